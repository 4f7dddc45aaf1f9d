//! Caller-side eligibility evaluation.
//!
//! The ledger stores the policy but never applies it. Before asking for a
//! key, the caller measures the identity's age from a reference timestamp:
//!
//! | Mode      | Reference                     |
//! |-----------|-------------------------------|
//! | `account` | when the account was created  |
//! | `guild`   | when the identity joined      |
//!
//! A missing reference is never eligible, even with `min_days = 0`.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use keyledger_types::{EligibilityMode, EligibilityPolicy};

/// Result of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The identity qualifies.
    Eligible,
    /// The identity does not qualify.
    Ineligible(IneligibleReason),
}

/// Why an identity does not qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    /// No reference timestamp was supplied for the active mode.
    MissingReference {
        /// The active check mode.
        mode: EligibilityMode,
    },
    /// The reference is too recent.
    TooRecent {
        /// The active check mode.
        mode: EligibilityMode,
        /// Required age in days.
        min_days: u32,
        /// When the identity becomes eligible.
        eligible_at: DateTime<Utc>,
    },
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference { mode: EligibilityMode::Account } => {
                write!(f, "Requirement not met. Account creation time is unknown.")
            },
            Self::MissingReference { mode: EligibilityMode::Guild } => {
                write!(f, "Requirement not met. Join time is unknown.")
            },
            Self::TooRecent { mode: EligibilityMode::Account, min_days, eligible_at } => write!(
                f,
                "Requirement not met. Your account must be at least {min_days} day(s) old \
                 (eligible from {}).",
                eligible_at.to_rfc3339()
            ),
            Self::TooRecent { mode: EligibilityMode::Guild, min_days, eligible_at } => write!(
                f,
                "Requirement not met. You must have been a member for at least {min_days} day(s) \
                 (eligible from {}).",
                eligible_at.to_rfc3339()
            ),
        }
    }
}

/// Applies `policy` to the reference timestamp of the active mode.
pub fn check(
    policy: &EligibilityPolicy,
    reference: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Eligibility {
    let Some(reference) = reference else {
        return Eligibility::Ineligible(IneligibleReason::MissingReference { mode: policy.mode });
    };

    let required = Duration::days(i64::from(policy.min_days));
    if now - reference < required {
        return Eligibility::Ineligible(IneligibleReason::TooRecent {
            mode: policy.mode,
            min_days: policy.min_days,
            eligible_at: reference + required,
        });
    }
    Eligibility::Eligible
}

/// Parses a timestamp argument: RFC 3339, a bare `YYYY-MM-DD` date (UTC
/// midnight), or integer Unix seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }
    if let Ok(secs) = raw.parse::<i64>()
        && let Some(ts) = DateTime::from_timestamp(secs, 0)
    {
        return Ok(ts);
    }
    Err(format!("expected RFC 3339, YYYY-MM-DD or Unix seconds, got '{raw}'"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn policy(min_days: u32, mode: EligibilityMode) -> EligibilityPolicy {
        EligibilityPolicy { min_days, mode }
    }

    #[test]
    fn test_old_enough_is_eligible() {
        let reference = now() - Duration::days(10);
        assert_eq!(
            check(&policy(7, EligibilityMode::Account), Some(reference), now()),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_exact_boundary_is_eligible() {
        let reference = now() - Duration::days(7);
        assert_eq!(
            check(&policy(7, EligibilityMode::Guild), Some(reference), now()),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_too_recent_reports_eligible_at() {
        let reference = now() - Duration::days(2);
        match check(&policy(7, EligibilityMode::Account), Some(reference), now()) {
            Eligibility::Ineligible(IneligibleReason::TooRecent { eligible_at, .. }) => {
                assert_eq!(eligible_at, reference + Duration::days(7));
            },
            other => panic!("expected TooRecent, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_reference_is_never_eligible() {
        let result = check(&policy(0, EligibilityMode::Guild), None, now());
        assert_eq!(
            result,
            Eligibility::Ineligible(IneligibleReason::MissingReference {
                mode: EligibilityMode::Guild
            })
        );
    }

    #[test]
    fn test_zero_days_accepts_any_past_reference() {
        assert_eq!(
            check(&policy(0, EligibilityMode::Account), Some(now()), now()),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02T01:00:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02").unwrap(), expected);
        assert_eq!(parse_timestamp(&expected.timestamp().to_string()).unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
