//! Eligibility policy stored by the ledger and evaluated by its callers.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Largest accepted `min_days` value (roughly ten years).
pub const MAX_MIN_DAYS: u32 = 3650;

/// Default minimum qualifying age in days.
pub const DEFAULT_MIN_DAYS: u32 = 7;

/// Which reference timestamp the caller compares against `min_days`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityMode {
    /// Age of the requester's platform account.
    #[default]
    Account,
    /// Time since the requester joined the community (guild membership).
    Guild,
}

impl EligibilityMode {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Guild => "guild",
        }
    }
}

impl fmt::Display for EligibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EligibilityMode {
    type Err = ConfigError;

    /// Parses `account` or `guild`, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(Self::Account),
            "guild" => Ok(Self::Guild),
            _ => Err(ConfigError::Validation {
                message: format!("mode must be 'account' or 'guild', got '{}'", s.trim()),
            }),
        }
    }
}

/// Minimum-age eligibility policy.
///
/// The ledger owns these parameters but never evaluates them: callers read
/// the policy, look up the requester's reference timestamp for `mode`, and
/// only invoke `claim` when `now - reference >= min_days`.
///
/// # Validation Rules
///
/// - `min_days` must be in `0..=3650`
///
/// # Example
///
/// ```no_run
/// # use keyledger_types::config::{EligibilityMode, EligibilityPolicy};
/// let policy = EligibilityPolicy::builder()
///     .min_days(30)
///     .mode(EligibilityMode::Guild)
///     .build()
///     .expect("valid policy");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EligibilityPolicy {
    /// Minimum qualifying age in days (0-3650).
    #[serde(default = "default_min_days")]
    pub min_days: u32,
    /// Which timestamp the age is measured from.
    #[serde(default)]
    pub mode: EligibilityMode,
}

#[bon::bon]
impl EligibilityPolicy {
    /// Creates a new eligibility policy with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `min_days` exceeds 3650.
    #[builder]
    pub fn new(
        #[builder(default = default_min_days())] min_days: u32,
        #[builder(default)] mode: EligibilityMode,
    ) -> Result<Self, ConfigError> {
        let policy = Self { min_days, mode };
        policy.validate()?;
        Ok(policy)
    }
}

impl EligibilityPolicy {
    /// Validates the policy values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_min_days(self.min_days)
    }

    /// Returns a copy with the provided fields of `update` applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the resulting policy is invalid.
    /// `self` is never modified.
    pub fn apply(&self, update: &PolicyUpdate) -> Result<Self, ConfigError> {
        let next = Self {
            min_days: update.min_days.unwrap_or(self.min_days),
            mode: update.mode.unwrap_or(self.mode),
        };
        next.validate()?;
        Ok(next)
    }
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self { min_days: default_min_days(), mode: EligibilityMode::default() }
    }
}

/// A partial change to the [`EligibilityPolicy`].
///
/// Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct PolicyUpdate {
    /// New minimum qualifying age in days.
    pub min_days: Option<u32>,
    /// New check mode.
    pub mode: Option<EligibilityMode>,
}

impl PolicyUpdate {
    /// Builds an update from untyped inputs, as received from a command surface.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `min_days` is negative or above
    /// 3650, or `mode` is neither `account` nor `guild`.
    pub fn parse(min_days: Option<i64>, mode: Option<&str>) -> Result<Self, ConfigError> {
        let min_days = min_days
            .map(|days| {
                u32::try_from(days).ok().filter(|d| *d <= MAX_MIN_DAYS).ok_or_else(|| {
                    ConfigError::Validation {
                        message: format!("min_days must be 0-{MAX_MIN_DAYS}, got {days}"),
                    }
                })
            })
            .transpose()?;
        let mode = mode.map(str::parse).transpose()?;
        Ok(Self { min_days, mode })
    }

    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_days.is_none() && self.mode.is_none()
    }
}

fn validate_min_days(min_days: u32) -> Result<(), ConfigError> {
    if min_days > MAX_MIN_DAYS {
        return Err(ConfigError::Validation {
            message: format!("min_days must be 0-{MAX_MIN_DAYS}, got {min_days}"),
        });
    }
    Ok(())
}

const fn default_min_days() -> u32 {
    DEFAULT_MIN_DAYS
}
