//! Plain-text exports of the pool and the claims.

use std::collections::BTreeMap;

use keyledger_types::{Identity, Key};

/// Header row of the claims export.
pub const CLAIMS_CSV_HEADER: &str = "user_id,key";

/// One key per line, in pool order.
pub(crate) fn pool_text<'a>(pool: impl Iterator<Item = &'a Key>) -> String {
    let mut out = String::new();
    for key in pool {
        out.push_str(key.as_str());
        out.push('\n');
    }
    out
}

/// `user_id,key` CSV, one row per claim, ordered by identity.
pub(crate) fn claims_csv(claims: &BTreeMap<Identity, Key>) -> String {
    let mut out = String::with_capacity(CLAIMS_CSV_HEADER.len() + 1 + claims.len() * 32);
    out.push_str(CLAIMS_CSV_HEADER);
    out.push('\n');
    for (identity, key) in claims {
        push_field(&mut out, identity.as_str());
        out.push(',');
        push_field(&mut out, key.as_str());
        out.push('\n');
    }
    out
}

/// Appends a field, quoting it per RFC 4180 when it contains a delimiter,
/// a quote or a line break.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_text_one_key_per_line() {
        let keys = [Key::new("A"), Key::new("B")];
        assert_eq!(pool_text(keys.iter()), "A\nB\n");
        assert_eq!(pool_text(std::iter::empty()), "");
    }

    #[test]
    fn test_claims_csv_header_and_rows() {
        let mut claims = BTreeMap::new();
        claims.insert(Identity::new("2"), Key::new("K2"));
        claims.insert(Identity::new("1"), Key::new("K1"));
        assert_eq!(claims_csv(&claims), "user_id,key\n1,K1\n2,K2\n");
    }

    #[test]
    fn test_claims_csv_quotes_special_fields() {
        let mut claims = BTreeMap::new();
        claims.insert(Identity::new("7"), Key::new("a,b\"c"));
        assert_eq!(claims_csv(&claims), "user_id,key\n7,\"a,b\"\"c\"\n");
    }
}
