//! Safe-type-change classification.
//!
//! A column type change is safe only when it is provably non-narrowing for
//! its type family. Anything not explicitly matched is unsafe, and the
//! column-change generator attaches a Blocking warning carrying the old and
//! new types.

use drift_schema::{TypeSpec, parse_type};

/// Whether changing a column from `old` to `new` is provably lossless.
pub fn is_safe_change(old: &str, new: &str) -> bool {
    let old_spec = parse_type(old);
    let new_spec = parse_type(new);

    if old_spec == new_spec {
        return true;
    }

    match (&old_spec, &new_spec) {
        // varchar(n) may grow, lose its limit, or become text.
        (TypeSpec::Varchar { length: old_len }, TypeSpec::Varchar { length: new_len }) => {
            widens(*old_len, *new_len)
        }
        (TypeSpec::Varchar { .. }, TypeSpec::Text) => true,

        // numeric(p,s) may grow p with the same s, or drop the
        // precision/scale constraint entirely.
        (
            TypeSpec::Numeric {
                precision: old_p,
                scale: old_s,
            },
            TypeSpec::Numeric {
                precision: new_p,
                scale: new_s,
            },
        ) => match (old_p, new_p) {
            (_, None) => new_s.is_none(),
            (Some(op), Some(np)) => np >= op && old_s == new_s,
            (None, Some(_)) => false,
        },

        // timestamp and timestamptz interconvert; fractional precision may
        // widen or be removed.
        (
            TypeSpec::Timestamp {
                precision: old_p, ..
            },
            TypeSpec::Timestamp {
                precision: new_p, ..
            },
        ) => widens(*old_p, *new_p),

        // time precision may widen or be removed; zoning must not change.
        (
            TypeSpec::Time {
                precision: old_p,
                with_time_zone: old_tz,
            },
            TypeSpec::Time {
                precision: new_p,
                with_time_zone: new_tz,
            },
        ) => old_tz == new_tz && widens(*old_p, *new_p),

        // bit varying(n) may grow or lose its limit.
        (TypeSpec::BitVarying { length: old_len }, TypeSpec::BitVarying { length: new_len }) => {
            widens(*old_len, *new_len)
        }

        // Fail closed.
        _ => false,
    }
}

/// A constraint widened: removed entirely, or grown while one existed.
fn widens(old: Option<u32>, new: Option<u32>) -> bool {
    match (old, new) {
        (_, None) => true,
        (Some(o), Some(n)) => n >= o,
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varchar_widening() {
        assert!(is_safe_change("varchar(50)", "varchar(100)"));
        assert!(is_safe_change("character varying(50)", "character varying"));
        assert!(is_safe_change("varchar(50)", "text"));
        assert!(!is_safe_change("varchar(100)", "varchar(50)"));
        assert!(!is_safe_change("text", "varchar(100)"));
    }

    #[test]
    fn test_numeric_rules() {
        assert!(is_safe_change("numeric(10,2)", "numeric(12,2)"));
        assert!(is_safe_change("numeric(10,2)", "numeric"));
        assert!(!is_safe_change("numeric(10,2)", "numeric(10,4)"));
        assert!(!is_safe_change("numeric(12,2)", "numeric(10,2)"));
        assert!(!is_safe_change("numeric", "numeric(18,6)"));
    }

    #[test]
    fn test_timestamp_zone_interconversion() {
        assert!(is_safe_change("timestamp", "timestamp with time zone"));
        assert!(is_safe_change("timestamptz", "timestamp"));
        assert!(is_safe_change("timestamp(3)", "timestamp(6) with time zone"));
        assert!(!is_safe_change("timestamp(6)", "timestamp(3)"));
    }

    #[test]
    fn test_time_zone_must_match() {
        assert!(is_safe_change("time(3)", "time(6)"));
        assert!(is_safe_change("time(3)", "time"));
        assert!(!is_safe_change("time", "time with time zone"));
    }

    #[test]
    fn test_bit_varying() {
        assert!(is_safe_change("bit varying(8)", "bit varying(16)"));
        assert!(is_safe_change("varbit(8)", "bit varying"));
        assert!(!is_safe_change("bit varying(16)", "bit varying(8)"));
    }

    #[test]
    fn test_unmatched_families_fail_closed() {
        assert!(!is_safe_change("integer", "bigint"));
        assert!(!is_safe_change("text", "integer"));
        assert!(!is_safe_change("uuid", "text"));
    }

    #[test]
    fn test_identical_types_are_safe() {
        assert!(is_safe_change("integer", "integer"));
        assert!(is_safe_change("varchar(10)", "character varying(10)"));
    }
}
