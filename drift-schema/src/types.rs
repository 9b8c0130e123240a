//! PostgreSQL type-spec parsing and canonical rendering.
//!
//! Both the declared schema and the introspected snapshot carry column types
//! as strings. The catalog spells them one way (`character varying`,
//! `timestamp with time zone`) and users another (`varchar(255)`,
//! `timestamptz`), so every type is parsed into a [`TypeSpec`] and rendered
//! back through a single canonical form before it enters the model. Two
//! semantically-equal types always canonicalize to the same string.

use std::fmt;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A parsed PostgreSQL type.
///
/// Only the families the safe-type-change classifier reasons about get a
/// structured variant; everything else is carried verbatim (lowercased,
/// whitespace-collapsed) in [`TypeSpec::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSpec {
    /// `character varying`, with optional length.
    Varchar {
        /// Maximum length, `None` for unbounded.
        length: Option<u32>,
    },
    /// `character`, with optional length.
    Char {
        /// Fixed length, `None` for length 1 semantics.
        length: Option<u32>,
    },
    /// `text`.
    Text,
    /// `numeric`, with optional precision and scale.
    Numeric {
        /// Total digits, `None` for unconstrained.
        precision: Option<u32>,
        /// Digits after the decimal point; only meaningful with a precision.
        scale: Option<u32>,
    },
    /// `timestamp`, optionally zoned, with optional fractional precision.
    Timestamp {
        /// Fractional-second digits.
        precision: Option<u32>,
        /// `with time zone` vs `without time zone`.
        with_time_zone: bool,
    },
    /// `time`, optionally zoned, with optional fractional precision.
    Time {
        /// Fractional-second digits.
        precision: Option<u32>,
        /// `with time zone` vs `without time zone`.
        with_time_zone: bool,
    },
    /// `bit varying`, with optional length.
    BitVarying {
        /// Maximum bit length, `None` for unbounded.
        length: Option<u32>,
    },
    /// Any other type, canonicalized textually.
    Other(String),
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Varchar { length } => write_parameterized(f, "character varying", &[*length]),
            Self::Char { length } => write_parameterized(f, "character", &[*length]),
            Self::Text => f.write_str("text"),
            Self::Numeric { precision, scale } => {
                write_parameterized(f, "numeric", &[*precision, *scale])
            }
            Self::Timestamp {
                precision,
                with_time_zone,
            } => {
                write_parameterized(f, "timestamp", &[*precision])?;
                if *with_time_zone {
                    f.write_str(" with time zone")?;
                }
                Ok(())
            }
            Self::Time {
                precision,
                with_time_zone,
            } => {
                write_parameterized(f, "time", &[*precision])?;
                if *with_time_zone {
                    f.write_str(" with time zone")?;
                }
                Ok(())
            }
            Self::BitVarying { length } => write_parameterized(f, "bit varying", &[*length]),
            Self::Other(name) => f.write_str(name),
        }
    }
}

fn write_parameterized(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    args: &[Option<u32>],
) -> fmt::Result {
    f.write_str(name)?;
    let present: Vec<u32> = args.iter().copied().flatten().collect();
    if !present.is_empty() {
        let rendered: Vec<String> = present.iter().map(u32::to_string).collect();
        write!(f, "({})", rendered.join(","))?;
    }
    Ok(())
}

/// Parse a raw type string into a [`TypeSpec`].
///
/// Never fails: unknown types land in [`TypeSpec::Other`] with their
/// spelling canonicalized, so they still compare stably.
pub fn parse_type(raw: &str) -> TypeSpec {
    let normalized = collapse_whitespace(&raw.to_lowercase());

    // Split "name(args) suffix" into its parts. The time-zone suffix trails
    // the argument list for types like `timestamp(3) with time zone`.
    let re = Regex::new(r"^(.+?)\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)\s*(.*)$").expect("type regex");

    let (base, first, second) = match re.captures(&normalized) {
        Some(caps) => {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let suffix = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
            let base = if suffix.is_empty() {
                name.to_string()
            } else {
                format!("{name} {suffix}")
            };
            let first = caps.get(2).and_then(|m| m.as_str().parse().ok());
            let second = caps.get(3).and_then(|m| m.as_str().parse().ok());
            (base, first, second)
        }
        None => (normalized.clone(), None, None),
    };

    match base.as_str() {
        "character varying" | "varchar" => TypeSpec::Varchar { length: first },
        "character" | "char" | "bpchar" => TypeSpec::Char { length: first },
        "text" => TypeSpec::Text,
        "numeric" | "decimal" => TypeSpec::Numeric {
            precision: first,
            scale: second,
        },
        "timestamp" | "timestamp without time zone" => TypeSpec::Timestamp {
            precision: first,
            with_time_zone: false,
        },
        "timestamp with time zone" | "timestamptz" => TypeSpec::Timestamp {
            precision: first,
            with_time_zone: true,
        },
        "time" | "time without time zone" => TypeSpec::Time {
            precision: first,
            with_time_zone: false,
        },
        "time with time zone" | "timetz" => TypeSpec::Time {
            precision: first,
            with_time_zone: true,
        },
        "bit varying" | "varbit" => TypeSpec::BitVarying { length: first },
        other => TypeSpec::Other(canonical_other(other, first, second)),
    }
}

/// Canonicalize a raw type string.
pub fn canonical_type(raw: &str) -> String {
    parse_type(raw).to_string()
}

/// Canonical spelling for types outside the classified families.
fn canonical_other(name: &str, first: Option<u32>, second: Option<u32>) -> String {
    let name = match name {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "float4" => "real",
        "float8" | "double" => "double precision",
        other => other,
    };

    let args: Vec<u32> = [first, second].into_iter().flatten().collect();
    if args.is_empty() {
        name.to_string()
    } else {
        let rendered: Vec<String> = args.iter().map(u32::to_string).collect();
        format!("{}({})", name, rendered.join(","))
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub(crate) fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_varchar_with_length() {
        assert_eq!(
            parse_type("varchar(255)"),
            TypeSpec::Varchar { length: Some(255) }
        );
        assert_eq!(
            parse_type("character varying(255)"),
            TypeSpec::Varchar { length: Some(255) }
        );
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(
            parse_type("numeric(10, 2)"),
            TypeSpec::Numeric {
                precision: Some(10),
                scale: Some(2)
            }
        );
        assert_eq!(
            parse_type("decimal"),
            TypeSpec::Numeric {
                precision: None,
                scale: None
            }
        );
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(
            parse_type("timestamptz"),
            TypeSpec::Timestamp {
                precision: None,
                with_time_zone: true
            }
        );
        assert_eq!(
            parse_type("timestamp(3) with time zone"),
            TypeSpec::Timestamp {
                precision: Some(3),
                with_time_zone: true
            }
        );
        assert_eq!(
            parse_type("TIMESTAMP WITHOUT TIME ZONE"),
            TypeSpec::Timestamp {
                precision: None,
                with_time_zone: false
            }
        );
    }

    #[test]
    fn test_canonical_aliases_agree() {
        assert_eq!(canonical_type("varchar(40)"), canonical_type("character   varying(40)"));
        assert_eq!(canonical_type("int4"), "integer");
        assert_eq!(canonical_type("int8"), "bigint");
        assert_eq!(canonical_type("timetz"), "time with time zone");
    }

    #[test]
    fn test_canonical_rendering_round_trips() {
        for raw in [
            "character varying(255)",
            "numeric(10,2)",
            "timestamp(6) with time zone",
            "bit varying(8)",
            "uuid",
            "double precision",
        ] {
            assert_eq!(canonical_type(&canonical_type(raw)), canonical_type(raw));
        }
    }

    #[test]
    fn test_other_types_pass_through() {
        assert_eq!(parse_type("uuid"), TypeSpec::Other("uuid".to_string()));
        assert_eq!(parse_type("jsonb"), TypeSpec::Other("jsonb".to_string()));
    }
}
