//! Deterministic naming and hashing for generated constraints and indexes.
//!
//! Generated objects are named `{table}_{hash8}_{suffix}`, where `hash8` is
//! a prefix of the SHA-256 of the object's *normalized* definition. The
//! normalization substitutes a fixed placeholder for the owning table name
//! and sorts participating columns, so the hash is stable under confirmed
//! renames and declaration-order changes: only a change to the object's
//! shape (column set, predicate, uniqueness, actions) produces a new hash.
//! The actual table name is spliced back in when the name is rendered.

use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::model::ReferentialAction;
use crate::types::collapse_whitespace;

/// Placeholder substituted for the owning table name before hashing.
pub const TABLE_PLACEHOLDER: &str = "__tbl__";

/// Suffix identifying the kind of a generated object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameSuffix {
    /// Primary key constraint.
    PrimaryKey,
    /// Plain or unique index.
    Index,
    /// Unique constraint.
    Unique,
    /// Foreign key constraint.
    ForeignKey,
    /// Check constraint.
    Check,
    /// Trigger.
    Trigger,
}

impl NameSuffix {
    /// The textual suffix. The `drift_` marker lets introspection recognize
    /// objects this tool owns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "drift_pk",
            Self::Index => "drift_idx",
            Self::Unique => "drift_key",
            Self::ForeignKey => "drift_fk",
            Self::Check => "drift_chk",
            Self::Trigger => "drift_trg",
        }
    }
}

/// First 8 hex characters of the SHA-256 of a normalized definition.
pub fn definition_hash(normalized_definition: &str) -> String {
    let digest = Sha256::digest(normalized_definition.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Render the deterministic name of a generated object.
pub fn generated_name(table: &str, normalized_definition: &str, suffix: NameSuffix) -> String {
    format!(
        "{}_{}_{}",
        table,
        definition_hash(normalized_definition),
        suffix.as_str()
    )
}

/// Normalized definition of a primary key.
pub fn normalize_primary_key(columns: &[SmolStr]) -> String {
    format!("primary key on {} ({})", TABLE_PLACEHOLDER, sorted_list(columns))
}

/// Normalized definition of an index.
pub fn normalize_index(
    columns: &[SmolStr],
    unique: bool,
    method: &str,
    predicate: Option<&str>,
) -> String {
    let mut def = String::new();
    if unique {
        def.push_str("unique ");
    }
    def.push_str(&format!(
        "index on {} using {} ({})",
        TABLE_PLACEHOLDER,
        method,
        sorted_list(columns)
    ));
    if let Some(pred) = predicate {
        def.push_str(&format!(" where {}", normalize_expression(pred)));
    }
    def
}

/// Normalized definition of a unique constraint.
pub fn normalize_unique(columns: &[SmolStr], nulls_distinct: bool) -> String {
    let mut def = format!("unique on {} ({})", TABLE_PLACEHOLDER, sorted_list(columns));
    if !nulls_distinct {
        def.push_str(" nulls not distinct");
    }
    def
}

/// Normalized definition of a check constraint.
pub fn normalize_check(expression: &str) -> String {
    format!(
        "check on {} ({})",
        TABLE_PLACEHOLDER,
        normalize_expression(expression)
    )
}

/// Normalized definition of a foreign key.
///
/// Column pairs are sorted by the referencing column so composite keys hash
/// identically regardless of declaration order.
pub fn normalize_foreign_key(
    columns: &[SmolStr],
    referenced_table: &str,
    referenced_columns: &[SmolStr],
    on_delete: ReferentialAction,
    on_update: ReferentialAction,
) -> String {
    let mut pairs: Vec<(&SmolStr, Option<&SmolStr>)> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c, referenced_columns.get(i)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let local: Vec<&str> = pairs.iter().map(|(c, _)| c.as_str()).collect();
    let referenced: Vec<&str> = pairs
        .iter()
        .map(|(_, r)| r.map(|r| r.as_str()).unwrap_or_default())
        .collect();

    format!(
        "foreign key on {} ({}) references {} ({}) on delete {} on update {}",
        TABLE_PLACEHOLDER,
        local.join(","),
        referenced_table,
        referenced.join(","),
        on_delete.as_sql().to_lowercase(),
        on_update.as_sql().to_lowercase(),
    )
}

/// Normalized definition of a trigger.
pub fn normalize_trigger(definition: &str) -> String {
    format!(
        "trigger on {} ({})",
        TABLE_PLACEHOLDER,
        normalize_expression(definition)
    )
}

/// Canonicalize an SQL expression for hashing and comparison.
///
/// Collapses whitespace, strips one level of enclosing parentheses, and
/// removes identifier quoting. This is a textual canonicalization, not a
/// parse; declared expressions should be written the way the catalog prints
/// them back for byte-stable hashing.
pub fn normalize_expression(expression: &str) -> String {
    let mut expr = collapse_whitespace(expression.trim());
    while expr.starts_with('(') && expr.ends_with(')') && balanced_without_outer(&expr) {
        expr = expr[1..expr.len() - 1].trim().to_string();
    }
    expr.replace('"', "")
}

/// Substitute one identifier for another inside an expression, respecting
/// word boundaries. Used to map renamed columns through check expressions
/// and index predicates.
pub fn substitute_identifier(expression: &str, from: &str, to: &str) -> String {
    let pattern = format!(r"\b{}\b", escape_regex(from));
    match regex_lite::Regex::new(&pattern) {
        Ok(re) => re.replace_all(expression, to).into_owned(),
        Err(_) => expression.to_string(),
    }
}

fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if !ch.is_alphanumeric() && ch != '_' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn balanced_without_outer(expr: &str) -> bool {
    // True when the first '(' matches the final ')'.
    let mut depth = 0usize;
    for (i, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn sorted_list(columns: &[SmolStr]) -> String {
    let mut names: Vec<&str> = columns.iter().map(SmolStr::as_str).collect();
    names.sort_unstable();
    names.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_is_stable_under_column_order() {
        let ab = normalize_index(&["a".into(), "b".into()], true, "btree", None);
        let ba = normalize_index(&["b".into(), "a".into()], true, "btree", None);
        assert_eq!(definition_hash(&ab), definition_hash(&ba));
    }

    #[test]
    fn test_hash_changes_with_shape() {
        let plain = normalize_index(&["a".into()], false, "btree", None);
        let unique = normalize_index(&["a".into()], true, "btree", None);
        assert_ne!(definition_hash(&plain), definition_hash(&unique));
    }

    #[test]
    fn test_generated_name_splices_table() {
        let def = normalize_unique(&["email".into()], true);
        let name = generated_name("users", &def, NameSuffix::Unique);
        assert!(name.starts_with("users_"));
        assert!(name.ends_with("_drift_key"));

        // Same shape on a renamed table keeps the hash, changes the prefix.
        let renamed = generated_name("accounts", &def, NameSuffix::Unique);
        let hash = |n: &str| n.split('_').nth(1).unwrap().to_string();
        assert_eq!(hash(&name), hash(&renamed));
    }

    #[test]
    fn test_normalize_expression_strips_outer_parens() {
        assert_eq!(normalize_expression("(price > 0)"), "price > 0");
        assert_eq!(normalize_expression("((a > 0) AND (b > 0))"), "(a > 0) AND (b > 0)");
        assert_eq!(normalize_expression("  price   >  0 "), "price > 0");
    }

    #[test]
    fn test_substitute_identifier_word_boundaries() {
        let expr = "price > 0 and priced < price";
        assert_eq!(
            substitute_identifier(expr, "price", "amount"),
            "amount > 0 and priced < amount"
        );
    }

    #[test]
    fn test_fk_pairs_sort_together() {
        let a = normalize_foreign_key(
            &["a".into(), "b".into()],
            "other",
            &["x".into(), "y".into()],
            ReferentialAction::NoAction,
            ReferentialAction::NoAction,
        );
        let b = normalize_foreign_key(
            &["b".into(), "a".into()],
            "other",
            &["y".into(), "x".into()],
            ReferentialAction::NoAction,
            ReferentialAction::NoAction,
        );
        assert_eq!(a, b);
    }
}
