//! Changeset generators.
//!
//! A generator is a `(predicate, transform)` pair: the predicate tests a
//! diff entry's kind and path shape to claim it, the transform turns the
//! entry into zero or more changesets. Generators are tried in a fixed
//! registry order per domain (tables, columns, primary key, indexes,
//! unique, foreign keys, enums, checks, triggers); exactly one generator
//! must claim each entry — an unclaimed entry aborts the run, and an entry
//! claimed twice is reported as the engine bug it is.
//!
//! All context a transform needs travels in the immutable
//! [`GeneratorContext`]; there is no shared generator state.

pub mod columns;
pub mod constraints;
pub mod enums;
pub mod indexes;
pub mod tables;
pub mod triggers;

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use smol_str::SmolStr;

use drift_schema::Renames;
use drift_schema::naming::substitute_identifier;

use crate::changeset::Changeset;
use crate::diff::{DiffEntry, DiffKind};
use crate::error::{MigrateError, MigrateResult};

/// Context passed into every generator call.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    /// Schema namespace being generated.
    pub schema_name: &'a str,
    /// Confirmed renames for this invocation.
    pub renames: &'a Renames,
    /// Declared tables being created in this same batch.
    pub tables_to_add: &'a HashSet<String>,
    /// Tables being dropped in this same batch.
    pub tables_to_drop: &'a HashSet<String>,
}

impl<'a> GeneratorContext<'a> {
    /// Whether `table` (declared name) is created in this batch.
    pub fn is_new_table(&self, table: &str) -> bool {
        self.tables_to_add.contains(table)
    }

    /// Whether `table` (declared name) is dropped in this batch.
    pub fn is_dropped_table(&self, table: &str) -> bool {
        self.tables_to_drop.contains(table)
    }

    /// The live (pre-rename) name of a declared table. Changesets that run
    /// before the rename tier must address tables by this name.
    pub fn live_table(&self, declared: &str) -> SmolStr {
        self.renames.table_from(self.schema_name, declared)
    }

    /// The live (pre-rename) name of a declared column.
    pub fn live_column(&self, declared_table: &str, declared_column: &str) -> SmolStr {
        self.renames
            .column_from(self.schema_name, declared_table, declared_column)
    }

    /// Map declared column names inside an expression back to their live
    /// names.
    pub fn live_expression(&self, declared_table: &str, expression: &str) -> String {
        match self.renames.columns_for(self.schema_name, declared_table) {
            Some(pairs) => pairs.iter().fold(expression.to_string(), |acc, r| {
                substitute_identifier(&acc, &r.to, &r.from)
            }),
            None => expression.to_string(),
        }
    }
}

/// One registered generator.
pub struct Generator {
    /// Name, for ambiguity diagnostics.
    pub name: &'static str,
    /// Predicate over the entry's kind and path shape.
    pub matches: fn(&DiffEntry) -> bool,
    /// Transform producing zero or more changesets.
    pub apply: fn(&DiffEntry, &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>>,
}

/// The registry, in fixed evaluation order.
fn registry() -> &'static [Generator] {
    &[
        // Tables
        Generator {
            name: "create_table",
            matches: tables::matches_create_table,
            apply: tables::create_table,
        },
        Generator {
            name: "drop_table",
            matches: tables::matches_drop_table,
            apply: tables::drop_table,
        },
        // Columns
        Generator {
            name: "create_column",
            matches: columns::matches_create_column,
            apply: columns::create_column,
        },
        Generator {
            name: "drop_column",
            matches: columns::matches_drop_column,
            apply: columns::drop_column,
        },
        Generator {
            name: "change_column_type",
            matches: columns::matches_change_type,
            apply: columns::change_type,
        },
        Generator {
            name: "change_column_nullable",
            matches: columns::matches_change_nullable,
            apply: columns::change_nullable,
        },
        Generator {
            name: "change_column_default",
            matches: columns::matches_change_default,
            apply: columns::change_default,
        },
        Generator {
            name: "change_column_volatility",
            matches: columns::matches_change_volatility,
            apply: columns::change_volatility,
        },
        Generator {
            name: "change_column_identity",
            matches: columns::matches_change_identity,
            apply: columns::change_identity,
        },
        // Primary key
        Generator {
            name: "primary_key",
            matches: constraints::matches_primary_key,
            apply: constraints::primary_key,
        },
        // Indexes
        Generator {
            name: "index",
            matches: indexes::matches_index,
            apply: indexes::index,
        },
        // Unique constraints
        Generator {
            name: "unique",
            matches: constraints::matches_unique,
            apply: constraints::unique,
        },
        // Foreign keys
        Generator {
            name: "foreign_key",
            matches: constraints::matches_foreign_key,
            apply: constraints::foreign_key,
        },
        // Enums
        Generator {
            name: "enum_type",
            matches: enums::matches_enum,
            apply: enums::enum_type,
        },
        Generator {
            name: "enum_labels",
            matches: enums::matches_enum_labels,
            apply: enums::enum_labels,
        },
        // Checks
        Generator {
            name: "check",
            matches: constraints::matches_check,
            apply: constraints::check,
        },
        // Triggers
        Generator {
            name: "trigger",
            matches: triggers::matches_trigger,
            apply: triggers::trigger,
        },
    ]
}

/// Run every diff entry through the registry.
///
/// Fails the whole run on an unclaimed or doubly-claimed entry; both are
/// engine invariant violations, not skippable conditions.
pub fn generate_changesets(
    entries: &[DiffEntry],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let mut changesets = Vec::new();

    for entry in entries {
        let claims: Vec<&Generator> = registry()
            .iter()
            .filter(|g| (g.matches)(entry))
            .collect();

        match claims.as_slice() {
            [] => {
                return Err(MigrateError::UnmatchedDiffEntry {
                    path: entry.path_display(),
                });
            }
            [generator] => {
                changesets.extend((generator.apply)(entry, ctx)?);
            }
            [first, second, ..] => {
                return Err(MigrateError::AmbiguousDiffEntry {
                    path: entry.path_display(),
                    first: first.name,
                    second: second.name,
                });
            }
        }
    }

    Ok(changesets)
}

/// Changesets for the confirmed renames themselves. These are not derived
/// from diff entries: the rename-mapped trees diff to nothing where a
/// rename is confirmed, and the rename becomes a single `ALTER ... RENAME`
/// instead of a drop/create pair.
pub fn rename_changesets(ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    let mut changesets = tables::rename_table_changesets(ctx);
    changesets.extend(columns::rename_column_changesets(ctx));
    changesets
}

/// Collect the declared names of tables created or dropped by this batch,
/// read from the table-level diff entries.
pub fn collect_table_sets(entries: &[DiffEntry]) -> (HashSet<String>, HashSet<String>) {
    let mut to_add = HashSet::new();
    let mut to_drop = HashSet::new();
    for entry in entries {
        if let [root, table] = entry.path.as_slice() {
            if root == "tables" {
                match entry.kind {
                    DiffKind::Create => {
                        to_add.insert(table.clone());
                    }
                    DiffKind::Remove => {
                        to_drop.insert(table.clone());
                    }
                    DiffKind::Change => {}
                }
            }
        }
    }
    (to_add, to_drop)
}

/// Decode a diff payload into a model type.
pub(crate) fn decode<T: DeserializeOwned>(
    generator: &'static str,
    entry: &DiffEntry,
    payload: Option<&serde_json::Value>,
) -> MigrateResult<T> {
    let value = payload.ok_or_else(|| MigrateError::InvalidPayload {
        generator,
        path: entry.path_display(),
        message: "missing payload".to_string(),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| MigrateError::InvalidPayload {
        generator,
        path: entry.path_display(),
        message: e.to_string(),
    })
}

/// Shape helpers shared by the predicates.
pub(crate) fn is_table_entry(entry: &DiffEntry) -> bool {
    matches!(entry.path.as_slice(), [root, _] if root == "tables")
}

pub(crate) fn is_column_entry(entry: &DiffEntry) -> bool {
    matches!(entry.path.as_slice(), [root, _, coll, _] if root == "tables" && coll == "columns")
}

pub(crate) fn is_column_field_entry(entry: &DiffEntry, field: &str) -> bool {
    matches!(
        entry.path.as_slice(),
        [root, _, coll, _, last] if root == "tables" && coll == "columns" && last == field
    )
}

pub(crate) fn is_collection_entry(entry: &DiffEntry, collection: &str) -> bool {
    matches!(
        entry.path.as_slice(),
        [root, _, coll, _] if root == "tables" && coll == collection
    )
}

pub(crate) fn table_of(entry: &DiffEntry) -> &str {
    entry.segment(1).unwrap_or_default()
}

pub(crate) fn column_of(entry: &DiffEntry) -> &str {
    entry.segment(3).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use drift_schema::{DeclaredColumn, DeclaredSchema, DeclaredTable, build_declared};

    #[test]
    fn test_collect_table_sets() {
        let remote = build_declared(
            &DeclaredSchema::new("public").table(
                DeclaredTable::new("old").column(DeclaredColumn::new("id", "bigint")),
            ),
        )
        .unwrap();
        let local = build_declared(
            &DeclaredSchema::new("public").table(
                DeclaredTable::new("new").column(DeclaredColumn::new("id", "bigint")),
            ),
        )
        .unwrap();

        let entries = diff(&remote, &local).unwrap();
        let (to_add, to_drop) = collect_table_sets(&entries);
        assert!(to_add.contains("new"));
        assert!(to_drop.contains("old"));
    }

    #[test]
    fn test_unmatched_entry_fails_run() {
        let entry = DiffEntry {
            kind: DiffKind::Change,
            path: vec!["nonsense".to_string()],
            value: Some(serde_json::json!(1)),
            old_value: Some(serde_json::json!(2)),
        };
        let renames = Renames::new();
        let empty = HashSet::new();
        let ctx = GeneratorContext {
            schema_name: "public",
            renames: &renames,
            tables_to_add: &empty,
            tables_to_drop: &empty,
        };

        let result = generate_changesets(std::slice::from_ref(&entry), &ctx);
        assert!(matches!(result, Err(MigrateError::UnmatchedDiffEntry { .. })));
    }
}
