//! Structural diff between canonical schema trees.
//!
//! The diff operates on the serialized keyed-object form of two
//! [`SchemaMigrationInfo`] trees. A key present on only one side yields a
//! single CREATE/REMOVE entry carrying the whole subtree; the walk never
//! descends into an added or removed subtree, which is how a whole-table
//! create or drop absorbs its columns and constraints instead of
//! decomposing into per-object entries. Keys present on both sides recurse,
//! except at nodes the generators treat as atomic (the primary key and the
//! hashed constraint/index entries), which compare wholesale.
//!
//! Entry order is tree-traversal order and carries no meaning; ordering is
//! entirely the sorter's job.

use serde_json::Value;

use drift_schema::SchemaMigrationInfo;

use crate::error::MigrateResult;

/// The kind of a diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Present in the local tree only.
    Create,
    /// Present in the remote tree only.
    Remove,
    /// Present in both with different values.
    Change,
}

/// One entry of a structural diff.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// Entry kind.
    pub kind: DiffKind,
    /// Location in the canonical tree, e.g.
    /// `["tables", "users", "columns", "email"]`.
    pub path: Vec<String>,
    /// New value, for Create and Change entries.
    pub value: Option<Value>,
    /// Old value, for Remove and Change entries.
    pub old_value: Option<Value>,
}

impl DiffEntry {
    /// Joined path for error messages.
    pub fn path_display(&self) -> String {
        self.path.join(".")
    }

    /// Path segment at `index`, if present.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.get(index).map(String::as_str)
    }
}

/// Diff two canonical trees: `remote` is the introspected state, `local`
/// the declared target. Pure; `diff(x, x)` is empty.
pub fn diff(
    remote: &SchemaMigrationInfo,
    local: &SchemaMigrationInfo,
) -> MigrateResult<Vec<DiffEntry>> {
    let remote_value = serde_json::to_value(remote)?;
    let local_value = serde_json::to_value(local)?;

    let mut entries = Vec::new();
    let mut path = Vec::new();
    diff_value(&remote_value, &local_value, &mut path, &mut entries);
    Ok(entries)
}

fn diff_value(old: &Value, new: &Value, path: &mut Vec<String>, out: &mut Vec<DiffEntry>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) if !is_atomic(path) => {
            for (key, old_child) in old_map {
                match new_map.get(key) {
                    Some(new_child) => {
                        path.push(key.clone());
                        diff_value(old_child, new_child, path, out);
                        path.pop();
                    }
                    None => {
                        let mut removed_path = path.clone();
                        removed_path.push(key.clone());
                        out.push(DiffEntry {
                            kind: DiffKind::Remove,
                            path: removed_path,
                            value: None,
                            old_value: Some(old_child.clone()),
                        });
                    }
                }
            }
            for (key, new_child) in new_map {
                if !old_map.contains_key(key) {
                    let mut created_path = path.clone();
                    created_path.push(key.clone());
                    out.push(DiffEntry {
                        kind: DiffKind::Create,
                        path: created_path,
                        value: Some(new_child.clone()),
                        old_value: None,
                    });
                }
            }
        }
        _ => {
            if old != new {
                out.push(DiffEntry {
                    kind: DiffKind::Change,
                    path: path.clone(),
                    value: Some(new.clone()),
                    old_value: Some(old.clone()),
                });
            }
        }
    }
}

/// Nodes compared wholesale even when both sides are objects.
///
/// Hashed collection entries share their key exactly when their shape is
/// unchanged, so a Change on one can only mean its catalog name differs;
/// decomposing further would only scatter that fact. The primary key is a
/// single logical object and is replaced, not field-patched.
fn is_atomic(path: &[String]) -> bool {
    match path {
        [first, _table, third] => first == "tables" && third == "primary_key",
        [first, _table, third, _key] => {
            first == "tables"
                && matches!(
                    third.as_str(),
                    "unique" | "checks" | "foreign_keys" | "indexes" | "triggers"
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_schema::{
        DeclaredColumn, DeclaredIndex, DeclaredSchema, DeclaredTable, build_declared,
    };
    use pretty_assertions::assert_eq;

    fn model(schema: DeclaredSchema) -> SchemaMigrationInfo {
        build_declared(&schema).unwrap()
    }

    #[test]
    fn test_self_diff_is_empty() {
        let info = model(
            DeclaredSchema::new("public").table(
                DeclaredTable::new("users")
                    .column(DeclaredColumn::new("id", "bigint").identity_always())
                    .column(DeclaredColumn::new("email", "text"))
                    .primary_key(["id"])
                    .index(DeclaredIndex::on(["email"])),
            ),
        );
        assert_eq!(diff(&info, &info).unwrap(), Vec::new());
    }

    #[test]
    fn test_new_table_is_one_entry() {
        let remote = model(DeclaredSchema::new("public"));
        let local = model(
            DeclaredSchema::new("public").table(
                DeclaredTable::new("users")
                    .column(DeclaredColumn::new("id", "bigint"))
                    .primary_key(["id"])
                    .index(DeclaredIndex::on(["id"])),
            ),
        );

        let entries = diff(&remote, &local).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.kind, DiffKind::Create);
        assert_eq!(entry.path, vec!["tables".to_string(), "users".to_string()]);

        // The table entry absorbs its children.
        let value = entry.value.as_ref().unwrap();
        assert!(value["columns"]["id"].is_object());
        assert!(value["primary_key"].is_object());
        assert_eq!(value["indexes"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_added_column_path_shape() {
        let remote = model(DeclaredSchema::new("public").table(
            DeclaredTable::new("users").column(DeclaredColumn::new("id", "bigint")),
        ));
        let local = model(
            DeclaredSchema::new("public").table(
                DeclaredTable::new("users")
                    .column(DeclaredColumn::new("id", "bigint"))
                    .column(DeclaredColumn::new("name", "text")),
            ),
        );

        let entries = diff(&remote, &local).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::Create);
        assert_eq!(
            entries[0].path,
            vec!["tables", "users", "columns", "name"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_column_type_change_is_field_level() {
        let remote = model(DeclaredSchema::new("public").table(
            DeclaredTable::new("users").column(DeclaredColumn::new("name", "varchar(50)")),
        ));
        let local = model(DeclaredSchema::new("public").table(
            DeclaredTable::new("users").column(DeclaredColumn::new("name", "varchar(100)")),
        ));

        let entries = diff(&remote, &local).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::Change);
        assert_eq!(entries[0].segment(4), Some("data_type"));
        assert_eq!(
            entries[0].old_value.as_ref().unwrap(),
            "character varying(50)"
        );
        assert_eq!(
            entries[0].value.as_ref().unwrap(),
            "character varying(100)"
        );
    }

    #[test]
    fn test_index_shape_change_is_remove_and_create() {
        let remote = model(
            DeclaredSchema::new("public").table(
                DeclaredTable::new("users")
                    .column(DeclaredColumn::new("email", "text"))
                    .index(DeclaredIndex::on(["email"])),
            ),
        );
        let local = model(
            DeclaredSchema::new("public").table(
                DeclaredTable::new("users")
                    .column(DeclaredColumn::new("email", "text"))
                    .index(DeclaredIndex::on(["email"]).unique()),
            ),
        );

        let entries = diff(&remote, &local).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.kind == DiffKind::Remove));
        assert!(entries.iter().any(|e| e.kind == DiffKind::Create));
    }
}
