//! Priority and dependency ordering of changesets.

use std::cmp::Ordering;
use std::collections::HashSet;

use drift_schema::SchemaMigrationInfo;

use crate::changeset::{Changeset, ChangesetKind};

/// Stable multi-key sort of changesets.
///
/// Primary key is the numeric priority. `CreateTable` ties are broken by
/// the caller-supplied dependency order (a table is created after the
/// tables it references), `DropTable` ties by the reverse of it. Everything
/// else keeps generation order, which the stable sort preserves.
///
/// `table_order` entries are qualified `schema.table` names.
pub fn sort_changesets(mut changesets: Vec<Changeset>, table_order: &[String]) -> Vec<Changeset> {
    let position = |changeset: &Changeset| {
        let qualified = format!("{}.{}", changeset.schema_name, changeset.current_table_name);
        table_order
            .iter()
            .position(|t| *t == qualified)
            .unwrap_or(usize::MAX)
    };

    changesets.sort_by(|a, b| {
        a.priority.cmp(&b.priority).then_with(|| {
            if a.kind == ChangesetKind::CreateTable && b.kind == ChangesetKind::CreateTable {
                position(a).cmp(&position(b))
            } else if a.kind == ChangesetKind::DropTable && b.kind == ChangesetKind::DropTable {
                position(b).cmp(&position(a))
            } else {
                Ordering::Equal
            }
        })
    });
    changesets
}

/// A topological order of the declared tables by their foreign keys: a
/// table appears after every table it references. Returned as qualified
/// `schema.table` names; cycles fall back to declaration order.
pub fn dependency_order(locals: &[SchemaMigrationInfo]) -> Vec<String> {
    let mut order = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();

    // Kahn-style sweep: keep placing tables whose references are already
    // placed (or self-referential) until nothing moves.
    let total: usize = locals.iter().map(|s| s.tables.len()).sum();
    while order.len() < total {
        let mut progressed = false;
        for schema in locals {
            for (table, info) in &schema.tables {
                let qualified = format!("{}.{}", schema.name, table);
                if placed.contains(&qualified) {
                    continue;
                }
                let ready = info.foreign_keys.values().all(|fk| {
                    fk.referenced_table == *table
                        || placed.contains(&format!("{}.{}", schema.name, fk.referenced_table))
                });
                if ready {
                    placed.insert(qualified.clone());
                    order.push(qualified);
                    progressed = true;
                }
            }
        }
        if !progressed {
            // Cycle: place the rest in declaration order.
            for schema in locals {
                for table in schema.tables.keys() {
                    let qualified = format!("{}.{}", schema.name, table);
                    if placed.insert(qualified.clone()) {
                        order.push(qualified);
                    }
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::StatementGroup;
    use drift_schema::{
        DeclaredColumn, DeclaredForeignKey, DeclaredSchema, DeclaredTable, build_declared,
    };

    fn changeset(kind: ChangesetKind, table: &str) -> Changeset {
        Changeset::new(kind, "public", table).up(vec![StatementGroup::single("SELECT 1")])
    }

    #[test]
    fn test_priority_orders_kinds() {
        let sorted = sort_changesets(
            vec![
                changeset(ChangesetKind::CreateForeignKey, "orders"),
                changeset(ChangesetKind::DropColumn, "users"),
                changeset(ChangesetKind::CreateTable, "orders"),
                changeset(ChangesetKind::CreateSchema, ""),
            ],
            &[],
        );
        let kinds: Vec<ChangesetKind> = sorted.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangesetKind::CreateSchema,
                ChangesetKind::CreateTable,
                ChangesetKind::CreateForeignKey,
                ChangesetKind::DropColumn,
            ]
        );
    }

    #[test]
    fn test_create_table_respects_dependency_order() {
        let order = vec!["public.users".to_string(), "public.orders".to_string()];
        let sorted = sort_changesets(
            vec![
                changeset(ChangesetKind::CreateTable, "orders"),
                changeset(ChangesetKind::CreateTable, "users"),
            ],
            &order,
        );
        assert_eq!(sorted[0].current_table_name, "users");
        assert_eq!(sorted[1].current_table_name, "orders");
    }

    #[test]
    fn test_drop_table_reverses_dependency_order() {
        let order = vec!["public.users".to_string(), "public.orders".to_string()];
        let sorted = sort_changesets(
            vec![
                changeset(ChangesetKind::DropTable, "users"),
                changeset(ChangesetKind::DropTable, "orders"),
            ],
            &order,
        );
        assert_eq!(sorted[0].current_table_name, "orders");
        assert_eq!(sorted[1].current_table_name, "users");
    }

    #[test]
    fn test_dependency_order_topological() {
        // orders -> users, items -> orders
        let schema = DeclaredSchema::new("public")
            .table(
                DeclaredTable::new("items")
                    .column(DeclaredColumn::new("id", "bigint"))
                    .column(DeclaredColumn::new("order_id", "bigint"))
                    .foreign_key(DeclaredForeignKey::new(["order_id"], "orders", ["id"])),
            )
            .table(
                DeclaredTable::new("orders")
                    .column(DeclaredColumn::new("id", "bigint"))
                    .column(DeclaredColumn::new("user_id", "bigint"))
                    .foreign_key(DeclaredForeignKey::new(["user_id"], "users", ["id"])),
            )
            .table(DeclaredTable::new("users").column(DeclaredColumn::new("id", "bigint")));

        let local = build_declared(&schema).unwrap();
        let order = dependency_order(std::slice::from_ref(&local));

        let pos = |name: &str| order.iter().position(|t| t == name).unwrap();
        assert!(pos("public.users") < pos("public.orders"));
        assert!(pos("public.orders") < pos("public.items"));
    }
}
