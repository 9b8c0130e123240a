//! Primary key, unique, foreign key, and check constraint generators.
//!
//! Constraint changesets on existing tables follow the lock-minimizing
//! patterns: checks and foreign keys attach `NOT VALID` and validate in a
//! separate statement, and unique constraints build their index
//! concurrently before attaching it. A Change entry on a hashed collection
//! can only mean the catalog name differs from the generated one (the
//! shape is the key), so it becomes a rename.

use drift_schema::{CheckInfo, ForeignKeyInfo, PrimaryKeyInfo, UniqueInfo};
use smol_str::SmolStr;

use crate::changeset::{
    ChangeWarning, Changeset, ChangesetKind, StatementGroup, WarningCode, WarningKind,
};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::MigrateResult;
use crate::statements::DdlStatement;

use super::{GeneratorContext, decode, is_collection_entry, table_of};

pub(crate) fn matches_primary_key(entry: &DiffEntry) -> bool {
    matches!(
        entry.path.as_slice(),
        [root, _, last] if root == "tables" && last == "primary_key"
    )
}

pub(crate) fn primary_key(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let pk: PrimaryKeyInfo = decode("primary_key", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);
            let live_columns: Vec<SmolStr> = pk
                .columns
                .iter()
                .map(|c| ctx.live_column(declared_table, c))
                .collect();

            let add = DdlStatement::AddPrimaryKey {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: pk.name.clone(),
                columns: live_columns,
            };
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: pk.name.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::CreatePrimaryKey, schema, live_table.as_str())
                    .current_table(declared_table)
                    .up(vec![StatementGroup::single(add.render())])
                    .down(vec![StatementGroup::single(drop.render())])
                    .warn(ChangeWarning::table(
                        WarningKind::MightFail,
                        WarningCode::AddPrimaryKeyToExistingTable,
                        schema,
                        declared_table,
                    )),
            ])
        }
        DiffKind::Remove => {
            let pk: PrimaryKeyInfo = decode("primary_key", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: pk.name.clone(),
            };
            let recreate = DdlStatement::AddPrimaryKey {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: pk.name.clone(),
                columns: pk.columns.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropPrimaryKey, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![StatementGroup::single(recreate.render())]),
            ])
        }
        DiffKind::Change => {
            let old: PrimaryKeyInfo = decode("primary_key", entry, entry.old_value.as_ref())?;
            let new: PrimaryKeyInfo = decode("primary_key", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);

            if old.columns == new.columns {
                // Same key, different catalog name: rename it into place.
                return Ok(vec![rename_constraint(
                    ChangesetKind::RenamePrimaryKey,
                    ctx,
                    declared_table,
                    &old.name,
                    &new.name,
                )]);
            }

            // A table has at most one primary key, so a key change must
            // swap the old one out in the same changeset.
            let up = StatementGroup::new(vec![
                DdlStatement::DropConstraint {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: old.name.clone(),
                }
                .render(),
                DdlStatement::AddPrimaryKey {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: new.name.clone(),
                    columns: new
                        .columns
                        .iter()
                        .map(|c| ctx.live_column(declared_table, c))
                        .collect(),
                }
                .render(),
            ]);
            let down = StatementGroup::new(vec![
                DdlStatement::DropConstraint {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: new.name.clone(),
                }
                .render(),
                DdlStatement::AddPrimaryKey {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: old.name.clone(),
                    columns: old
                        .columns
                        .iter()
                        .map(|c| ctx.live_column(declared_table, c))
                        .collect(),
                }
                .render(),
            ]);

            Ok(vec![
                Changeset::new(ChangesetKind::CreatePrimaryKey, schema, live_table.as_str())
                    .current_table(declared_table)
                    .up(vec![up])
                    .down(vec![down])
                    .warn(ChangeWarning::table(
                        WarningKind::MightFail,
                        WarningCode::AddPrimaryKeyToExistingTable,
                        schema,
                        declared_table,
                    )),
            ])
        }
    }
}

pub(crate) fn matches_unique(entry: &DiffEntry) -> bool {
    is_collection_entry(entry, "unique")
}

pub(crate) fn unique(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let unique: UniqueInfo = decode("unique", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);
            let live_columns: Vec<SmolStr> = unique
                .columns
                .iter()
                .map(|c| ctx.live_column(declared_table, c))
                .collect();

            if !unique.nulls_distinct {
                // NULLS NOT DISTINCT cannot ride on a plain unique index
                // build, so the constraint attaches directly.
                let add = DdlStatement::AddUnique {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: unique.name.clone(),
                    columns: live_columns,
                    nulls_distinct: false,
                };
                let drop = DdlStatement::DropConstraint {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    name: unique.name.clone(),
                };
                return Ok(vec![
                    Changeset::new(
                        ChangesetKind::AttachUniqueConstraint,
                        schema,
                        live_table.as_str(),
                    )
                    .current_table(declared_table)
                    .up(vec![StatementGroup::single(add.render())])
                    .down(vec![StatementGroup::single(drop.render())])
                    .warn(ChangeWarning::table(
                        WarningKind::MightFail,
                        WarningCode::AddUniqueToExistingTable,
                        schema,
                        declared_table,
                    )),
                ]);
            }

            // Two changesets: build the unique index concurrently (its own
            // non-transactional unit), then attach the constraint to it.
            // A unique violation during the build drops the half-built
            // index before the error propagates.
            let index = drift_schema::IndexInfo {
                name: unique.name.clone(),
                columns: live_columns,
                unique: true,
                predicate: None,
                method: "btree".to_string(),
            };
            let create_index = DdlStatement::CreateIndex {
                schema: schema.to_string(),
                table: live_table.to_string(),
                index,
                concurrently: true,
            };
            let cleanup = DdlStatement::DropIndex {
                schema: schema.to_string(),
                name: unique.name.clone(),
                concurrently: true,
            };

            let build = Changeset::new(ChangesetKind::CreateUniqueIndex, schema, live_table.as_str())
                .current_table(declared_table)
                .non_transactional()
                .up(vec![
                    StatementGroup::single(create_index.render())
                        .with_unique_violation_cleanup(vec![cleanup.render()]),
                ])
                .down(vec![StatementGroup::single(cleanup.render())])
                .warn(ChangeWarning::table(
                    WarningKind::MightFail,
                    WarningCode::AddUniqueToExistingTable,
                    schema,
                    declared_table,
                ));

            let attach_stmt = DdlStatement::AddUniqueUsingIndex {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: unique.name.clone(),
                index: unique.name.clone(),
            };
            let drop_constraint = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: unique.name.clone(),
            };
            let attach = Changeset::new(
                ChangesetKind::AttachUniqueConstraint,
                schema,
                live_table.as_str(),
            )
            .current_table(declared_table)
            .up(vec![StatementGroup::single(attach_stmt.render())])
            .down(vec![StatementGroup::single(drop_constraint.render())]);

            Ok(vec![build, attach])
        }
        DiffKind::Remove => {
            let unique: UniqueInfo = decode("unique", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: unique.name.clone(),
            };
            let recreate = DdlStatement::AddUnique {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: unique.name.clone(),
                columns: unique.columns.clone(),
                nulls_distinct: unique.nulls_distinct,
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropUnique, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![StatementGroup::single(recreate.render())]),
            ])
        }
        DiffKind::Change => {
            let old: UniqueInfo = decode("unique", entry, entry.old_value.as_ref())?;
            let new: UniqueInfo = decode("unique", entry, entry.value.as_ref())?;
            Ok(vec![rename_constraint(
                ChangesetKind::RenameUnique,
                ctx,
                declared_table,
                &old.name,
                &new.name,
            )])
        }
    }
}

pub(crate) fn matches_foreign_key(entry: &DiffEntry) -> bool {
    is_collection_entry(entry, "foreign_keys")
}

pub(crate) fn foreign_key(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let fk: ForeignKeyInfo = decode("foreign_key", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);
            let live_referenced = ctx.live_table(&fk.referenced_table);

            let mut live_fk = fk.clone();
            live_fk.columns = fk
                .columns
                .iter()
                .map(|c| ctx.live_column(declared_table, c))
                .collect();
            live_fk.referenced_columns = fk
                .referenced_columns
                .iter()
                .map(|c| ctx.live_column(&fk.referenced_table, c))
                .collect();

            let add = DdlStatement::AddForeignKey {
                schema: schema.to_string(),
                table: live_table.to_string(),
                foreign_key: live_fk,
                referenced_table: live_referenced.to_string(),
                not_valid: true,
            };
            let validate = DdlStatement::ValidateConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: fk.name.clone(),
            };
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: fk.name.clone(),
            };

            Ok(vec![
                Changeset::new(ChangesetKind::CreateForeignKey, schema, live_table.as_str())
                    .current_table(declared_table)
                    .up(vec![
                        StatementGroup::single(add.render()),
                        StatementGroup::single(validate.render()),
                    ])
                    .down(vec![StatementGroup::single(drop.render())])
                    .warn(ChangeWarning::table(
                        WarningKind::MightFail,
                        WarningCode::AddForeignKeyToExistingTable,
                        schema,
                        declared_table,
                    )),
            ])
        }
        DiffKind::Remove => {
            let fk: ForeignKeyInfo = decode("foreign_key", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: fk.name.clone(),
            };
            let readd = DdlStatement::AddForeignKey {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                foreign_key: fk.clone(),
                referenced_table: fk.referenced_table.to_string(),
                not_valid: true,
            };
            let validate = DdlStatement::ValidateConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: fk.name.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropForeignKey, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![
                        StatementGroup::single(readd.render()),
                        StatementGroup::single(validate.render()),
                    ]),
            ])
        }
        DiffKind::Change => {
            let old: ForeignKeyInfo = decode("foreign_key", entry, entry.old_value.as_ref())?;
            let new: ForeignKeyInfo = decode("foreign_key", entry, entry.value.as_ref())?;
            Ok(vec![rename_constraint(
                ChangesetKind::RenameForeignKey,
                ctx,
                declared_table,
                &old.name,
                &new.name,
            )])
        }
    }
}

pub(crate) fn matches_check(entry: &DiffEntry) -> bool {
    is_collection_entry(entry, "checks")
}

pub(crate) fn check(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let check: CheckInfo = decode("check", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);
            let live_expression = ctx.live_expression(declared_table, &check.expression);

            let add = DdlStatement::AddCheck {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: check.name.clone(),
                expression: live_expression,
                not_valid: true,
            };
            let validate = DdlStatement::ValidateConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: check.name.clone(),
            };
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: check.name.clone(),
            };

            Ok(vec![
                Changeset::new(ChangesetKind::CreateCheck, schema, live_table.as_str())
                    .current_table(declared_table)
                    .up(vec![
                        StatementGroup::single(add.render()),
                        StatementGroup::single(validate.render()),
                    ])
                    .down(vec![StatementGroup::single(drop.render())])
                    .warn(ChangeWarning::table(
                        WarningKind::MightFail,
                        WarningCode::AddCheckToExistingTable,
                        schema,
                        declared_table,
                    )),
            ])
        }
        DiffKind::Remove => {
            let check: CheckInfo = decode("check", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: check.name.clone(),
            };
            let readd = DdlStatement::AddCheck {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: check.name.clone(),
                expression: check.expression.clone(),
                not_valid: true,
            };
            let validate = DdlStatement::ValidateConstraint {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: check.name.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropCheck, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![
                        StatementGroup::single(readd.render()),
                        StatementGroup::single(validate.render()),
                    ]),
            ])
        }
        DiffKind::Change => {
            let old: CheckInfo = decode("check", entry, entry.old_value.as_ref())?;
            let new: CheckInfo = decode("check", entry, entry.value.as_ref())?;
            Ok(vec![rename_constraint(
                ChangesetKind::RenameCheck,
                ctx,
                declared_table,
                &old.name,
                &new.name,
            )])
        }
    }
}

/// A constraint rename changeset. Runs after the table rename tier, so it
/// addresses the table by its declared name.
fn rename_constraint(
    kind: ChangesetKind,
    ctx: &GeneratorContext<'_>,
    declared_table: &str,
    from: &str,
    to: &str,
) -> Changeset {
    let stmt = |from: &str, to: &str| {
        DdlStatement::RenameConstraint {
            schema: ctx.schema_name.to_string(),
            table: declared_table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
        .render()
    };
    Changeset::new(kind, ctx.schema_name, declared_table)
        .up(vec![StatementGroup::single(stmt(from, to))])
        .down(vec![StatementGroup::single(stmt(to, from))])
}
