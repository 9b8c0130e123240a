//! Column-level generators.

use drift_schema::{ColumnInfo, IdentityMode};

use crate::changeset::{
    ChangeWarning, Changeset, ChangesetKind, StatementGroup, WarningCode, WarningKind,
};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::MigrateResult;
use crate::safety::is_safe_change;
use crate::statements::{ColumnDef, DdlStatement};

use super::{GeneratorContext, column_of, decode, is_column_entry, is_column_field_entry, table_of};

pub(crate) fn matches_create_column(entry: &DiffEntry) -> bool {
    entry.kind == DiffKind::Create && is_column_entry(entry)
}

pub(crate) fn create_column(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let info: ColumnInfo = decode("create_column", entry, entry.value.as_ref())?;
    let declared_table = table_of(entry);
    let column = column_of(entry);
    let schema = ctx.schema_name;
    let live_table = ctx.live_table(declared_table);
    let new_table = ctx.is_new_table(declared_table);

    let drop = DdlStatement::DropColumn {
        schema: schema.to_string(),
        table: live_table.to_string(),
        name: column.to_string(),
    };
    let down = vec![StatementGroup::single(drop.render())];

    // A non-nullable, non-generated column on an existing table goes in as
    // three steps: add it nullable, backfill the default, then SET NOT
    // NULL. The last step scans the table and fails on remaining NULLs.
    let plain_add = info.nullable
        || info.identity.is_some()
        || info.is_sequence_backed()
        || new_table;

    if !plain_add {
        let mut nullable_info = info.clone();
        nullable_info.nullable = true;
        nullable_info.default = None;

        let mut groups = vec![StatementGroup::single(
            DdlStatement::AddColumn {
                schema: schema.to_string(),
                table: live_table.to_string(),
                column: ColumnDef::new(column, nullable_info),
            }
            .render(),
        )];
        if let Some(default) = &info.default {
            groups.push(StatementGroup::single(
                DdlStatement::SetColumnDefault {
                    schema: schema.to_string(),
                    table: live_table.to_string(),
                    column: column.to_string(),
                    default: Some(default.clone()),
                }
                .render(),
            ));
        }
        groups.push(StatementGroup::single(
            DdlStatement::SetColumnNotNull {
                schema: schema.to_string(),
                table: live_table.to_string(),
                column: column.to_string(),
                not_null: true,
            }
            .render(),
        ));

        let mut changeset =
            Changeset::new(ChangesetKind::CreateNonNullableColumn, schema, live_table.as_str())
                .current_table(declared_table)
                .up(groups)
                .down(down)
                .warn(ChangeWarning::column(
                    WarningKind::MightFail,
                    WarningCode::AddNonNullableColumn,
                    schema,
                    declared_table,
                    column,
                ));
        if info.default_volatile {
            changeset = changeset.warn(ChangeWarning::column(
                WarningKind::Blocking,
                WarningCode::AddVolatileDefault,
                schema,
                declared_table,
                column,
            ));
        }
        return Ok(vec![changeset]);
    }

    let add = DdlStatement::AddColumn {
        schema: schema.to_string(),
        table: live_table.to_string(),
        column: ColumnDef::new(column, info.clone()),
    };
    let mut changeset = Changeset::new(ChangesetKind::CreateColumn, schema, live_table.as_str())
        .current_table(declared_table)
        .up(vec![StatementGroup::single(add.render())])
        .down(down);

    if !new_table {
        if info.is_sequence_backed() || info.identity.is_some() {
            // Sequence-backed columns rewrite the table under an exclusive
            // lock and cannot be added concurrently-safely.
            changeset = changeset.warn(ChangeWarning::column(
                WarningKind::Blocking,
                WarningCode::AddSerialColumn,
                schema,
                declared_table,
                column,
            ));
        } else if info.default_volatile {
            changeset = changeset.warn(ChangeWarning::column(
                WarningKind::Blocking,
                WarningCode::AddVolatileDefault,
                schema,
                declared_table,
                column,
            ));
        }
    }

    Ok(vec![changeset])
}

pub(crate) fn matches_drop_column(entry: &DiffEntry) -> bool {
    entry.kind == DiffKind::Remove && is_column_entry(entry)
}

pub(crate) fn drop_column(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let info: ColumnInfo = decode("drop_column", entry, entry.old_value.as_ref())?;
    let table = table_of(entry);
    let column = column_of(entry);
    let schema = ctx.schema_name;

    // Drops run after the rename tier, so the declared names are live.
    let drop = DdlStatement::DropColumn {
        schema: schema.to_string(),
        table: table.to_string(),
        name: column.to_string(),
    };
    let recreate = DdlStatement::AddColumn {
        schema: schema.to_string(),
        table: table.to_string(),
        column: ColumnDef::new(column, info),
    };

    Ok(vec![
        Changeset::new(ChangesetKind::DropColumn, schema, table)
            .up(vec![StatementGroup::single(drop.render())])
            .down(vec![StatementGroup::single(recreate.render())])
            .warn(ChangeWarning::column(
                WarningKind::Destructive,
                WarningCode::ColumnDrop,
                schema,
                table,
                column,
            )),
    ])
}

pub(crate) fn matches_change_type(entry: &DiffEntry) -> bool {
    entry.kind == DiffKind::Change && is_column_field_entry(entry, "data_type")
}

pub(crate) fn change_type(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let old_type: String = decode("change_column_type", entry, entry.old_value.as_ref())?;
    let new_type: String = decode("change_column_type", entry, entry.value.as_ref())?;
    let declared_table = table_of(entry);
    let declared_column = column_of(entry);
    let schema = ctx.schema_name;
    let live_table = ctx.live_table(declared_table);
    let live_column = ctx.live_column(declared_table, declared_column);

    let up = DdlStatement::AlterColumnType {
        schema: schema.to_string(),
        table: live_table.to_string(),
        column: live_column.to_string(),
        data_type: new_type.clone(),
    };
    let down = DdlStatement::AlterColumnType {
        schema: schema.to_string(),
        table: live_table.to_string(),
        column: live_column.to_string(),
        data_type: old_type.clone(),
    };

    let mut changeset =
        Changeset::new(ChangesetKind::ChangeColumnType, schema, live_table.as_str())
            .current_table(declared_table)
            .up(vec![StatementGroup::single(up.render())])
            .down(vec![StatementGroup::single(down.render())]);

    if !is_safe_change(&old_type, &new_type) {
        changeset = changeset.warn(
            ChangeWarning::column(
                WarningKind::Blocking,
                WarningCode::ChangeColumnType,
                schema,
                declared_table,
                declared_column,
            )
            .with_change(old_type, new_type),
        );
    }

    Ok(vec![changeset])
}

pub(crate) fn matches_change_nullable(entry: &DiffEntry) -> bool {
    is_column_field_entry(entry, "nullable")
}

pub(crate) fn change_nullable(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let now_nullable: bool = decode("change_column_nullable", entry, entry.value.as_ref())?;
    let declared_table = table_of(entry);
    let declared_column = column_of(entry);
    let schema = ctx.schema_name;
    let live_table = ctx.live_table(declared_table);
    let live_column = ctx.live_column(declared_table, declared_column);

    let set = |not_null: bool| {
        DdlStatement::SetColumnNotNull {
            schema: schema.to_string(),
            table: live_table.to_string(),
            column: live_column.to_string(),
            not_null,
        }
        .render()
    };

    let mut changeset =
        Changeset::new(ChangesetKind::ChangeColumnNullable, schema, live_table.as_str())
            .current_table(declared_table)
            .up(vec![StatementGroup::single(set(!now_nullable))])
            .down(vec![StatementGroup::single(set(now_nullable))]);

    if !now_nullable {
        // SET NOT NULL scans the table and fails on existing NULLs.
        changeset = changeset.warn(ChangeWarning::column(
            WarningKind::MightFail,
            WarningCode::SetColumnNotNull,
            schema,
            declared_table,
            declared_column,
        ));
    }

    Ok(vec![changeset])
}

pub(crate) fn matches_change_default(entry: &DiffEntry) -> bool {
    is_column_field_entry(entry, "default")
}

pub(crate) fn change_default(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let new_default: Option<String> = match &entry.value {
        Some(v) => decode("change_column_default", entry, Some(v))?,
        None => None,
    };
    let old_default: Option<String> = match &entry.old_value {
        Some(v) => decode("change_column_default", entry, Some(v))?,
        None => None,
    };
    let declared_table = table_of(entry);
    let declared_column = column_of(entry);
    let schema = ctx.schema_name;
    let live_table = ctx.live_table(declared_table);
    let live_column = ctx.live_column(declared_table, declared_column);

    let set = |default: Option<String>| {
        DdlStatement::SetColumnDefault {
            schema: schema.to_string(),
            table: live_table.to_string(),
            column: live_column.to_string(),
            default,
        }
        .render()
    };

    Ok(vec![
        Changeset::new(ChangesetKind::ChangeColumnDefault, schema, live_table.as_str())
            .current_table(declared_table)
            .up(vec![StatementGroup::single(set(new_default))])
            .down(vec![StatementGroup::single(set(old_default))]),
    ])
}

pub(crate) fn matches_change_volatility(entry: &DiffEntry) -> bool {
    is_column_field_entry(entry, "default_volatile")
}

/// The volatility flag is derived from the default expression; the default
/// generator already covers the change.
pub(crate) fn change_volatility(
    _entry: &DiffEntry,
    _ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    Ok(Vec::new())
}

pub(crate) fn matches_change_identity(entry: &DiffEntry) -> bool {
    is_column_field_entry(entry, "identity")
}

pub(crate) fn change_identity(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let new_identity: Option<IdentityMode> = match &entry.value {
        Some(v) => decode("change_column_identity", entry, Some(v))?,
        None => None,
    };
    let old_identity: Option<IdentityMode> = match &entry.old_value {
        Some(v) => decode("change_column_identity", entry, Some(v))?,
        None => None,
    };
    let declared_table = table_of(entry);
    let declared_column = column_of(entry);
    let schema = ctx.schema_name;
    let live_table = ctx.live_table(declared_table);
    let live_column = ctx.live_column(declared_table, declared_column);

    let set = |identity: Option<IdentityMode>| {
        DdlStatement::SetColumnIdentity {
            schema: schema.to_string(),
            table: live_table.to_string(),
            column: live_column.to_string(),
            identity,
        }
        .render()
    };

    Ok(vec![
        Changeset::new(ChangesetKind::ChangeColumnIdentity, schema, live_table.as_str())
            .current_table(declared_table)
            .up(vec![StatementGroup::single(set(new_identity))])
            .down(vec![StatementGroup::single(set(old_identity))]),
    ])
}

/// Changesets for confirmed column renames. These run after the table
/// rename tier, so they address the table by its declared name and the
/// column by its live one.
pub(crate) fn rename_column_changesets(ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    let mut changesets = Vec::new();
    for (key, pairs) in &ctx.renames.columns {
        let Some((schema, table)) = key.split_once('.') else {
            continue;
        };
        if schema != ctx.schema_name {
            continue;
        }
        for rename in pairs {
            let stmt = |from: &str, to: &str| {
                DdlStatement::RenameColumn {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .render()
            };
            changesets.push(
                Changeset::new(ChangesetKind::RenameColumn, schema, table)
                    .up(vec![StatementGroup::single(stmt(&rename.from, &rename.to))])
                    .down(vec![StatementGroup::single(stmt(&rename.to, &rename.from))]),
            );
        }
    }
    changesets
}
