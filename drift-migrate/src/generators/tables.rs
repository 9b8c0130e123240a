//! Table-level generators.
//!
//! A whole-table create or drop arrives as a single diff entry carrying the
//! entire table subtree: its primary key, checks, unique constraints, and
//! foreign keys travel inline with `CREATE TABLE`/`DROP TABLE`, while
//! indexes and triggers fan out into their own changesets.

use drift_schema::TableMigrationInfo;

use crate::changeset::{
    ChangeWarning, Changeset, ChangesetKind, StatementGroup, WarningCode, WarningKind,
};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::MigrateResult;
use crate::statements::{ColumnDef, DdlStatement};

use super::{GeneratorContext, decode, is_table_entry, table_of};

pub(crate) fn matches_create_table(entry: &DiffEntry) -> bool {
    entry.kind == DiffKind::Create && is_table_entry(entry)
}

pub(crate) fn create_table(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table: TableMigrationInfo = decode("create_table", entry, entry.value.as_ref())?;
    let name = table_of(entry);
    let schema = ctx.schema_name;

    let columns: Vec<ColumnDef> = table
        .columns
        .iter()
        .map(|(col_name, info)| ColumnDef::new(col_name.clone(), info.clone()))
        .collect();

    let foreign_keys = table
        .foreign_keys
        .values()
        .map(|fk| (fk.clone(), ctx.live_table(&fk.referenced_table).to_string()))
        .collect();

    let create = DdlStatement::CreateTable {
        schema: schema.to_string(),
        name: name.to_string(),
        columns,
        primary_key: table.primary_key.clone(),
        unique: table.unique.values().cloned().collect(),
        checks: table.checks.values().cloned().collect(),
        foreign_keys,
    };
    let drop = DdlStatement::DropTable {
        schema: schema.to_string(),
        name: name.to_string(),
    };

    let mut changesets = vec![
        Changeset::new(ChangesetKind::CreateTable, schema, name)
            .up(vec![StatementGroup::single(create.render())])
            .down(vec![StatementGroup::single(drop.render())]),
    ];

    // Indexes and triggers do not travel inside CREATE TABLE; they become
    // their own changesets. The table is new, so the builds are plain and
    // transactional.
    for index in table.indexes.values() {
        let create = DdlStatement::CreateIndex {
            schema: schema.to_string(),
            table: name.to_string(),
            index: index.clone(),
            concurrently: false,
        };
        let drop = DdlStatement::DropIndex {
            schema: schema.to_string(),
            name: index.name.clone(),
            concurrently: false,
        };
        changesets.push(
            Changeset::new(ChangesetKind::CreateIndex, schema, name)
                .up(vec![StatementGroup::single(create.render())])
                .down(vec![StatementGroup::single(drop.render())]),
        );
    }

    for trigger in table.triggers.values() {
        let create = DdlStatement::CreateTrigger {
            schema: schema.to_string(),
            table: name.to_string(),
            name: trigger.name.clone(),
            definition: trigger.definition.clone(),
        };
        let drop = DdlStatement::DropTrigger {
            schema: schema.to_string(),
            table: name.to_string(),
            name: trigger.name.clone(),
        };
        changesets.push(
            Changeset::new(ChangesetKind::CreateTrigger, schema, name)
                .up(vec![StatementGroup::single(create.render())])
                .down(vec![StatementGroup::single(drop.render())]),
        );
    }

    Ok(changesets)
}

pub(crate) fn matches_drop_table(entry: &DiffEntry) -> bool {
    entry.kind == DiffKind::Remove && is_table_entry(entry)
}

pub(crate) fn drop_table(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table: TableMigrationInfo = decode("drop_table", entry, entry.old_value.as_ref())?;
    let name = table_of(entry);
    let schema = ctx.schema_name;

    let drop = DdlStatement::DropTable {
        schema: schema.to_string(),
        name: name.to_string(),
    };

    // The down side restores the whole table shape: the table with its
    // inline constraints first, then its indexes and triggers.
    let columns: Vec<ColumnDef> = table
        .columns
        .iter()
        .map(|(col_name, info)| ColumnDef::new(col_name.clone(), info.clone()))
        .collect();
    let recreate = DdlStatement::CreateTable {
        schema: schema.to_string(),
        name: name.to_string(),
        columns,
        primary_key: table.primary_key.clone(),
        unique: table.unique.values().cloned().collect(),
        checks: table.checks.values().cloned().collect(),
        foreign_keys: table
            .foreign_keys
            .values()
            .map(|fk| (fk.clone(), fk.referenced_table.to_string()))
            .collect(),
    };

    let mut down = vec![StatementGroup::single(recreate.render())];
    for index in table.indexes.values() {
        down.push(StatementGroup::single(
            DdlStatement::CreateIndex {
                schema: schema.to_string(),
                table: name.to_string(),
                index: index.clone(),
                concurrently: false,
            }
            .render(),
        ));
    }
    for trigger in table.triggers.values() {
        down.push(StatementGroup::single(
            DdlStatement::CreateTrigger {
                schema: schema.to_string(),
                table: name.to_string(),
                name: trigger.name.clone(),
                definition: trigger.definition.clone(),
            }
            .render(),
        ));
    }

    Ok(vec![
        Changeset::new(ChangesetKind::DropTable, schema, name)
            .up(vec![StatementGroup::single(drop.render())])
            .down(down)
            .warn(ChangeWarning::table(
                WarningKind::Destructive,
                WarningCode::TableDrop,
                schema,
                name,
            )),
    ])
}

/// Changesets for confirmed table renames. These run in the rename tier,
/// after all creation changesets have addressed the table by its live name.
pub(crate) fn rename_table_changesets(ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    ctx.renames
        .tables
        .iter()
        .filter(|r| r.schema == ctx.schema_name)
        .map(|r| {
            let up = DdlStatement::RenameTable {
                schema: ctx.schema_name.to_string(),
                from: r.from.to_string(),
                to: r.to.to_string(),
            };
            let down = DdlStatement::RenameTable {
                schema: ctx.schema_name.to_string(),
                from: r.to.to_string(),
                to: r.from.to_string(),
            };
            Changeset::new(ChangesetKind::RenameTable, ctx.schema_name, r.from.as_str())
                .current_table(r.to.as_str())
                .up(vec![StatementGroup::single(up.render())])
                .down(vec![StatementGroup::single(down.render())])
        })
        .collect()
}
