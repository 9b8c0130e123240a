//! Index generators.
//!
//! Index builds on existing tables use the concurrent build mode, which
//! cannot run inside a transaction; the changeset is marked
//! non-transactional and carries the cleanup that removes a half-built
//! index after a unique violation. Indexes on tables created in the same
//! batch are emitted by the table generator as plain transactional builds.

use drift_schema::IndexInfo;
use smol_str::SmolStr;

use crate::changeset::{Changeset, ChangesetKind, StatementGroup};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::MigrateResult;
use crate::statements::DdlStatement;

use super::{GeneratorContext, decode, is_collection_entry, table_of};

pub(crate) fn matches_index(entry: &DiffEntry) -> bool {
    is_collection_entry(entry, "indexes")
}

pub(crate) fn index(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let index: IndexInfo = decode("index", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);

            let mut live_index = index.clone();
            live_index.columns = index
                .columns
                .iter()
                .map(|c| ctx.live_column(declared_table, c))
                .collect::<Vec<SmolStr>>();
            live_index.predicate = index
                .predicate
                .as_deref()
                .map(|p| ctx.live_expression(declared_table, p));

            let create = DdlStatement::CreateIndex {
                schema: schema.to_string(),
                table: live_table.to_string(),
                index: live_index,
                concurrently: true,
            };
            let drop = DdlStatement::DropIndex {
                schema: schema.to_string(),
                name: index.name.clone(),
                concurrently: true,
            };

            let mut up = StatementGroup::single(create.render());
            if index.unique {
                up = up.with_unique_violation_cleanup(vec![drop.render()]);
            }

            Ok(vec![
                Changeset::new(ChangesetKind::CreateIndex, schema, live_table.as_str())
                    .current_table(declared_table)
                    .non_transactional()
                    .up(vec![up])
                    .down(vec![StatementGroup::single(drop.render())]),
            ])
        }
        DiffKind::Remove => {
            let index: IndexInfo = decode("index", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropIndex {
                schema: schema.to_string(),
                name: index.name.clone(),
                concurrently: false,
            };
            let recreate = DdlStatement::CreateIndex {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                index: index.clone(),
                concurrently: false,
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropIndex, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![StatementGroup::single(recreate.render())]),
            ])
        }
        DiffKind::Change => {
            let old: IndexInfo = decode("index", entry, entry.old_value.as_ref())?;
            let new: IndexInfo = decode("index", entry, entry.value.as_ref())?;

            let stmt = |from: &str, to: &str| {
                DdlStatement::RenameIndex {
                    schema: schema.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .render()
            };
            Ok(vec![
                Changeset::new(ChangesetKind::RenameIndex, schema, declared_table)
                    .up(vec![StatementGroup::single(stmt(&old.name, &new.name))])
                    .down(vec![StatementGroup::single(stmt(&new.name, &old.name))]),
            ])
        }
    }
}
