//! Trigger generators.

use drift_schema::TriggerInfo;

use crate::changeset::{Changeset, ChangesetKind, StatementGroup};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::MigrateResult;
use crate::statements::DdlStatement;

use super::{GeneratorContext, decode, is_collection_entry, table_of};

pub(crate) fn matches_trigger(entry: &DiffEntry) -> bool {
    is_collection_entry(entry, "triggers")
}

pub(crate) fn trigger(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let declared_table = table_of(entry);
    let schema = ctx.schema_name;

    match entry.kind {
        DiffKind::Create => {
            let trigger: TriggerInfo = decode("trigger", entry, entry.value.as_ref())?;
            let live_table = ctx.live_table(declared_table);
            let definition = ctx.live_expression(declared_table, &trigger.definition);

            let create = DdlStatement::CreateTrigger {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: trigger.name.clone(),
                definition,
            };
            let drop = DdlStatement::DropTrigger {
                schema: schema.to_string(),
                table: live_table.to_string(),
                name: trigger.name.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::CreateTrigger, schema, live_table.as_str())
                    .current_table(declared_table)
                    .up(vec![StatementGroup::single(create.render())])
                    .down(vec![StatementGroup::single(drop.render())]),
            ])
        }
        DiffKind::Remove => {
            let trigger: TriggerInfo = decode("trigger", entry, entry.old_value.as_ref())?;
            let drop = DdlStatement::DropTrigger {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: trigger.name.clone(),
            };
            let recreate = DdlStatement::CreateTrigger {
                schema: schema.to_string(),
                table: declared_table.to_string(),
                name: trigger.name.clone(),
                definition: trigger.definition.clone(),
            };
            Ok(vec![
                Changeset::new(ChangesetKind::DropTrigger, schema, declared_table)
                    .up(vec![StatementGroup::single(drop.render())])
                    .down(vec![StatementGroup::single(recreate.render())]),
            ])
        }
        DiffKind::Change => {
            let old: TriggerInfo = decode("trigger", entry, entry.old_value.as_ref())?;
            let new: TriggerInfo = decode("trigger", entry, entry.value.as_ref())?;

            let stmt = |from: &str, to: &str| {
                DdlStatement::RenameTrigger {
                    schema: schema.to_string(),
                    table: declared_table.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .render()
            };
            Ok(vec![
                Changeset::new(ChangesetKind::RenameTrigger, schema, declared_table)
                    .up(vec![StatementGroup::single(stmt(&old.name, &new.name))])
                    .down(vec![StatementGroup::single(stmt(&new.name, &old.name))]),
            ])
        }
    }
}
