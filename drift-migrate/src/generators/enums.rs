//! Enumerated type generators.
//!
//! Generated enums are stamped with an ownership comment so introspection
//! can recognize them. Label additions apply in place; removals and
//! reorders have no in-place form in PostgreSQL and fail generation
//! instead of guessing at a rewrite.

use smol_str::SmolStr;

use drift_schema::EnumInfo;

use crate::changeset::{Changeset, ChangesetKind, StatementGroup};
use crate::diff::{DiffEntry, DiffKind};
use crate::error::{MigrateError, MigrateResult};
use crate::statements::DdlStatement;

use super::{GeneratorContext, decode};

/// Comment stamped on generated enum types.
pub const ENUM_OWNERSHIP_COMMENT: &str = "drift";

pub(crate) fn matches_enum(entry: &DiffEntry) -> bool {
    matches!(entry.path.as_slice(), [root, _] if root == "enums")
}

pub(crate) fn enum_type(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let name = entry.segment(1).unwrap_or_default();
    let schema = ctx.schema_name;

    let create = |info: &EnumInfo| {
        vec![StatementGroup::new(vec![
            DdlStatement::CreateEnum {
                schema: schema.to_string(),
                name: name.to_string(),
                labels: info.labels.clone(),
            }
            .render(),
            DdlStatement::CommentOnType {
                schema: schema.to_string(),
                name: name.to_string(),
                comment: ENUM_OWNERSHIP_COMMENT.to_string(),
            }
            .render(),
        ])]
    };
    let drop = || {
        vec![StatementGroup::single(
            DdlStatement::DropEnum {
                schema: schema.to_string(),
                name: name.to_string(),
            }
            .render(),
        )]
    };

    match entry.kind {
        DiffKind::Create => {
            let info: EnumInfo = decode("enum_type", entry, entry.value.as_ref())?;
            Ok(vec![
                Changeset::new(ChangesetKind::CreateEnum, schema, "")
                    .up(create(&info))
                    .down(drop()),
            ])
        }
        DiffKind::Remove => {
            let info: EnumInfo = decode("enum_type", entry, entry.old_value.as_ref())?;
            // The ownership comment is not restored on the way back down;
            // that loss is the documented cost of dropping a generated
            // enum.
            Ok(vec![
                Changeset::new(ChangesetKind::DropEnum, schema, "")
                    .up(drop())
                    .down(create(&info)),
            ])
        }
        DiffKind::Change => Err(MigrateError::UnsupportedEnumChange {
            schema: schema.to_string(),
            name: name.to_string(),
        }),
    }
}

pub(crate) fn matches_enum_labels(entry: &DiffEntry) -> bool {
    matches!(
        entry.path.as_slice(),
        [root, _, last] if root == "enums" && last == "labels"
    )
}

pub(crate) fn enum_labels(
    entry: &DiffEntry,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let name = entry.segment(1).unwrap_or_default();
    let schema = ctx.schema_name;

    let old: Vec<SmolStr> = decode("enum_labels", entry, entry.old_value.as_ref())?;
    let new: Vec<SmolStr> = decode("enum_labels", entry, entry.value.as_ref())?;

    // The old labels must survive in order; only additions are applicable
    // in place.
    if !is_subsequence(&old, &new) {
        return Err(MigrateError::UnsupportedEnumChange {
            schema: schema.to_string(),
            name: name.to_string(),
        });
    }

    let statements: Vec<String> = new
        .iter()
        .filter(|label| !old.contains(label))
        .map(|label| {
            DdlStatement::AddEnumLabel {
                schema: schema.to_string(),
                name: name.to_string(),
                label: label.to_string(),
            }
            .render()
        })
        .collect();

    // Added labels cannot be removed again; the changeset is documented
    // irreversible and its down is empty.
    Ok(vec![
        Changeset::new(ChangesetKind::ChangeEnum, schema, "")
            .up(vec![StatementGroup::new(statements)]),
    ])
}

fn is_subsequence(needle: &[SmolStr], haystack: &[SmolStr]) -> bool {
    let mut iter = haystack.iter();
    needle.iter().all(|n| iter.any(|h| h == n))
}
