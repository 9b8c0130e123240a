//! Human-readable change reports.
//!
//! The summary renders before any apply: categorized warnings first, so
//! destructive and blocking changes are impossible to miss, then the
//! ordered operations per phase.

use std::fmt::Write as _;

use crate::changeset::{ChangePhase, ChangeWarning, Changeset, WarningCode, WarningKind};

/// Render a change report for sorted changesets.
pub fn summarize(changesets: &[Changeset]) -> String {
    let mut out = String::new();

    if changesets.is_empty() {
        return "No schema changes detected".to_string();
    }

    let warnings: Vec<&ChangeWarning> =
        changesets.iter().flat_map(|c| c.warnings.iter()).collect();
    if !warnings.is_empty() {
        for kind in [
            WarningKind::Destructive,
            WarningKind::Blocking,
            WarningKind::MightFail,
        ] {
            let of_kind: Vec<&&ChangeWarning> =
                warnings.iter().filter(|w| w.kind == kind).collect();
            if of_kind.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}:", kind_heading(kind));
            for warning in of_kind {
                let _ = writeln!(out, "  - {}", warning_message(warning));
            }
        }
        out.push('\n');
    }

    for phase in ChangePhase::ALL {
        let of_phase: Vec<&Changeset> =
            changesets.iter().filter(|c| c.phase == phase).collect();
        if of_phase.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} ({} changes):", phase.as_str(), of_phase.len());
        for changeset in of_phase {
            let target = if changeset.current_table_name.is_empty() {
                changeset.schema_name.clone()
            } else {
                format!("{}.{}", changeset.schema_name, changeset.current_table_name)
            };
            let _ = writeln!(out, "  - {} {}", changeset.kind.as_str(), target);
        }
    }

    out.trim_end().to_string()
}

fn kind_heading(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::Destructive => "Destructive changes",
        WarningKind::Blocking => "Blocking changes",
        WarningKind::MightFail => "Changes that might fail",
    }
}

fn warning_message(warning: &ChangeWarning) -> String {
    let target = match &warning.column {
        Some(column) => format!("{}.{}.{}", warning.schema, warning.table, column),
        None => format!("{}.{}", warning.schema, warning.table),
    };
    match warning.code {
        WarningCode::SchemaDrop => format!("schema {} will be dropped", warning.schema),
        WarningCode::TableDrop => format!("table {target} and its data will be dropped"),
        WarningCode::ColumnDrop => format!("column {target} and its data will be dropped"),
        WarningCode::ChangeColumnType => match (&warning.from, &warning.to) {
            (Some(from), Some(to)) => format!(
                "column {target} changes type from {from} to {to}, which is not provably lossless"
            ),
            _ => format!("column {target} changes type in a way that is not provably lossless"),
        },
        WarningCode::AddSerialColumn => {
            format!("sequence-backed column {target} locks the table while it is added")
        }
        WarningCode::AddVolatileDefault => {
            format!("column {target} has a volatile default; adding it rewrites every row")
        }
        WarningCode::AddNonNullableColumn => {
            format!("non-nullable column {target} fails if the table has rows that get no value")
        }
        WarningCode::SetColumnNotNull => {
            format!("column {target} becomes NOT NULL and fails on existing NULLs")
        }
        WarningCode::AddPrimaryKeyToExistingTable => {
            format!("primary key on {target} fails on existing NULLs or duplicates")
        }
        WarningCode::AddUniqueToExistingTable => {
            format!("unique constraint on {target} fails on existing duplicates")
        }
        WarningCode::AddCheckToExistingTable => {
            format!("check constraint on {target} fails on rows that violate it")
        }
        WarningCode::AddForeignKeyToExistingTable => {
            format!("foreign key on {target} fails on rows without a referenced row")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangesetKind, StatementGroup};

    #[test]
    fn test_empty_summary() {
        assert_eq!(summarize(&[]), "No schema changes detected");
    }

    #[test]
    fn test_warnings_lead_the_report() {
        let changesets = vec![
            Changeset::new(ChangesetKind::CreateColumn, "public", "users")
                .up(vec![StatementGroup::single("SELECT 1")]),
            Changeset::new(ChangesetKind::DropTable, "public", "legacy")
                .up(vec![StatementGroup::single("SELECT 1")])
                .warn(ChangeWarning::table(
                    WarningKind::Destructive,
                    WarningCode::TableDrop,
                    "public",
                    "legacy",
                )),
        ];

        let report = summarize(&changesets);
        let warnings_at = report.find("Destructive changes").unwrap();
        let expand_at = report.find("expand (").unwrap();
        assert!(warnings_at < expand_at);
        assert!(report.contains("contract (1 changes)"));
    }
}
