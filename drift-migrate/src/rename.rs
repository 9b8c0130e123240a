//! Rename correlation and persisted rename records.
//!
//! The correlator proposes `{from, to}` pairs where a removed and an added
//! object of equivalent shape exist in the same collection and no
//! identical-shape counterpart remains on either side. Proposals are never
//! applied on their own: non-interactive runs honor only renames that were
//! previously confirmed (persisted under the state directory or passed in
//! by the caller). An unconfirmed pair stays a drop/create — the engine
//! never assumes data can move without being told so.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use drift_schema::{
    ColumnInfo, RenameKind, Renames, SchemaMigrationInfo, TableMigrationInfo,
};

use crate::error::{MigrateError, MigrateResult};

/// A proposed rename awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCandidate {
    /// Table or column rename.
    pub kind: RenameKind,
    /// Schema namespace.
    pub schema: String,
    /// Owning table, for column renames.
    pub table: Option<String>,
    /// Name on the live side.
    pub from: String,
    /// Name on the declared side.
    pub to: String,
}

/// Correlate unmatched drop/create pairs between two canonical trees.
///
/// `remote` is the introspected tree, `local` the declared one; both must
/// come from the same namespace. Only unambiguous pairings are proposed: a
/// shape shared by more than one removed or added object stays a
/// drop/create.
pub fn correlate(
    remote: &SchemaMigrationInfo,
    local: &SchemaMigrationInfo,
) -> Vec<RenameCandidate> {
    let schema = remote.name.as_str();
    let mut candidates = Vec::new();

    // Tables removed on one side and added on the other, paired by shape.
    let removed: Vec<&str> = remote
        .tables
        .keys()
        .filter(|t| !local.tables.contains_key(*t))
        .map(|t| t.as_str())
        .collect();
    let added: Vec<&str> = local
        .tables
        .keys()
        .filter(|t| !remote.tables.contains_key(*t))
        .map(|t| t.as_str())
        .collect();

    let removed_by_shape = group_by_shape(&removed, |t| table_shape(&remote.tables[*t]));
    let added_by_shape = group_by_shape(&added, |t| table_shape(&local.tables[*t]));

    for (shape, from_names) in &removed_by_shape {
        if let Some(to_names) = added_by_shape.get(shape) {
            if let ([from], [to]) = (from_names.as_slice(), to_names.as_slice()) {
                candidates.push(RenameCandidate {
                    kind: RenameKind::Table,
                    schema: schema.to_string(),
                    table: None,
                    from: (*from).to_string(),
                    to: (*to).to_string(),
                });
            }
        }
    }

    // Columns within tables present on both sides.
    for (table, remote_table) in &remote.tables {
        let Some(local_table) = local.tables.get(table) else {
            continue;
        };

        let removed: Vec<&str> = remote_table
            .columns
            .keys()
            .filter(|c| !local_table.columns.contains_key(*c))
            .map(|c| c.as_str())
            .collect();
        let added: Vec<&str> = local_table
            .columns
            .keys()
            .filter(|c| !remote_table.columns.contains_key(*c))
            .map(|c| c.as_str())
            .collect();

        let removed_by_shape =
            group_by_shape(&removed, |c| column_shape(&remote_table.columns[*c]));
        let added_by_shape = group_by_shape(&added, |c| column_shape(&local_table.columns[*c]));

        for (shape, from_names) in &removed_by_shape {
            if let Some(to_names) = added_by_shape.get(shape) {
                if let ([from], [to]) = (from_names.as_slice(), to_names.as_slice()) {
                    candidates.push(RenameCandidate {
                        kind: RenameKind::Column,
                        schema: schema.to_string(),
                        table: Some(table.to_string()),
                        from: (*from).to_string(),
                        to: (*to).to_string(),
                    });
                }
            }
        }
    }

    debug!(schema, count = candidates.len(), "correlated rename candidates");
    candidates
}

/// Confirm candidates into a rename set.
pub fn confirm(candidates: &[RenameCandidate]) -> Renames {
    let mut renames = Renames::new();
    for candidate in candidates {
        match (&candidate.kind, &candidate.table) {
            (RenameKind::Table, _) => {
                renames.add_table(
                    candidate.schema.as_str(),
                    candidate.from.as_str(),
                    candidate.to.as_str(),
                );
            }
            (RenameKind::Column, Some(table)) => {
                renames.add_column(
                    &candidate.schema,
                    table,
                    candidate.from.as_str(),
                    candidate.to.as_str(),
                );
            }
            (RenameKind::Column, None) => {}
        }
    }
    renames
}

fn group_by_shape<'a>(
    names: &[&'a str],
    shape_of: impl Fn(&&'a str) -> String,
) -> HashMap<String, Vec<&'a str>> {
    let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
    for name in names {
        groups.entry(shape_of(name)).or_default().push(name);
    }
    groups
}

/// A table's shape, independent of its name: its columns and the hash keys
/// of its constraint collections. The hash keys already substitute a
/// placeholder for the table name, so a renamed-but-unchanged table shapes
/// identically on both sides.
fn table_shape(table: &TableMigrationInfo) -> String {
    let mut columns: Vec<String> = table
        .columns
        .iter()
        .map(|(name, info)| format!("{name}={}", column_shape(info)))
        .collect();
    columns.sort_unstable();

    let mut keys: Vec<&str> = table
        .unique
        .keys()
        .chain(table.checks.keys())
        .chain(table.foreign_keys.keys())
        .chain(table.indexes.keys())
        .chain(table.triggers.keys())
        .map(String::as_str)
        .collect();
    keys.sort_unstable();

    let pk = table
        .primary_key
        .as_ref()
        .map(|pk| {
            let mut cols: Vec<&str> = pk.columns.iter().map(|c| c.as_str()).collect();
            cols.sort_unstable();
            cols.join(",")
        })
        .unwrap_or_default();

    format!("cols[{}] pk[{}] keys[{}]", columns.join(";"), pk, keys.join(";"))
}

/// A column's shape, independent of its name.
fn column_shape(column: &ColumnInfo) -> String {
    format!(
        "{}:{}:{}:{}",
        column.data_type,
        column.nullable,
        column.default.as_deref().unwrap_or(""),
        column
            .identity
            .map(|i| format!("{i:?}"))
            .unwrap_or_default()
    )
}

/// A persisted rename record, one JSON file per confirmed rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRecord {
    /// Timestamp-prefixed identifier.
    pub id: String,
    /// Record kind.
    #[serde(rename = "type")]
    pub kind: RenameKind,
    /// Schema namespace.
    pub schema: String,
    /// Owning table, for column renames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Live-side name.
    pub from: String,
    /// Declared-side name.
    pub to: String,
}

/// Rename records under a state directory.
pub struct RenameState {
    dir: PathBuf,
}

impl RenameState {
    /// Create a state handle rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The state directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all persisted records into a confirmed rename set.
    pub async fn load(&self) -> MigrateResult<Renames> {
        let mut renames = Renames::new();
        if !self.dir.exists() {
            return Ok(renames);
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = tokio::fs::read_to_string(&path).await?;
            let record: RenameRecord = serde_json::from_str(&content).map_err(|e| {
                MigrateError::artifact(format!(
                    "malformed rename record {}: {e}",
                    path.display()
                ))
            })?;
            match (&record.kind, &record.table) {
                (RenameKind::Table, _) => {
                    renames.add_table(
                        record.schema.as_str(),
                        record.from.as_str(),
                        record.to.as_str(),
                    );
                }
                (RenameKind::Column, Some(table)) => {
                    renames.add_column(
                        &record.schema,
                        table,
                        record.from.as_str(),
                        record.to.as_str(),
                    );
                }
                (RenameKind::Column, None) => {
                    return Err(MigrateError::artifact(format!(
                        "column rename record {} has no table",
                        path.display()
                    )));
                }
            }
        }

        Ok(renames)
    }

    /// Persist a confirmed candidate so the next run does not re-ask.
    pub async fn record(&self, candidate: &RenameCandidate) -> MigrateResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let id = format!("{stamp}-{}-{}", candidate.from, candidate.to);
        let record = RenameRecord {
            id: id.clone(),
            kind: candidate.kind,
            schema: candidate.schema.clone(),
            table: candidate.table.clone(),
            from: candidate.from.clone(),
            to: candidate.to.clone(),
        };

        let path = self.dir.join(format!("{id}.json"));
        let content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "recorded rename");
        Ok(path)
    }
}
