//! Migration artifacts on disk.
//!
//! One directory per ordered unit, grouped into phase directories consumed
//! independently by deploy tooling:
//!
//! ```text
//! migrations/
//!   expand/
//!     20240301120000001_create_table_users/
//!       up.sql
//!       down.sql
//!       migration.toml
//!   alter/
//!   contract/
//! ```
//!
//! `up.sql`/`down.sql` are the human-readable rendering; `migration.toml`
//! carries the authoritative statement groups (with their unique-violation
//! recovery), the `transactional` and `scaffold` flags, and the warnings
//! attached at generation time. The loader reads a phase directory back
//! into ordered [`MigrationUnit`]s.

use std::path::{Path, PathBuf};

use chrono::Utc;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::changeset::{ChangePhase, ChangeWarning, Changeset, StatementGroup};
use crate::error::{MigrateError, MigrateResult};
use crate::executor::MigrationUnit;

/// Metadata sidecar of one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Whether the unit may run inside a transaction.
    pub transactional: bool,
    /// True for hand-authored or empty scaffolds.
    pub scaffold: bool,
    /// Warnings attached at generation time.
    #[serde(default)]
    pub warnings: Vec<ChangeWarning>,
    /// Up statement groups.
    #[serde(default)]
    pub up: Vec<StatementGroup>,
    /// Down statement groups.
    #[serde(default)]
    pub down: Vec<StatementGroup>,
}

/// Writes changesets as migration artifacts.
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer rooted at the migrations directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The migrations directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one artifact directory per changeset, under its phase
    /// directory, named so lexicographic order is plan order.
    pub async fn write(&self, changesets: &[Changeset]) -> MigrateResult<Vec<PathBuf>> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let mut written = Vec::new();

        for (sequence, changeset) in changesets.iter().enumerate() {
            let mut slug = changeset.kind.as_str().to_string();
            if !changeset.current_table_name.is_empty() {
                slug.push('_');
                slug.push_str(&changeset.current_table_name);
            }

            let dir = self
                .root
                .join(changeset.phase.as_str())
                .join(format!("{stamp}{sequence:03}_{slug}"));
            tokio::fs::create_dir_all(&dir).await?;

            tokio::fs::write(dir.join("up.sql"), render_sql(&changeset.up)).await?;
            tokio::fs::write(dir.join("down.sql"), render_sql(&changeset.down)).await?;

            let metadata = ArtifactMetadata {
                transactional: changeset.transactional,
                scaffold: false,
                warnings: changeset.warnings.clone(),
                up: changeset.up.clone(),
                down: changeset.down.clone(),
            };
            tokio::fs::write(dir.join("migration.toml"), render_metadata(&metadata)?).await?;

            debug!(artifact = %dir.display(), "wrote migration artifact");
            written.push(dir);
        }

        info!(count = written.len(), root = %self.root.display(), "wrote migration artifacts");
        Ok(written)
    }

    /// Create an empty, hand-editable artifact in a phase.
    pub async fn scaffold(&self, phase: ChangePhase, name: &str) -> MigrateResult<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let dir = self
            .root
            .join(phase.as_str())
            .join(format!("{stamp}000_{name}"));
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join("up.sql"), "").await?;
        tokio::fs::write(dir.join("down.sql"), "").await?;
        let metadata = ArtifactMetadata {
            transactional: true,
            scaffold: true,
            warnings: Vec::new(),
            up: Vec::new(),
            down: Vec::new(),
        };
        tokio::fs::write(dir.join("migration.toml"), render_metadata(&metadata)?).await?;
        Ok(dir)
    }
}

/// Reads a phase directory back into ordered migration units.
pub struct MigrationSource {
    root: PathBuf,
}

impl MigrationSource {
    /// Create a source rooted at the migrations directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load one phase's units in name order.
    pub async fn load_phase(&self, phase: ChangePhase) -> MigrateResult<Vec<MigrationUnit>> {
        let dir = self.root.join(phase.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let name_re = Regex::new(r"^\d{14,}_[a-z0-9_]+$").expect("artifact name regex");

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() && name_re.is_match(name) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut units = Vec::new();
        for path in paths {
            units.push(self.load_unit(&path).await?);
        }
        Ok(units)
    }

    async fn load_unit(&self, dir: &Path) -> MigrateResult<MigrationUnit> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrateError::artifact(format!("invalid path {}", dir.display())))?
            .to_string();

        let metadata_path = dir.join("migration.toml");
        let content = tokio::fs::read_to_string(&metadata_path).await.map_err(|e| {
            MigrateError::artifact(format!("missing {}: {e}", metadata_path.display()))
        })?;
        let metadata: ArtifactMetadata = toml::from_str(&content)
            .map_err(|e| MigrateError::Metadata(format!("{}: {e}", metadata_path.display())))?;

        Ok(MigrationUnit {
            name,
            transactional: metadata.transactional,
            up: metadata.up,
            down: metadata.down,
            scaffold: metadata.scaffold,
            warnings: metadata.warnings,
        })
    }
}

fn render_sql(groups: &[StatementGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        for statement in &group.statements {
            out.push_str(statement);
            out.push_str(";\n");
        }
        out.push('\n');
    }
    out
}

fn render_metadata(metadata: &ArtifactMetadata) -> MigrateResult<String> {
    let body = toml::to_string_pretty(metadata)
        .map_err(|e| MigrateError::Metadata(e.to_string()))?;
    // Header mirrors the generated files' provenance without being load-
    // bearing; the parser ignores comments.
    Ok(format!("# Generated migration metadata. Do not edit by hand.\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{Changeset, ChangesetKind};

    fn sample_changeset() -> Changeset {
        Changeset::new(ChangesetKind::CreateColumn, "public", "users")
            .up(vec![StatementGroup::single(
                "ALTER TABLE \"public\".\"users\" ADD COLUMN \"name\" text",
            )])
            .down(vec![StatementGroup::single(
                "ALTER TABLE \"public\".\"users\" DROP COLUMN \"name\"",
            )])
    }

    #[tokio::test]
    async fn test_write_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let written = writer.write(&[sample_changeset()]).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(dir.path().join("expand")));

        let source = MigrationSource::new(dir.path());
        let units = source.load_phase(ChangePhase::Expand).await.unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].transactional);
        assert!(!units[0].scaffold);
        assert!(units[0].up[0].statements[0].contains("ADD COLUMN"));

        // Other phases stay empty.
        assert!(source.load_phase(ChangePhase::Contract).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scaffold_flag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        writer.scaffold(ChangePhase::Alter, "backfill_names").await.unwrap();

        let units = MigrationSource::new(dir.path())
            .load_phase(ChangePhase::Alter)
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].scaffold);
        assert!(units[0].up.is_empty());
    }

    #[test]
    fn test_sql_rendering_terminates_statements() {
        let groups = vec![StatementGroup::new(vec![
            "CREATE TABLE a ()".to_string(),
            "CREATE TABLE b ()".to_string(),
        ])];
        let sql = render_sql(&groups);
        assert_eq!(sql, "CREATE TABLE a ();\nCREATE TABLE b ();\n\n");
    }
}
