//! The migration engine facade.
//!
//! Ties the pipeline together: canonical model building, diffing, changeset
//! generation, sorting, and either artifact generation or direct push.
//! Planning is pure — nothing touches the database until `push` executes
//! the plan or `generate` writes it to disk.

use std::path::PathBuf;

use tracing::{debug, info};

use drift_schema::{
    DatabaseSnapshot, DeclaredSchema, Renames, SchemaMigrationInfo, build_declared,
    build_snapshot,
};

use crate::artifact::ArtifactWriter;
use crate::changeset::{
    ChangePhase, ChangeWarning, Changeset, ChangesetKind, StatementGroup, WarningCode,
    WarningKind,
};
use crate::diff::diff;
use crate::error::MigrateResult;
use crate::executor::{MigrationReport, MigrationUnit, PhasedMigrator};
use crate::generators::{
    GeneratorContext, collect_table_sets, generate_changesets, rename_changesets,
};
use crate::ledger::PostgresLedger;
use crate::rename::{RenameCandidate, RenameState, correlate};
use crate::session::SqlSession;
use crate::sort::{dependency_order, sort_changesets};
use crate::statements::DdlStatement;
use crate::summary::summarize;

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Root of the migration artifact tree (phase directories below it).
    pub migrations_dir: PathBuf,
    /// State directory for rename records.
    pub state_dir: PathBuf,
    /// Whether push runs report without executing.
    pub dry_run: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            state_dir: PathBuf::from("./migrations/.drift"),
            dry_run: false,
        }
    }
}

impl MigrateConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the rename-state directory.
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// An ordered, phase-bucketed set of changesets ready to write or apply.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Changesets in execution order.
    pub changesets: Vec<Changeset>,
}

impl MigrationPlan {
    /// Whether the plan contains no work.
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Changesets of one phase, in order.
    pub fn for_phase(&self, phase: ChangePhase) -> Vec<&Changeset> {
        self.changesets.iter().filter(|c| c.phase == phase).collect()
    }

    /// All warnings across the plan.
    pub fn warnings(&self) -> Vec<&ChangeWarning> {
        self.changesets.iter().flat_map(|c| c.warnings.iter()).collect()
    }

    /// Human-readable change report.
    pub fn summary(&self) -> String {
        summarize(&self.changesets)
    }
}

/// Per-phase outcome of a push.
#[derive(Debug)]
pub struct PhaseOutcome {
    /// The phase that ran.
    pub phase: ChangePhase,
    /// Its per-unit report.
    pub report: MigrationReport,
}

/// The migration engine.
pub struct Engine {
    config: MigrateConfig,
}

impl Engine {
    /// Create an engine.
    pub fn new(config: MigrateConfig) -> Self {
        Self { config }
    }

    /// The engine configuration.
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Compute the ordered plan transforming `remotes` into `locals`.
    ///
    /// Pure: builds both canonical trees per namespace, diffs them,
    /// generates changesets (threading `renames` through the generator
    /// context), and sorts the result. Namespaces declared but absent
    /// remotely are created; namespaces present remotely but undeclared
    /// are dropped.
    pub fn plan(
        &self,
        locals: &[DeclaredSchema],
        remotes: &[DatabaseSnapshot],
        renames: &Renames,
    ) -> MigrateResult<MigrationPlan> {
        let mut changesets = Vec::new();
        let mut local_trees = Vec::new();

        for declared in locals {
            let local = build_declared(declared)?;
            let remote = match remotes.iter().find(|r| r.schema == declared.name) {
                Some(snapshot) => build_snapshot(snapshot, renames)?,
                None => {
                    changesets.push(create_schema_changeset(declared.name.as_str()));
                    SchemaMigrationInfo::new(declared.name.clone())
                }
            };

            let entries = diff(&remote, &local)?;
            debug!(schema = %declared.name, entries = entries.len(), "diffed namespace");

            let (tables_to_add, tables_to_drop) = collect_table_sets(&entries);
            let ctx = GeneratorContext {
                schema_name: declared.name.as_str(),
                renames,
                tables_to_add: &tables_to_add,
                tables_to_drop: &tables_to_drop,
            };

            changesets.extend(generate_changesets(&entries, &ctx)?);
            changesets.extend(rename_changesets(&ctx));
            local_trees.push(local);
        }

        for snapshot in remotes {
            if !locals.iter().any(|l| l.name == snapshot.schema) {
                changesets.push(drop_schema_changeset(snapshot.schema.as_str()));
            }
        }

        let order = dependency_order(&local_trees);
        let changesets = sort_changesets(changesets, &order);
        info!(changesets = changesets.len(), "planned migration");
        Ok(MigrationPlan { changesets })
    }

    /// Propose rename candidates between the declared and live schemas.
    ///
    /// Correlation runs without any confirmed renames so every unmatched
    /// drop/create pair is visible; the caller confirms candidates (and
    /// may persist them via [`Engine::confirm_rename`]) before planning.
    pub fn propose_renames(
        &self,
        locals: &[DeclaredSchema],
        remotes: &[DatabaseSnapshot],
    ) -> MigrateResult<Vec<RenameCandidate>> {
        let none = Renames::new();
        let mut candidates = Vec::new();
        for declared in locals {
            if let Some(snapshot) = remotes.iter().find(|r| r.schema == declared.name) {
                let local = build_declared(declared)?;
                let remote = build_snapshot(snapshot, &none)?;
                candidates.extend(correlate(&remote, &local));
            }
        }
        Ok(candidates)
    }

    /// Load confirmed renames persisted under the state directory.
    pub async fn load_renames(&self) -> MigrateResult<Renames> {
        RenameState::new(&self.config.state_dir).load().await
    }

    /// Persist a confirmed rename candidate for future runs.
    pub async fn confirm_rename(&self, candidate: &RenameCandidate) -> MigrateResult<()> {
        RenameState::new(&self.config.state_dir)
            .record(candidate)
            .await?;
        Ok(())
    }

    /// Write the plan as migration artifacts under the phase directories.
    pub async fn generate(&self, plan: &MigrationPlan) -> MigrateResult<Vec<PathBuf>> {
        ArtifactWriter::new(&self.config.migrations_dir)
            .write(&plan.changesets)
            .await
    }

    /// Apply the plan directly, phase by phase.
    ///
    /// Each phase runs under its own ledger and lock; a failed phase stops
    /// the later phases from being attempted.
    pub async fn push(
        &self,
        plan: &MigrationPlan,
        session: &mut dyn SqlSession,
    ) -> MigrateResult<Vec<PhaseOutcome>> {
        let migrator = if self.config.dry_run {
            PhasedMigrator::new().dry_run()
        } else {
            PhasedMigrator::new()
        };

        let mut outcomes = Vec::new();
        for phase in ChangePhase::ALL {
            let changesets = plan.for_phase(phase);
            if changesets.is_empty() {
                continue;
            }

            let units: Vec<MigrationUnit> = changesets
                .iter()
                .enumerate()
                .map(|(sequence, changeset)| MigrationUnit::from_changeset(sequence, changeset))
                .collect();

            let ledger = PostgresLedger::new(phase);
            let report = migrator.run(&units, session, &ledger).await?;
            let succeeded = report.succeeded();
            outcomes.push(PhaseOutcome { phase, report });

            if !self.config.dry_run && !succeeded {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Render the plan's change report.
    pub fn summarize(&self, plan: &MigrationPlan) -> String {
        plan.summary()
    }
}

fn create_schema_changeset(name: &str) -> Changeset {
    let create = DdlStatement::CreateSchema {
        name: name.to_string(),
    };
    let drop = DdlStatement::DropSchema {
        name: name.to_string(),
    };
    Changeset::new(ChangesetKind::CreateSchema, name, "")
        .up(vec![StatementGroup::single(create.render())])
        .down(vec![StatementGroup::single(drop.render())])
}

fn drop_schema_changeset(name: &str) -> Changeset {
    let drop = DdlStatement::DropSchema {
        name: name.to_string(),
    };
    let create = DdlStatement::CreateSchema {
        name: name.to_string(),
    };
    // The down side recreates the namespace, not its contents.
    Changeset::new(ChangesetKind::DropSchema, name, "")
        .up(vec![StatementGroup::single(drop.render())])
        .down(vec![StatementGroup::single(create.render())])
        .warn(ChangeWarning::table(
            WarningKind::Destructive,
            WarningCode::SchemaDrop,
            name,
            "",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_schema::{DeclaredColumn, DeclaredTable};

    #[test]
    fn test_config_builder() {
        let config = MigrateConfig::new()
            .migrations_dir("./db/migrations")
            .state_dir("./db/state")
            .dry_run(true);
        assert_eq!(config.migrations_dir, PathBuf::from("./db/migrations"));
        assert_eq!(config.state_dir, PathBuf::from("./db/state"));
        assert!(config.dry_run);
    }

    #[test]
    fn test_plan_empty_for_equal_schemas() {
        let engine = Engine::new(MigrateConfig::default());
        let declared = DeclaredSchema::new("public").table(
            DeclaredTable::new("users").column(DeclaredColumn::new("id", "bigint")),
        );

        // The remote mirrors the declared schema exactly.
        let snapshot = DatabaseSnapshot::new("public").table(drift_schema::TableSnapshot {
            name: "users".into(),
            columns: vec![drift_schema::ColumnSnapshot::new("id", "bigint")],
            ..Default::default()
        });

        let plan = engine
            .plan(&[declared], &[snapshot], &Renames::new())
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_new_namespace_creates_schema_first() {
        let engine = Engine::new(MigrateConfig::default());
        let declared = DeclaredSchema::new("app").table(
            DeclaredTable::new("users").column(DeclaredColumn::new("id", "bigint")),
        );

        let plan = engine.plan(&[declared], &[], &Renames::new()).unwrap();
        assert_eq!(plan.changesets[0].kind, ChangesetKind::CreateSchema);
        assert!(
            plan.changesets
                .iter()
                .any(|c| c.kind == ChangesetKind::CreateTable)
        );
    }

    #[test]
    fn test_undeclared_namespace_dropped_with_warning() {
        let engine = Engine::new(MigrateConfig::default());
        let snapshot = DatabaseSnapshot::new("legacy");

        let plan = engine.plan(&[], &[snapshot], &Renames::new()).unwrap();
        assert_eq!(plan.changesets.len(), 1);
        assert_eq!(plan.changesets[0].kind, ChangesetKind::DropSchema);
        assert_eq!(plan.warnings().len(), 1);
        assert_eq!(plan.warnings()[0].code, WarningCode::SchemaDrop);
    }
}
