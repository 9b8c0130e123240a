//! The phased migrator.
//!
//! Units apply in order. Consecutive transactional units coalesce into one
//! database transaction; a non-transactional unit (a concurrent index
//! build) always runs alone, outside any transaction, flanked by the
//! commits of its neighbors. A failure inside a transactional batch rolls
//! the whole batch back — its ledger rows with it — and every later unit
//! is marked `NotExecuted` without being attempted. Batches committed
//! earlier stay applied.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::changeset::{ChangeWarning, Changeset, StatementGroup};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::MigrationLedger;
use crate::session::SqlSession;

/// One executable migration unit: a changeset rendered to statement
/// groups, or an artifact loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUnit {
    /// Unique, ordered name; the ledger key.
    pub name: String,
    /// Whether the unit may run inside a transaction.
    pub transactional: bool,
    /// Statement groups applying the unit.
    pub up: Vec<StatementGroup>,
    /// Statement groups reversing the unit.
    pub down: Vec<StatementGroup>,
    /// True for hand-authored or empty scaffolds.
    pub scaffold: bool,
    /// Warnings carried from generation.
    pub warnings: Vec<ChangeWarning>,
}

impl MigrationUnit {
    /// Build a unit from a changeset. `sequence` orders the unit within
    /// its phase and makes the name unique.
    pub fn from_changeset(sequence: usize, changeset: &Changeset) -> Self {
        let mut name = format!("{:04}_{}", sequence, changeset.kind.as_str());
        if !changeset.current_table_name.is_empty() {
            name.push('_');
            name.push_str(&changeset.current_table_name);
        }
        Self {
            name,
            transactional: changeset.transactional,
            up: changeset.up.clone(),
            down: changeset.down.clone(),
            scaffold: false,
            warnings: changeset.warnings.clone(),
        }
    }
}

/// Lifecycle state of one unit in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Not yet attempted.
    Pending,
    /// Currently executing.
    Running,
    /// Applied and committed.
    Success,
    /// Failed; its batch was rolled back.
    Error,
    /// Skipped because an earlier unit failed.
    NotExecuted,
}

/// Per-unit outcome of a run.
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Unit name.
    pub name: String,
    /// Final status.
    pub status: UnitStatus,
    /// Error message for failed units.
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
}

/// Outcome of one migrator run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Reports for the units that were part of this run.
    pub units: Vec<UnitReport>,
    /// Names of already-applied units that were skipped.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    /// Whether every attempted unit succeeded.
    pub fn succeeded(&self) -> bool {
        self.units
            .iter()
            .all(|u| matches!(u.status, UnitStatus::Success))
    }

    /// The first failed unit, if any.
    pub fn first_error(&self) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.status == UnitStatus::Error)
    }

    /// One line per unit plus the first error message.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .units
            .iter()
            .map(|u| format!("{:12} {}", format!("{:?}", u.status), u.name))
            .collect();
        if !self.skipped.is_empty() {
            lines.push(format!("{} already applied", self.skipped.len()));
        }
        if let Some(failed) = self.first_error() {
            if let Some(error) = &failed.error {
                lines.push(format!("error: {error}"));
            }
        }
        lines.join("\n")
    }
}

/// Executes migration units against a session with ledger tracking.
#[derive(Debug, Clone, Default)]
pub struct PhasedMigrator {
    dry_run: bool,
}

impl PhasedMigrator {
    /// Create a migrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report what would run without applying changes or taking the lock.
    /// The ledger tables are still created if missing, so the applied set
    /// can be read.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Apply pending units in order.
    ///
    /// Acquires the phase lock for the duration of the run; a held lock
    /// fails the invocation immediately. Already-applied units are
    /// skipped, making re-runs idempotent.
    pub async fn run(
        &self,
        units: &[MigrationUnit],
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<MigrationReport> {
        if self.dry_run {
            return self.plan_only(units, session, ledger).await;
        }

        ledger.ensure_ready(session).await?;
        ledger.acquire_lock(session).await?;

        let result = self.run_locked(units, session, ledger).await;
        let released = ledger.release_lock(session).await;

        match (result, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(run_err), _) => Err(run_err),
        }
    }

    async fn plan_only(
        &self,
        units: &[MigrationUnit],
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<MigrationReport> {
        ledger.ensure_ready(session).await?;
        let applied = ledger.applied(session).await?;

        let mut report = MigrationReport::default();
        for unit in units {
            if applied.contains(&unit.name) {
                report.skipped.push(unit.name.clone());
            } else {
                info!(unit = %unit.name, "dry run: would apply");
                report.units.push(UnitReport {
                    name: unit.name.clone(),
                    status: UnitStatus::Pending,
                    error: None,
                    duration_ms: 0,
                });
            }
        }
        Ok(report)
    }

    async fn run_locked(
        &self,
        units: &[MigrationUnit],
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<MigrationReport> {
        let applied = ledger.applied(session).await?;

        let mut report = MigrationReport::default();
        let mut pending: Vec<&MigrationUnit> = Vec::new();
        for unit in units {
            if applied.contains(&unit.name) {
                debug!(unit = %unit.name, "already applied");
                report.skipped.push(unit.name.clone());
            } else {
                pending.push(unit);
                report.units.push(UnitReport {
                    name: unit.name.clone(),
                    status: UnitStatus::Pending,
                    error: None,
                    duration_ms: 0,
                });
            }
        }

        let mut failed = false;
        for batch in batch_indices(&pending) {
            if failed {
                for index in batch.indices {
                    report.units[index].status = UnitStatus::NotExecuted;
                }
                continue;
            }

            if batch.transactional {
                failed = self
                    .run_transactional_batch(&batch.indices, &pending, &mut report, session, ledger)
                    .await?;
            } else {
                // Exactly one unit; it must never be wrapped in a
                // transaction even when batching is otherwise eligible.
                let index = batch.indices[0];
                failed = self
                    .run_standalone_unit(index, pending[index], &mut report, session, ledger)
                    .await?;
            }
        }

        Ok(report)
    }

    async fn run_transactional_batch(
        &self,
        indices: &[usize],
        pending: &[&MigrationUnit],
        report: &mut MigrationReport,
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<bool> {
        session.begin().await?;
        let mut recorded: Vec<&str> = Vec::new();

        for (position, &index) in indices.iter().enumerate() {
            let unit = pending[index];
            report.units[index].status = UnitStatus::Running;
            let start = Instant::now();

            match execute_groups(session, &unit.up).await {
                Ok(()) => {
                    let duration_ms = start.elapsed().as_millis() as i64;
                    ledger.record_applied(session, &unit.name, duration_ms).await?;
                    recorded.push(&unit.name);
                    report.units[index].status = UnitStatus::Success;
                    report.units[index].duration_ms = duration_ms;
                    info!(unit = %unit.name, duration_ms, "applied");
                }
                Err(err) => {
                    session.rollback().await?;
                    // Nothing in the batch survives the rollback. A
                    // SQL-backed ledger loses its rows with the
                    // transaction; any other implementation is told
                    // explicitly.
                    for name in recorded.drain(..) {
                        ledger.remove(session, name).await?;
                    }
                    // The failing unit reports the error, the rest revert
                    // to NotExecuted regardless of whether they had run.
                    for (other_position, &other) in indices.iter().enumerate() {
                        report.units[other].status = if other_position == position {
                            UnitStatus::Error
                        } else {
                            UnitStatus::NotExecuted
                        };
                    }
                    report.units[index].error = Some(err.to_string());
                    warn!(unit = %unit.name, error = %err, "batch rolled back");
                    return Ok(true);
                }
            }
        }

        session.commit().await?;
        Ok(false)
    }

    async fn run_standalone_unit(
        &self,
        index: usize,
        unit: &MigrationUnit,
        report: &mut MigrationReport,
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<bool> {
        report.units[index].status = UnitStatus::Running;
        let start = Instant::now();

        match execute_groups(session, &unit.up).await {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                ledger.record_applied(session, &unit.name, duration_ms).await?;
                report.units[index].status = UnitStatus::Success;
                report.units[index].duration_ms = duration_ms;
                info!(unit = %unit.name, duration_ms, "applied");
                Ok(false)
            }
            Err(err) => {
                report.units[index].status = UnitStatus::Error;
                report.units[index].error = Some(err.to_string());
                warn!(unit = %unit.name, error = %err, "unit failed");
                Ok(true)
            }
        }
    }

    /// Revert applied units in reverse order by executing their down
    /// groups, removing each ledger record as it reverts.
    pub async fn revert(
        &self,
        units: &[MigrationUnit],
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<MigrationReport> {
        ledger.ensure_ready(session).await?;
        ledger.acquire_lock(session).await?;

        let result = self.revert_locked(units, session, ledger).await;
        let released = ledger.release_lock(session).await;

        match (result, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(run_err), _) => Err(run_err),
        }
    }

    async fn revert_locked(
        &self,
        units: &[MigrationUnit],
        session: &mut dyn SqlSession,
        ledger: &dyn MigrationLedger,
    ) -> MigrateResult<MigrationReport> {
        let applied = ledger.applied(session).await?;
        let mut report = MigrationReport::default();
        let mut failed = false;

        for unit in units.iter().rev() {
            if !applied.contains(&unit.name) {
                report.skipped.push(unit.name.clone());
                continue;
            }

            let index = report.units.len();
            report.units.push(UnitReport {
                name: unit.name.clone(),
                status: UnitStatus::Pending,
                error: None,
                duration_ms: 0,
            });

            if failed {
                report.units[index].status = UnitStatus::NotExecuted;
                continue;
            }

            report.units[index].status = UnitStatus::Running;
            let start = Instant::now();

            if unit.transactional {
                session.begin().await?;
            }
            match execute_groups(session, &unit.down).await {
                Ok(()) => {
                    ledger.remove(session, &unit.name).await?;
                    if unit.transactional {
                        session.commit().await?;
                    }
                    report.units[index].status = UnitStatus::Success;
                    report.units[index].duration_ms = start.elapsed().as_millis() as i64;
                    info!(unit = %unit.name, "reverted");
                }
                Err(err) => {
                    if unit.transactional {
                        session.rollback().await?;
                    }
                    report.units[index].status = UnitStatus::Error;
                    report.units[index].error = Some(err.to_string());
                    failed = true;
                }
            }
        }

        Ok(report)
    }
}

/// Execute statement groups in order.
///
/// A unique violation in a group that declares cleanup statements runs the
/// cleanup (dropping the half-built index) and then re-raises the original
/// error.
async fn execute_groups(
    session: &mut dyn SqlSession,
    groups: &[StatementGroup],
) -> Result<(), MigrateError> {
    for group in groups {
        for statement in &group.statements {
            if let Err(err) = session.execute(statement).await {
                if err.is_unique_violation() && !group.on_unique_violation.is_empty() {
                    for cleanup in &group.on_unique_violation {
                        if let Err(cleanup_err) = session.execute(cleanup).await {
                            warn!(error = %cleanup_err, "cleanup after unique violation failed");
                        }
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Group consecutive transactional units; non-transactional units stand
/// alone.
struct Batch {
    transactional: bool,
    indices: Vec<usize>,
}

fn batch_indices(pending: &[&MigrationUnit]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for (index, unit) in pending.iter().enumerate() {
        let extend = unit.transactional
            && batches
                .last()
                .is_some_and(|b: &Batch| b.transactional);
        if extend {
            if let Some(last) = batches.last_mut() {
                last.indices.push(index);
            }
        } else {
            batches.push(Batch {
                transactional: unit.transactional,
                indices: vec![index],
            });
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::testing::RecordingSession;

    fn unit(name: &str, sql: &str) -> MigrationUnit {
        MigrationUnit {
            name: name.to_string(),
            transactional: true,
            up: vec![StatementGroup::single(sql)],
            down: vec![StatementGroup::single(format!("-- undo {sql}"))],
            scaffold: false,
            warnings: Vec::new(),
        }
    }

    fn concurrent_unit(name: &str, sql: &str, cleanup: &str) -> MigrationUnit {
        MigrationUnit {
            name: name.to_string(),
            transactional: false,
            up: vec![
                StatementGroup::single(sql)
                    .with_unique_violation_cleanup(vec![cleanup.to_string()]),
            ],
            down: Vec::new(),
            scaffold: false,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_all_units_apply() {
        let units = vec![unit("0001_a", "CREATE TABLE a ()"), unit("0002_b", "CREATE TABLE b ()")];
        let mut session = RecordingSession::new();
        let ledger = MemoryLedger::new();

        let report = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(session.committed_contains("CREATE TABLE a"));
        assert!(session.committed_contains("CREATE TABLE b"));
        assert_eq!(ledger.applied_names(), vec!["0001_a", "0002_b"]);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_rerun_skips_applied() {
        let units = vec![unit("0001_a", "CREATE TABLE a ()")];
        let mut session = RecordingSession::new();
        let ledger = MemoryLedger::new();
        ledger.seed_applied("0001_a");

        let report = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap();

        assert!(report.units.is_empty());
        assert_eq!(report.skipped, vec!["0001_a"]);
        assert!(!session.committed_contains("CREATE TABLE a"));
    }

    #[tokio::test]
    async fn test_lock_contention_fails_fast() {
        let units = vec![unit("0001_a", "CREATE TABLE a ()")];
        let mut session = RecordingSession::new();
        let ledger = MemoryLedger::locked();

        let err = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::LockFailed(_)));
        assert!(session.committed.is_empty());
    }

    #[tokio::test]
    async fn test_non_transactional_unit_runs_outside_transaction() {
        let units = vec![
            unit("0001_a", "CREATE TABLE a ()"),
            concurrent_unit(
                "0002_idx",
                "CREATE UNIQUE INDEX CONCURRENTLY i ON a (x)",
                "DROP INDEX CONCURRENTLY IF EXISTS i",
            ),
            unit("0003_b", "CREATE TABLE b ()"),
        ];
        let mut session = RecordingSession::new();
        let ledger = MemoryLedger::new();

        let report = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap();
        assert!(report.succeeded());

        // The concurrent build ran between the two commits, never inside a
        // transaction: BEGIN, a, COMMIT/index/BEGIN, b, COMMIT order in the
        // committed log.
        let log = session.log.clone();
        let index_pos = log
            .iter()
            .position(|s| s.contains("CONCURRENTLY i"))
            .unwrap();
        assert!(log[..index_pos].iter().any(|s| s.contains("CREATE TABLE a")));
        assert!(log[index_pos..].iter().any(|s| s.contains("CREATE TABLE b")));
    }

    #[tokio::test]
    async fn test_unique_violation_triggers_cleanup_then_fails() {
        let units = vec![concurrent_unit(
            "0001_idx",
            "CREATE UNIQUE INDEX CONCURRENTLY i ON a (x)",
            "DROP INDEX CONCURRENTLY IF EXISTS i",
        )];
        let mut session = RecordingSession::new().fail_on("CREATE UNIQUE INDEX", "23505");
        let ledger = MemoryLedger::new();

        let report = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.units[0].status, UnitStatus::Error);
        // The half-built index was dropped before the error surfaced.
        assert!(session.committed_contains("DROP INDEX CONCURRENTLY IF EXISTS i"));
        assert!(ledger.applied_names().is_empty());
    }

    #[tokio::test]
    async fn test_mid_batch_failure_rolls_back_batch() {
        let units = vec![
            unit("0001_a", "CREATE TABLE a ()"),
            unit("0002_bad", "CREATE TABLE broken ()"),
            unit("0003_c", "CREATE TABLE c ()"),
        ];
        let mut session = RecordingSession::new().fail_on("broken", "42601");
        let ledger = MemoryLedger::new();

        let report = PhasedMigrator::new()
            .run(&units, &mut session, &ledger)
            .await
            .unwrap();

        let statuses: Vec<UnitStatus> = report.units.iter().map(|u| u.status).collect();
        assert_eq!(
            statuses,
            vec![UnitStatus::NotExecuted, UnitStatus::Error, UnitStatus::NotExecuted]
        );
        // The whole batch rolled back: nothing committed, nothing recorded.
        assert!(session.committed.is_empty());
        assert!(ledger.applied_names().is_empty());
    }
}
