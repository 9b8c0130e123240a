//! Applied-migration ledger and run lock.
//!
//! One ledger/lock table pair exists per phase, so the expand, alter, and
//! contract batches track independently. The ledger answers "has unit X
//! been applied?", making re-runs idempotent, and the lock table is the
//! mutual-exclusion gate between concurrent invocations: an invocation
//! that cannot take the lock fails fast.
//!
//! Ledger writes go through the same session the migrator executes on, so
//! a rolled-back transactional batch also rolls back its ledger rows.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::changeset::ChangePhase;
use crate::error::{MigrateError, MigrateResult};
use crate::session::SqlSession;

/// The applied-migration ledger for one phase.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Create the ledger and lock tables if missing.
    async fn ensure_ready(&self, session: &mut dyn SqlSession) -> MigrateResult<()>;

    /// Names of applied units, in application order.
    async fn applied(&self, session: &mut dyn SqlSession) -> MigrateResult<Vec<String>>;

    /// Record a unit as applied.
    async fn record_applied(
        &self,
        session: &mut dyn SqlSession,
        name: &str,
        duration_ms: i64,
    ) -> MigrateResult<()>;

    /// Remove a unit's record after a revert.
    async fn remove(&self, session: &mut dyn SqlSession, name: &str) -> MigrateResult<()>;

    /// Take the exclusive run lock. Fails with
    /// [`MigrateError::LockFailed`] when another invocation holds it.
    async fn acquire_lock(&self, session: &mut dyn SqlSession) -> MigrateResult<()>;

    /// Release the run lock.
    async fn release_lock(&self, session: &mut dyn SqlSession) -> MigrateResult<()>;
}

/// SQL-backed ledger over per-phase tables.
pub struct PostgresLedger {
    phase: ChangePhase,
}

impl PostgresLedger {
    /// Create the ledger for a phase.
    pub fn new(phase: ChangePhase) -> Self {
        Self { phase }
    }

    /// History table name for this phase.
    pub fn history_table(&self) -> String {
        format!("_drift_migrations_{}", self.phase.as_str())
    }

    /// Lock table name for this phase.
    pub fn lock_table(&self) -> String {
        format!("_drift_migrations_{}_lock", self.phase.as_str())
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl MigrationLedger for PostgresLedger {
    async fn ensure_ready(&self, session: &mut dyn SqlSession) -> MigrateResult<()> {
        let history = self.history_table();
        let lock = self.lock_table();

        session
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS \"{history}\" (\n    \
                 name VARCHAR(255) PRIMARY KEY,\n    \
                 applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),\n    \
                 duration_ms BIGINT NOT NULL DEFAULT 0\n)"
            ))
            .await?;
        session
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS \"{lock}\" (\n    \
                 id INTEGER PRIMARY KEY,\n    \
                 locked BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                 locked_at TIMESTAMP WITH TIME ZONE\n)"
            ))
            .await?;
        session
            .execute(&format!(
                "INSERT INTO \"{lock}\" (id, locked) VALUES (1, FALSE) ON CONFLICT (id) DO NOTHING"
            ))
            .await?;
        Ok(())
    }

    async fn applied(&self, session: &mut dyn SqlSession) -> MigrateResult<Vec<String>> {
        let rows = session
            .query_rows(&format!(
                "SELECT name FROM \"{}\" ORDER BY name",
                self.history_table()
            ))
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.into_iter().next()).collect())
    }

    async fn record_applied(
        &self,
        session: &mut dyn SqlSession,
        name: &str,
        duration_ms: i64,
    ) -> MigrateResult<()> {
        session
            .execute(&format!(
                "INSERT INTO \"{}\" (name, duration_ms) VALUES ({}, {})",
                self.history_table(),
                quote_literal(name),
                duration_ms
            ))
            .await?;
        Ok(())
    }

    async fn remove(&self, session: &mut dyn SqlSession, name: &str) -> MigrateResult<()> {
        session
            .execute(&format!(
                "DELETE FROM \"{}\" WHERE name = {}",
                self.history_table(),
                quote_literal(name)
            ))
            .await?;
        Ok(())
    }

    async fn acquire_lock(&self, session: &mut dyn SqlSession) -> MigrateResult<()> {
        let affected = session
            .execute(&format!(
                "UPDATE \"{}\" SET locked = TRUE, locked_at = NOW() WHERE id = 1 AND locked = FALSE",
                self.lock_table()
            ))
            .await?;
        if affected == 1 {
            Ok(())
        } else {
            Err(MigrateError::lock_failed(format!(
                "another migration run holds the {} lock",
                self.phase.as_str()
            )))
        }
    }

    async fn release_lock(&self, session: &mut dyn SqlSession) -> MigrateResult<()> {
        session
            .execute(&format!(
                "UPDATE \"{}\" SET locked = FALSE, locked_at = NULL WHERE id = 1",
                self.lock_table()
            ))
            .await?;
        Ok(())
    }
}

/// In-process ledger for tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    applied: Mutex<Vec<String>>,
    locked: Mutex<bool>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that already holds its lock, for contention tests.
    pub fn locked() -> Self {
        let ledger = Self::default();
        *ledger.locked.lock() = true;
        ledger
    }

    /// Mark a unit as applied out-of-band.
    pub fn seed_applied(&self, name: impl Into<String>) {
        self.applied.lock().push(name.into());
    }

    /// Applied unit names.
    pub fn applied_names(&self) -> Vec<String> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl MigrationLedger for MemoryLedger {
    async fn ensure_ready(&self, _session: &mut dyn SqlSession) -> MigrateResult<()> {
        Ok(())
    }

    async fn applied(&self, _session: &mut dyn SqlSession) -> MigrateResult<Vec<String>> {
        Ok(self.applied.lock().clone())
    }

    async fn record_applied(
        &self,
        _session: &mut dyn SqlSession,
        name: &str,
        _duration_ms: i64,
    ) -> MigrateResult<()> {
        self.applied.lock().push(name.to_string());
        Ok(())
    }

    async fn remove(&self, _session: &mut dyn SqlSession, name: &str) -> MigrateResult<()> {
        self.applied.lock().retain(|n| n != name);
        Ok(())
    }

    async fn acquire_lock(&self, _session: &mut dyn SqlSession) -> MigrateResult<()> {
        let mut locked = self.locked.lock();
        if *locked {
            return Err(MigrateError::lock_failed(
                "another migration run holds the lock",
            ));
        }
        *locked = true;
        Ok(())
    }

    async fn release_lock(&self, _session: &mut dyn SqlSession) -> MigrateResult<()> {
        *self.locked.lock() = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;

    #[test]
    fn test_table_names_per_phase() {
        let ledger = PostgresLedger::new(ChangePhase::Contract);
        assert_eq!(ledger.history_table(), "_drift_migrations_contract");
        assert_eq!(ledger.lock_table(), "_drift_migrations_contract_lock");
    }

    #[tokio::test]
    async fn test_postgres_ledger_lock_round_trip() {
        let ledger = PostgresLedger::new(ChangePhase::Expand);
        let mut session = RecordingSession::new();

        ledger.ensure_ready(&mut session).await.unwrap();
        ledger.acquire_lock(&mut session).await.unwrap();
        ledger.release_lock(&mut session).await.unwrap();

        assert!(session.committed_contains("CREATE TABLE IF NOT EXISTS \"_drift_migrations_expand\""));
        assert!(session.committed_contains("SET locked = TRUE"));
        assert!(session.committed_contains("SET locked = FALSE"));
    }

    #[tokio::test]
    async fn test_memory_ledger_contention() {
        let ledger = MemoryLedger::locked();
        let mut session = RecordingSession::new();
        let err = ledger.acquire_lock(&mut session).await.unwrap_err();
        assert!(matches!(err, MigrateError::LockFailed(_)));
    }
}
