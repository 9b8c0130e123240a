//! The database session seam.
//!
//! The executor and ledger speak to the database through [`SqlSession`]
//! only; any driver that can execute a statement and control a transaction
//! can back it. Implementations must surface the SQLSTATE of failed
//! statements through [`MigrateError::Execution`] — the executor's
//! unique-violation handling for concurrent index builds depends on it.
//!
//! [`MigrateError::Execution`]: crate::error::MigrateError::Execution

use async_trait::async_trait;

use crate::error::MigrateResult;

/// A single database session with transaction control.
#[async_trait]
pub trait SqlSession: Send {
    /// Execute one statement, returning the affected row count.
    async fn execute(&mut self, sql: &str) -> MigrateResult<u64>;

    /// Query rows of string columns. Used by the SQL-backed ledger.
    async fn query_rows(&mut self, sql: &str) -> MigrateResult<Vec<Vec<String>>>;

    /// Begin a transaction.
    async fn begin(&mut self) -> MigrateResult<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> MigrateResult<()>;
}
