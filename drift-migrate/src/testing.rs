//! In-process test doubles for the session and ledger seams.
//!
//! [`RecordingSession`] models the transaction semantics the executor
//! relies on: statements executed inside a transaction only become visible
//! in `committed` after a commit, and disappear on rollback. Failures are
//! scripted by substring so tests can fail an exact statement with an exact
//! SQLSTATE.

use async_trait::async_trait;

use crate::error::{MigrateError, MigrateResult};
use crate::session::SqlSession;

/// A scripted failure: the first statement containing `needle` fails with
/// the given SQLSTATE.
#[derive(Debug, Clone)]
pub struct FailureRule {
    /// Substring that triggers the failure.
    pub needle: String,
    /// SQLSTATE to report.
    pub code: Option<String>,
    /// Whether the rule keeps firing after the first match.
    pub sticky: bool,
}

/// An in-memory session that records statements instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingSession {
    /// Statements visible after commits (and autocommitted statements).
    pub committed: Vec<String>,
    /// Every statement attempted, in order, transactional or not.
    pub log: Vec<String>,
    transaction: Option<Vec<String>>,
    failures: Vec<FailureRule>,
}

impl RecordingSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first statement containing `needle` with SQLSTATE `code`.
    pub fn fail_on(mut self, needle: impl Into<String>, code: impl Into<String>) -> Self {
        self.failures.push(FailureRule {
            needle: needle.into(),
            code: Some(code.into()),
            sticky: false,
        });
        self
    }

    /// Fail every statement containing `needle`.
    pub fn always_fail_on(mut self, needle: impl Into<String>, code: impl Into<String>) -> Self {
        self.failures.push(FailureRule {
            needle: needle.into(),
            code: Some(code.into()),
            sticky: true,
        });
        self
    }

    /// Whether a committed statement contains `needle`.
    pub fn committed_contains(&self, needle: &str) -> bool {
        self.committed.iter().any(|s| s.contains(needle))
    }

    /// Whether the session is inside a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

#[async_trait]
impl SqlSession for RecordingSession {
    async fn execute(&mut self, sql: &str) -> MigrateResult<u64> {
        self.log.push(sql.to_string());

        if let Some(pos) = self.failures.iter().position(|r| sql.contains(&r.needle)) {
            let rule = if self.failures[pos].sticky {
                self.failures[pos].clone()
            } else {
                self.failures.remove(pos)
            };
            return Err(MigrateError::Execution {
                message: format!("scripted failure for: {sql}"),
                code: rule.code,
            });
        }

        match &mut self.transaction {
            Some(buffer) => buffer.push(sql.to_string()),
            None => self.committed.push(sql.to_string()),
        }
        Ok(1)
    }

    async fn query_rows(&mut self, sql: &str) -> MigrateResult<Vec<Vec<String>>> {
        self.log.push(sql.to_string());
        Ok(Vec::new())
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        if self.transaction.is_some() {
            return Err(MigrateError::execution("transaction already open"));
        }
        self.transaction = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        match self.transaction.take() {
            Some(buffer) => {
                self.committed.extend(buffer);
                Ok(())
            }
            None => Err(MigrateError::execution("no transaction to commit")),
        }
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        match self.transaction.take() {
            Some(_) => Ok(()),
            None => Err(MigrateError::execution("no transaction to roll back")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_discards_buffer() {
        let mut session = RecordingSession::new();
        session.begin().await.unwrap();
        session.execute("CREATE TABLE a ()").await.unwrap();
        session.rollback().await.unwrap();

        assert!(session.committed.is_empty());
        assert_eq!(session.log.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_publishes_buffer() {
        let mut session = RecordingSession::new();
        session.begin().await.unwrap();
        session.execute("CREATE TABLE a ()").await.unwrap();
        session.commit().await.unwrap();

        assert!(session.committed_contains("CREATE TABLE a"));
    }

    #[tokio::test]
    async fn test_scripted_failure_carries_code() {
        let mut session = RecordingSession::new().fail_on("CREATE UNIQUE INDEX", "23505");
        let err = session
            .execute("CREATE UNIQUE INDEX CONCURRENTLY x ON t (c)")
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
