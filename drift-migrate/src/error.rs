//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// SQLSTATE code for a unique-constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur during migration generation and execution.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model (de)serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema model construction error.
    #[error("Schema error: {0}")]
    Schema(#[from] drift_schema::SchemaError),

    /// A diff entry matched no generator. This is an engine invariant
    /// violation, not a recoverable condition: the whole generation run
    /// fails rather than silently skipping the entry.
    #[error("No changeset generator claimed diff entry at {path}")]
    UnmatchedDiffEntry {
        /// Joined diff path.
        path: String,
    },

    /// A diff entry was claimed by more than one generator.
    #[error("Diff entry at {path} claimed by generators {first} and {second}")]
    AmbiguousDiffEntry {
        /// Joined diff path.
        path: String,
        /// First claiming generator.
        first: &'static str,
        /// Second claiming generator.
        second: &'static str,
    },

    /// A generator received a payload it could not decode.
    #[error("Generator '{generator}' could not decode diff payload at {path}: {message}")]
    InvalidPayload {
        /// Claiming generator.
        generator: &'static str,
        /// Joined diff path.
        path: String,
        /// Decode failure detail.
        message: String,
    },

    /// A statement failed against the live database. The underlying
    /// message and SQLSTATE are preserved.
    #[error("Execution error [{}]: {message}", .code.as_deref().unwrap_or("-"))]
    Execution {
        /// Database error message.
        message: String,
        /// SQLSTATE code, when the driver reports one.
        code: Option<String>,
    },

    /// The migration lock could not be acquired. Fatal to the invocation.
    #[error("Failed to acquire migration lock: {0}")]
    LockFailed(String),

    /// A migration artifact was malformed or unreadable.
    #[error("Invalid migration artifact: {0}")]
    Artifact(String),

    /// Artifact metadata (de)serialization error.
    #[error("Artifact metadata error: {0}")]
    Metadata(String),

    /// No declared counterpart for a remote namespace, or vice versa,
    /// where the caller's request requires one.
    #[error("Unknown schema namespace '{0}'")]
    UnknownNamespace(String),

    /// An enum change removed or reordered labels, which PostgreSQL cannot
    /// apply in place and this engine will not rewrite implicitly.
    #[error("Enum '{schema}.{name}' removes or reorders labels; drop and recreate it explicitly")]
    UnsupportedEnumChange {
        /// Namespace.
        schema: String,
        /// Type name.
        name: String,
    },
}

impl MigrateError {
    /// Create an execution error without a SQLSTATE.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code: None,
        }
    }

    /// Create an execution error carrying a SQLSTATE.
    pub fn execution_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Create a lock failure.
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::LockFailed(message.into())
    }

    /// Create an artifact error.
    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact(message.into())
    }

    /// Whether this is a unique-constraint violation, the one execution
    /// error the concurrent index build path treats as recoverable by
    /// cleanup.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Execution { code: Some(c), .. } if c == UNIQUE_VIOLATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display_keeps_code() {
        let err = MigrateError::execution_with_code("duplicate key value", "23505");
        let msg = err.to_string();
        assert!(msg.contains("23505"));
        assert!(msg.contains("duplicate key value"));
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(MigrateError::execution_with_code("dup", "23505").is_unique_violation());
        assert!(!MigrateError::execution_with_code("syntax", "42601").is_unique_violation());
        assert!(!MigrateError::execution("no code").is_unique_violation());
    }

    #[test]
    fn test_unmatched_entry_display() {
        let err = MigrateError::UnmatchedDiffEntry {
            path: "tables.users.columns.id".to_string(),
        };
        assert!(err.to_string().contains("tables.users.columns.id"));
    }
}
