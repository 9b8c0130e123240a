//! Error types for schema model construction.

use thiserror::Error;

/// Result type alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building the canonical model.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Two tables with the same name in one namespace.
    #[error("Duplicate table '{0}' in schema")]
    DuplicateTable(String),

    /// Two columns with the same name in one table.
    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A constraint or index references a column the table does not have.
    #[error("Table '{table}' has no column '{column}' referenced by {referrer}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Missing column name.
        column: String,
        /// The constraint or index that referenced it.
        referrer: String,
    },

    /// A foreign key references a table that is not part of the schema.
    #[error("Foreign key on '{table}' references unknown table '{referenced}'")]
    UnknownReferencedTable {
        /// Referencing table.
        table: String,
        /// Missing referenced table.
        referenced: String,
    },

    /// Two enumerated types with the same name in one namespace.
    #[error("Duplicate enum type '{0}' in schema")]
    DuplicateEnum(String),

    /// Two hashed objects in one collection normalized to the same key.
    #[error("Objects '{first}' and '{second}' on table '{table}' have identical definitions")]
    DuplicateDefinition {
        /// Table name.
        table: String,
        /// First object name.
        first: String,
        /// Second object name.
        second: String,
    },
}

impl SchemaError {
    /// Create an unknown-column error.
    pub fn unknown_column(
        table: impl Into<String>,
        column: impl Into<String>,
        referrer: impl Into<String>,
    ) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
            referrer: referrer.into(),
        }
    }

    /// Create a duplicate-column error.
    pub fn duplicate_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DuplicateColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}
