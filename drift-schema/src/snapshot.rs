//! The introspected-database input tree.
//!
//! This is the interface consumed from the live-introspection reader: the
//! raw facts catalog queries return, one row set per table, before any
//! normalization. The migration history and lock tables are expected to be
//! filtered out by the reader.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::model::{IdentityMode, ReferentialAction};

/// An introspected snapshot of one schema namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    /// Namespace name, e.g. `public`.
    pub schema: SmolStr,
    /// Tables present in the namespace.
    pub tables: Vec<TableSnapshot>,
    /// Enumerated types present in the namespace.
    pub enums: Vec<EnumSnapshot>,
}

impl DatabaseSnapshot {
    /// Create an empty snapshot.
    pub fn new(schema: impl Into<SmolStr>) -> Self {
        Self {
            schema: schema.into(),
            tables: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Add a table.
    pub fn table(mut self, table: TableSnapshot) -> Self {
        self.tables.push(table);
        self
    }

    /// Add an enumerated type.
    pub fn enum_type(mut self, name: impl Into<SmolStr>, labels: Vec<SmolStr>) -> Self {
        self.enums.push(EnumSnapshot {
            name: name.into(),
            labels,
        });
        self
    }
}

/// One introspected table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name as it exists in the catalog.
    pub name: SmolStr,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnSnapshot>,
    /// Primary key, if any.
    pub primary_key: Option<PrimaryKeySnapshot>,
    /// Unique constraints.
    pub unique: Vec<UniqueSnapshot>,
    /// Check constraints.
    pub checks: Vec<CheckSnapshot>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    /// Indexes, excluding those backing constraints.
    pub indexes: Vec<IndexSnapshot>,
    /// Triggers.
    pub triggers: Vec<TriggerSnapshot>,
}

impl TableSnapshot {
    /// Create an empty table snapshot.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One introspected column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: SmolStr,
    /// Data type as the catalog reports it, e.g. `character varying(255)`.
    pub data_type: String,
    /// Whether the column is nullable.
    pub nullable: bool,
    /// Default expression as the catalog prints it.
    pub default: Option<String>,
    /// Identity mode, if the column is an identity column.
    pub identity: Option<IdentityMode>,
}

impl ColumnSnapshot {
    /// Create a nullable column snapshot.
    pub fn new(name: impl Into<SmolStr>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: None,
        }
    }

    /// Mark NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default expression.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// An introspected primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Key columns in key order.
    pub columns: Vec<SmolStr>,
}

/// An introspected unique constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueSnapshot {
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<SmolStr>,
    /// `NULLS DISTINCT` semantics.
    pub nulls_distinct: bool,
}

/// An introspected check constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSnapshot {
    /// Constraint name.
    pub name: String,
    /// Expression as `pg_get_expr` prints it.
    pub expression: String,
}

/// An introspected foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<SmolStr>,
    /// Referenced table.
    pub referenced_table: SmolStr,
    /// Referenced columns.
    pub referenced_columns: Vec<SmolStr>,
    /// ON DELETE action.
    pub on_delete: ReferentialAction,
    /// ON UPDATE action.
    pub on_update: ReferentialAction,
}

/// An introspected index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index name.
    pub name: String,
    /// Indexed columns in index order.
    pub columns: Vec<SmolStr>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Partial-index predicate, if any.
    pub predicate: Option<String>,
    /// Access method.
    pub method: String,
}

/// An introspected trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    /// Trigger name.
    pub name: String,
    /// Definition after the name with the table reference replaced by
    /// `__tbl__`, so it compares against declared definitions.
    pub definition: String,
}

/// An introspected enumerated type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumSnapshot {
    /// Type name.
    pub name: SmolStr,
    /// Labels in sort order.
    pub labels: Vec<SmolStr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builders() {
        let snap = DatabaseSnapshot::new("public").table(
            TableSnapshot::new("users"),
        );
        assert_eq!(snap.schema, "public");
        assert_eq!(snap.tables.len(), 1);
    }

    #[test]
    fn test_column_snapshot() {
        let col = ColumnSnapshot::new("id", "integer")
            .not_null()
            .default_expr("nextval('users_id_seq'::regclass)");
        assert!(!col.nullable);
        assert!(col.default.is_some());
    }
}
