//! The canonical migration model.
//!
//! Both the declared schema and the introspected database are normalized
//! into [`SchemaMigrationInfo`] trees. The five constraint/index collections
//! on each table are keyed by a stable hash of their normalized definition
//! (see [`crate::naming`]), not by a user-assigned name, so unchanged
//! objects diff to nothing regardless of source or declaration order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The canonical model for one schema namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMigrationInfo {
    /// Namespace name, e.g. `public`.
    pub name: SmolStr,
    /// Tables keyed by table name.
    pub tables: IndexMap<SmolStr, TableMigrationInfo>,
    /// Enumerated types keyed by type name.
    pub enums: IndexMap<SmolStr, EnumInfo>,
}

impl SchemaMigrationInfo {
    /// Create an empty model for a namespace.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
            enums: IndexMap::new(),
        }
    }

    /// Check whether the namespace holds no objects.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }
}

/// One table of the canonical model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMigrationInfo {
    /// Columns keyed by column name, in declaration order.
    pub columns: IndexMap<SmolStr, ColumnInfo>,
    /// The primary key, at most one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeyInfo>,
    /// Unique constraints keyed by definition hash.
    pub unique: IndexMap<String, UniqueInfo>,
    /// Check constraints keyed by definition hash.
    pub checks: IndexMap<String, CheckInfo>,
    /// Foreign keys keyed by definition hash.
    pub foreign_keys: IndexMap<String, ForeignKeyInfo>,
    /// Indexes keyed by definition hash.
    pub indexes: IndexMap<String, IndexInfo>,
    /// Triggers keyed by definition hash.
    pub triggers: IndexMap<String, TriggerInfo>,
}

/// One column of the canonical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Canonical type rendering, e.g. `character varying(255)`.
    pub data_type: String,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Canonicalized default expression, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether the default expression is volatile (`now()`, `random()`, ...).
    #[serde(default)]
    pub default_volatile: bool,
    /// Identity column mode, if the column is an identity column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityMode>,
}

impl ColumnInfo {
    /// Create a nullable column of the given canonical type.
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            nullable: true,
            default: None,
            default_volatile: false,
            identity: None,
        }
    }

    /// Whether the column is backed by its own sequence, i.e. was declared
    /// `serial`/`bigserial` or introspected with a `nextval` default on the
    /// column's sequence.
    pub fn is_sequence_backed(&self) -> bool {
        self.default
            .as_deref()
            .is_some_and(|d| d.starts_with("nextval("))
    }
}

/// Identity column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// `GENERATED ALWAYS AS IDENTITY`.
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    ByDefault,
}

/// The primary key of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    /// Constraint name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Key columns, in key order.
    pub columns: Vec<SmolStr>,
}

/// A unique constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueInfo {
    /// Constraint name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<SmolStr>,
    /// `NULLS DISTINCT` (the PostgreSQL default) vs `NULLS NOT DISTINCT`.
    #[serde(default = "default_true")]
    pub nulls_distinct: bool,
}

/// A check constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInfo {
    /// Constraint name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Canonicalized check expression, without the outer parentheses.
    pub expression: String,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Referencing columns, paired positionally with `referenced_columns`.
    pub columns: Vec<SmolStr>,
    /// Referenced table, same namespace.
    pub referenced_table: SmolStr,
    /// Referenced columns.
    pub referenced_columns: Vec<SmolStr>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: ReferentialAction,
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// `NO ACTION` (the default).
    #[default]
    NoAction,
    /// `RESTRICT`.
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
}

impl ReferentialAction {
    /// SQL rendering of the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// An index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Indexed columns, in index order.
    pub columns: Vec<SmolStr>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Partial-index predicate, canonicalized, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    /// Index access method, e.g. `btree`.
    #[serde(default = "default_method")]
    pub method: String,
}

/// A trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Trigger name as it exists (or will exist) in the catalog.
    pub name: String,
    /// Canonicalized trigger definition body, everything after the name:
    /// `before update on __tbl__ for each row execute function touch()`.
    pub definition: String,
}

/// An enumerated type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumInfo {
    /// Labels in declared order.
    pub labels: Vec<SmolStr>,
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "btree".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_schema() {
        let info = SchemaMigrationInfo::new("public");
        assert!(info.is_empty());
        assert_eq!(info.name, "public");
    }

    #[test]
    fn test_sequence_backed_detection() {
        let mut col = ColumnInfo::new("integer");
        assert!(!col.is_sequence_backed());

        col.default = Some("nextval('users_id_seq'::regclass)".to_string());
        assert!(col.is_sequence_backed());
    }

    #[test]
    fn test_model_serializes_to_keyed_objects() {
        let mut info = SchemaMigrationInfo::new("public");
        info.tables
            .insert("users".into(), TableMigrationInfo::default());

        let value = serde_json::to_value(&info).unwrap();
        assert!(value["tables"]["users"]["columns"].is_object());
    }

    #[test]
    fn test_referential_action_sql() {
        assert_eq!(ReferentialAction::SetNull.as_sql(), "SET NULL");
        assert_eq!(ReferentialAction::default().as_sql(), "NO ACTION");
    }
}
