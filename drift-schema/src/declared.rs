//! The declared-schema input tree.
//!
//! This is the interface consumed from the schema-definition surface: a
//! plain-data description of the desired schema, as produced by whatever
//! builder API or file format sits in front of the engine. The constructors
//! here exist so tests and callers can assemble trees by hand; they are not
//! a schema-definition DSL.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::model::{IdentityMode, ReferentialAction};

/// A declared schema namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredSchema {
    /// Namespace name, e.g. `public`.
    pub name: SmolStr,
    /// Declared tables.
    pub tables: Vec<DeclaredTable>,
    /// Declared enumerated types.
    pub enums: Vec<DeclaredEnum>,
}

impl DeclaredSchema {
    /// Create an empty declared schema.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Add a table.
    pub fn table(mut self, table: DeclaredTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Add an enumerated type.
    pub fn enum_type(mut self, decl: DeclaredEnum) -> Self {
        self.enums.push(decl);
        self
    }
}

/// A declared table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTable {
    /// Table name.
    pub name: SmolStr,
    /// Columns in declaration order.
    pub columns: Vec<DeclaredColumn>,
    /// Primary key columns, if any.
    pub primary_key: Option<Vec<SmolStr>>,
    /// Unique constraints.
    pub unique: Vec<DeclaredUnique>,
    /// Check constraints.
    pub checks: Vec<DeclaredCheck>,
    /// Foreign keys.
    pub foreign_keys: Vec<DeclaredForeignKey>,
    /// Indexes.
    pub indexes: Vec<DeclaredIndex>,
    /// Triggers.
    pub triggers: Vec<DeclaredTrigger>,
}

impl DeclaredTable {
    /// Create an empty table declaration.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a column.
    pub fn column(mut self, column: DeclaredColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a unique constraint.
    pub fn unique(mut self, unique: DeclaredUnique) -> Self {
        self.unique.push(unique);
        self
    }

    /// Add a check constraint.
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.checks.push(DeclaredCheck {
            expression: expression.into(),
        });
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, fk: DeclaredForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Add an index.
    pub fn index(mut self, index: DeclaredIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a trigger.
    pub fn trigger(mut self, trigger: DeclaredTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredColumn {
    /// Column name.
    pub name: SmolStr,
    /// Type as written, e.g. `varchar(255)`, `serial`, `timestamptz`.
    pub data_type: String,
    /// Whether NULL is accepted. Defaults to true.
    pub nullable: bool,
    /// Default expression as written, if any.
    pub default: Option<String>,
    /// Identity column mode.
    pub identity: Option<IdentityMode>,
}

impl DeclaredColumn {
    /// Create a nullable column.
    pub fn new(name: impl Into<SmolStr>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default expression.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Mark as `GENERATED ALWAYS AS IDENTITY`.
    pub fn identity_always(mut self) -> Self {
        self.identity = Some(IdentityMode::Always);
        self.nullable = false;
        self
    }

    /// Mark as `GENERATED BY DEFAULT AS IDENTITY`.
    pub fn identity_by_default(mut self) -> Self {
        self.identity = Some(IdentityMode::ByDefault);
        self.nullable = false;
        self
    }
}

/// A declared unique constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredUnique {
    /// Constrained columns.
    pub columns: Vec<SmolStr>,
    /// `NULLS DISTINCT` semantics; defaults to true.
    pub nulls_distinct: bool,
}

impl DeclaredUnique {
    /// Create a unique constraint over the given columns.
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            nulls_distinct: true,
        }
    }

    /// Use `NULLS NOT DISTINCT`.
    pub fn nulls_not_distinct(mut self) -> Self {
        self.nulls_distinct = false;
        self
    }
}

/// A declared check constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredCheck {
    /// Check expression, without the outer parentheses.
    pub expression: String,
}

/// A declared foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredForeignKey {
    /// Referencing columns.
    pub columns: Vec<SmolStr>,
    /// Referenced table in the same namespace.
    pub referenced_table: SmolStr,
    /// Referenced columns.
    pub referenced_columns: Vec<SmolStr>,
    /// ON DELETE action.
    pub on_delete: ReferentialAction,
    /// ON UPDATE action.
    pub on_update: ReferentialAction,
}

impl DeclaredForeignKey {
    /// Create a foreign key referencing `table (columns)`.
    pub fn new<I, S>(columns: I, table: impl Into<SmolStr>, referenced: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: table.into(),
            referenced_columns: referenced.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    /// Set the ON DELETE action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the ON UPDATE action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

/// A declared index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredIndex {
    /// Indexed columns, in index order.
    pub columns: Vec<SmolStr>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Partial-index predicate, if any.
    pub predicate: Option<String>,
    /// Index access method; defaults to `btree`.
    pub method: String,
}

impl DeclaredIndex {
    /// Create a btree index over the given columns.
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            predicate: None,
            method: "btree".to_string(),
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set a partial-index predicate.
    pub fn predicate(mut self, expr: impl Into<String>) -> Self {
        self.predicate = Some(expr.into());
        self
    }

    /// Set the access method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// A declared trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTrigger {
    /// Trigger definition after the name, with `__tbl__` standing in for
    /// the table reference, e.g.
    /// `before update on __tbl__ for each row execute function touch_updated_at()`.
    pub definition: String,
}

impl DeclaredTrigger {
    /// Create a trigger from its definition body.
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

/// A declared enumerated type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredEnum {
    /// Type name.
    pub name: SmolStr,
    /// Labels in order.
    pub labels: Vec<SmolStr>,
}

impl DeclaredEnum {
    /// Create an enumerated type.
    pub fn new<I, S>(name: impl Into<SmolStr>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}
