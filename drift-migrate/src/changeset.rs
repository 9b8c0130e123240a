//! Changesets: the unit of migration work.
//!
//! A changeset pairs reversible `up`/`down` statement groups with the
//! ordering metadata the sorter and executor need: a strictly-ordered
//! priority, a deploy phase, and whether the statements may run inside a
//! transaction. Safety warnings attach at generation time and never change
//! afterwards.

use serde::{Deserialize, Serialize};

/// Deploy phase of a changeset.
///
/// Expand changes are additive and safe to apply before new application
/// code ships; alter changes rewrite in place; contract changes are
/// destructive and safe only after old code is retired. Phases bucket the
/// output into separate migration batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePhase {
    /// Additive changes.
    Expand,
    /// In-place changes.
    Alter,
    /// Destructive changes.
    Contract,
}

impl ChangePhase {
    /// All phases in apply order.
    pub const ALL: [ChangePhase; 3] = [Self::Expand, Self::Alter, Self::Contract];

    /// Directory / ledger segment name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Alter => "alter",
            Self::Contract => "contract",
        }
    }
}

/// Cross-type execution priority; lower runs first.
///
/// The discriminants are an internal total order, not a contract: creation
/// runs in dependency order, renames run after all creation so earlier
/// changesets can address objects by their live names, and drops run in
/// reverse dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePriority {
    /// Schema namespace creation.
    CreateSchema = 10,
    /// Enumerated type creation.
    CreateEnum = 20,
    /// Enumerated type label addition.
    ChangeEnum = 25,
    /// Table creation.
    CreateTable = 30,
    /// Column creation.
    CreateColumn = 40,
    /// In-place column changes.
    ChangeColumn = 45,
    /// Primary key attachment.
    CreatePrimaryKey = 50,
    /// Index creation.
    CreateIndex = 60,
    /// Unique constraint creation (index build and attachment).
    CreateUnique = 70,
    /// Foreign key creation.
    CreateForeignKey = 80,
    /// Check constraint creation.
    CreateCheck = 90,
    /// Trigger creation.
    CreateTrigger = 100,
    /// Table renames.
    RenameTable = 110,
    /// Column renames.
    RenameColumn = 120,
    /// Generated constraint/index renames.
    RenameConstraint = 130,
    /// Trigger drops.
    DropTrigger = 140,
    /// Check constraint drops.
    DropCheck = 150,
    /// Foreign key drops.
    DropForeignKey = 160,
    /// Unique constraint drops.
    DropUnique = 170,
    /// Index drops.
    DropIndex = 180,
    /// Primary key drops.
    DropPrimaryKey = 190,
    /// Column drops.
    DropColumn = 200,
    /// Table drops.
    DropTable = 210,
    /// Enumerated type drops.
    DropEnum = 220,
    /// Schema namespace drops.
    DropSchema = 230,
}

/// Operation kind of a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangesetKind {
    /// `CREATE SCHEMA`.
    CreateSchema,
    /// `DROP SCHEMA`.
    DropSchema,
    /// `CREATE TYPE ... AS ENUM`.
    CreateEnum,
    /// `ALTER TYPE ... ADD VALUE`.
    ChangeEnum,
    /// `DROP TYPE`.
    DropEnum,
    /// `CREATE TABLE` with its absorbed constraints.
    CreateTable,
    /// `DROP TABLE`.
    DropTable,
    /// `ALTER TABLE ... RENAME TO`.
    RenameTable,
    /// Plain column addition.
    CreateColumn,
    /// Non-nullable column addition via the add/default/set-not-null steps.
    CreateNonNullableColumn,
    /// Column drop.
    DropColumn,
    /// `ALTER TABLE ... RENAME COLUMN`.
    RenameColumn,
    /// Column data type change.
    ChangeColumnType,
    /// Column nullability change.
    ChangeColumnNullable,
    /// Column default change.
    ChangeColumnDefault,
    /// Column identity change.
    ChangeColumnIdentity,
    /// Primary key attachment.
    CreatePrimaryKey,
    /// Primary key drop.
    DropPrimaryKey,
    /// Primary key constraint rename.
    RenamePrimaryKey,
    /// Index creation.
    CreateIndex,
    /// Index drop.
    DropIndex,
    /// Index rename.
    RenameIndex,
    /// Concurrent unique index build backing a unique constraint.
    CreateUniqueIndex,
    /// Attachment of a unique constraint to its prebuilt index.
    AttachUniqueConstraint,
    /// Unique constraint drop.
    DropUnique,
    /// Unique constraint rename.
    RenameUnique,
    /// Foreign key creation.
    CreateForeignKey,
    /// Foreign key drop.
    DropForeignKey,
    /// Foreign key rename.
    RenameForeignKey,
    /// Check constraint creation.
    CreateCheck,
    /// Check constraint drop.
    DropCheck,
    /// Check constraint rename.
    RenameCheck,
    /// Trigger creation.
    CreateTrigger,
    /// Trigger drop.
    DropTrigger,
    /// Trigger rename.
    RenameTrigger,
}

impl ChangesetKind {
    /// The priority tier this kind executes in.
    pub fn priority(&self) -> ChangePriority {
        match self {
            Self::CreateSchema => ChangePriority::CreateSchema,
            Self::CreateEnum => ChangePriority::CreateEnum,
            Self::ChangeEnum => ChangePriority::ChangeEnum,
            Self::CreateTable => ChangePriority::CreateTable,
            Self::CreateColumn | Self::CreateNonNullableColumn => ChangePriority::CreateColumn,
            Self::ChangeColumnType
            | Self::ChangeColumnNullable
            | Self::ChangeColumnDefault
            | Self::ChangeColumnIdentity => ChangePriority::ChangeColumn,
            Self::CreatePrimaryKey => ChangePriority::CreatePrimaryKey,
            Self::CreateIndex => ChangePriority::CreateIndex,
            Self::CreateUniqueIndex | Self::AttachUniqueConstraint => ChangePriority::CreateUnique,
            Self::CreateForeignKey => ChangePriority::CreateForeignKey,
            Self::CreateCheck => ChangePriority::CreateCheck,
            Self::CreateTrigger => ChangePriority::CreateTrigger,
            Self::RenameTable => ChangePriority::RenameTable,
            Self::RenameColumn => ChangePriority::RenameColumn,
            Self::RenamePrimaryKey
            | Self::RenameIndex
            | Self::RenameUnique
            | Self::RenameForeignKey
            | Self::RenameCheck
            | Self::RenameTrigger => ChangePriority::RenameConstraint,
            Self::DropTrigger => ChangePriority::DropTrigger,
            Self::DropCheck => ChangePriority::DropCheck,
            Self::DropForeignKey => ChangePriority::DropForeignKey,
            Self::DropUnique => ChangePriority::DropUnique,
            Self::DropIndex => ChangePriority::DropIndex,
            Self::DropPrimaryKey => ChangePriority::DropPrimaryKey,
            Self::DropColumn => ChangePriority::DropColumn,
            Self::DropTable => ChangePriority::DropTable,
            Self::DropEnum => ChangePriority::DropEnum,
            Self::DropSchema => ChangePriority::DropSchema,
        }
    }

    /// The deploy phase this kind belongs to.
    pub fn phase(&self) -> ChangePhase {
        match self {
            Self::CreateSchema
            | Self::CreateEnum
            | Self::ChangeEnum
            | Self::CreateTable
            | Self::CreateColumn
            | Self::CreateNonNullableColumn
            | Self::CreatePrimaryKey
            | Self::CreateIndex
            | Self::CreateUniqueIndex
            | Self::AttachUniqueConstraint
            | Self::CreateForeignKey
            | Self::CreateCheck
            | Self::CreateTrigger => ChangePhase::Expand,
            Self::RenameTable
            | Self::RenameColumn
            | Self::RenamePrimaryKey
            | Self::RenameIndex
            | Self::RenameUnique
            | Self::RenameForeignKey
            | Self::RenameCheck
            | Self::RenameTrigger
            | Self::ChangeColumnType
            | Self::ChangeColumnNullable
            | Self::ChangeColumnDefault
            | Self::ChangeColumnIdentity => ChangePhase::Alter,
            Self::DropSchema
            | Self::DropEnum
            | Self::DropTable
            | Self::DropColumn
            | Self::DropPrimaryKey
            | Self::DropIndex
            | Self::DropUnique
            | Self::DropForeignKey
            | Self::DropCheck
            | Self::DropTrigger => ChangePhase::Contract,
        }
    }

    /// Snake-case label for display and artifact slugs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSchema => "create_schema",
            Self::DropSchema => "drop_schema",
            Self::CreateEnum => "create_enum",
            Self::ChangeEnum => "change_enum",
            Self::DropEnum => "drop_enum",
            Self::CreateTable => "create_table",
            Self::DropTable => "drop_table",
            Self::RenameTable => "rename_table",
            Self::CreateColumn => "create_column",
            Self::CreateNonNullableColumn => "create_non_nullable_column",
            Self::DropColumn => "drop_column",
            Self::RenameColumn => "rename_column",
            Self::ChangeColumnType => "change_column_type",
            Self::ChangeColumnNullable => "change_column_nullable",
            Self::ChangeColumnDefault => "change_column_default",
            Self::ChangeColumnIdentity => "change_column_identity",
            Self::CreatePrimaryKey => "create_primary_key",
            Self::DropPrimaryKey => "drop_primary_key",
            Self::RenamePrimaryKey => "rename_primary_key",
            Self::CreateIndex => "create_index",
            Self::DropIndex => "drop_index",
            Self::RenameIndex => "rename_index",
            Self::CreateUniqueIndex => "create_unique_index",
            Self::AttachUniqueConstraint => "attach_unique_constraint",
            Self::DropUnique => "drop_unique",
            Self::RenameUnique => "rename_unique",
            Self::CreateForeignKey => "create_foreign_key",
            Self::DropForeignKey => "drop_foreign_key",
            Self::RenameForeignKey => "rename_foreign_key",
            Self::CreateCheck => "create_check",
            Self::DropCheck => "drop_check",
            Self::RenameCheck => "rename_check",
            Self::CreateTrigger => "create_trigger",
            Self::DropTrigger => "drop_trigger",
            Self::RenameTrigger => "rename_trigger",
        }
    }
}

/// Severity class of a change warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Data is irrecoverably removed.
    Destructive,
    /// The change takes locks or rewrites that block concurrent work.
    Blocking,
    /// The change can fail against existing data.
    MightFail,
}

/// Machine-readable warning code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// A schema namespace is dropped.
    SchemaDrop,
    /// A table is dropped.
    TableDrop,
    /// A column is dropped.
    ColumnDrop,
    /// A column's data type changes in a way not proven lossless.
    ChangeColumnType,
    /// A sequence-backed (`serial`) column is added to an existing table.
    AddSerialColumn,
    /// A column with a volatile default is added to an existing table.
    AddVolatileDefault,
    /// A non-nullable column without a default is added to an existing
    /// table.
    AddNonNullableColumn,
    /// An existing column becomes NOT NULL.
    SetColumnNotNull,
    /// A primary key is attached to an existing table.
    AddPrimaryKeyToExistingTable,
    /// A unique constraint is attached to an existing table.
    AddUniqueToExistingTable,
    /// A check constraint is attached to an existing table.
    AddCheckToExistingTable,
    /// A foreign key is attached to an existing table.
    AddForeignKeyToExistingTable,
}

/// A warning attached to a changeset at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeWarning {
    /// Severity class.
    pub kind: WarningKind,
    /// Machine-readable code.
    pub code: WarningCode,
    /// Schema namespace.
    pub schema: String,
    /// Affected table.
    pub table: String,
    /// Affected column, when column-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Old value for change warnings, e.g. the previous type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// New value for change warnings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl ChangeWarning {
    /// Create a table-scoped warning.
    pub fn table(
        kind: WarningKind,
        code: WarningCode,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            schema: schema.into(),
            table: table.into(),
            column: None,
            from: None,
            to: None,
        }
    }

    /// Create a column-scoped warning.
    pub fn column(
        kind: WarningKind,
        code: WarningCode,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            column: Some(column.into()),
            ..Self::table(kind, code, schema, table)
        }
    }

    /// Attach old/new values.
    pub fn with_change(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }
}

/// An ordered list of statements executed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementGroup {
    /// Statements in execution order.
    pub statements: Vec<String>,
    /// Cleanup statements run if a unique-constraint violation occurs while
    /// executing this group; the original error is re-raised afterwards.
    /// Used by concurrent index builds to drop the half-built index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_unique_violation: Vec<String>,
}

impl StatementGroup {
    /// Create a group from statements.
    pub fn new(statements: Vec<String>) -> Self {
        Self {
            statements,
            on_unique_violation: Vec::new(),
        }
    }

    /// Create a single-statement group.
    pub fn single(statement: impl Into<String>) -> Self {
        Self::new(vec![statement.into()])
    }

    /// Attach unique-violation cleanup statements.
    pub fn with_unique_violation_cleanup(mut self, statements: Vec<String>) -> Self {
        self.on_unique_violation = statements;
        self
    }
}

/// One reversible unit of migration work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Operation kind.
    pub kind: ChangesetKind,
    /// Execution priority; lower runs first.
    pub priority: ChangePriority,
    /// Deploy phase.
    pub phase: ChangePhase,
    /// Schema namespace.
    pub schema_name: String,
    /// Table the statements address (the live name at execution time).
    pub table_name: String,
    /// Post-rename table name, used for display and warnings.
    pub current_table_name: String,
    /// Statement groups applying the change.
    pub up: Vec<StatementGroup>,
    /// Statement groups reversing the change. Empty where no reverse
    /// exists; such kinds are documented irreversible.
    pub down: Vec<StatementGroup>,
    /// Whether the statements may run inside a transaction. False for
    /// operations the database forbids in one, e.g. concurrent index
    /// builds.
    pub transactional: bool,
    /// Warnings attached at generation time.
    pub warnings: Vec<ChangeWarning>,
}

impl Changeset {
    /// Create a changeset of the given kind; priority and phase derive from
    /// the kind.
    pub fn new(
        kind: ChangesetKind,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            kind,
            priority: kind.priority(),
            phase: kind.phase(),
            schema_name: schema_name.into(),
            current_table_name: table_name.clone(),
            table_name,
            up: Vec::new(),
            down: Vec::new(),
            transactional: true,
            warnings: Vec::new(),
        }
    }

    /// Set the post-rename display name.
    pub fn current_table(mut self, name: impl Into<String>) -> Self {
        self.current_table_name = name.into();
        self
    }

    /// Set the up statement groups.
    pub fn up(mut self, groups: Vec<StatementGroup>) -> Self {
        self.up = groups;
        self
    }

    /// Set the down statement groups.
    pub fn down(mut self, groups: Vec<StatementGroup>) -> Self {
        self.down = groups;
        self
    }

    /// Mark the changeset non-transactional.
    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Attach a warning.
    pub fn warn(mut self, warning: ChangeWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// All up statements flattened, for display and tests.
    pub fn up_statements(&self) -> Vec<&str> {
        self.up
            .iter()
            .flat_map(|g| g.statements.iter().map(String::as_str))
            .collect()
    }

    /// All down statements flattened, for display and tests.
    pub fn down_statements(&self) -> Vec<&str> {
        self.down
            .iter()
            .flat_map(|g| g.statements.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_total_order() {
        assert!(ChangePriority::CreateSchema < ChangePriority::CreateTable);
        assert!(ChangePriority::CreateTable < ChangePriority::CreateForeignKey);
        assert!(ChangePriority::CreateTrigger < ChangePriority::RenameTable);
        assert!(ChangePriority::RenameConstraint < ChangePriority::DropTrigger);
        assert!(ChangePriority::DropColumn < ChangePriority::DropTable);
        assert!(ChangePriority::DropTable < ChangePriority::DropSchema);
    }

    #[test]
    fn test_phase_partition() {
        assert_eq!(ChangesetKind::CreateColumn.phase(), ChangePhase::Expand);
        assert_eq!(ChangesetKind::ChangeColumnType.phase(), ChangePhase::Alter);
        assert_eq!(ChangesetKind::DropColumn.phase(), ChangePhase::Contract);
        assert_eq!(ChangesetKind::RenameTable.phase(), ChangePhase::Alter);
    }

    #[test]
    fn test_changeset_builder_defaults() {
        let cs = Changeset::new(ChangesetKind::CreateColumn, "public", "users");
        assert!(cs.transactional);
        assert_eq!(cs.priority, ChangePriority::CreateColumn);
        assert_eq!(cs.phase, ChangePhase::Expand);
        assert_eq!(cs.current_table_name, "users");
    }

    #[test]
    fn test_drop_priorities_reverse_creation() {
        // Drops run in reverse dependency order of the creates.
        assert!(ChangePriority::DropTrigger < ChangePriority::DropCheck);
        assert!(ChangePriority::DropCheck < ChangePriority::DropForeignKey);
        assert!(ChangePriority::DropForeignKey < ChangePriority::DropIndex);
        assert!(ChangePriority::DropIndex < ChangePriority::DropColumn);
    }
}
