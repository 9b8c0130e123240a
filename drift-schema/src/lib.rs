//! # drift-schema
//!
//! Canonical schema model for the Drift migration engine.
//!
//! This crate provides:
//! - The canonical, hash-keyed migration model ([`SchemaMigrationInfo`])
//!   that both the declared schema and the introspected database are
//!   normalized into before diffing
//! - Model builders for the two sources ([`build_declared`],
//!   [`build_snapshot`])
//! - The deterministic naming/hashing scheme for generated constraints and
//!   indexes ([`naming`])
//! - PostgreSQL type-spec parsing and canonical rendering ([`types`])
//!
//! Two semantically-equal schemas always build into trees that diff to
//! nothing: collections are keyed by a hash of their normalized definition,
//! and the normalization substitutes placeholder names so declaration order
//! and confirmed renames never perturb the keys.
//!
//! ## Example
//!
//! ```rust,ignore
//! use drift_schema::{build_declared, DeclaredSchema, DeclaredTable, DeclaredColumn};
//!
//! let schema = DeclaredSchema::new("public").table(
//!     DeclaredTable::new("users")
//!         .column(DeclaredColumn::new("id", "bigint").identity_always())
//!         .column(DeclaredColumn::new("email", "text"))
//!         .primary_key(["id"]),
//! );
//! let local = build_declared(&schema)?;
//! ```

pub mod builder;
pub mod declared;
pub mod error;
pub mod model;
pub mod naming;
pub mod rename;
pub mod snapshot;
pub mod types;

pub use builder::{build_declared, build_snapshot};
pub use declared::{
    DeclaredCheck, DeclaredColumn, DeclaredEnum, DeclaredForeignKey, DeclaredIndex,
    DeclaredSchema, DeclaredTable, DeclaredTrigger, DeclaredUnique,
};
pub use error::{SchemaError, SchemaResult};
pub use model::{
    CheckInfo, ColumnInfo, EnumInfo, ForeignKeyInfo, IdentityMode, IndexInfo, PrimaryKeyInfo,
    ReferentialAction, SchemaMigrationInfo, TableMigrationInfo, TriggerInfo, UniqueInfo,
};
pub use naming::{NameSuffix, definition_hash, generated_name};
pub use rename::{ColumnRename, RenameKind, Renames, TableRename};
pub use snapshot::{
    CheckSnapshot, ColumnSnapshot, DatabaseSnapshot, EnumSnapshot, ForeignKeySnapshot,
    IndexSnapshot, PrimaryKeySnapshot, TableSnapshot, TriggerSnapshot, UniqueSnapshot,
};
pub use types::{TypeSpec, canonical_type, parse_type};
