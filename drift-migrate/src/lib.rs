//! # drift-migrate
//!
//! Migration engine for Drift.
//!
//! This crate provides functionality for:
//! - Structural diffing between the declared schema and the live database
//! - Rename correlation, so confirmed renames become `ALTER ... RENAME`
//!   instead of drop/create pairs
//! - Changeset generation with safety warnings (destructive, blocking,
//!   might-fail) and lock-minimizing DDL patterns
//! - Priority and phase ordering (expand / alter / contract)
//! - Migration artifacts on disk, one reversible unit per directory
//! - Phased execution with transaction grouping, a per-phase ledger and
//!   lock, and full-batch rollback on failure
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ Canonical      │──▶│ Diff Engine │──▶│ Changeset        │
//! │ Models (x2)    │   └─────────────┘   │ Generators       │
//! └────────────────┘          ▲          └──────────────────┘
//!         ▲                   │                   │
//!   renames threaded    rename-mapped            ▼
//!   through context       remote tree    ┌──────────────────┐
//!                                        │ Priority & Phase │
//!                                        │ Sorter           │
//!                                        └──────────────────┘
//!                                                 │
//!                            ┌────────────────────┴───────┐
//!                            ▼                            ▼
//!                  ┌──────────────────┐         ┌──────────────────┐
//!                  │ Artifacts (disk) │         │ Phased Migrator  │
//!                  └──────────────────┘         └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use drift_migrate::{Engine, MigrateConfig};
//! use drift_schema::{DeclaredColumn, DeclaredSchema, DeclaredTable, Renames};
//!
//! let engine = Engine::new(MigrateConfig::new().migrations_dir("./migrations"));
//!
//! let declared = DeclaredSchema::new("public").table(
//!     DeclaredTable::new("users")
//!         .column(DeclaredColumn::new("id", "bigint").identity_always())
//!         .column(DeclaredColumn::new("email", "text").not_null())
//!         .primary_key(["id"]),
//! );
//!
//! let renames = engine.load_renames().await?;
//! let plan = engine.plan(&[declared], &[introspected], &renames)?;
//! println!("{}", plan.summary());
//! engine.generate(&plan).await?;
//! ```

pub mod artifact;
pub mod changeset;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod generators;
pub mod ledger;
pub mod rename;
pub mod safety;
pub mod session;
pub mod sort;
pub mod statements;
pub mod summary;
pub mod testing;

pub use artifact::{ArtifactMetadata, ArtifactWriter, MigrationSource};
pub use changeset::{
    ChangePhase, ChangePriority, ChangeWarning, Changeset, ChangesetKind, StatementGroup,
    WarningCode, WarningKind,
};
pub use diff::{DiffEntry, DiffKind, diff};
pub use engine::{Engine, MigrateConfig, MigrationPlan, PhaseOutcome};
pub use error::{MigrateError, MigrateResult, UNIQUE_VIOLATION};
pub use executor::{MigrationReport, MigrationUnit, PhasedMigrator, UnitReport, UnitStatus};
pub use generators::{GeneratorContext, generate_changesets, rename_changesets};
pub use ledger::{MemoryLedger, MigrationLedger, PostgresLedger};
pub use rename::{RenameCandidate, RenameRecord, RenameState, confirm, correlate};
pub use safety::is_safe_change;
pub use session::SqlSession;
pub use sort::{dependency_order, sort_changesets};
pub use statements::{ColumnDef, DdlStatement};
pub use summary::summarize;
pub use testing::RecordingSession;
