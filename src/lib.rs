//! # Drift
//!
//! Declarative, phased schema migrations for PostgreSQL.
//!
//! Drift compares a declarative description of the desired schema with an
//! introspected snapshot of the live database and computes the minimal,
//! safely-ordered set of DDL operations that transforms one into the
//! other. Changes are emitted as reversible migration artifacts bucketed
//! into expand / alter / contract phases, or applied directly with
//! transactional grouping, ledger tracking, and rollback.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use drift::prelude::*;
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
//! let plan = engine.plan(&[declared], &[snapshot], &renames)?;
//! println!("{}", plan.summary());
//! engine.generate(&plan).await?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Canonical schema model, naming, and builders.
pub mod schema {
    pub use drift_schema::*;
}

/// Diffing, changeset generation, and phased execution.
pub mod migrate {
    pub use drift_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ChangePhase, Changeset, Engine, MigrateConfig, MigrationPlan, PhasedMigrator, SqlSession,
    };
    pub use crate::schema::{
        DatabaseSnapshot, DeclaredColumn, DeclaredSchema, DeclaredTable, Renames,
    };
}

// Re-export key types at the crate root
pub use drift_migrate::{Engine, MigrateConfig};
pub use drift_schema::{DatabaseSnapshot, DeclaredSchema, Renames};
