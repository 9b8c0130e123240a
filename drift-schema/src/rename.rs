//! Confirmed rename sets threaded through model building and generation.
//!
//! A rename only exists here once it has been confirmed (interactively, via
//! persisted records, or passed in by the caller). Correlation of rename
//! *candidates* lives in the migration engine; an unconfirmed candidate is
//! treated as an independent drop/create pair.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The kind of a rename record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenameKind {
    /// A table was renamed.
    #[serde(rename = "tableRename")]
    Table,
    /// A column was renamed.
    #[serde(rename = "columnRename")]
    Column,
}

/// A confirmed table rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRename {
    /// Schema namespace.
    pub schema: SmolStr,
    /// Name in the live database.
    pub from: SmolStr,
    /// Name in the declared schema.
    pub to: SmolStr,
}

/// A confirmed column rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    /// Name in the live database.
    pub from: SmolStr,
    /// Name in the declared schema.
    pub to: SmolStr,
}

/// All confirmed renames for one push/generate invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Renames {
    /// Table renames.
    #[serde(default)]
    pub tables: Vec<TableRename>,
    /// Column renames keyed by `"schema.table"`, where the table name is
    /// the declared (post-rename) one.
    #[serde(default)]
    pub columns: HashMap<String, Vec<ColumnRename>>,
}

impl Renames {
    /// Create an empty rename set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no renames are recorded.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }

    /// Record a table rename.
    pub fn add_table(
        &mut self,
        schema: impl Into<SmolStr>,
        from: impl Into<SmolStr>,
        to: impl Into<SmolStr>,
    ) {
        self.tables.push(TableRename {
            schema: schema.into(),
            from: from.into(),
            to: to.into(),
        });
    }

    /// Record a column rename on `schema.table` (declared table name).
    pub fn add_column(
        &mut self,
        schema: &str,
        table: &str,
        from: impl Into<SmolStr>,
        to: impl Into<SmolStr>,
    ) {
        self.columns
            .entry(format!("{schema}.{table}"))
            .or_default()
            .push(ColumnRename {
                from: from.into(),
                to: to.into(),
            });
    }

    /// Map a live table name to its declared name.
    pub fn table_to(&self, schema: &str, live: &str) -> SmolStr {
        self.tables
            .iter()
            .find(|r| r.schema == schema && r.from == live)
            .map(|r| r.to.clone())
            .unwrap_or_else(|| live.into())
    }

    /// Map a declared table name back to its live name.
    pub fn table_from(&self, schema: &str, declared: &str) -> SmolStr {
        self.tables
            .iter()
            .find(|r| r.schema == schema && r.to == declared)
            .map(|r| r.from.clone())
            .unwrap_or_else(|| declared.into())
    }

    /// Map a live column name to its declared name.
    ///
    /// `table` is the declared (post-rename) table name.
    pub fn column_to(&self, schema: &str, table: &str, live: &str) -> SmolStr {
        self.columns_for(schema, table)
            .and_then(|rs| rs.iter().find(|r| r.from == live))
            .map(|r| r.to.clone())
            .unwrap_or_else(|| live.into())
    }

    /// Map a declared column name back to its live name.
    ///
    /// `table` is the declared (post-rename) table name.
    pub fn column_from(&self, schema: &str, table: &str, declared: &str) -> SmolStr {
        self.columns_for(schema, table)
            .and_then(|rs| rs.iter().find(|r| r.to == declared))
            .map(|r| r.from.clone())
            .unwrap_or_else(|| declared.into())
    }

    /// The column renames recorded for `schema.table`, if any.
    pub fn columns_for(&self, schema: &str, table: &str) -> Option<&[ColumnRename]> {
        self.columns
            .get(&format!("{schema}.{table}"))
            .map(Vec::as_slice)
    }

    /// Whether the declared table name is the target of a confirmed rename.
    pub fn is_renamed_table(&self, schema: &str, declared: &str) -> bool {
        self.tables
            .iter()
            .any(|r| r.schema == schema && r.to == declared)
    }

    /// Whether the declared column is the target of a confirmed rename.
    pub fn is_renamed_column(&self, schema: &str, table: &str, declared: &str) -> bool {
        self.columns_for(schema, table)
            .is_some_and(|rs| rs.iter().any(|r| r.to == declared))
    }
}
