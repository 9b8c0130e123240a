//! Structured DDL statements and their PostgreSQL rendering.
//!
//! Generators build [`DdlStatement`] values instead of splicing SQL
//! strings; every statement renders to the target dialect in this one
//! place. Identifiers are always quoted.

use drift_schema::{
    CheckInfo, ColumnInfo, ForeignKeyInfo, IdentityMode, IndexInfo, PrimaryKeyInfo, UniqueInfo,
};
use smol_str::SmolStr;

/// Quote an identifier.
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a schema-qualified identifier.
fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", ident(schema), ident(name))
}

fn column_list(columns: &[SmolStr]) -> String {
    columns
        .iter()
        .map(|c| ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a string literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A column definition as it appears in CREATE TABLE / ADD COLUMN.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: SmolStr,
    /// Canonical column facts.
    pub info: ColumnInfo,
}

impl ColumnDef {
    /// Pair a name with its column facts.
    pub fn new(name: impl Into<SmolStr>, info: ColumnInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }

    /// Whether the column is sequence-backed on its own sequence, i.e. was
    /// a `serial` declaration.
    pub fn serial_type(&self) -> Option<&'static str> {
        if !self.info.is_sequence_backed() {
            return None;
        }
        match self.info.data_type.as_str() {
            "integer" => Some("serial"),
            "bigint" => Some("bigserial"),
            "smallint" => Some("smallserial"),
            _ => None,
        }
    }

    fn render(&self) -> String {
        let mut parts = vec![ident(&self.name)];

        if let Some(serial) = self.serial_type() {
            parts.push(serial.to_string());
            return parts.join(" ");
        }

        parts.push(self.info.data_type.clone());

        if let Some(identity) = self.info.identity {
            parts.push(
                match identity {
                    IdentityMode::Always => "GENERATED ALWAYS AS IDENTITY",
                    IdentityMode::ByDefault => "GENERATED BY DEFAULT AS IDENTITY",
                }
                .to_string(),
            );
        }

        if !self.info.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &self.info.default {
            parts.push(format!("DEFAULT {default}"));
        }

        parts.join(" ")
    }
}

/// A typed DDL operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    /// `CREATE SCHEMA`.
    CreateSchema {
        /// Namespace name.
        name: String,
    },
    /// `DROP SCHEMA ... CASCADE`.
    DropSchema {
        /// Namespace name.
        name: String,
    },
    /// `CREATE TYPE ... AS ENUM (...)`.
    CreateEnum {
        /// Namespace.
        schema: String,
        /// Type name.
        name: String,
        /// Labels in order.
        labels: Vec<SmolStr>,
    },
    /// `COMMENT ON TYPE`, used to stamp generated enums.
    CommentOnType {
        /// Namespace.
        schema: String,
        /// Type name.
        name: String,
        /// Comment text.
        comment: String,
    },
    /// `ALTER TYPE ... ADD VALUE IF NOT EXISTS`.
    AddEnumLabel {
        /// Namespace.
        schema: String,
        /// Type name.
        name: String,
        /// Label to append.
        label: String,
    },
    /// `DROP TYPE`.
    DropEnum {
        /// Namespace.
        schema: String,
        /// Type name.
        name: String,
    },
    /// `CREATE TABLE` with inline constraints.
    CreateTable {
        /// Namespace.
        schema: String,
        /// Table name.
        name: String,
        /// Columns in order.
        columns: Vec<ColumnDef>,
        /// Inline primary key.
        primary_key: Option<PrimaryKeyInfo>,
        /// Inline unique constraints.
        unique: Vec<UniqueInfo>,
        /// Inline check constraints.
        checks: Vec<CheckInfo>,
        /// Inline foreign keys, rendered against `referenced_table`.
        foreign_keys: Vec<(ForeignKeyInfo, String)>,
    },
    /// `DROP TABLE`.
    DropTable {
        /// Namespace.
        schema: String,
        /// Table name.
        name: String,
    },
    /// `ALTER TABLE ... RENAME TO`.
    RenameTable {
        /// Namespace.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `ALTER TABLE ... ADD COLUMN`.
    AddColumn {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },
    /// `ALTER TABLE ... DROP COLUMN`.
    DropColumn {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column name.
        name: String,
    },
    /// `ALTER TABLE ... RENAME COLUMN`.
    RenameColumn {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `ALTER TABLE ... ALTER COLUMN ... TYPE`.
    AlterColumnType {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column.
        column: String,
        /// New canonical type.
        data_type: String,
    },
    /// `ALTER COLUMN ... SET DEFAULT` / `DROP DEFAULT`.
    SetColumnDefault {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column.
        column: String,
        /// New default; `None` drops it.
        default: Option<String>,
    },
    /// `ALTER COLUMN ... SET NOT NULL` / `DROP NOT NULL`.
    SetColumnNotNull {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column.
        column: String,
        /// Whether the column becomes NOT NULL.
        not_null: bool,
    },
    /// `ALTER COLUMN ... ADD GENERATED ... AS IDENTITY` / `DROP IDENTITY`.
    SetColumnIdentity {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Column.
        column: String,
        /// New identity mode; `None` drops identity.
        identity: Option<IdentityMode>,
    },
    /// `ALTER TABLE ... ADD CONSTRAINT ... PRIMARY KEY`.
    AddPrimaryKey {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
        /// Key columns.
        columns: Vec<SmolStr>,
    },
    /// `ALTER TABLE ... DROP CONSTRAINT`.
    DropConstraint {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// `ALTER TABLE ... RENAME CONSTRAINT`.
    RenameConstraint {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `CREATE [UNIQUE] INDEX [CONCURRENTLY]`.
    CreateIndex {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Index facts.
        index: IndexInfo,
        /// Use the concurrent build mode.
        concurrently: bool,
    },
    /// `DROP INDEX [CONCURRENTLY]`.
    DropIndex {
        /// Namespace.
        schema: String,
        /// Index name.
        name: String,
        /// Use the concurrent drop mode.
        concurrently: bool,
    },
    /// `ALTER INDEX ... RENAME TO`.
    RenameIndex {
        /// Namespace.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `ALTER TABLE ... ADD CONSTRAINT ... UNIQUE (...)`, the direct form
    /// used when the two-step concurrent build does not apply.
    AddUnique {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
        /// Constrained columns.
        columns: Vec<SmolStr>,
        /// `NULLS DISTINCT` semantics.
        nulls_distinct: bool,
    },
    /// `ALTER TABLE ... ADD CONSTRAINT ... UNIQUE USING INDEX`.
    AddUniqueUsingIndex {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
        /// Prebuilt unique index to attach.
        index: String,
    },
    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
    AddForeignKey {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Foreign key facts.
        foreign_key: ForeignKeyInfo,
        /// Referenced table, live name at execution time.
        referenced_table: String,
        /// Attach `NOT VALID` for later validation.
        not_valid: bool,
    },
    /// `ALTER TABLE ... ADD CONSTRAINT ... CHECK`.
    AddCheck {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
        /// Check expression.
        expression: String,
        /// Attach `NOT VALID` for later validation.
        not_valid: bool,
    },
    /// `ALTER TABLE ... VALIDATE CONSTRAINT`.
    ValidateConstraint {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// `CREATE TRIGGER`.
    CreateTrigger {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Trigger name.
        name: String,
        /// Definition after the name: timing, events, and action, with the
        /// `__tbl__` placeholder where the table reference goes.
        definition: String,
    },
    /// `DROP TRIGGER`.
    DropTrigger {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Trigger name.
        name: String,
    },
    /// `ALTER TRIGGER ... ON ... RENAME TO`.
    RenameTrigger {
        /// Namespace.
        schema: String,
        /// Table.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
}

impl DdlStatement {
    /// Render the statement as PostgreSQL.
    pub fn render(&self) -> String {
        match self {
            Self::CreateSchema { name } => {
                format!("CREATE SCHEMA IF NOT EXISTS {}", ident(name))
            }
            Self::DropSchema { name } => {
                format!("DROP SCHEMA {} CASCADE", ident(name))
            }
            Self::CreateEnum {
                schema,
                name,
                labels,
            } => {
                let rendered: Vec<String> = labels.iter().map(|l| literal(l)).collect();
                format!(
                    "CREATE TYPE {} AS ENUM ({})",
                    qualified(schema, name),
                    rendered.join(", ")
                )
            }
            Self::CommentOnType {
                schema,
                name,
                comment,
            } => {
                format!(
                    "COMMENT ON TYPE {} IS {}",
                    qualified(schema, name),
                    literal(comment)
                )
            }
            Self::AddEnumLabel {
                schema,
                name,
                label,
            } => {
                format!(
                    "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
                    qualified(schema, name),
                    literal(label)
                )
            }
            Self::DropEnum { schema, name } => {
                format!("DROP TYPE {}", qualified(schema, name))
            }
            Self::CreateTable {
                schema,
                name,
                columns,
                primary_key,
                unique,
                checks,
                foreign_keys,
            } => {
                let mut items: Vec<String> = columns.iter().map(ColumnDef::render).collect();

                if let Some(pk) = primary_key {
                    items.push(format!(
                        "CONSTRAINT {} PRIMARY KEY ({})",
                        ident(&pk.name),
                        column_list(&pk.columns)
                    ));
                }
                for u in unique {
                    let nulls = if u.nulls_distinct {
                        ""
                    } else {
                        " NULLS NOT DISTINCT"
                    };
                    items.push(format!(
                        "CONSTRAINT {} UNIQUE{} ({})",
                        ident(&u.name),
                        nulls,
                        column_list(&u.columns)
                    ));
                }
                for c in checks {
                    items.push(format!(
                        "CONSTRAINT {} CHECK ({})",
                        ident(&c.name),
                        c.expression
                    ));
                }
                for (fk, referenced) in foreign_keys {
                    items.push(format!(
                        "CONSTRAINT {} {}",
                        ident(&fk.name),
                        render_foreign_key_body(schema, fk, referenced)
                    ));
                }

                format!(
                    "CREATE TABLE {} (\n    {}\n)",
                    qualified(schema, name),
                    items.join(",\n    ")
                )
            }
            Self::DropTable { schema, name } => {
                format!("DROP TABLE {}", qualified(schema, name))
            }
            Self::RenameTable { schema, from, to } => {
                format!(
                    "ALTER TABLE {} RENAME TO {}",
                    qualified(schema, from),
                    ident(to)
                )
            }
            Self::AddColumn {
                schema,
                table,
                column,
            } => {
                format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    qualified(schema, table),
                    column.render()
                )
            }
            Self::DropColumn {
                schema,
                table,
                name,
            } => {
                format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    qualified(schema, table),
                    ident(name)
                )
            }
            Self::RenameColumn {
                schema,
                table,
                from,
                to,
            } => {
                format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    qualified(schema, table),
                    ident(from),
                    ident(to)
                )
            }
            Self::AlterColumnType {
                schema,
                table,
                column,
                data_type,
            } => {
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                    qualified(schema, table),
                    ident(column),
                    data_type
                )
            }
            Self::SetColumnDefault {
                schema,
                table,
                column,
                default,
            } => match default {
                Some(expr) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    qualified(schema, table),
                    ident(column),
                    expr
                ),
                None => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    qualified(schema, table),
                    ident(column)
                ),
            },
            Self::SetColumnNotNull {
                schema,
                table,
                column,
                not_null,
            } => {
                let action = if *not_null {
                    "SET NOT NULL"
                } else {
                    "DROP NOT NULL"
                };
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    qualified(schema, table),
                    ident(column),
                    action
                )
            }
            Self::SetColumnIdentity {
                schema,
                table,
                column,
                identity,
            } => {
                let action = match identity {
                    Some(IdentityMode::Always) => "ADD GENERATED ALWAYS AS IDENTITY".to_string(),
                    Some(IdentityMode::ByDefault) => {
                        "ADD GENERATED BY DEFAULT AS IDENTITY".to_string()
                    }
                    None => "DROP IDENTITY IF EXISTS".to_string(),
                };
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    qualified(schema, table),
                    ident(column),
                    action
                )
            }
            Self::AddPrimaryKey {
                schema,
                table,
                name,
                columns,
            } => {
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                    qualified(schema, table),
                    ident(name),
                    column_list(columns)
                )
            }
            Self::DropConstraint {
                schema,
                table,
                name,
            } => {
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    qualified(schema, table),
                    ident(name)
                )
            }
            Self::RenameConstraint {
                schema,
                table,
                from,
                to,
            } => {
                format!(
                    "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
                    qualified(schema, table),
                    ident(from),
                    ident(to)
                )
            }
            Self::CreateIndex {
                schema,
                table,
                index,
                concurrently,
            } => {
                let mut sql = String::from("CREATE ");
                if index.unique {
                    sql.push_str("UNIQUE ");
                }
                sql.push_str("INDEX ");
                if *concurrently {
                    sql.push_str("CONCURRENTLY ");
                }
                sql.push_str(&format!(
                    "{} ON {} USING {} ({})",
                    ident(&index.name),
                    qualified(schema, table),
                    index.method,
                    column_list(&index.columns)
                ));
                if let Some(predicate) = &index.predicate {
                    sql.push_str(&format!(" WHERE {predicate}"));
                }
                sql
            }
            Self::DropIndex {
                schema,
                name,
                concurrently,
            } => {
                let concurrently = if *concurrently { "CONCURRENTLY " } else { "" };
                format!(
                    "DROP INDEX {}IF EXISTS {}",
                    concurrently,
                    qualified(schema, name)
                )
            }
            Self::RenameIndex { schema, from, to } => {
                format!(
                    "ALTER INDEX {} RENAME TO {}",
                    qualified(schema, from),
                    ident(to)
                )
            }
            Self::AddUnique {
                schema,
                table,
                name,
                columns,
                nulls_distinct,
            } => {
                let nulls = if *nulls_distinct {
                    ""
                } else {
                    " NULLS NOT DISTINCT"
                };
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE{} ({})",
                    qualified(schema, table),
                    ident(name),
                    nulls,
                    column_list(columns)
                )
            }
            Self::AddUniqueUsingIndex {
                schema,
                table,
                name,
                index,
            } => {
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE USING INDEX {}",
                    qualified(schema, table),
                    ident(name),
                    ident(index)
                )
            }
            Self::AddForeignKey {
                schema,
                table,
                foreign_key,
                referenced_table,
                not_valid,
            } => {
                let mut sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    qualified(schema, table),
                    ident(&foreign_key.name),
                    render_foreign_key_body(schema, foreign_key, referenced_table)
                );
                if *not_valid {
                    sql.push_str(" NOT VALID");
                }
                sql
            }
            Self::AddCheck {
                schema,
                table,
                name,
                expression,
                not_valid,
            } => {
                let mut sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                    qualified(schema, table),
                    ident(name),
                    expression
                );
                if *not_valid {
                    sql.push_str(" NOT VALID");
                }
                sql
            }
            Self::ValidateConstraint {
                schema,
                table,
                name,
            } => {
                format!(
                    "ALTER TABLE {} VALIDATE CONSTRAINT {}",
                    qualified(schema, table),
                    ident(name)
                )
            }
            Self::CreateTrigger {
                schema,
                table,
                name,
                definition,
            } => {
                // Canonical definitions carry the `__tbl__` placeholder for
                // the table reference.
                format!(
                    "CREATE TRIGGER {} {}",
                    ident(name),
                    definition.replace("__tbl__", &qualified(schema, table))
                )
            }
            Self::DropTrigger {
                schema,
                table,
                name,
            } => {
                format!(
                    "DROP TRIGGER {} ON {}",
                    ident(name),
                    qualified(schema, table)
                )
            }
            Self::RenameTrigger {
                schema,
                table,
                from,
                to,
            } => {
                format!(
                    "ALTER TRIGGER {} ON {} RENAME TO {}",
                    ident(from),
                    qualified(schema, table),
                    ident(to)
                )
            }
        }
    }
}

fn render_foreign_key_body(schema: &str, fk: &ForeignKeyInfo, referenced_table: &str) -> String {
    format!(
        "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        column_list(&fk.columns),
        qualified(schema, referenced_table),
        column_list(&fk.referenced_columns),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_schema::ColumnInfo;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_column_render() {
        let mut info = ColumnInfo::new("text");
        info.nullable = false;
        info.default = Some("'unknown'".to_string());

        let stmt = DdlStatement::AddColumn {
            schema: "public".into(),
            table: "users".into(),
            column: ColumnDef::new("name", info),
        };
        assert_eq!(
            stmt.render(),
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"name\" text NOT NULL DEFAULT 'unknown'"
        );
    }

    #[test]
    fn test_serial_column_renders_as_serial() {
        let mut info = ColumnInfo::new("integer");
        info.nullable = false;
        info.default = Some("nextval('orders_id_seq'::regclass)".to_string());
        info.default_volatile = true;

        let def = ColumnDef::new("id", info);
        assert_eq!(def.serial_type(), Some("serial"));
        assert_eq!(def.render(), "\"id\" serial");
    }

    #[test]
    fn test_concurrent_index_render() {
        let stmt = DdlStatement::CreateIndex {
            schema: "public".into(),
            table: "users".into(),
            index: IndexInfo {
                name: "users_ab12cd34_drift_idx".into(),
                columns: vec!["email".into()],
                unique: true,
                predicate: Some("deleted_at IS NULL".into()),
                method: "btree".into(),
            },
            concurrently: true,
        };
        assert_eq!(
            stmt.render(),
            "CREATE UNIQUE INDEX CONCURRENTLY \"users_ab12cd34_drift_idx\" ON \
             \"public\".\"users\" USING btree (\"email\") WHERE deleted_at IS NULL"
        );
    }

    #[test]
    fn test_check_not_valid_render() {
        let stmt = DdlStatement::AddCheck {
            schema: "public".into(),
            table: "users".into(),
            name: "users_ff00aa11_drift_chk".into(),
            expression: "age >= 0".into(),
            not_valid: true,
        };
        assert!(stmt.render().ends_with("CHECK (age >= 0) NOT VALID"));
    }

    #[test]
    fn test_identity_render() {
        let mut info = ColumnInfo::new("bigint");
        info.nullable = false;
        info.identity = Some(IdentityMode::Always);
        let def = ColumnDef::new("id", info);
        assert_eq!(
            def.render(),
            "\"id\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL"
        );
    }

    #[test]
    fn test_create_table_render_inlines_constraints() {
        let stmt = DdlStatement::CreateTable {
            schema: "public".into(),
            name: "users".into(),
            columns: vec![ColumnDef::new("id", {
                let mut c = ColumnInfo::new("bigint");
                c.nullable = false;
                c
            })],
            primary_key: Some(PrimaryKeyInfo {
                name: "users_aa_drift_pk".into(),
                columns: vec!["id".into()],
            }),
            unique: vec![],
            checks: vec![],
            foreign_keys: vec![],
        };
        let sql = stmt.render();
        assert!(sql.starts_with("CREATE TABLE \"public\".\"users\""));
        assert!(sql.contains("CONSTRAINT \"users_aa_drift_pk\" PRIMARY KEY (\"id\")"));
    }
}
