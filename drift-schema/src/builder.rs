//! Canonical model builders.
//!
//! Two entry points produce [`SchemaMigrationInfo`] trees keyed and hashed
//! identically regardless of source: [`build_declared`] for the declared
//! schema and [`build_snapshot`] for the introspected database. The
//! snapshot builder maps names through the confirmed renames before
//! hashing, so a confirmed rename diffs to nothing at the hashed-collection
//! level while the stored catalog names still identify the live objects.

use std::collections::HashSet;

use smol_str::SmolStr;
use tracing::debug;

use crate::declared::{DeclaredColumn, DeclaredSchema};
use crate::error::{SchemaError, SchemaResult};
use crate::model::{
    CheckInfo, ColumnInfo, EnumInfo, ForeignKeyInfo, IndexInfo, PrimaryKeyInfo,
    SchemaMigrationInfo, TableMigrationInfo, TriggerInfo, UniqueInfo,
};
use crate::naming::{
    NameSuffix, definition_hash, generated_name, normalize_check, normalize_expression,
    normalize_foreign_key, normalize_index, normalize_primary_key, normalize_trigger,
    normalize_unique, substitute_identifier,
};
use crate::rename::Renames;
use crate::snapshot::DatabaseSnapshot;
use crate::types::canonical_type;

/// Default expressions considered volatile: adding a column with one of
/// these as its default rewrites every row with a per-row value and cannot
/// be applied as a cheap catalog-only change.
const VOLATILE_FUNCTIONS: &[&str] = &[
    "now(",
    "clock_timestamp(",
    "statement_timestamp(",
    "transaction_timestamp(",
    "current_timestamp",
    "random(",
    "gen_random_uuid(",
    "uuid_generate_v4(",
    "nextval(",
];

/// Whether a default expression is volatile.
pub fn is_volatile_default(expression: &str) -> bool {
    let lowered = expression.to_lowercase();
    VOLATILE_FUNCTIONS.iter().any(|f| lowered.contains(f))
}

/// Build the canonical model from a declared schema.
pub fn build_declared(schema: &DeclaredSchema) -> SchemaResult<SchemaMigrationInfo> {
    let mut info = SchemaMigrationInfo::new(schema.name.clone());

    let table_names: HashSet<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();

    for decl in &schema.enums {
        if info.enums.contains_key(&decl.name) {
            return Err(SchemaError::DuplicateEnum(decl.name.to_string()));
        }
        info.enums.insert(
            decl.name.clone(),
            EnumInfo {
                labels: decl.labels.clone(),
            },
        );
    }

    for table in &schema.tables {
        if info.tables.contains_key(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name.to_string()));
        }

        let mut entry = TableMigrationInfo::default();
        let table_name = table.name.as_str();

        for column in &table.columns {
            if entry.columns.contains_key(&column.name) {
                return Err(SchemaError::duplicate_column(table_name, column.name.as_str()));
            }
            entry
                .columns
                .insert(column.name.clone(), build_declared_column(table_name, column));
        }

        let has_column = |name: &SmolStr| entry.columns.contains_key(name);

        if let Some(pk_columns) = &table.primary_key {
            for col in pk_columns {
                if !has_column(col) {
                    return Err(SchemaError::unknown_column(table_name, col.as_str(), "primary key"));
                }
            }
            let def = normalize_primary_key(pk_columns);
            entry.primary_key = Some(PrimaryKeyInfo {
                name: generated_name(table_name, &def, NameSuffix::PrimaryKey),
                columns: pk_columns.clone(),
            });
        }

        for unique in &table.unique {
            for col in &unique.columns {
                if !has_column(col) {
                    return Err(SchemaError::unknown_column(table_name, col.as_str(), "unique constraint"));
                }
            }
            let def = normalize_unique(&unique.columns, unique.nulls_distinct);
            insert_hashed(
                table_name,
                &mut entry.unique,
                &def,
                UniqueInfo {
                    name: generated_name(table_name, &def, NameSuffix::Unique),
                    columns: unique.columns.clone(),
                    nulls_distinct: unique.nulls_distinct,
                },
                |u| &u.name,
            )?;
        }

        for check in &table.checks {
            let expression = normalize_expression(&check.expression);
            let def = normalize_check(&expression);
            insert_hashed(
                table_name,
                &mut entry.checks,
                &def,
                CheckInfo {
                    name: generated_name(table_name, &def, NameSuffix::Check),
                    expression,
                },
                |c| &c.name,
            )?;
        }

        for fk in &table.foreign_keys {
            for col in &fk.columns {
                if !has_column(col) {
                    return Err(SchemaError::unknown_column(table_name, col.as_str(), "foreign key"));
                }
            }
            if !table_names.contains(fk.referenced_table.as_str()) {
                return Err(SchemaError::UnknownReferencedTable {
                    table: table_name.to_string(),
                    referenced: fk.referenced_table.to_string(),
                });
            }
            let def = normalize_foreign_key(
                &fk.columns,
                &fk.referenced_table,
                &fk.referenced_columns,
                fk.on_delete,
                fk.on_update,
            );
            insert_hashed(
                table_name,
                &mut entry.foreign_keys,
                &def,
                ForeignKeyInfo {
                    name: generated_name(table_name, &def, NameSuffix::ForeignKey),
                    columns: fk.columns.clone(),
                    referenced_table: fk.referenced_table.clone(),
                    referenced_columns: fk.referenced_columns.clone(),
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                },
                |f| &f.name,
            )?;
        }

        for index in &table.indexes {
            for col in &index.columns {
                if !has_column(col) {
                    return Err(SchemaError::unknown_column(table_name, col.as_str(), "index"));
                }
            }
            let predicate = index.predicate.as_deref().map(normalize_expression);
            let def = normalize_index(&index.columns, index.unique, &index.method, predicate.as_deref());
            insert_hashed(
                table_name,
                &mut entry.indexes,
                &def,
                IndexInfo {
                    name: generated_name(table_name, &def, NameSuffix::Index),
                    columns: index.columns.clone(),
                    unique: index.unique,
                    predicate,
                    method: index.method.clone(),
                },
                |i| &i.name,
            )?;
        }

        for trigger in &table.triggers {
            let definition = normalize_expression(&trigger.definition);
            let def = normalize_trigger(&definition);
            insert_hashed(
                table_name,
                &mut entry.triggers,
                &def,
                TriggerInfo {
                    name: generated_name(table_name, &def, NameSuffix::Trigger),
                    definition,
                },
                |t| &t.name,
            )?;
        }

        info.tables.insert(table.name.clone(), entry);
    }

    debug!(
        schema = %info.name,
        tables = info.tables.len(),
        enums = info.enums.len(),
        "built canonical model from declared schema"
    );
    Ok(info)
}

/// Build the canonical model from an introspected snapshot, mapping names
/// through the confirmed renames.
pub fn build_snapshot(
    snapshot: &DatabaseSnapshot,
    renames: &Renames,
) -> SchemaResult<SchemaMigrationInfo> {
    let mut info = SchemaMigrationInfo::new(snapshot.schema.clone());
    let schema_name = snapshot.schema.as_str();

    for decl in &snapshot.enums {
        info.enums.insert(
            decl.name.clone(),
            EnumInfo {
                labels: decl.labels.clone(),
            },
        );
    }

    for table in &snapshot.tables {
        let declared_name = renames.table_to(schema_name, &table.name);
        if info.tables.contains_key(&declared_name) {
            return Err(SchemaError::DuplicateTable(declared_name.to_string()));
        }

        let column_renames = renames.columns_for(schema_name, &declared_name);
        let map_column = |name: &SmolStr| renames.column_to(schema_name, &declared_name, name);
        let map_columns =
            |names: &[SmolStr]| names.iter().map(&map_column).collect::<Vec<SmolStr>>();
        let map_expression = |expr: &str| {
            let normalized = normalize_expression(expr);
            match column_renames {
                Some(pairs) => pairs.iter().fold(normalized, |acc, r| {
                    substitute_identifier(&acc, &r.from, &r.to)
                }),
                None => normalized,
            }
        };

        let mut entry = TableMigrationInfo::default();

        for column in &table.columns {
            let declared_column = map_column(&column.name);
            if entry.columns.contains_key(&declared_column) {
                return Err(SchemaError::duplicate_column(
                    declared_name.as_str(),
                    declared_column.as_str(),
                ));
            }
            let default = column.default.as_deref().map(normalize_expression);
            let default_volatile = default.as_deref().is_some_and(is_volatile_default);
            entry.columns.insert(
                declared_column,
                ColumnInfo {
                    data_type: canonical_type(&column.data_type),
                    nullable: column.nullable,
                    default,
                    default_volatile,
                    identity: column.identity,
                },
            );
        }

        if let Some(pk) = &table.primary_key {
            entry.primary_key = Some(PrimaryKeyInfo {
                name: pk.name.clone(),
                columns: map_columns(&pk.columns),
            });
        }

        for unique in &table.unique {
            let columns = map_columns(&unique.columns);
            let def = normalize_unique(&columns, unique.nulls_distinct);
            entry.unique.insert(
                definition_hash(&def),
                UniqueInfo {
                    name: unique.name.clone(),
                    columns,
                    nulls_distinct: unique.nulls_distinct,
                },
            );
        }

        for check in &table.checks {
            let expression = map_expression(&check.expression);
            let def = normalize_check(&expression);
            entry.checks.insert(
                definition_hash(&def),
                CheckInfo {
                    name: check.name.clone(),
                    expression,
                },
            );
        }

        for fk in &table.foreign_keys {
            let columns = map_columns(&fk.columns);
            let referenced_table = renames.table_to(schema_name, &fk.referenced_table);
            let referenced_columns: Vec<SmolStr> = fk
                .referenced_columns
                .iter()
                .map(|c| renames.column_to(schema_name, &referenced_table, c))
                .collect();
            let def = normalize_foreign_key(
                &columns,
                &referenced_table,
                &referenced_columns,
                fk.on_delete,
                fk.on_update,
            );
            entry.foreign_keys.insert(
                definition_hash(&def),
                ForeignKeyInfo {
                    name: fk.name.clone(),
                    columns,
                    referenced_table,
                    referenced_columns,
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                },
            );
        }

        for index in &table.indexes {
            let columns = map_columns(&index.columns);
            let predicate = index.predicate.as_deref().map(&map_expression);
            let def = normalize_index(&columns, index.unique, &index.method, predicate.as_deref());
            entry.indexes.insert(
                definition_hash(&def),
                IndexInfo {
                    name: index.name.clone(),
                    columns,
                    unique: index.unique,
                    predicate,
                    method: index.method.clone(),
                },
            );
        }

        for trigger in &table.triggers {
            let definition = map_expression(&trigger.definition);
            let def = normalize_trigger(&definition);
            entry.triggers.insert(
                definition_hash(&def),
                TriggerInfo {
                    name: trigger.name.clone(),
                    definition,
                },
            );
        }

        info.tables.insert(declared_name, entry);
    }

    debug!(
        schema = %info.name,
        tables = info.tables.len(),
        enums = info.enums.len(),
        "built canonical model from snapshot"
    );
    Ok(info)
}

fn build_declared_column(table: &str, column: &DeclaredColumn) -> ColumnInfo {
    // serial pseudo-types canonicalize the way the catalog reports them
    // back: an integer family type with a nextval default on the column's
    // own sequence.
    let lowered = column.data_type.trim().to_lowercase();
    let serial_base = match lowered.as_str() {
        "serial" | "serial4" => Some("integer"),
        "bigserial" | "serial8" => Some("bigint"),
        "smallserial" | "serial2" => Some("smallint"),
        _ => None,
    };

    if let Some(base) = serial_base {
        let default = format!("nextval('{}_{}_seq'::regclass)", table, column.name);
        return ColumnInfo {
            data_type: base.to_string(),
            nullable: false,
            default: Some(default),
            default_volatile: true,
            identity: None,
        };
    }

    let default = column.default.as_deref().map(normalize_expression);
    let default_volatile = default.as_deref().is_some_and(is_volatile_default);
    ColumnInfo {
        data_type: canonical_type(&column.data_type),
        nullable: column.nullable,
        default,
        default_volatile,
        identity: column.identity,
    }
}

fn insert_hashed<T>(
    table: &str,
    map: &mut indexmap::IndexMap<String, T>,
    normalized_definition: &str,
    value: T,
    name_of: impl Fn(&T) -> &String,
) -> SchemaResult<()> {
    let key = definition_hash(normalized_definition);
    if let Some(existing) = map.get(&key) {
        return Err(SchemaError::DuplicateDefinition {
            table: table.to_string(),
            first: name_of(existing).clone(),
            second: name_of(&value).clone(),
        });
    }
    map.insert(key, value);
    Ok(())
}
