//! End-to-end planning tests: declared schema + snapshot in, ordered
//! changesets out.

use pretty_assertions::assert_eq;

use drift::migrate::{ChangePhase, ChangePriority, ChangesetKind, Engine, MigrateConfig};
use drift::schema::naming::{self, NameSuffix};
use drift::schema::{
    CheckSnapshot, ColumnSnapshot, DatabaseSnapshot, DeclaredColumn, DeclaredForeignKey,
    DeclaredIndex, DeclaredSchema, DeclaredTable, IndexSnapshot, Renames, TableSnapshot,
};

fn engine() -> Engine {
    Engine::new(MigrateConfig::default())
}

fn users_snapshot() -> DatabaseSnapshot {
    DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![ColumnSnapshot::new("id", "bigint").not_null()],
        ..Default::default()
    })
}

#[test]
fn test_add_nullable_column() {
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("name", "text")),
    );

    let plan = engine()
        .plan(&[declared], &[users_snapshot()], &Renames::new())
        .unwrap();

    assert_eq!(plan.changesets.len(), 1);
    let changeset = &plan.changesets[0];
    assert_eq!(changeset.kind, ChangesetKind::CreateColumn);
    assert_eq!(changeset.phase, ChangePhase::Expand);
    assert_eq!(changeset.priority, ChangePriority::CreateColumn);
    assert!(changeset.warnings.is_empty());
    assert_eq!(
        changeset.up_statements(),
        vec!["ALTER TABLE \"public\".\"users\" ADD COLUMN \"name\" text"]
    );
    assert_eq!(
        changeset.down_statements(),
        vec!["ALTER TABLE \"public\".\"users\" DROP COLUMN \"name\""]
    );
}

#[test]
fn test_add_non_nullable_column_with_default() {
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(
                DeclaredColumn::new("status", "text")
                    .not_null()
                    .default_expr("'active'"),
            ),
    );

    let plan = engine()
        .plan(&[declared], &[users_snapshot()], &Renames::new())
        .unwrap();

    assert_eq!(plan.changesets.len(), 1);
    let changeset = &plan.changesets[0];
    assert_eq!(changeset.kind, ChangesetKind::CreateNonNullableColumn);
    assert_eq!(changeset.phase, ChangePhase::Expand);

    // Three steps: add nullable, set default, set not null.
    let statements = changeset.up_statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].contains("ADD COLUMN \"status\" text"));
    assert!(!statements[0].contains("NOT NULL"));
    assert!(statements[1].contains("SET DEFAULT 'active'"));
    assert!(statements[2].ends_with("SET NOT NULL"));

    assert_eq!(changeset.warnings.len(), 1);
    assert_eq!(
        changeset.warnings[0].kind,
        drift::migrate::WarningKind::MightFail
    );
}

#[test]
fn test_drop_last_check_constraint() {
    let expression = "age >= 0";
    let generated = naming::generated_name(
        "users",
        &naming::normalize_check(expression),
        NameSuffix::Check,
    );

    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![
            ColumnSnapshot::new("id", "bigint").not_null(),
            ColumnSnapshot::new("age", "integer"),
        ],
        checks: vec![CheckSnapshot {
            name: generated.clone(),
            expression: expression.to_string(),
        }],
        ..Default::default()
    });

    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("age", "integer")),
    );

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();

    assert_eq!(plan.changesets.len(), 1);
    let changeset = &plan.changesets[0];
    assert_eq!(changeset.kind, ChangesetKind::DropCheck);
    assert_eq!(changeset.phase, ChangePhase::Contract);

    // Up drops the exact generated name; down recreates NOT VALID and
    // validates it.
    assert_eq!(
        changeset.up_statements(),
        vec![format!(
            "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"{generated}\""
        )]
    );
    let down = changeset.down_statements();
    assert_eq!(down.len(), 2);
    assert!(down[0].contains(&format!("ADD CONSTRAINT \"{generated}\" CHECK (age >= 0) NOT VALID")));
    assert!(down[1].contains(&format!("VALIDATE CONSTRAINT \"{generated}\"")));
}

#[test]
fn test_create_table_dependency_ordering() {
    // Declared with the dependent table first; the sorter must put the
    // referenced table's create ahead regardless of input order.
    let declared = DeclaredSchema::new("public")
        .table(
            DeclaredTable::new("orders")
                .column(DeclaredColumn::new("id", "bigint").not_null())
                .column(DeclaredColumn::new("user_id", "bigint").not_null())
                .primary_key(["id"])
                .foreign_key(DeclaredForeignKey::new(["user_id"], "users", ["id"])),
        )
        .table(
            DeclaredTable::new("users")
                .column(DeclaredColumn::new("id", "bigint").not_null())
                .primary_key(["id"]),
        );

    let plan = engine()
        .plan(&[declared], &[DatabaseSnapshot::new("public")], &Renames::new())
        .unwrap();

    let creates: Vec<&str> = plan
        .changesets
        .iter()
        .filter(|c| c.kind == ChangesetKind::CreateTable)
        .map(|c| c.current_table_name.as_str())
        .collect();
    assert_eq!(creates, vec!["users", "orders"]);
}

#[test]
fn test_phase_partition() {
    // One plan containing an expand, an alter, and a contract change.
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![
            ColumnSnapshot::new("id", "bigint").not_null(),
            ColumnSnapshot::new("age", "integer"),
            ColumnSnapshot::new("obsolete", "text"),
        ],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("age", "bigint"))
            .column(DeclaredColumn::new("note", "text").default_expr("''")),
    );

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();

    let phase_of = |kind: ChangesetKind| {
        plan.changesets
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.phase)
            .unwrap()
    };
    assert_eq!(phase_of(ChangesetKind::CreateColumn), ChangePhase::Expand);
    assert_eq!(phase_of(ChangesetKind::ChangeColumnType), ChangePhase::Alter);
    assert_eq!(phase_of(ChangesetKind::DropColumn), ChangePhase::Contract);

    // Phases bucket in apply order within the sorted plan.
    let phases: Vec<ChangePhase> = plan.changesets.iter().map(|c| c.phase).collect();
    let expand_at = phases.iter().position(|p| *p == ChangePhase::Expand).unwrap();
    let contract_at = phases.iter().position(|p| *p == ChangePhase::Contract).unwrap();
    assert!(expand_at < contract_at);
}

#[test]
fn test_confirmed_rename_stays_a_rename() {
    let index_def = naming::normalize_index(&["email".into()], false, "btree", None);
    let old_index_name = naming::generated_name("user", &index_def, NameSuffix::Index);
    let new_index_name = naming::generated_name("users", &index_def, NameSuffix::Index);

    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "user".into(),
        columns: vec![ColumnSnapshot::new("email", "text")],
        indexes: vec![IndexSnapshot {
            name: old_index_name.clone(),
            columns: vec!["email".into()],
            unique: false,
            predicate: None,
            method: "btree".into(),
        }],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("email", "text"))
            .index(DeclaredIndex::on(["email"])),
    );

    let mut renames = Renames::new();
    renames.add_table("public", "user", "users");

    let plan = engine()
        .plan(&[declared.clone()], &[snapshot.clone()], &renames)
        .unwrap();

    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ChangesetKind::RenameTable));
    assert!(kinds.contains(&ChangesetKind::RenameIndex));
    assert!(!kinds.contains(&ChangesetKind::DropTable));
    assert!(!kinds.contains(&ChangesetKind::CreateTable));

    // The hash survived the rename; only the spliced table prefix moved.
    let rename_index = plan
        .changesets
        .iter()
        .find(|c| c.kind == ChangesetKind::RenameIndex)
        .unwrap();
    assert!(rename_index.up_statements()[0].contains(&old_index_name));
    assert!(rename_index.up_statements()[0].contains(&new_index_name));

    // Unconfirmed, the same pair is an independent drop and create.
    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();
    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ChangesetKind::DropTable));
    assert!(kinds.contains(&ChangesetKind::CreateTable));
    assert!(!kinds.contains(&ChangesetKind::RenameTable));
}

#[test]
fn test_renamed_column_keeps_generated_index_name() {
    // Index over a renamed column: the hash maps the live column through
    // the confirmed rename, so nothing about the index diffs.
    let index_def = naming::normalize_index(&["email".into()], false, "btree", None);
    let index_name = naming::generated_name("users", &index_def, NameSuffix::Index);

    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![ColumnSnapshot::new("mail", "text")],
        indexes: vec![IndexSnapshot {
            name: index_name,
            columns: vec!["mail".into()],
            unique: false,
            predicate: None,
            method: "btree".into(),
        }],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("email", "text"))
            .index(DeclaredIndex::on(["email"])),
    );

    let mut renames = Renames::new();
    renames.add_column("public", "users", "mail", "email");

    let plan = engine().plan(&[declared], &[snapshot], &renames).unwrap();
    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangesetKind::RenameColumn]);
}

#[test]
fn test_unsafe_type_change_gets_blocking_warning() {
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![ColumnSnapshot::new("name", "character varying(100)")],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users").column(DeclaredColumn::new("name", "varchar(50)")),
    );

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();

    let changeset = &plan.changesets[0];
    assert_eq!(changeset.kind, ChangesetKind::ChangeColumnType);
    assert_eq!(changeset.warnings.len(), 1);
    let warning = &changeset.warnings[0];
    assert_eq!(warning.kind, drift::migrate::WarningKind::Blocking);
    assert_eq!(warning.from.as_deref(), Some("character varying(100)"));
    assert_eq!(warning.to.as_deref(), Some("character varying(50)"));
}

#[test]
fn test_safe_type_change_has_no_warning() {
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![ColumnSnapshot::new("name", "character varying(50)")],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users").column(DeclaredColumn::new("name", "text")),
    );

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();
    assert!(plan.changesets[0].warnings.is_empty());
}

#[test]
fn test_unique_constraint_builds_concurrently_then_attaches() {
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("email", "text"))
            .unique(drift::schema::DeclaredUnique::on(["email"])),
    );
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![
            ColumnSnapshot::new("id", "bigint").not_null(),
            ColumnSnapshot::new("email", "text"),
        ],
        ..Default::default()
    });

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();

    assert_eq!(plan.changesets.len(), 2);
    let build = &plan.changesets[0];
    let attach = &plan.changesets[1];

    assert_eq!(build.kind, ChangesetKind::CreateUniqueIndex);
    assert!(!build.transactional);
    assert!(build.up_statements()[0].contains("CREATE UNIQUE INDEX CONCURRENTLY"));
    assert!(!build.up[0].on_unique_violation.is_empty());

    assert_eq!(attach.kind, ChangesetKind::AttachUniqueConstraint);
    assert!(attach.transactional);
    assert!(attach.up_statements()[0].contains("UNIQUE USING INDEX"));
}

#[test]
fn test_plan_is_idempotent_for_equal_schemas() {
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("email", "text")),
    );
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![
            ColumnSnapshot::new("id", "bigint").not_null(),
            ColumnSnapshot::new("email", "text"),
        ],
        ..Default::default()
    });

    let plan = engine()
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();
    assert!(plan.is_empty(), "unexpected changesets: {:?}", plan.changesets);
}
