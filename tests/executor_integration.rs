//! Executor behavior against a scripted session: batching, rollback,
//! idempotency, and phase isolation.

use pretty_assertions::assert_eq;

use drift::migrate::{
    ChangesetKind, Engine, MemoryLedger, MigrateConfig, MigrationUnit, PhasedMigrator,
    RecordingSession, StatementGroup, UnitStatus,
};
use drift::schema::{
    ColumnSnapshot, DatabaseSnapshot, DeclaredColumn, DeclaredSchema, DeclaredTable, Renames,
    TableSnapshot,
};

fn table_unit(name: &str, table: &str) -> MigrationUnit {
    MigrationUnit {
        name: name.to_string(),
        transactional: true,
        up: vec![StatementGroup::single(format!("CREATE TABLE {table} ()"))],
        down: vec![StatementGroup::single(format!("DROP TABLE {table}"))],
        scaffold: false,
        warnings: Vec::new(),
    }
}

#[tokio::test]
async fn test_rollback_mid_run_statuses() {
    // Units 1-2 form a transactional batch, unit 3 is a failing
    // non-transactional unit, units 4-5 never run. The first batch's
    // commit survives; nothing from units 3-5 exists afterwards.
    let units = vec![
        table_unit("0001_users", "users"),
        table_unit("0002_orders", "orders"),
        MigrationUnit {
            name: "0003_idx".to_string(),
            transactional: false,
            up: vec![StatementGroup::single(
                "CREATE INDEX CONCURRENTLY broken_idx ON users (email)",
            )],
            down: Vec::new(),
            scaffold: false,
            warnings: Vec::new(),
        },
        table_unit("0004_items", "items"),
        table_unit("0005_audit", "audit"),
    ];

    let mut session = RecordingSession::new().fail_on("broken_idx", "42703");
    let ledger = MemoryLedger::new();

    let report = PhasedMigrator::new()
        .run(&units, &mut session, &ledger)
        .await
        .unwrap();

    let statuses: Vec<UnitStatus> = report.units.iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            UnitStatus::Success,
            UnitStatus::Success,
            UnitStatus::Error,
            UnitStatus::NotExecuted,
            UnitStatus::NotExecuted,
        ]
    );

    // Units 1-2 persist, units 3-5 left nothing behind.
    assert!(session.committed_contains("CREATE TABLE users"));
    assert!(session.committed_contains("CREATE TABLE orders"));
    assert!(!session.committed_contains("broken_idx"));
    assert!(!session.committed_contains("CREATE TABLE items"));
    assert!(!session.committed_contains("CREATE TABLE audit"));
    assert_eq!(ledger.applied_names(), vec!["0001_users", "0002_orders"]);

    let summary = report.summary();
    assert!(summary.contains("0003_idx"));
    assert!(summary.contains("error:"));
}

#[tokio::test]
async fn test_failed_transactional_batch_reverts_ledger() {
    // Both units share one transaction; the second fails, so neither the
    // DDL nor the ledger rows survive.
    let units = vec![
        table_unit("0001_users", "users"),
        MigrationUnit {
            name: "0002_bad".to_string(),
            transactional: true,
            up: vec![StatementGroup::single("CREATE TABLE bad ()")],
            down: Vec::new(),
            scaffold: false,
            warnings: Vec::new(),
        },
    ];

    let mut session = RecordingSession::new().fail_on("CREATE TABLE bad", "42601");
    let ledger = MemoryLedger::new();

    let report = PhasedMigrator::new()
        .run(&units, &mut session, &ledger)
        .await
        .unwrap();

    let statuses: Vec<UnitStatus> = report.units.iter().map(|u| u.status).collect();
    assert_eq!(statuses, vec![UnitStatus::NotExecuted, UnitStatus::Error]);
    assert!(session.committed.is_empty());
    assert!(!session.in_transaction());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let units = vec![table_unit("0001_users", "users"), table_unit("0002_orders", "orders")];
    let ledger = MemoryLedger::new();

    let mut session = RecordingSession::new();
    let first = PhasedMigrator::new()
        .run(&units, &mut session, &ledger)
        .await
        .unwrap();
    assert!(first.succeeded());

    let mut session = RecordingSession::new();
    let second = PhasedMigrator::new()
        .run(&units, &mut session, &ledger)
        .await
        .unwrap();
    assert!(second.units.is_empty());
    assert_eq!(second.skipped, vec!["0001_users", "0002_orders"]);
    assert!(!session.committed_contains("CREATE TABLE"));
}

#[tokio::test]
async fn test_revert_runs_down_in_reverse() {
    let units = vec![table_unit("0001_users", "users"), table_unit("0002_orders", "orders")];
    let ledger = MemoryLedger::new();

    let mut session = RecordingSession::new();
    PhasedMigrator::new()
        .run(&units, &mut session, &ledger)
        .await
        .unwrap();

    let mut session = RecordingSession::new();
    let report = PhasedMigrator::new()
        .revert(&units, &mut session, &ledger)
        .await
        .unwrap();

    assert!(report.succeeded());
    let orders_at = session
        .committed
        .iter()
        .position(|s| s.contains("DROP TABLE orders"))
        .unwrap();
    let users_at = session
        .committed
        .iter()
        .position(|s| s.contains("DROP TABLE users"))
        .unwrap();
    assert!(orders_at < users_at);
    assert!(ledger.applied_names().is_empty());
}

#[tokio::test]
async fn test_push_applies_phases_in_order_with_separate_ledgers() {
    // A plan with expand work (new column) and contract work (dropped
    // column) pushed against a recording session: expand statements land
    // before contract statements, and each phase tracks its own ledger
    // tables.
    let engine = Engine::new(MigrateConfig::default());
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![
            ColumnSnapshot::new("id", "bigint").not_null(),
            ColumnSnapshot::new("obsolete", "text"),
        ],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users")
            .column(DeclaredColumn::new("id", "bigint").not_null())
            .column(DeclaredColumn::new("name", "text")),
    );

    let plan = engine
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();
    assert_eq!(plan.changesets.len(), 2);

    let mut session = RecordingSession::new();
    let outcomes = engine.push(&plan, &mut session).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.report.succeeded()));

    let add_at = session
        .committed
        .iter()
        .position(|s| s.contains("ADD COLUMN \"name\""))
        .unwrap();
    let drop_at = session
        .committed
        .iter()
        .position(|s| s.contains("DROP COLUMN \"obsolete\""))
        .unwrap();
    assert!(add_at < drop_at);

    // Per-phase ledger tables.
    assert!(session.committed_contains("_drift_migrations_expand"));
    assert!(session.committed_contains("_drift_migrations_contract"));
    assert!(session.committed_contains("INSERT INTO \"_drift_migrations_expand\""));
}

#[tokio::test]
async fn test_push_generates_no_work_for_identical_schema() {
    let engine = Engine::new(MigrateConfig::default());
    let snapshot = DatabaseSnapshot::new("public").table(TableSnapshot {
        name: "users".into(),
        columns: vec![ColumnSnapshot::new("id", "bigint").not_null()],
        ..Default::default()
    });
    let declared = DeclaredSchema::new("public").table(
        DeclaredTable::new("users").column(DeclaredColumn::new("id", "bigint").not_null()),
    );

    let plan = engine
        .plan(&[declared], &[snapshot], &Renames::new())
        .unwrap();
    let mut session = RecordingSession::new();
    let outcomes = engine.push(&plan, &mut session).await.unwrap();

    assert!(outcomes.is_empty());
    assert!(session.committed.is_empty());
}

#[tokio::test]
async fn test_changeset_unit_names_are_ordered_and_descriptive() {
    let changeset = drift::migrate::Changeset::new(
        ChangesetKind::CreateColumn,
        "public",
        "users",
    )
    .up(vec![StatementGroup::single("SELECT 1")]);

    let unit = MigrationUnit::from_changeset(3, &changeset);
    assert_eq!(unit.name, "0003_create_column_users");
    assert!(unit.transactional);
}
