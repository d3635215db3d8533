use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use taskdeck_core::definition::DomainDefinition;
use taskdeck_core::executor::TaskExecutor;
use taskdeck_core::models::{CoreErrorKind, TaskId, TaskLogLevel, TaskSpec, TaskStatus};
use taskdeck_core::persistence::{MigrationStore, RunHistoryStore};
use taskdeck_core::sqlite::{SqliteRunHistoryStore, current_schema_version};

fn test_db_path(test_name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("taskdeck-{test_name}-{nanos}.sqlite3"))
}

fn migrated_store(test_name: &str) -> (Arc<SqliteRunHistoryStore>, std::path::PathBuf) {
    let path = test_db_path(test_name);
    let store = SqliteRunHistoryStore::new(&path);
    store.migrate_to_latest().unwrap();
    (Arc::new(store), path)
}

fn definition() -> DomainDefinition {
    DomainDefinition::new("history", ["ops"])
        .task(TaskSpec::new("OPS-001", "rotate keys", "ops"))
        .task(TaskSpec::new("OPS-002", "prune backups", "ops"))
}

#[test]
fn migrations_move_up_and_down() {
    let path = test_db_path("migrations");
    let store = SqliteRunHistoryStore::new(&path);

    assert_eq!(store.current_version().unwrap(), 0);
    assert_eq!(store.planned_migrations(0).len(), 1);

    store.migrate_to_latest().unwrap();
    assert_eq!(store.current_version().unwrap(), current_schema_version());
    assert!(store.planned_migrations(current_schema_version()).is_empty());

    store.apply_migration(0).unwrap();
    assert_eq!(store.current_version().unwrap(), 0);

    let error = store.apply_migration(current_schema_version() + 1).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Storage);

    let _ = std::fs::remove_file(path);
}

#[test]
fn unmigrated_store_reports_storage_errors() {
    let path = test_db_path("unmigrated");
    let store = SqliteRunHistoryStore::new(&path);

    let error = store.list_recent_runs(5).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Storage);

    let _ = std::fs::remove_file(path);
}

#[test]
fn executor_persists_run_summaries_newest_first() {
    let (store, path) = migrated_store("runs");
    let mut executor = TaskExecutor::from_definition(&definition())
        .unwrap()
        .with_history_store(store.clone());

    let first = executor.execute_all(None).unwrap();
    executor.reset("OPS-002").unwrap();
    let second = executor.execute_all(Some("ops")).unwrap();

    let runs = store.list_recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].run_id > runs[1].run_id);
    assert_eq!(runs[0].domain, "history");
    assert_eq!(runs[0].result, second);
    assert_eq!(runs[1].result, first);
    assert_eq!(runs[0].result.category.as_deref(), Some("ops"));
    assert_eq!(runs[0].result.newly_completed, 1);
    assert_eq!(runs[0].result.skipped, 1);

    assert_eq!(store.list_recent_runs(1).unwrap().len(), 1);
    assert!(store.list_recent_runs(0).unwrap().is_empty());

    let _ = std::fs::remove_file(path);
}

#[test]
fn executor_persists_task_log_including_reset_audit() {
    let (store, path) = migrated_store("task-log");
    let mut executor = TaskExecutor::from_definition(&definition())
        .unwrap()
        .with_history_store(store.clone());

    executor.execute_one("OPS-001").unwrap();
    executor.reset("OPS-001").unwrap();

    let records = store
        .list_task_log("history", &TaskId::from("OPS-001"))
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records, executor.task_log());
    assert_eq!(records[2].level, TaskLogLevel::Warn);
    assert_eq!(records[2].from, Some(TaskStatus::Completed));
    assert_eq!(records[2].to, TaskStatus::Pending);

    assert!(
        store
            .list_task_log("history", &TaskId::from("OPS-002"))
            .unwrap()
            .is_empty()
    );

    let _ = std::fs::remove_file(path);
}

#[test]
fn store_failures_do_not_fail_the_run() {
    let path = test_db_path("never-migrated");
    let store = Arc::new(SqliteRunHistoryStore::new(&path));
    let mut executor = TaskExecutor::from_definition(&definition())
        .unwrap()
        .with_history_store(store);

    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.completed, 2);

    let _ = std::fs::remove_file(path);
}
