#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_run_history_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS run_records (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    category TEXT,
    total INTEGER NOT NULL,
    completed INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    newly_completed INTEGER NOT NULL,
    newly_failed INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    success_rate REAL NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_log (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    task_id TEXT NOT NULL,
    from_status TEXT,
    to_status TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_log_task
    ON task_log (domain, task_id, log_id);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_task_log_task;
DROP TABLE IF EXISTS task_log;
DROP TABLE IF EXISTS run_records;
"#,
};

const MIGRATIONS: [SqliteMigration; 1] = [MIGRATION_0001];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
