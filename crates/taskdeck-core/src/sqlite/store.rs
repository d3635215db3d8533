use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, Row, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::models::{
    CoreError, CoreErrorKind, ExecutionResult, TaskId, TaskLogLevel, TaskLogRecord, TaskStatus,
};
use crate::persistence::{MigrationStore, PersistenceResult, RunHistoryStore, RunRecord};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "taskdeck_schema_migrations";

pub struct SqliteRunHistoryStore {
    database_path: PathBuf,
}

impl SqliteRunHistoryStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteRunHistoryStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl RunHistoryStore for SqliteRunHistoryStore {
    fn record_run(&self, domain: &str, result: &ExecutionResult) -> PersistenceResult<u64> {
        self.with_connection("record_run", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO run_records (
    domain, category, total, completed, failed, newly_completed, newly_failed,
    skipped, success_rate, elapsed_ms, recorded_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
",
                params![
                    domain,
                    result.category.as_deref(),
                    to_i64(result.total)?,
                    to_i64(result.completed)?,
                    to_i64(result.failed)?,
                    to_i64(result.newly_completed)?,
                    to_i64(result.newly_failed)?,
                    to_i64(result.skipped)?,
                    result.success_rate,
                    i64::try_from(result.elapsed_ms).unwrap_or(i64::MAX),
                    format_timestamp(result.timestamp)?,
                ],
            )?;
            i64_to_u64(connection.last_insert_rowid())
        })
    }

    fn record_log(&self, record: &TaskLogRecord) -> PersistenceResult<()> {
        self.with_connection("record_log", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO task_log (domain, task_id, from_status, to_status, level, message, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
",
                params![
                    record.domain,
                    record.task_id.as_str(),
                    record.from.map(TaskStatus::as_str),
                    record.to.as_str(),
                    record.level.as_str(),
                    record.message,
                    format_timestamp(record.created_at)?,
                ],
            )?;
            Ok(())
        })
    }

    fn list_recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_recent_runs", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT run_id, domain, category, total, completed, failed, newly_completed,
       newly_failed, skipped, success_rate, elapsed_ms, recorded_at
FROM run_records
ORDER BY run_id DESC
LIMIT ?1
",
            )?;
            let rows = statement.query_map(params![to_i64(limit)?], run_record_from_row)?;
            rows.collect()
        })
    }

    fn list_task_log(
        &self,
        domain: &str,
        task_id: &TaskId,
    ) -> PersistenceResult<Vec<TaskLogRecord>> {
        self.with_connection("list_task_log", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT domain, task_id, from_status, to_status, level, message, created_at
FROM task_log
WHERE domain = ?1 AND task_id = ?2
ORDER BY log_id ASC
",
            )?;
            let rows = statement.query_map(params![domain, task_id.as_str()], |row| {
                let from_raw: Option<String> = row.get(2)?;
                let to_raw: String = row.get(3)?;
                let level_raw: String = row.get(4)?;
                let created_raw: String = row.get(6)?;

                Ok(TaskLogRecord {
                    domain: row.get(0)?,
                    task_id: TaskId::new(row.get::<_, String>(1)?),
                    from: from_raw.as_deref().map(parse_task_status).transpose()?,
                    to: parse_task_status(&to_raw)?,
                    level: parse_log_level(&level_raw)?,
                    message: row.get(5)?,
                    created_at: parse_timestamp(&created_raw)?,
                })
            })?;
            rows.collect()
        })
    }
}

fn run_record_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let run_id: i64 = row.get(0)?;
    let recorded_raw: String = row.get(11)?;
    let elapsed_ms: i64 = row.get(10)?;

    Ok(RunRecord {
        run_id: i64_to_u64(run_id)?,
        domain: row.get(1)?,
        result: ExecutionResult {
            category: row.get(2)?,
            total: to_usize(row.get(3)?)?,
            completed: to_usize(row.get(4)?)?,
            failed: to_usize(row.get(5)?)?,
            newly_completed: to_usize(row.get(6)?)?,
            newly_failed: to_usize(row.get(7)?)?,
            skipped: to_usize(row.get(8)?)?,
            success_rate: row.get(9)?,
            elapsed_ms: i64_to_u64(elapsed_ms)?,
            timestamp: parse_timestamp(&recorded_raw)?,
        },
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before recording runs",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::Storage,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}

fn parse_task_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    raw.parse::<TaskStatus>().map_err(|_| {
        storage_error_sqlite(&format!("unknown task status '{raw}' in sqlite record"))
    })
}

fn parse_log_level(raw: &str) -> rusqlite::Result<TaskLogLevel> {
    raw.parse::<TaskLogLevel>().map_err(|_| {
        storage_error_sqlite(&format!("unknown log level '{raw}' in sqlite record"))
    })
}

fn format_timestamp(value: OffsetDateTime) -> rusqlite::Result<String> {
    value
        .format(&Rfc3339)
        .map_err(|error| storage_error_sqlite(&format!("failed to format timestamp: {error}")))
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|error| {
        storage_error_sqlite(&format!("invalid timestamp '{raw}' in sqlite record: {error}"))
    })
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative value in sqlite record"))
}

fn to_usize(value: i64) -> rusqlite::Result<usize> {
    usize::try_from(value).map_err(|_| storage_error_sqlite("count out of range in sqlite record"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}
