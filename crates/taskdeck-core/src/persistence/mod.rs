use serde::{Deserialize, Serialize};

use crate::models::{CoreError, ExecutionResult, TaskId, TaskLogRecord};

pub type PersistenceResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: u64,
    pub domain: String,
    pub result: ExecutionResult,
}

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Write-mostly audit sink for executor runs. Nothing stored here is ever
/// loaded back into a catalog.
pub trait RunHistoryStore: Send + Sync {
    fn record_run(&self, domain: &str, result: &ExecutionResult) -> PersistenceResult<u64>;

    fn record_log(&self, record: &TaskLogRecord) -> PersistenceResult<()>;

    fn list_recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunRecord>>;

    fn list_task_log(&self, domain: &str, task_id: &TaskId)
    -> PersistenceResult<Vec<TaskLogRecord>>;
}
