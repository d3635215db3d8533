use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Aggregate of one `execute_all` call.
///
/// `completed` and `failed` count catalog state inside the run's scope after
/// the run; the `newly_*` counters only count transitions made by this call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub category: Option<String>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub newly_completed: usize,
    pub newly_failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub elapsed_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ExecutionResult {
    pub fn success_rate(completed: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        }
    }

    pub fn is_fully_successful(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    pub fn transitions(&self) -> usize {
        self.newly_completed + self.newly_failed
    }
}
