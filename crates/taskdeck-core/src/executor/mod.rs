pub mod parallel;
pub mod routes;

pub use routes::HandlerRoutes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::catalog::TaskCatalog;
use crate::definition::{DomainDefinition, ExecutorSettings};
use crate::handlers::{self, HandlerResult, TaskHandler};
use crate::models::{
    CoreError, CoreErrorKind, ExecutionResult, Task, TaskId, TaskLogLevel, TaskLogRecord,
    TaskStatus,
};
use crate::persistence::RunHistoryStore;

pub type ExecutorResult<T> = Result<T, CoreError>;

/// Runs the tasks of one catalog and owns that catalog for its lifetime.
pub struct TaskExecutor {
    catalog: TaskCatalog,
    routes: HandlerRoutes,
    settings: ExecutorSettings,
    task_log: Vec<TaskLogRecord>,
    history: Option<Arc<dyn RunHistoryStore>>,
}

enum Admission {
    Run,
    HoldForReview,
    Reject(TaskStatus),
}

#[derive(Default)]
struct RunCounters {
    newly_completed: usize,
    newly_failed: usize,
    skipped: usize,
}

impl RunCounters {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => self.newly_completed += 1,
            TaskStatus::Failed => self.newly_failed += 1,
            _ => {}
        }
    }
}

impl TaskExecutor {
    pub fn new(catalog: TaskCatalog) -> Self {
        Self {
            catalog,
            routes: HandlerRoutes::default(),
            settings: ExecutorSettings::default(),
            task_log: Vec::new(),
            history: None,
        }
    }

    pub fn from_definition(definition: &DomainDefinition) -> ExecutorResult<Self> {
        Ok(Self::new(TaskCatalog::build(definition)?).with_settings(definition.settings))
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_default_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.routes.set_default(handler);
        self
    }

    pub fn with_history_store(mut self, store: Arc<dyn RunHistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn set_default_handler(&mut self, handler: Arc<dyn TaskHandler>) {
        self.routes.set_default(handler);
    }

    pub fn route_category(
        &mut self,
        category: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> ExecutorResult<()> {
        self.catalog.ensure_category(category)?;
        self.routes.insert_category(category.to_string(), handler);
        Ok(())
    }

    pub fn route_task(&mut self, id: &str, handler: Arc<dyn TaskHandler>) -> ExecutorResult<()> {
        let position = self.catalog.position(id)?;
        let task_id = self.catalog.task_at(position).id.clone();
        self.routes.insert_task(task_id, handler);
        Ok(())
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> TaskCatalog {
        self.catalog
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn routes(&self) -> &HandlerRoutes {
        &self.routes
    }

    /// Audit trail of every transition, approval and reset, oldest first.
    pub fn task_log(&self) -> &[TaskLogRecord] {
        &self.task_log
    }

    /// Runs a single task. Handler failures are recorded on the returned
    /// task rather than returned as errors; a task that is not runnable
    /// fails with `InvalidState`.
    pub fn execute_one(&mut self, id: &str) -> ExecutorResult<&Task> {
        let position = self.catalog.position(id)?;
        match self.admission(position) {
            Admission::Run => {
                let (outcome, elapsed) = self.run_handler(position);
                self.finish(position, outcome, elapsed);
            }
            Admission::HoldForReview => self.hold_for_review(position),
            Admission::Reject(status) => return Err(self.not_runnable(position, status)),
        }
        Ok(self.catalog.task_at(position))
    }

    /// Runs every runnable task in catalog order, optionally restricted to one
    /// category. Tasks that are not runnable are skipped.
    pub fn execute_all(&mut self, category: Option<&str>) -> ExecutorResult<ExecutionResult> {
        let started = Instant::now();
        let scope = self.catalog.scope(category)?;
        let mut counters = RunCounters::default();

        for &position in &scope {
            match self.admission(position) {
                Admission::Run => {
                    let (outcome, elapsed) = self.run_handler(position);
                    counters.record(self.finish(position, outcome, elapsed));
                }
                Admission::HoldForReview => {
                    self.hold_for_review(position);
                    counters.skipped += 1;
                }
                Admission::Reject(status) => {
                    tracing::trace!(
                        task_id = %self.catalog.task_at(position).id,
                        status = status.as_str(),
                        "skipping task that is not runnable"
                    );
                    counters.skipped += 1;
                }
            }
        }

        Ok(self.summarize(category, &scope, counters, started.elapsed()))
    }

    pub fn approve(&mut self, id: &str, reviewer: &str) -> ExecutorResult<&Task> {
        let position = self.catalog.position(id)?;
        let reviewer = reviewer.trim();
        let task = self.catalog.task_at(position);
        let status = task.status;

        if reviewer.is_empty() {
            return Err(self.task_error(
                position,
                CoreErrorKind::InvalidInput,
                "reviewer must not be empty",
            ));
        }
        if !task.requires_review {
            return Err(self.task_error(
                position,
                CoreErrorKind::InvalidInput,
                format!("task '{}' does not require review", task.id),
            ));
        }
        if !matches!(status, TaskStatus::Pending | TaskStatus::AwaitingReview) {
            return Err(self.task_error(
                position,
                CoreErrorKind::InvalidState,
                format!(
                    "task '{}' cannot be approved from '{}'",
                    task.id,
                    status.as_str()
                ),
            ));
        }

        self.catalog.task_at_mut(position).reviewed_by = Some(reviewer.to_string());
        self.record(
            position,
            Some(status),
            status,
            TaskLogLevel::Info,
            format!("approved by {reviewer}"),
        );
        Ok(self.catalog.task_at(position))
    }

    /// Returns a completed or failed task to `pending`, discarding its
    /// previous outcome and approval.
    pub fn reset(&mut self, id: &str) -> ExecutorResult<&Task> {
        let position = self.catalog.position(id)?;
        let task = self.catalog.task_at(position);
        let previous = task.status;

        if !previous.is_terminal() {
            return Err(self.task_error(
                position,
                CoreErrorKind::InvalidState,
                format!(
                    "task '{}' cannot be reset from '{}'; only completed or failed tasks can",
                    task.id,
                    previous.as_str()
                ),
            ));
        }

        let message = match &task.error {
            Some(error) => format!("reset from {} (last error: {error})", previous.as_str()),
            None => format!("reset from {}", previous.as_str()),
        };
        tracing::warn!(
            domain = %self.catalog.domain().name,
            task_id = %task.id,
            previous = previous.as_str(),
            "task reset to pending"
        );

        let task = self.catalog.task_at_mut(position);
        task.status = TaskStatus::Pending;
        task.clear_runtime();
        self.record(
            position,
            Some(previous),
            TaskStatus::Pending,
            TaskLogLevel::Warn,
            message,
        );
        Ok(self.catalog.task_at(position))
    }

    fn admission(&self, position: usize) -> Admission {
        let task = self.catalog.task_at(position);
        match task.status {
            TaskStatus::Pending
                if self.settings.review_gate && task.requires_review && !task.is_approved() =>
            {
                Admission::HoldForReview
            }
            TaskStatus::Pending => Admission::Run,
            TaskStatus::AwaitingReview if task.is_approved() => Admission::Run,
            status => Admission::Reject(status),
        }
    }

    fn hold_for_review(&mut self, position: usize) {
        let task = self.catalog.task_at_mut(position);
        let previous = task.status;
        task.status = TaskStatus::AwaitingReview;
        tracing::debug!(task_id = %task.id, "task held for review approval");
        self.record(
            position,
            Some(previous),
            TaskStatus::AwaitingReview,
            TaskLogLevel::Info,
            "held for review approval".to_string(),
        );
    }

    fn mark_running(&mut self, position: usize) {
        let task = self.catalog.task_at_mut(position);
        let previous = task.status;
        task.status = TaskStatus::Running;
        task.started_at = None;
        task.finished_at = None;
        task.elapsed_ms = None;
        task.error = None;
        tracing::debug!(task_id = %task.id, category = %task.category, "task running");
        self.record(
            position,
            Some(previous),
            TaskStatus::Running,
            TaskLogLevel::Info,
            "started".to_string(),
        );
    }

    fn run_handler(&mut self, position: usize) -> (HandlerResult, Duration) {
        self.mark_running(position);
        self.catalog.task_at_mut(position).started_at = Some(OffsetDateTime::now_utc());
        let task = self.catalog.task_at(position);
        let handler = self.routes.resolve(task);
        let started = Instant::now();
        let outcome = handlers::invoke(handler.as_ref(), task);
        (outcome, started.elapsed())
    }

    fn finish(&mut self, position: usize, outcome: HandlerResult, elapsed: Duration) -> TaskStatus {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let task = self.catalog.task_at_mut(position);
        task.finished_at = Some(OffsetDateTime::now_utc());
        task.elapsed_ms = Some(elapsed_ms);

        let (status, level, message) = match outcome {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                tracing::debug!(task_id = %task.id, elapsed_ms, "task completed");
                (TaskStatus::Completed, TaskLogLevel::Info, "completed".to_string())
            }
            Err(error) => {
                tracing::warn!(
                    task_id = %task.id,
                    category = %task.category,
                    kind = error.kind.as_str(),
                    message = %error.message,
                    "task failed"
                );
                task.status = TaskStatus::Failed;
                task.error = Some(error.message.clone());
                (TaskStatus::Failed, TaskLogLevel::Error, error.message)
            }
        };

        self.record(position, Some(TaskStatus::Running), status, level, message);
        status
    }

    /// Fails a task whose handler outcome will never be applied.
    fn abandon(&mut self, position: usize, reason: &str) {
        let task = self.catalog.task_at_mut(position);
        if task.status != TaskStatus::Running {
            return;
        }
        task.status = TaskStatus::Failed;
        task.finished_at = Some(OffsetDateTime::now_utc());
        task.error = Some(reason.to_string());
        tracing::warn!(
            task_id = %task.id,
            category = %task.category,
            message = reason,
            "task abandoned while running"
        );
        self.record(
            position,
            Some(TaskStatus::Running),
            TaskStatus::Failed,
            TaskLogLevel::Error,
            reason.to_string(),
        );
    }

    fn summarize(
        &self,
        category: Option<&str>,
        scope: &[usize],
        counters: RunCounters,
        elapsed: Duration,
    ) -> ExecutionResult {
        let (completed, failed) =
            scope
                .iter()
                .fold((0, 0), |(completed, failed), &position| {
                    match self.catalog.task_at(position).status {
                        TaskStatus::Completed => (completed + 1, failed),
                        TaskStatus::Failed => (completed, failed + 1),
                        _ => (completed, failed),
                    }
                });

        let result = ExecutionResult {
            category: category.map(str::to_string),
            total: scope.len(),
            completed,
            failed,
            newly_completed: counters.newly_completed,
            newly_failed: counters.newly_failed,
            skipped: counters.skipped,
            success_rate: ExecutionResult::success_rate(completed, scope.len()),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timestamp: OffsetDateTime::now_utc(),
        };

        let domain = &self.catalog.domain().name;
        tracing::info!(
            domain = %domain,
            category = category.unwrap_or("*"),
            total = result.total,
            completed = result.completed,
            failed = result.failed,
            newly_completed = result.newly_completed,
            newly_failed = result.newly_failed,
            skipped = result.skipped,
            success_rate = result.success_rate,
            "task run finished"
        );

        if let Some(store) = &self.history {
            persist_run(store.as_ref(), domain, &result);
        }

        result
    }

    fn record(
        &mut self,
        position: usize,
        from: Option<TaskStatus>,
        to: TaskStatus,
        level: TaskLogLevel,
        message: String,
    ) {
        let record = TaskLogRecord {
            domain: self.catalog.domain().name.clone(),
            task_id: self.catalog.task_at(position).id.clone(),
            from,
            to,
            level,
            message,
            created_at: OffsetDateTime::now_utc(),
        };

        if let Some(store) = &self.history {
            persist_log(store.as_ref(), &record);
        }

        self.task_log.push(record);
    }

    fn not_runnable(&self, position: usize, status: TaskStatus) -> CoreError {
        let id = &self.catalog.task_at(position).id;
        let message = match status {
            TaskStatus::AwaitingReview => format!("task '{id}' is awaiting review approval"),
            status => format!(
                "task '{id}' cannot transition from '{}' to 'running'",
                status.as_str()
            ),
        };
        self.task_error(position, CoreErrorKind::InvalidState, message)
    }

    fn task_error(
        &self,
        position: usize,
        kind: CoreErrorKind,
        message: impl Into<String>,
    ) -> CoreError {
        let task_id: TaskId = self.catalog.task_at(position).id.clone();
        CoreError::new(kind, message)
            .with_domain(self.catalog.domain().name.clone())
            .with_task(task_id)
    }
}

fn persist_log(store: &dyn RunHistoryStore, record: &TaskLogRecord) {
    if let Err(error) = store.record_log(record) {
        tracing::error!(
            task_id = %record.task_id,
            kind = error.kind.as_str(),
            message = %error.message,
            "failed to persist task log record"
        );
    }
}

fn persist_run(store: &dyn RunHistoryStore, domain: &str, result: &ExecutionResult) {
    if let Err(error) = store.record_run(domain, result) {
        tracing::error!(
            domain = %domain,
            kind = error.kind.as_str(),
            message = %error.message,
            "failed to persist run summary"
        );
    }
}
