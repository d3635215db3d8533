use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::executor::{
    Admission, ExecutorResult, RunCounters, TaskExecutor, persist_log, persist_run,
};
use crate::handlers::{self, HandlerResult};
use crate::models::{CoreError, CoreErrorKind, ExecutionResult, TaskLogRecord};
use crate::persistence::RunHistoryStore;

const CANCELLED: &str = "parallel run was cancelled before the task finished";
const LOST_BRANCH: &str = "task branch ended without reporting an outcome";

struct BranchOutcome {
    position: usize,
    outcome: HandlerResult,
    started_at: OffsetDateTime,
    elapsed: Duration,
}

/// Executor borrow held for one parallel run. History writes are buffered
/// while it is alive. Dropping it mid-run fails every task still marked
/// running and hands the buffered records to the blocking pool.
struct ParallelRun<'a> {
    executor: &'a mut TaskExecutor,
    history: Option<Arc<dyn RunHistoryStore>>,
    log_start: usize,
    in_flight: BTreeSet<usize>,
}

impl<'a> ParallelRun<'a> {
    fn begin(executor: &'a mut TaskExecutor) -> Self {
        let history = executor.history.take();
        let log_start = executor.task_log.len();
        Self {
            executor,
            history,
            log_start,
            in_flight: BTreeSet::new(),
        }
    }

    fn take_buffered(&mut self) -> Vec<TaskLogRecord> {
        let records = self.executor.task_log[self.log_start..].to_vec();
        self.log_start = self.executor.task_log.len();
        records
    }

    /// Puts the store back on the executor and writes the buffered records
    /// and the run summary from the blocking pool.
    async fn flush(mut self, result: &ExecutionResult) {
        let records = self.take_buffered();
        let Some(store) = self.history.take() else {
            return;
        };
        self.executor.history = Some(store.clone());

        let domain = self.executor.catalog.domain().name.clone();
        let result = result.clone();
        let written = tokio::task::spawn_blocking(move || {
            for record in &records {
                persist_log(store.as_ref(), record);
            }
            persist_run(store.as_ref(), &domain, &result);
        })
        .await;

        if let Err(join_error) = written {
            tracing::error!(
                domain = %self.executor.catalog.domain().name,
                error = %join_error,
                "run history flush did not join"
            );
        }
    }
}

impl Drop for ParallelRun<'_> {
    fn drop(&mut self) {
        for position in std::mem::take(&mut self.in_flight) {
            self.executor.abandon(position, CANCELLED);
        }

        let records = self.take_buffered();
        let Some(store) = self.history.take() else {
            return;
        };
        self.executor.history = Some(store.clone());
        if records.is_empty() {
            return;
        }

        let write = move || {
            for record in &records {
                persist_log(store.as_ref(), record);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn_blocking(write)),
            Err(_) => write(),
        }
    }
}

impl TaskExecutor {
    /// Fan-out variant of [`TaskExecutor::execute_all`]. Handlers run on the
    /// blocking pool with at most `max_parallelism` in flight; statuses and
    /// the aggregate result are only updated once every branch has joined.
    ///
    /// If the returned future is dropped before it completes, tasks that were
    /// already started end up `failed` and can be `reset`.
    pub async fn execute_all_parallel(
        &mut self,
        category: Option<&str>,
    ) -> ExecutorResult<ExecutionResult> {
        let started = Instant::now();
        let scope = self.catalog.scope(category)?;
        let mut run = ParallelRun::begin(self);
        let mut counters = RunCounters::default();
        let mut branches = Vec::new();

        for &position in &scope {
            match run.executor.admission(position) {
                Admission::Run => {
                    run.executor.mark_running(position);
                    run.in_flight.insert(position);
                    let task = run.executor.catalog.task_at(position).clone();
                    let handler = run.executor.routes.resolve(&task);
                    branches.push((position, task, handler));
                }
                Admission::HoldForReview => {
                    run.executor.hold_for_review(position);
                    counters.skipped += 1;
                }
                Admission::Reject(_) => counters.skipped += 1,
            }
        }

        let permits = Arc::new(Semaphore::new(run.executor.settings.parallelism()));
        let mut join_set = JoinSet::new();
        for (position, task, handler) in branches {
            let permits = permits.clone();
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let task_id = task.id.clone();
                let started_at = OffsetDateTime::now_utc();
                let started = Instant::now();
                let outcome =
                    tokio::task::spawn_blocking(move || handlers::invoke(handler.as_ref(), &task))
                        .await
                        .unwrap_or_else(|join_error| {
                            Err(CoreError::new(
                                CoreErrorKind::Internal,
                                format!("task handler join failure: {join_error}"),
                            )
                            .with_task(task_id))
                        });
                BranchOutcome {
                    position,
                    outcome,
                    started_at,
                    elapsed: started.elapsed(),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(run.in_flight.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(branch) => outcomes.push(branch),
                Err(join_error) => {
                    tracing::error!(
                        domain = %run.executor.catalog.domain().name,
                        error = %join_error,
                        "parallel task branch did not join"
                    );
                }
            }
        }

        outcomes.sort_by_key(|branch| branch.position);
        for branch in outcomes {
            run.in_flight.remove(&branch.position);
            let task = run.executor.catalog.task_at_mut(branch.position);
            task.started_at = Some(branch.started_at);
            let status = run
                .executor
                .finish(branch.position, branch.outcome, branch.elapsed);
            counters.record(status);
        }
        for position in std::mem::take(&mut run.in_flight) {
            run.executor.abandon(position, LOST_BRANCH);
            counters.newly_failed += 1;
        }

        let result = run
            .executor
            .summarize(category, &scope, counters, started.elapsed());
        run.flush(&result).await;
        Ok(result)
    }
}
