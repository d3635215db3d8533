use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskdeck_core::catalog::TaskCatalog;
use taskdeck_core::definition::{DomainDefinition, ExecutorSettings};
use taskdeck_core::executor::TaskExecutor;
use taskdeck_core::handlers::{HandlerResult, ManualReviewHandler, TaskHandler};
use taskdeck_core::models::{CoreError, CoreErrorKind, Task, TaskLogLevel, TaskSpec, TaskStatus};

fn scenario_executor() -> TaskExecutor {
    let definition = DomainDefinition::from_groups(
        "scenario",
        [
            (
                "A",
                vec![
                    TaskSpec::new("A-001", "first a", ""),
                    TaskSpec::new("A-002", "second a", ""),
                ],
            ),
            ("B", vec![TaskSpec::new("B-001", "only b", "")]),
            ("C", Vec::new()),
        ],
    );
    TaskExecutor::new(TaskCatalog::build(&definition).unwrap())
}

struct CountingHandler {
    calls: AtomicUsize,
}

impl CountingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TaskHandler for CountingHandler {
    fn execute(&self, _task: &Task) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn failing(message: &'static str) -> Arc<dyn TaskHandler> {
    Arc::new(move |task: &Task| -> HandlerResult {
        Err(CoreError::new(CoreErrorKind::ExecutionFailure, message).with_task(task.id.clone()))
    })
}

#[test]
fn scenario_runs_everything_once_and_second_pass_is_a_no_op() {
    let mut executor = scenario_executor();
    let handler = CountingHandler::new();
    executor.set_default_handler(handler.clone());

    let first = executor.execute_all(None).unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.completed, 3);
    assert_eq!(first.failed, 0);
    assert_eq!(first.success_rate, 1.0);
    assert_eq!(first.newly_completed, 3);
    assert_eq!(handler.calls(), 3);

    let second = executor.execute_all(None).unwrap();
    assert_eq!(second.total, 3);
    assert_eq!(second.completed, 3);
    assert_eq!(second.newly_completed, 0);
    assert_eq!(second.transitions(), 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(handler.calls(), 3);
}

#[test]
fn one_failure_does_not_abort_the_batch() {
    let mut executor = scenario_executor();
    executor.route_task("A-002", failing("collaborator unavailable")).unwrap();

    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.completed, 2);
    assert_eq!(result.failed, 1);
    assert!((result.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    assert!(!result.is_fully_successful());

    let failed = executor.catalog().get("A-002").unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("collaborator unavailable"));
    assert!(failed.finished_at.is_some());
    assert_eq!(
        executor.catalog().get("B-001").unwrap().status,
        TaskStatus::Completed
    );
}

#[test]
fn empty_scope_reports_zero_success_rate() {
    let mut executor = scenario_executor();

    let result = executor.execute_all(Some("C")).unwrap();
    assert_eq!(result.total, 0);
    assert_eq!(result.success_rate, 0.0);
    assert_eq!(result.category.as_deref(), Some("C"));

    let empty = DomainDefinition::new("empty", ["only"]);
    let mut executor = TaskExecutor::new(TaskCatalog::build(&empty).unwrap());
    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.total, 0);
    assert_eq!(result.success_rate, 0.0);
}

#[test]
fn category_filter_only_touches_that_category() {
    let mut executor = scenario_executor();

    let result = executor.execute_all(Some("A")).unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.completed, 2);
    assert_eq!(
        executor.catalog().get("B-001").unwrap().status,
        TaskStatus::Pending
    );

    let error = executor.execute_all(Some("Z")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownCategory);
}

#[test]
fn execute_one_completes_task_and_records_timing() {
    let mut executor = scenario_executor();

    let task = executor.execute_one("B-001").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.started_at.is_some());
    assert!(task.elapsed_ms.is_some());
    assert!(task.error.is_none());
}

#[test]
fn execute_one_rejects_tasks_that_already_ran() {
    let mut executor = scenario_executor();
    executor.execute_one("A-001").unwrap();

    let error = executor.execute_one("A-001").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidState);
    assert_eq!(error.task.unwrap().as_str(), "A-001");

    let error = executor.execute_one("A-404").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::TaskNotFound);
}

#[test]
fn handler_failure_is_recorded_not_returned() {
    let mut executor = scenario_executor();
    executor.route_category("B", failing("exit status 3")).unwrap();

    let task = executor.execute_one("B-001").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("exit status 3"));
}

#[test]
fn panicking_handler_marks_only_its_task_failed() {
    let mut executor = scenario_executor();
    let panicking: Arc<dyn TaskHandler> =
        Arc::new(|_task: &Task| -> HandlerResult { panic!("handler bug") });
    executor.route_task("A-001", panicking).unwrap();

    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(result.completed, 2);

    let task = executor.catalog().get("A-001").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("handler bug"));
}

#[test]
fn task_route_wins_over_category_route() {
    let mut executor = scenario_executor();
    let category_handler = CountingHandler::new();
    let task_handler = CountingHandler::new();
    executor.route_category("A", category_handler.clone()).unwrap();
    executor.route_task("A-002", task_handler.clone()).unwrap();

    executor.execute_all(None).unwrap();
    assert_eq!(category_handler.calls(), 1);
    assert_eq!(task_handler.calls(), 1);
}

#[test]
fn routing_to_unknown_targets_fails() {
    let mut executor = scenario_executor();

    let error = executor
        .route_category("Z", Arc::new(ManualReviewHandler))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownCategory);

    let error = executor
        .route_task("Z-001", Arc::new(ManualReviewHandler))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::TaskNotFound);
}

#[test]
fn manual_review_handler_fails_fast() {
    let mut executor = scenario_executor();
    executor.route_task("A-001", Arc::new(ManualReviewHandler)).unwrap();

    let task = executor.execute_one("A-001").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("manual completion"));
}

#[test]
fn reset_returns_terminal_task_to_pending_with_audit_record() {
    let mut executor = scenario_executor();
    executor.route_task("A-001", failing("first attempt failed")).unwrap();
    executor.execute_one("A-001").unwrap();

    let task = executor.reset("A-001").unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.error.is_none());
    assert!(task.started_at.is_none());

    let audit = executor.task_log().last().unwrap();
    assert_eq!(audit.level, TaskLogLevel::Warn);
    assert_eq!(audit.from, Some(TaskStatus::Failed));
    assert_eq!(audit.to, TaskStatus::Pending);
    assert!(audit.message.contains("first attempt failed"));

    executor.route_task("A-001", CountingHandler::new()).unwrap();
    let task = executor.execute_one("A-001").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn reset_of_pending_task_is_invalid_state() {
    let mut executor = scenario_executor();

    let error = executor.reset("B-001").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidState);
}

#[test]
fn task_log_tracks_each_transition_in_order() {
    let mut executor = scenario_executor();
    executor.execute_one("B-001").unwrap();

    let transitions: Vec<(Option<TaskStatus>, TaskStatus)> = executor
        .task_log()
        .iter()
        .map(|record| (record.from, record.to))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (Some(TaskStatus::Pending), TaskStatus::Running),
            (Some(TaskStatus::Running), TaskStatus::Completed),
        ]
    );
    assert!(
        executor
            .task_log()
            .iter()
            .all(|record| record.domain == "scenario")
    );
}

fn gated_executor() -> TaskExecutor {
    let definition = DomainDefinition::new("gated", ["filing"])
        .task(TaskSpec::new("FIL-001", "assemble packet", "filing"))
        .task(TaskSpec::new("FIL-002", "submit packet", "filing").requires_review(true))
        .settings(ExecutorSettings::default().with_review_gate(true));
    TaskExecutor::from_definition(&definition).unwrap()
}

#[test]
fn review_gate_holds_unapproved_tasks() {
    let mut executor = gated_executor();

    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.completed, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(
        executor.catalog().get("FIL-002").unwrap().status,
        TaskStatus::AwaitingReview
    );

    let error = executor.execute_one("FIL-002").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidState);
}

#[test]
fn approved_task_runs_on_the_next_pass() {
    let mut executor = gated_executor();
    executor.execute_all(None).unwrap();

    let task = executor.approve("FIL-002", "reviewer@example.org").unwrap();
    assert_eq!(task.reviewed_by.as_deref(), Some("reviewer@example.org"));

    let result = executor.execute_all(None).unwrap();
    assert_eq!(result.newly_completed, 1);
    assert_eq!(result.completed, 2);
    assert_eq!(result.success_rate, 1.0);
}

#[test]
fn approval_before_first_attempt_lets_the_task_run_directly() {
    let mut executor = gated_executor();
    executor.approve("FIL-002", "lead").unwrap();

    let task = executor.execute_one("FIL-002").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn approve_validates_reviewer_and_task() {
    let mut executor = gated_executor();

    let error = executor.approve("FIL-002", "   ").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);

    let error = executor.approve("FIL-001", "lead").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);

    executor.approve("FIL-002", "lead").unwrap();
    executor.execute_one("FIL-002").unwrap();
    let error = executor.approve("FIL-002", "lead").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidState);
}

#[test]
fn without_the_gate_requires_review_is_advisory() {
    let definition = DomainDefinition::new("open", ["filing"])
        .task(TaskSpec::new("FIL-001", "submit packet", "filing").requires_review(true));
    let mut executor = TaskExecutor::from_definition(&definition).unwrap();

    let task = executor.execute_one("FIL-001").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn reset_clears_approval() {
    let mut executor = gated_executor();
    executor.approve("FIL-002", "lead").unwrap();
    executor.execute_one("FIL-002").unwrap();

    let task = executor.reset("FIL-002").unwrap();
    assert!(task.reviewed_by.is_none());

    executor.execute_all(Some("filing")).unwrap();
    assert_eq!(
        executor.catalog().get("FIL-002").unwrap().status,
        TaskStatus::AwaitingReview
    );
}

#[test]
fn gated_execute_one_returns_the_held_task() {
    let mut executor = gated_executor();

    let task = executor.execute_one("FIL-002").unwrap();
    assert_eq!(task.status, TaskStatus::AwaitingReview);
    assert!(task.started_at.is_none());

    let catalog = executor.into_catalog();
    assert_eq!(catalog.status_counts()["awaiting_review"], 1);
}
