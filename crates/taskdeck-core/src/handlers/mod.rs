pub mod external;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::models::{CoreError, CoreErrorKind, Task};

pub use external::{
    CollaboratorRequest, CollaboratorResponse, CommandCollaborator, CommandSpec, Collaborator,
    ExternalCallHandler,
};

pub type HandlerResult = Result<(), CoreError>;

/// Execution step attached to a task. Errors mark the task failed; they are
/// never propagated out of the executor.
pub trait TaskHandler: Send + Sync {
    fn execute(&self, task: &Task) -> HandlerResult;
}

impl<F> TaskHandler for F
where
    F: Fn(&Task) -> HandlerResult + Send + Sync,
{
    fn execute(&self, task: &Task) -> HandlerResult {
        self(task)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpHandler;

impl TaskHandler for NoOpHandler {
    fn execute(&self, task: &Task) -> HandlerResult {
        tracing::info!(
            task_id = %task.id,
            category = %task.category,
            name = %task.name,
            "task executed"
        );
        Ok(())
    }
}

/// Refuses to run anything; the task has to be signed off by a person.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManualReviewHandler;

impl TaskHandler for ManualReviewHandler {
    fn execute(&self, task: &Task) -> HandlerResult {
        Err(CoreError::new(
            CoreErrorKind::ReviewRequired,
            format!("task '{}' requires manual completion", task.id),
        )
        .with_task(task.id.clone()))
    }
}

pub(crate) fn invoke(handler: &dyn TaskHandler, task: &Task) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.execute(task))) {
        Ok(result) => result,
        Err(payload) => Err(CoreError::new(
            CoreErrorKind::Internal,
            format!("task handler panicked: {}", panic_message(payload.as_ref())),
        )
        .with_task(task.id.clone())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{HandlerResult, ManualReviewHandler, NoOpHandler, TaskHandler, invoke};
    use crate::models::{CoreErrorKind, Task, TaskSpec};

    fn task() -> Task {
        Task::from_spec(&TaskSpec::new("CMP-001", "Filing check", "compliance"))
    }

    #[test]
    fn noop_handler_succeeds() {
        assert!(NoOpHandler.execute(&task()).is_ok());
    }

    #[test]
    fn manual_review_handler_always_fails() {
        let error = ManualReviewHandler.execute(&task()).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ReviewRequired);
        assert_eq!(error.task.unwrap().as_str(), "CMP-001");
    }

    #[test]
    fn panics_are_converted_into_internal_errors() {
        let handler = |_: &Task| -> HandlerResult { panic!("simulated handler panic") };
        let error = invoke(&handler, &task()).unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::Internal);
        assert!(error.message.contains("simulated handler panic"));
    }
}
