use thiserror::Error;

use crate::models::TaskId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    DuplicateId,
    UnknownCategory,
    TaskNotFound,
    InvalidState,
    InvalidInput,
    ParseFailure,
    Storage,
    ExecutionFailure,
    ReviewRequired,
    Internal,
}

impl CoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateId => "duplicate_id",
            Self::UnknownCategory => "unknown_category",
            Self::TaskNotFound => "task_not_found",
            Self::InvalidState => "invalid_state",
            Self::InvalidInput => "invalid_input",
            Self::ParseFailure => "parse_failure",
            Self::Storage => "storage",
            Self::ExecutionFailure => "execution_failure",
            Self::ReviewRequired => "review_required",
            Self::Internal => "internal",
        }
    }

    /// Configuration and lookup mistakes; these always propagate to the caller.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            Self::DuplicateId | Self::UnknownCategory | Self::TaskNotFound | Self::InvalidInput
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub domain: Option<String>,
    pub task: Option<TaskId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            domain: None,
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Fills attribution the error does not already carry.
    pub fn attributed(mut self, domain: &str, task: &TaskId) -> Self {
        if self.domain.is_none() {
            self.domain = Some(domain.to_string());
        }
        if self.task.is_none() {
            self.task = Some(task.clone());
        }
        self
    }
}
