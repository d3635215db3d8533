use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const PRIORITY_RANGE: RangeInclusive<u8> = 1..=3;
pub const DEFAULT_PRIORITY: u8 = 2;

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    AwaitingReview,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::AwaitingReview,
        Self::Running,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingReview => "awaiting_review",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "awaiting_review" => Ok(Self::AwaitingReview),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// One task record of a definition document.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub estimated_duration: u32,
    #[serde(default)]
    pub requires_review: bool,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            priority: i64::from(DEFAULT_PRIORITY),
            estimated_duration: 0,
            requires_review: false,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn estimated_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration = minutes;
        self
    }

    pub fn requires_review(mut self, requires_review: bool) -> Self {
        self.requires_review = requires_review;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The priority as a task priority, or `None` when outside `PRIORITY_RANGE`.
    pub fn checked_priority(&self) -> Option<u8> {
        u8::try_from(self.priority)
            .ok()
            .filter(|priority| PRIORITY_RANGE.contains(priority))
    }
}

fn default_priority() -> i64 {
    i64::from(DEFAULT_PRIORITY)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub priority: u8,
    pub estimated_duration: u32,
    pub requires_review: bool,
    pub status: TaskStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

impl Task {
    pub(crate) fn from_spec(spec: &TaskSpec) -> Self {
        Self {
            id: TaskId::new(spec.id.trim()),
            name: spec.name.clone(),
            category: spec.category.clone(),
            description: spec.description.clone(),
            priority: spec.checked_priority().unwrap_or(DEFAULT_PRIORITY),
            estimated_duration: spec.estimated_duration,
            requires_review: spec.requires_review,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            elapsed_ms: None,
            error: None,
            reviewed_by: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.reviewed_by.is_some()
    }

    pub(crate) fn clear_runtime(&mut self) {
        self.started_at = None;
        self.finished_at = None;
        self.elapsed_ms = None;
        self.error = None;
        self.reviewed_by = None;
    }
}
