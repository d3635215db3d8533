pub mod domain;
pub mod error;
pub mod result;
pub mod task;
pub mod task_log;

pub use domain::DomainDescriptor;
pub use error::{CoreError, CoreErrorKind};
pub use result::ExecutionResult;
pub use task::{DEFAULT_PRIORITY, PRIORITY_RANGE, Task, TaskId, TaskSpec, TaskStatus};
pub use task_log::{TaskLogLevel, TaskLogRecord};
