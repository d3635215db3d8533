use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::handlers::{HandlerResult, TaskHandler};
use crate::models::{CoreError, CoreErrorKind, Task, TaskId};

const MAX_OUTPUT_BYTES: usize = 4 * 1024;

pub const TASK_ID_ENV: &str = "TASKDECK_TASK_ID";
pub const TASK_NAME_ENV: &str = "TASKDECK_TASK_NAME";
pub const TASK_CATEGORY_ENV: &str = "TASKDECK_TASK_CATEGORY";
pub const TASK_PRIORITY_ENV: &str = "TASKDECK_TASK_PRIORITY";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorRequest {
    pub task_id: TaskId,
    pub name: String,
    pub category: String,
    pub priority: u8,
}

impl From<&Task> for CollaboratorRequest {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            category: task.category.clone(),
            priority: task.priority,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorResponse {
    pub detail: Option<String>,
}

/// Service that carries out a task on the executor's behalf.
pub trait Collaborator: Send + Sync {
    fn call(&self, request: &CollaboratorRequest) -> Result<CollaboratorResponse, CoreError>;
}

pub struct ExternalCallHandler<C> {
    collaborator: C,
}

impl<C: Collaborator> ExternalCallHandler<C> {
    pub fn new(collaborator: C) -> Self {
        Self { collaborator }
    }

    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }
}

impl<C: Collaborator> TaskHandler for ExternalCallHandler<C> {
    fn execute(&self, task: &Task) -> HandlerResult {
        let request = CollaboratorRequest::from(task);
        let response = self
            .collaborator
            .call(&request)
            .map_err(|error| CoreError {
                task: error.task.or_else(|| Some(task.id.clone())),
                ..error
            })?;

        tracing::debug!(
            task_id = %task.id,
            detail = response.detail.as_deref().unwrap_or(""),
            "collaborator call succeeded"
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_command("command program path must not be empty"));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_command(
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_command(
                "environment keys and values must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

/// Runs one external command per task. The task is passed through
/// `TASKDECK_TASK_*` environment variables; a non-zero exit fails the task.
#[derive(Clone, Debug)]
pub struct CommandCollaborator {
    spec: CommandSpec,
}

impl CommandCollaborator {
    pub fn new(spec: CommandSpec) -> Result<Self, CoreError> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

impl Collaborator for CommandCollaborator {
    fn call(&self, request: &CollaboratorRequest) -> Result<CollaboratorResponse, CoreError> {
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .envs(&self.spec.env)
            .env(TASK_ID_ENV, request.task_id.as_str())
            .env(TASK_NAME_ENV, &request.name)
            .env(TASK_CATEGORY_ENV, &request.category)
            .env(TASK_PRIORITY_ENV, request.priority.to_string())
            .stdin(Stdio::null());
        if let Some(working_dir) = &self.spec.working_dir {
            command.current_dir(working_dir);
        }

        let output = command.output().map_err(|error| {
            CoreError::new(
                CoreErrorKind::ExecutionFailure,
                format!(
                    "failed to spawn '{}': {error}",
                    self.spec.program.display()
                ),
            )
            .with_task(request.task_id.clone())
        })?;

        if !output.status.success() {
            let exit = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = tail_text(&output.stderr).unwrap_or_default();
            return Err(CoreError::new(
                CoreErrorKind::ExecutionFailure,
                format!(
                    "'{}' exited with status {exit}: {}",
                    self.spec.program.display(),
                    stderr.trim()
                ),
            )
            .with_task(request.task_id.clone()));
        }

        Ok(CollaboratorResponse {
            detail: tail_text(&output.stdout).map(|text| text.trim().to_string()),
        })
    }
}

fn tail_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let window = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[(bytes.len() - MAX_OUTPUT_BYTES)..]
    } else {
        bytes
    };

    let text = String::from_utf8_lossy(window).to_string();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn invalid_command(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
