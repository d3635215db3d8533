use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, DomainDescriptor, TaskSpec};

pub type DefinitionResult<T> = Result<T, CoreError>;

pub const DEFAULT_MAX_PARALLELISM: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSettings {
    /// Hold `requires_review` tasks in `awaiting_review` until approved.
    pub review_gate: bool,
    pub max_parallelism: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            review_gate: false,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}

impl ExecutorSettings {
    pub fn with_review_gate(mut self, enabled: bool) -> Self {
        self.review_gate = enabled;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub(crate) fn parallelism(&self) -> usize {
        self.max_parallelism.max(1)
    }
}

/// Declarative description of one domain: its categories and task records.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainDefinition {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub categories: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub settings: ExecutorSettings,
}

impl DomainDefinition {
    pub fn new(
        domain: impl Into<String>,
        categories: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            domain: domain.into(),
            description: None,
            categories: categories.into_iter().map(Into::into).collect(),
            tasks: Vec::new(),
            settings: ExecutorSettings::default(),
        }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    pub fn tasks(mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.tasks.extend(specs);
        self
    }

    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds a definition from a category to task-list mapping. Each spec's
    /// `category` field is overwritten with the group it was listed under.
    pub fn from_groups<C, T>(
        domain: impl Into<String>,
        groups: impl IntoIterator<Item = (C, T)>,
    ) -> Self
    where
        C: Into<String>,
        T: IntoIterator<Item = TaskSpec>,
    {
        let mut categories = Vec::new();
        let mut tasks = Vec::new();
        for (category, specs) in groups {
            let category = category.into();
            tasks.extend(specs.into_iter().map(|mut spec| {
                spec.category = category.clone();
                spec
            }));
            categories.push(category);
        }

        Self {
            domain: domain.into(),
            description: None,
            categories,
            tasks,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> DefinitionResult<Self> {
        serde_json::from_str(raw).map_err(|error| parse_error(&error))
    }

    pub fn from_reader(reader: impl Read) -> DefinitionResult<Self> {
        serde_json::from_reader(reader).map_err(|error| parse_error(&error))
    }

    pub fn from_path(path: impl AsRef<Path>) -> DefinitionResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Storage,
                format!("failed to open definition '{}': {error}", path.display()),
            )
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|error| CoreError {
            message: format!("{} ({})", error.message, path.display()),
            ..error
        })
    }

    pub fn descriptor(&self) -> DomainDescriptor {
        DomainDescriptor {
            name: self.domain.trim().to_string(),
            description: self.description.clone(),
            categories: self.categories.clone(),
        }
    }
}

fn parse_error(error: &serde_json::Error) -> CoreError {
    CoreError::new(
        CoreErrorKind::ParseFailure,
        format!("invalid definition document: {error}"),
    )
}
