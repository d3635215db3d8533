use std::collections::{BTreeMap, HashMap, HashSet};

use crate::definition::DomainDefinition;
use crate::models::{
    CoreError, CoreErrorKind, DomainDescriptor, PRIORITY_RANGE, Task, TaskId, TaskSpec, TaskStatus,
};

pub type CatalogResult<T> = Result<T, CoreError>;

/// Ordered task collection for one domain. The set of tasks is fixed at
/// build time; only per-task runtime fields change afterwards.
#[derive(Clone, Debug)]
pub struct TaskCatalog {
    domain: DomainDescriptor,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskCatalog {
    pub fn build(definition: &DomainDefinition) -> CatalogResult<Self> {
        let domain = definition.descriptor();
        if domain.name.is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "domain name must not be empty",
            ));
        }

        let mut declared = HashSet::new();
        for category in &domain.categories {
            if category.trim().is_empty() {
                return Err(invalid_input(&domain.name, "category names must not be empty"));
            }
            if !declared.insert(category.as_str()) {
                return Err(invalid_input(
                    &domain.name,
                    format!("category '{category}' is declared more than once"),
                ));
            }
        }

        let mut tasks = Vec::with_capacity(definition.tasks.len());
        let mut index = HashMap::with_capacity(definition.tasks.len());
        for spec in &definition.tasks {
            validate_spec(&domain, spec)?;

            let task = Task::from_spec(spec);
            if index.contains_key(&task.id) {
                return Err(CoreError::new(
                    CoreErrorKind::DuplicateId,
                    format!("task id '{}' is defined more than once", task.id),
                )
                .with_domain(domain.name.clone())
                .with_task(task.id));
            }

            index.insert(task.id.clone(), tasks.len());
            tasks.push(task);
        }

        tracing::debug!(
            domain = %domain.name,
            categories = domain.categories.len(),
            tasks = tasks.len(),
            "built task catalog"
        );

        Ok(Self {
            domain,
            tasks,
            index,
        })
    }

    pub fn domain(&self) -> &DomainDescriptor {
        &self.domain
    }

    pub fn categories(&self) -> &[String] {
        &self.domain.categories
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> CatalogResult<&Task> {
        Ok(&self.tasks[self.position(id)?])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn tasks_by_category(&self, category: &str) -> CatalogResult<Vec<&Task>> {
        self.ensure_category(category)?;
        Ok(self
            .tasks
            .iter()
            .filter(|task| task.category == category)
            .collect())
    }

    pub fn ensure_category(&self, category: &str) -> CatalogResult<()> {
        if self.domain.declares(category) {
            Ok(())
        } else {
            Err(CoreError::new(
                CoreErrorKind::UnknownCategory,
                format!(
                    "category '{category}' is not declared for domain '{}'",
                    self.domain.name
                ),
            )
            .with_domain(self.domain.name.clone()))
        }
    }

    /// Task counts per declared category, in declaration order.
    pub fn category_counts(&self) -> Vec<(&str, usize)> {
        self.domain
            .categories
            .iter()
            .map(|category| {
                let count = self
                    .tasks
                    .iter()
                    .filter(|task| &task.category == category)
                    .count();
                (category.as_str(), count)
            })
            .collect()
    }

    /// Task counts keyed by status storage key; every status is present.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = TaskStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        for task in &self.tasks {
            *counts.entry(task.status.as_str().to_string()).or_default() += 1;
        }
        counts
    }

    pub(crate) fn position(&self, id: &str) -> CatalogResult<usize> {
        self.index.get(id).copied().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::TaskNotFound,
                format!("unknown task id '{id}'"),
            )
            .with_domain(self.domain.name.clone())
            .with_task(TaskId::from(id))
        })
    }

    /// Positions of the tasks in scope, in catalog order.
    pub(crate) fn scope(&self, category: Option<&str>) -> CatalogResult<Vec<usize>> {
        match category {
            Some(category) => {
                self.ensure_category(category)?;
                Ok(self
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, task)| task.category == category)
                    .map(|(position, _)| position)
                    .collect())
            }
            None => Ok((0..self.tasks.len()).collect()),
        }
    }

    pub(crate) fn task_at(&self, position: usize) -> &Task {
        &self.tasks[position]
    }

    pub(crate) fn task_at_mut(&mut self, position: usize) -> &mut Task {
        &mut self.tasks[position]
    }
}

fn validate_spec(domain: &DomainDescriptor, spec: &TaskSpec) -> CatalogResult<()> {
    if spec.id.trim().is_empty() {
        return Err(invalid_input(
            &domain.name,
            format!("task '{}' has an empty id", spec.name),
        ));
    }

    if spec.name.trim().is_empty() {
        return Err(invalid_input(
            &domain.name,
            format!("task '{}' has an empty name", spec.id),
        )
        .with_task(TaskId::new(spec.id.trim())));
    }

    if !domain.declares(&spec.category) {
        return Err(CoreError::new(
            CoreErrorKind::UnknownCategory,
            format!(
                "task '{}' uses category '{}' which is not declared for domain '{}'",
                spec.id, spec.category, domain.name
            ),
        )
        .with_domain(domain.name.clone())
        .with_task(TaskId::new(spec.id.trim())));
    }

    if spec.checked_priority().is_none() {
        return Err(invalid_input(
            &domain.name,
            format!(
                "task '{}' has priority {} outside {}..={}",
                spec.id,
                spec.priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            ),
        )
        .with_task(TaskId::new(spec.id.trim())));
    }

    Ok(())
}

fn invalid_input(domain: &str, message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message).with_domain(domain)
}
