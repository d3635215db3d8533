use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{NoOpHandler, TaskHandler};
use crate::models::{Task, TaskId};

/// Handler lookup: task override, then category handler, then default.
#[derive(Clone)]
pub struct HandlerRoutes {
    default: Arc<dyn TaskHandler>,
    by_category: HashMap<String, Arc<dyn TaskHandler>>,
    by_task: HashMap<TaskId, Arc<dyn TaskHandler>>,
}

impl Default for HandlerRoutes {
    fn default() -> Self {
        Self::new(Arc::new(NoOpHandler))
    }
}

impl HandlerRoutes {
    pub fn new(default: Arc<dyn TaskHandler>) -> Self {
        Self {
            default,
            by_category: HashMap::new(),
            by_task: HashMap::new(),
        }
    }

    pub fn resolve(&self, task: &Task) -> Arc<dyn TaskHandler> {
        self.by_task
            .get(&task.id)
            .or_else(|| self.by_category.get(&task.category))
            .unwrap_or(&self.default)
            .clone()
    }

    pub(crate) fn set_default(&mut self, handler: Arc<dyn TaskHandler>) {
        self.default = handler;
    }

    pub(crate) fn insert_category(&mut self, category: String, handler: Arc<dyn TaskHandler>) {
        self.by_category.insert(category, handler);
    }

    pub(crate) fn insert_task(&mut self, task: TaskId, handler: Arc<dyn TaskHandler>) {
        self.by_task.insert(task, handler);
    }
}
