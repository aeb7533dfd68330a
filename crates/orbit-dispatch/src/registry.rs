//! Registry: `task_type → handler` (§4.2). The Dispatcher's only
//! routing decision is a map lookup against this table.

use crate::handler::TaskHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps `task_type` strings to their registered handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its own [`TaskHandler::task_type`].
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type().to_string(), handler);
    }

    /// Look up the handler for `task_type`, if any is registered.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }
}
