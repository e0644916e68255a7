use std::collections::HashMap;
use std::sync::Arc;

use crate::interfaces::handlers::ActionHandler;

/// Action name to handler table.
///
/// Filled before the dispatcher starts, then shared behind an `Arc` and only read.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Returns false if an action with the same name is already registered.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> bool {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return false;
        }
        self.handlers.insert(name, handler);
        true
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe(&self) -> Vec<serde_json::Value> {
        self.actions()
            .into_iter()
            .filter_map(|name| self.handlers.get(&name))
            .map(|h| {
                serde_json::json!({
                    "name": h.name(),
                    "description": h.description(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
