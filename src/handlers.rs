use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::interfaces::handlers::{ActionHandler, HandlerContext};
use crate::plugins::registry::HandlerRegistry;

pub const PING_ACTION: &str = "ping";
pub const ACTIONS_ACTION: &str = "actions";

pub struct PingHandler;

#[async_trait]
impl ActionHandler for PingHandler {
    fn name(&self) -> &str {
        PING_ACTION
    }

    fn description(&self) -> &str {
        "Liveness probe"
    }

    async fn handle(&self, _ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        Ok(Some(json!({"pong": true})))
    }
}

/// Lists the actions this node serves.
pub struct ActionsHandler {
    actions: Vec<Value>,
}

#[async_trait]
impl ActionHandler for ActionsHandler {
    fn name(&self) -> &str {
        ACTIONS_ACTION
    }

    fn description(&self) -> &str {
        "Lists the actions served by this node"
    }

    async fn handle(&self, ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        Ok(Some(json!({
            "cluster_id": ctx.cluster_id,
            "actions": self.actions,
        })))
    }
}

/// Adds `ping` and `actions` unless the caller registered its own.
/// Must run after every other handler is registered, since `actions` snapshots the table.
pub fn install_builtins(registry: &mut HandlerRegistry) {
    if !registry.contains(PING_ACTION) {
        registry.register(Arc::new(PingHandler));
    }
    if registry.contains(ACTIONS_ACTION) {
        return;
    }
    let mut actions = registry.describe();
    actions.push(json!({
        "name": ACTIONS_ACTION,
        "description": "Lists the actions served by this node",
    }));
    actions.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    registry.register(Arc::new(ActionsHandler { actions }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtins_list_themselves() {
        let mut registry = HandlerRegistry::new();
        install_builtins(&mut registry);
        assert_eq!(registry.actions(), vec!["actions", "ping"]);

        let ctx = HandlerContext {
            scope: "s".to_string(),
            action: ACTIONS_ACTION.to_string(),
            correlation_id: "c".to_string(),
            channel: "mewld/ipc@0".to_string(),
            cluster_id: Some(0),
        };
        let handler = registry.get(ACTIONS_ACTION).unwrap();
        let listed = handler.handle(&ctx, Map::new()).await.unwrap().unwrap();
        let names: Vec<&str> = listed["actions"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a["name"].as_str())
            .collect();
        assert_eq!(names, vec!["actions", "ping"]);
        assert_eq!(listed["cluster_id"], json!(0));
    }
}
