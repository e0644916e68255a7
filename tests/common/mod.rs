#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use cluster_ipc::config::IpcConfig;
use cluster_ipc::error::{IpcError, Result};
use cluster_ipc::interfaces::handlers::{ActionHandler, HandlerContext};
use cluster_ipc::node::IpcNode;
use cluster_ipc::plugins::registry::HandlerRegistry;
use cluster_ipc::services::pubsub::MemoryPubSub;

pub fn member_config(id: u16, count: u16) -> IpcConfig {
    IpcConfig {
        cluster_id: Some(id),
        cluster_count: count,
        ..IpcConfig::default()
    }
}

pub fn api_config(count: u16) -> IpcConfig {
    IpcConfig {
        cluster_count: count,
        ..IpcConfig::default()
    }
}

pub fn registry(handlers: Vec<Arc<dyn ActionHandler>>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        assert!(registry.register(handler));
    }
    registry
}

pub async fn start(bus: &MemoryPubSub, config: IpcConfig, handlers: HandlerRegistry) -> IpcNode {
    IpcNode::start(config, Arc::new(bus.clone()), handlers)
        .await
        .unwrap()
}

/// Starts members `0..count`, giving each the handlers `make(id)` returns.
pub async fn start_members<F>(bus: &MemoryPubSub, count: u16, make: F) -> Vec<IpcNode>
where
    F: Fn(u16) -> Vec<Arc<dyn ActionHandler>>,
{
    let mut nodes = Vec::new();
    for id in 0..count {
        nodes.push(start(bus, member_config(id, count), registry(make(id))).await);
    }
    nodes
}

pub struct WhoAmI;

#[async_trait]
impl ActionHandler for WhoAmI {
    fn name(&self) -> &str {
        "whoami"
    }

    async fn handle(&self, ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        Ok(Some(json!({"cluster_id": ctx.cluster_id})))
    }
}

pub struct PanicHandler {
    pub name: String,
}

#[async_trait]
impl ActionHandler for PanicHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        panic!("handler exploded");
    }
}

pub struct FailingHandler;

#[async_trait]
impl ActionHandler for FailingHandler {
    fn name(&self) -> &str {
        "fail"
    }

    async fn handle(&self, _ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        Err(IpcError::Handler("guild not found".to_string()))
    }
}

pub struct EmptyHandler;

#[async_trait]
impl ActionHandler for EmptyHandler {
    fn name(&self) -> &str {
        "empty"
    }

    async fn handle(&self, _ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        Ok(None)
    }
}

pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl ActionHandler for SlowHandler {
    fn name(&self) -> &str {
        "slow"
    }

    async fn handle(&self, _ctx: &HandlerContext, args: Map<String, Value>) -> Result<Option<Value>> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(Value::Object(args)))
    }
}

pub struct CountingHandler {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionHandler for CountingHandler {
    fn name(&self) -> &str {
        "modules"
    }

    async fn handle(&self, _ctx: &HandlerContext, _args: Map<String, Value>) -> Result<Option<Value>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(json!({"modules": ["core"], "served": n})))
    }
}
