use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// What a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub scope: String,
    pub action: String,
    pub correlation_id: String,
    pub channel: String,
    /// The local cluster member id, if this node is one.
    pub cluster_id: Option<u16>,
}

/// Serves one named action.
///
/// Returning `Ok(None)` is treated as a failure by the dispatcher: every request
/// gets either a result or an error back.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    async fn handle(&self, ctx: &HandlerContext, args: Map<String, Value>)
        -> Result<Option<Value>>;
}

pub struct FnHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(HandlerContext, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        args: Map<String, Value>,
    ) -> Result<Option<Value>> {
        (self.func)(ctx.clone(), args).await
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn ActionHandler>
where
    F: Fn(HandlerContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        func,
    })
}
