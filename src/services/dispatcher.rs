use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use crate::domains::envelope::{Envelope, ErrorKind, ErrorPayload, Target};
use crate::interfaces::handlers::HandlerContext;
use crate::interfaces::pubsub::RawMessage;
use crate::plugins::registry::HandlerRegistry;
use crate::services::transport::BusTransport;

/// Receiving side: routes inbound requests to handlers and publishes their answers.
pub struct Dispatcher {
    scope: String,
    cluster_id: Option<u16>,
    inbox_channel: Option<String>,
    handlers: Arc<HandlerRegistry>,
    transport: BusTransport,
    decode_failures: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        scope: impl Into<String>,
        cluster_id: Option<u16>,
        inbox_channel: Option<String>,
        handlers: Arc<HandlerRegistry>,
        transport: BusTransport,
    ) -> Self {
        Self {
            scope: scope.into(),
            cluster_id,
            inbox_channel,
            handlers,
            transport,
            decode_failures: AtomicU64::new(0),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Decodes a raw message and keeps it only if it belongs to our scope.
    pub fn decode(&self, raw: &RawMessage) -> Option<Envelope> {
        let envelope = match self.transport.codec().decode(&raw.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                trace!(channel = %raw.channel, error = %err, "dropping undecodable message");
                return None;
            }
        };
        if envelope.scope != self.scope {
            return None;
        }
        Some(envelope)
    }

    /// Whether this node is the addressee of a request that arrived on `channel`.
    pub fn accepts(&self, channel: &str, envelope: &Envelope) -> bool {
        match envelope.target {
            Some(Target::All) => self.cluster_id.is_some(),
            Some(Target::Cluster(id)) => self.cluster_id == Some(id),
            None => self.inbox_channel.as_deref() == Some(channel),
        }
    }

    /// Full receive path for one raw message. Responses are left to the caller's
    /// resolution step and ignored here.
    pub async fn handle_raw(&self, raw: RawMessage) {
        if let Some(envelope) = self.decode(&raw) {
            self.dispatch(&raw.channel, envelope).await;
        }
    }

    pub async fn dispatch(&self, channel: &str, request: Envelope) {
        if request.is_response() || !self.accepts(channel, &request) {
            return;
        }
        let response = self.respond(channel, &request).await;
        if let Err(err) = self.transport.publish(channel, &response).await {
            error!(
                channel,
                action = %request.action,
                correlation_id = %request.correlation_id,
                error = %err,
                "failed to publish response"
            );
        }
    }

    async fn respond(&self, channel: &str, request: &Envelope) -> Envelope {
        let Some(handler) = self.handlers.get(&request.action) else {
            debug!(action = %request.action, "unknown action");
            return request.failure(self.cluster_id, ErrorPayload::unknown_action());
        };

        let ctx = HandlerContext {
            scope: request.scope.clone(),
            action: request.action.clone(),
            correlation_id: request.correlation_id.clone(),
            channel: channel.to_string(),
            cluster_id: self.cluster_id,
        };
        let outcome = AssertUnwindSafe(handler.handle(&ctx, request.args.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(result))) => request.success(self.cluster_id, result),
            Ok(Ok(None)) => {
                warn!(action = %request.action, "handler returned no result");
                request.failure(
                    self.cluster_id,
                    ErrorPayload::new(ErrorKind::EmptyResult, "handler returned no result"),
                )
            }
            Ok(Err(err)) => {
                error!(action = %request.action, error = %err, "handler failed");
                request.failure(
                    self.cluster_id,
                    ErrorPayload::new(ErrorKind::HandlerFailed, err.to_string()),
                )
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(action = %request.action, panic = %message, "handler panicked");
                request.failure(
                    self.cluster_id,
                    ErrorPayload::new(ErrorKind::HandlerPanicked, message),
                )
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }
}
