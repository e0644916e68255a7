use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::Result;

/// A message as the bus delivered it, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub channel: String,
    /// The pattern that matched, for pattern subscriptions.
    pub pattern: Option<String>,
    pub payload: Bytes,
}

/// Messages a subscription buffers before the bus starts dropping for it.
pub const SUBSCRIPTION_BUFFER: usize = 1024;

/// Inbound side of a subscription. Messages arrive in the order the bus produced them.
///
/// Dropping or closing the subscription unsubscribes it; already buffered messages
/// can still be drained after `close`.
pub struct Subscription {
    rx: mpsc::Receiver<RawMessage>,
}

impl Subscription {
    pub fn pair() -> (mpsc::Sender<RawMessage>, Self) {
        Self::with_capacity(SUBSCRIPTION_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> (mpsc::Sender<RawMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    pub async fn recv(&mut self) -> Option<RawMessage> {
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = RawMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()>;

    /// Subscribes to exact channel names and glob patterns (`*`, `?`) as one subscription.
    async fn subscribe(&self, channels: &[String], patterns: &[String]) -> Result<Subscription>;
}
