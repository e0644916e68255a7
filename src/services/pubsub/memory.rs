use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::Result;
use crate::interfaces::pubsub::{PubSub, RawMessage, Subscription};
use crate::services::pubsub::pattern::ChannelPattern;

struct Subscriber {
    channels: HashSet<String>,
    patterns: Vec<ChannelPattern>,
    tx: mpsc::Sender<RawMessage>,
}

impl Subscriber {
    fn route(&self, channel: &str) -> Option<Option<String>> {
        if self.channels.contains(channel) {
            return Some(None);
        }
        self.patterns
            .iter()
            .find(|p| p.matches(channel))
            .map(|p| Some(p.as_str().to_string()))
    }
}

/// In-process bus. Each subscription receives a matching message at most once,
/// in publish order. A subscription whose buffer is full misses the message.
#[derive(Clone, Default)]
pub struct MemoryPubSub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes and returns how many subscriptions the message reached.
    pub fn publish_counted(&self, channel: &str, payload: Bytes) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            if let Some(pattern) = subscriber.route(channel) {
                let message = RawMessage {
                    channel: channel.to_string(),
                    pattern,
                    payload: payload.clone(),
                };
                match subscriber.tx.try_send(message) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(channel, "subscriber is lagging, dropping message");
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        self.publish_counted(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String], patterns: &[String]) -> Result<Subscription> {
        let patterns = patterns
            .iter()
            .map(|p| ChannelPattern::new(p))
            .collect::<Result<Vec<_>>>()?;
        let (tx, subscription) = Subscription::pair();
        let subscriber = Subscriber {
            channels: channels.iter().cloned().collect(),
            patterns,
            tx,
        };
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscriber);
        Ok(subscription)
    }
}
