use std::sync::Arc;

use tracing::trace;

use crate::codec::EnvelopeCodec;
use crate::domains::envelope::{ClusterAddress, Envelope};
use crate::error::Result;
use crate::interfaces::pubsub::{PubSub, Subscription};

/// Envelope-level view of the shared bus.
///
/// A node listens on the base channel plus every `{base}/ipc@*` sub-channel; the
/// sub-channels carry member- and tier-addressed traffic.
#[derive(Clone)]
pub struct BusTransport {
    pubsub: Arc<dyn PubSub>,
    codec: EnvelopeCodec,
    base_channel: String,
}

impl BusTransport {
    pub fn new(pubsub: Arc<dyn PubSub>, base_channel: impl Into<String>, codec: EnvelopeCodec) -> Self {
        Self {
            pubsub,
            codec,
            base_channel: base_channel.into(),
        }
    }

    pub fn base_channel(&self) -> &str {
        &self.base_channel
    }

    pub fn ipc_pattern(&self) -> String {
        format!("{}/ipc@*", self.base_channel)
    }

    pub fn channel_for(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.base_channel)
    }

    pub fn member_channel(&self, address: &ClusterAddress) -> String {
        address.channel(&self.base_channel)
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<()> {
        let payload = self.codec.encode(envelope)?;
        trace!(
            channel,
            action = %envelope.action,
            correlation_id = %envelope.correlation_id,
            response = envelope.is_response(),
            "publishing envelope"
        );
        self.pubsub.publish(channel, payload).await
    }

    /// Opens the node's inbound stream: the base channel and the ipc wildcard.
    pub async fn open(&self) -> Result<Subscription> {
        self.pubsub
            .subscribe(&[self.base_channel.clone()], &[self.ipc_pattern()])
            .await
    }
}
