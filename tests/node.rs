mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Map;

use cluster_ipc::domains::envelope::Target;
use cluster_ipc::error::{IpcError, Result};
use cluster_ipc::interfaces::pubsub::{PubSub, Subscription};
use cluster_ipc::node::IpcNode;
use cluster_ipc::plugins::registry::HandlerRegistry;
use cluster_ipc::services::pubsub::MemoryPubSub;

use common::{api_config, member_config, registry, start};

/// A bus whose subscriptions end as soon as they are opened.
struct DeadBus;

#[async_trait]
impl PubSub for DeadBus {
    async fn publish(&self, _channel: &str, _payload: Bytes) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _channels: &[String], _patterns: &[String]) -> Result<Subscription> {
        let (_tx, subscription) = Subscription::pair();
        Ok(subscription)
    }
}

#[tokio::test]
async fn lost_inbound_stream_is_reported() {
    let mut node = IpcNode::start(member_config(0, 1), Arc::new(DeadBus), HandlerRegistry::new())
        .await
        .unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), node.wait())
        .await
        .unwrap();
    assert!(matches!(outcome, Err(IpcError::Transport(_))));
}

#[tokio::test]
async fn shutdown_stops_the_receive_loop() {
    let bus = MemoryPubSub::new();
    let node = start(&bus, member_config(0, 1), registry(Vec::new())).await;
    assert_eq!(bus.subscriber_count(), 1);
    node.shutdown().await.unwrap();
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn broadcast_to_empty_topology_returns_nothing() {
    let bus = MemoryPubSub::new();
    let api = start(&bus, api_config(0), registry(Vec::new())).await;
    let responses = api
        .client()
        .send("ping", Map::new(), Target::All, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(responses.is_empty());
    assert!(api.acks().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected_before_subscribing() {
    let bus = MemoryPubSub::new();
    let result = IpcNode::start(member_config(3, 2), Arc::new(bus.clone()), HandlerRegistry::new()).await;
    assert!(matches!(result, Err(IpcError::Config(_))));
    assert_eq!(bus.subscriber_count(), 0);
}
