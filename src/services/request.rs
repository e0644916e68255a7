use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domains::envelope::{ClusterAddress, Envelope, Outcome, Target};
use crate::error::{IpcError, Result};
use crate::services::acks::{new_correlation_id, AckRegistry, Waiter};
use crate::services::transport::BusTransport;

/// Known worker-cluster members, as supplied by cluster configuration.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    members: HashMap<u16, ClusterAddress>,
}

impl ClusterTopology {
    /// Members `0..count` with the default `ipc@{id}` suffixes.
    pub fn with_count(count: u16) -> Self {
        Self::from_members((0..count).map(ClusterAddress::new))
    }

    pub fn from_members(members: impl IntoIterator<Item = ClusterAddress>) -> Self {
        Self {
            members: members.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn address(&self, id: u16) -> ClusterAddress {
        self.members
            .get(&id)
            .cloned()
            .unwrap_or_else(|| ClusterAddress::new(id))
    }
}

/// Sending side: publishes commands and collects their correlated responses.
#[derive(Clone)]
pub struct RequestClient {
    scope: String,
    transport: BusTransport,
    acks: AckRegistry,
    topology: ClusterTopology,
}

impl RequestClient {
    pub fn new(
        scope: impl Into<String>,
        transport: BusTransport,
        acks: AckRegistry,
        topology: ClusterTopology,
    ) -> Self {
        Self {
            scope: scope.into(),
            transport,
            acks,
            topology,
        }
    }

    pub fn acks(&self) -> &AckRegistry {
        &self.acks
    }

    pub fn transport(&self) -> &BusTransport {
        &self.transport
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Sends `action` to one member or to all of them and waits for every expected reply.
    ///
    /// Transport-level failures (`Timeout`, `CountMismatch`) are errors; a reply
    /// carrying an application error is still a returned envelope.
    pub async fn send(
        &self,
        action: &str,
        args: Map<String, Value>,
        target: Target,
        timeout: Duration,
    ) -> Result<Vec<Envelope>> {
        // The member count is a snapshot taken at send time.
        let (channel, expected) = match target {
            Target::All => (
                self.transport.base_channel().to_string(),
                self.topology.member_count(),
            ),
            Target::Cluster(id) => (self.transport.member_channel(&self.topology.address(id)), 1),
        };
        let correlation_id = new_correlation_id();
        let waiter = self
            .begin(&channel, &correlation_id, action, args, Some(target), expected)
            .await?;
        let collected = waiter.collect(timeout).await;

        if collected.is_complete() {
            return Ok(collected.envelopes);
        }
        warn!(
            action,
            correlation_id = %correlation_id,
            expected,
            received = collected.envelopes.len(),
            "request did not collect every response"
        );
        match target {
            Target::Cluster(_) => Err(IpcError::Timeout { correlation_id }),
            Target::All => Err(IpcError::CountMismatch {
                correlation_id,
                expected,
                received: collected.envelopes,
            }),
        }
    }

    /// Registers `correlation_id` and then publishes the request on `channel`.
    pub async fn begin(
        &self,
        channel: &str,
        correlation_id: &str,
        action: &str,
        args: Map<String, Value>,
        target: Option<Target>,
        expected: usize,
    ) -> Result<Waiter> {
        let waiter = self.acks.register(correlation_id, expected)?;
        let request = Envelope::request(&self.scope, action, correlation_id, args, target);
        self.transport.publish(channel, &request).await?;
        debug!(channel, action, correlation_id, expected, "request published");
        Ok(waiter)
    }

    /// Publishes a request nobody waits for.
    pub async fn notify(
        &self,
        channel: &str,
        action: &str,
        args: Map<String, Value>,
        target: Option<Target>,
    ) -> Result<String> {
        let correlation_id = new_correlation_id();
        let request = Envelope::request(&self.scope, action, &correlation_id, args, target);
        self.transport.publish(channel, &request).await?;
        Ok(correlation_id)
    }

    /// Sends to one member and requires exactly one clean result.
    pub async fn request_one(
        &self,
        action: &str,
        args: Map<String, Value>,
        cluster_id: u16,
        timeout: Duration,
    ) -> Result<Value> {
        let mut responses = self
            .send(action, args, Target::Cluster(cluster_id), timeout)
            .await?;
        if responses.len() != 1 {
            return Err(IpcError::Runtime(format!(
                "expected 1 response, got {}",
                responses.len()
            )));
        }
        let response = responses.remove(0);
        match response.outcome() {
            Outcome::Success(value) => Ok(value.clone()),
            Outcome::Failure(error) => Err(IpcError::Remote {
                cluster_id: response.responder(),
                error: error.clone(),
            }),
            Outcome::Pending => Err(IpcError::Runtime(
                "response carried neither result nor error".to_string(),
            )),
        }
    }
}
