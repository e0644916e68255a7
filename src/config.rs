use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::domains::envelope::ClusterAddress;
use crate::error::{IpcError, Result};

fn default_scope() -> String {
    "splashtail".to_string()
}

fn default_channel() -> String {
    "mewld".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_retry_after_secs() -> u64 {
    30
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_jobs_inbox() -> String {
    "ipc@jobserver".to_string()
}

fn default_broker() -> String {
    "127.0.0.1:6380".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Set on worker-cluster members only.
    #[serde(default)]
    pub cluster_id: Option<u16>,
    #[serde(default)]
    pub inbox: Option<String>,
    #[serde(default)]
    pub cluster_count: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_jobs_inbox")]
    pub jobs_inbox: String,
    #[serde(default = "default_broker")]
    pub broker: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            channel: default_channel(),
            cluster_id: None,
            inbox: None,
            cluster_count: 0,
            request_timeout_ms: default_request_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            retry_after_secs: default_retry_after_secs(),
            max_payload_bytes: default_max_payload_bytes(),
            jobs_inbox: default_jobs_inbox(),
            broker: default_broker(),
        }
    }
}

impl IpcConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| IpcError::Config(e.to_string()))?;
        let config: IpcConfig =
            serde_json::from_str(&content).map_err(|e| IpcError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scope.trim().is_empty() {
            return Err(IpcError::Config("scope must not be empty".to_string()));
        }
        if self.channel.trim().is_empty() {
            return Err(IpcError::Config("channel must not be empty".to_string()));
        }
        if let Some(id) = self.cluster_id {
            if id >= self.cluster_count {
                return Err(IpcError::Config(format!(
                    "cluster_id {id} is outside cluster_count {}",
                    self.cluster_count
                )));
            }
        }
        Ok(())
    }

    /// The same bus settings for a node that only sends: no member id, no inbox.
    pub fn into_client(mut self) -> Self {
        self.cluster_id = None;
        self.inbox = None;
        self
    }

    /// This node's inbox suffix: the explicit override, else `ipc@{cluster_id}` for members.
    pub fn inbox_suffix(&self) -> Option<String> {
        self.inbox
            .clone()
            .or_else(|| self.cluster_id.map(|id| ClusterAddress::new(id).suffix))
    }

    pub fn inbox_channel(&self) -> Option<String> {
        self.inbox_suffix()
            .map(|suffix| format!("{}/{suffix}", self.channel))
    }

    pub fn jobs_channel(&self) -> String {
        format!("{}/{}", self.channel, self.jobs_inbox)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}
