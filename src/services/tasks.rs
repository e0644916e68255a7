use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domains::envelope::Outcome;
use crate::error::{IpcError, Result};
use crate::interfaces::handlers::{handler_fn, ActionHandler};
use crate::services::acks::new_correlation_id;
use crate::services::request::RequestClient;

pub const NEW_TASK_ACTION: &str = "new_task";

/// A unit of work already persisted by its own storage path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: String,
    #[serde(rename = "name")]
    pub task_name: String,
    #[serde(rename = "task", default)]
    pub payload: Value,
}

impl TaskSubmission {
    fn to_args(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).map_err(|e| IpcError::Serialization(e.to_string()))? {
            Value::Object(args) => Ok(args),
            _ => Err(IpcError::Serialization(
                "task submission did not serialize to an object".to_string(),
            )),
        }
    }

    fn from_args(args: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(args)).map_err(|e| IpcError::Handler(e.to_string()))
    }
}

/// What the submitting caller learns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Published without waiting for the job tier.
    Queued { task_id: String },
    /// The job tier acknowledged receipt.
    Accepted {
        task_id: String,
        output: Option<Value>,
    },
    /// No acknowledgement within the bound; the task may still run.
    Unconfirmed {
        task_id: String,
        retry_after_secs: u64,
    },
}

impl SubmitOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Queued { task_id }
            | Self::Accepted { task_id, .. }
            | Self::Unconfirmed { task_id, .. } => task_id,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Unconfirmed { .. })
    }
}

/// Hands tasks to the job-execution tier, optionally blocking until it acknowledges.
pub struct TaskSubmitter {
    client: RequestClient,
    channel: String,
    ack_timeout: Duration,
    retry_after: Duration,
}

impl TaskSubmitter {
    pub fn new(
        client: RequestClient,
        channel: impl Into<String>,
        ack_timeout: Duration,
        retry_after: Duration,
    ) -> Self {
        Self {
            client,
            channel: channel.into(),
            ack_timeout,
            retry_after,
        }
    }

    pub async fn submit(&self, submission: &TaskSubmission, wait_for_ack: bool) -> Result<SubmitOutcome> {
        let args = submission.to_args()?;
        if !wait_for_ack {
            self.client
                .notify(&self.channel, NEW_TASK_ACTION, args, None)
                .await?;
            return Ok(SubmitOutcome::Queued {
                task_id: submission.task_id.clone(),
            });
        }

        let correlation_id = new_correlation_id();
        let mut waiter = self
            .client
            .begin(&self.channel, &correlation_id, NEW_TASK_ACTION, args, None, 1)
            .await?;

        let timer = tokio::time::sleep(self.ack_timeout);
        tokio::pin!(timer);
        let acked = tokio::select! {
            envelope = waiter.recv() => envelope,
            _ = &mut timer => None,
        };
        // Expiry also picks up an acknowledgement that won the race against the timer.
        let acked = match acked {
            Some(envelope) => Some(envelope),
            None => waiter.expire().into_iter().next(),
        };

        let Some(ack) = acked else {
            warn!(
                task_id = %submission.task_id,
                correlation_id = %correlation_id,
                "job tier did not acknowledge in time"
            );
            return Ok(SubmitOutcome::Unconfirmed {
                task_id: submission.task_id.clone(),
                retry_after_secs: self.retry_after.as_secs(),
            });
        };

        match ack.outcome() {
            Outcome::Success(output) => {
                info!(task_id = %submission.task_id, "task acknowledged");
                Ok(SubmitOutcome::Accepted {
                    task_id: submission.task_id.clone(),
                    output: Some(output.clone()),
                })
            }
            Outcome::Failure(error) => Err(IpcError::Remote {
                cluster_id: ack.responder(),
                error: error.clone(),
            }),
            Outcome::Pending => Ok(SubmitOutcome::Accepted {
                task_id: submission.task_id.clone(),
                output: None,
            }),
        }
    }
}

/// Job-tier side: acknowledges `new_task` requests with whatever `accept` returns.
pub fn new_task_handler<F, Fut>(accept: F) -> Arc<dyn ActionHandler>
where
    F: Fn(TaskSubmission) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    let accept = Arc::new(accept);
    handler_fn(NEW_TASK_ACTION, move |_ctx, args| {
        let accept = accept.clone();
        async move {
            let submission = TaskSubmission::from_args(args)?;
            let output = (*accept)(submission).await?;
            Ok::<_, IpcError>(Some(output))
        }
    })
}
