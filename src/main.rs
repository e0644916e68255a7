use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cluster_ipc::config::IpcConfig;
use cluster_ipc::domains::envelope::{Envelope, Outcome, Target};
use cluster_ipc::error::{IpcError, Result};
use cluster_ipc::node::IpcNode;
use cluster_ipc::plugins::registry::HandlerRegistry;
use cluster_ipc::services::pubsub::TcpPubSub;
use cluster_ipc::services::tasks::TaskSubmission;

#[derive(Parser, Debug)]
#[command(name = "cluster-ipc")]
#[command(about = "Send commands to cluster IPC nodes")]
struct Cli {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "CLUSTER_IPC_BROKER")]
    broker: Option<String>,

    #[arg(long)]
    cluster_count: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send an action to one cluster or broadcast it to all of them.
    Send {
        action: String,
        #[arg(long, conflicts_with = "all")]
        cluster: Option<u16>,
        #[arg(long, default_value_t = false)]
        all: bool,
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Submit a task to the job tier.
    Submit {
        task_id: String,
        name: String,
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
}

fn parse_args(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).map_err(|e| IpcError::Config(e.to_string()))? {
        Value::Object(map) => Ok(map),
        _ => Err(IpcError::Config("--args must be a JSON object".to_string())),
    }
}

fn render(envelope: &Envelope) -> Value {
    match envelope.outcome() {
        Outcome::Success(result) => json!({"cluster_id": envelope.responder(), "result": result}),
        Outcome::Failure(error) => json!({"cluster_id": envelope.responder(), "error": error}),
        Outcome::Pending => json!({"cluster_id": envelope.responder()}),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cluster_ipc=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => IpcConfig::from_file(path)?,
        None => IpcConfig::default(),
    };
    if let Some(broker) = cli.broker {
        config.broker = broker;
    }
    if let Some(count) = cli.cluster_count {
        config.cluster_count = count;
    }
    // A shared member config may set cluster_id; the CLI only ever acts as a client.
    if let Some(id) = config.cluster_id {
        debug!(cluster_id = id, "ignoring cluster_id from config for the client node");
    }
    let config = config.into_client();

    let pubsub = Arc::new(
        TcpPubSub::new(config.broker.clone()).with_max_payload_bytes(config.max_payload_bytes),
    );
    let node = IpcNode::start(config, pubsub, HandlerRegistry::new()).await?;

    let output = match cli.command {
        Commands::Send {
            action,
            cluster,
            all,
            args,
            timeout_ms,
        } => {
            let target = match (cluster, all) {
                (Some(id), _) => Target::Cluster(id),
                (None, true) => Target::All,
                (None, false) => {
                    return Err(IpcError::Config("pass --cluster <id> or --all".to_string()))
                }
            };
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| node.config().request_timeout());
            match node.client().send(&action, parse_args(&args)?, target, timeout).await {
                Ok(responses) => Value::Array(responses.iter().map(render).collect()),
                Err(IpcError::CountMismatch {
                    expected, received, ..
                }) => json!({
                    "error": "count_mismatch",
                    "expected": expected,
                    "responses": received.iter().map(render).collect::<Vec<_>>(),
                }),
                Err(err) => return Err(err),
            }
        }
        Commands::Submit {
            task_id,
            name,
            payload,
            wait,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).map_err(|e| IpcError::Config(e.to_string()))?;
            let submission = TaskSubmission {
                task_id,
                task_name: name,
                payload,
            };
            let outcome = node.task_submitter().submit(&submission, wait).await?;
            serde_json::to_value(&outcome).map_err(|e| IpcError::Serialization(e.to_string()))?
        }
    };

    let text =
        serde_json::to_string_pretty(&output).map_err(|e| IpcError::Serialization(e.to_string()))?;
    println!("{text}");
    node.shutdown().await
}
