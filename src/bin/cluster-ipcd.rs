use std::sync::Arc;

use cluster_ipc::config::IpcConfig;
use cluster_ipc::error::Result;
use cluster_ipc::node::IpcNode;
use cluster_ipc::plugins::registry::HandlerRegistry;
use cluster_ipc::services::pubsub::TcpPubSub;
use cluster_ipc::services::tasks::new_task_handler;
use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cluster-ipcd")]
#[command(about = "Cluster IPC node daemon")]
struct Cli {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "CLUSTER_IPC_BROKER")]
    broker: Option<String>,

    #[arg(long)]
    cluster_id: Option<u16>,

    #[arg(long)]
    cluster_count: Option<u16>,

    #[arg(long)]
    inbox: Option<String>,

    /// Serve the job tier's inbox and acknowledge submitted tasks.
    #[arg(long, default_value_t = false)]
    jobserver: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cluster_ipc=info"));
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
    if cli.cluster_id.is_some() {
        config.cluster_id = cli.cluster_id;
    }
    if cli.inbox.is_some() {
        config.inbox = cli.inbox;
    }

    let mut handlers = HandlerRegistry::new();
    if cli.jobserver {
        config.inbox = Some(config.jobs_inbox.clone());
        handlers.register(new_task_handler(|task| async move {
            info!(task_id = %task.task_id, name = %task.task_name, "task accepted");
            Ok(json!({"task_id": task.task_id, "state": "pending"}))
        }));
    }

    let pubsub = Arc::new(
        TcpPubSub::new(config.broker.clone()).with_max_payload_bytes(config.max_payload_bytes),
    );
    let mut node = IpcNode::start(config, pubsub, handlers).await?;

    tokio::select! {
        outcome = node.wait() => {
            if let Err(err) = &outcome {
                error!(error = %err, "receive loop terminated; exiting for restart");
            }
            outcome
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            node.shutdown().await
        }
    }
}
