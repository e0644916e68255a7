use cluster_ipc::broker::Broker;
use cluster_ipc::codec::DEFAULT_MAX_PAYLOAD_BYTES;
use cluster_ipc::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cluster-ipc-broker")]
#[command(about = "Publish/subscribe broker for cluster IPC")]
struct Cli {
    #[arg(long, env = "CLUSTER_IPC_BROKER", default_value = "127.0.0.1:6380")]
    listen: String,

    /// Largest payload a client may publish; longer frames close the connection.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cluster_ipc=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    Broker::bind(&cli.listen)
        .await?
        .with_max_payload_bytes(cli.max_payload_bytes)
        .run()
        .await
}
