use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::codec::EnvelopeCodec;
use crate::config::IpcConfig;
use crate::error::{IpcError, Result};
use crate::handlers::install_builtins;
use crate::interfaces::pubsub::{PubSub, RawMessage, Subscription};
use crate::plugins::registry::HandlerRegistry;
use crate::services::acks::AckRegistry;
use crate::services::cache::CachedClient;
use crate::services::dispatcher::Dispatcher;
use crate::services::request::{ClusterTopology, RequestClient};
use crate::services::tasks::TaskSubmitter;
use crate::services::transport::BusTransport;

/// One process's attachment to the bus: a dispatcher for inbound commands and a
/// request client whose responses are resolved by the same receive loop.
pub struct IpcNode {
    config: IpcConfig,
    dispatcher: Arc<Dispatcher>,
    client: RequestClient,
    shutdown: Option<oneshot::Sender<()>>,
    receive_loop: Option<JoinHandle<Result<()>>>,
}

impl IpcNode {
    pub async fn start(
        config: IpcConfig,
        pubsub: Arc<dyn PubSub>,
        mut handlers: HandlerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        install_builtins(&mut handlers);

        let transport = BusTransport::new(
            pubsub,
            config.channel.clone(),
            EnvelopeCodec::new(config.max_payload_bytes),
        );
        let acks = AckRegistry::new();
        let dispatcher = Arc::new(Dispatcher::new(
            config.scope.clone(),
            config.cluster_id,
            config.inbox_channel(),
            Arc::new(handlers),
            transport.clone(),
        ));
        let client = RequestClient::new(
            config.scope.clone(),
            transport.clone(),
            acks.clone(),
            ClusterTopology::with_count(config.cluster_count),
        );

        let subscription = transport.open().await?;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let receive_loop = tokio::spawn(receive_loop(
            subscription,
            dispatcher.clone(),
            acks,
            shutdown_rx,
        ));
        info!(
            scope = %config.scope,
            channel = %config.channel,
            cluster_id = ?config.cluster_id,
            inbox = ?config.inbox_channel(),
            "ipc node started"
        );

        Ok(Self {
            config,
            dispatcher,
            client,
            shutdown: Some(shutdown),
            receive_loop: Some(receive_loop),
        })
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn acks(&self) -> &AckRegistry {
        self.client.acks()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn decode_failures(&self) -> u64 {
        self.dispatcher.decode_failures()
    }

    pub fn task_submitter(&self) -> TaskSubmitter {
        TaskSubmitter::new(
            self.client.clone(),
            self.config.jobs_channel(),
            self.config.ack_timeout(),
            self.config.retry_after(),
        )
    }

    pub fn cached_client(&self) -> CachedClient {
        CachedClient::new(self.client.clone(), self.config.request_timeout())
    }

    /// Closes the subscription and waits for the receive loop to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.join().await
    }

    /// Runs until the receive loop stops. It only stops on its own when the
    /// transport fails, which is reported as an error.
    pub async fn wait(&mut self) -> Result<()> {
        self.join().await
    }

    async fn join(&mut self) -> Result<()> {
        let Some(receive_loop) = self.receive_loop.take() else {
            return Ok(());
        };
        receive_loop
            .await
            .map_err(|e| IpcError::Runtime(e.to_string()))?
    }
}

async fn receive_loop(
    mut subscription: Subscription,
    dispatcher: Arc<Dispatcher>,
    acks: AckRegistry,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                subscription.close();
                info!("ipc node shutting down");
                return Ok(());
            }
            message = subscription.recv() => match message {
                Some(raw) => {
                    let dispatcher = dispatcher.clone();
                    let acks = acks.clone();
                    tokio::spawn(route(dispatcher, acks, raw));
                }
                None => {
                    error!("ipc inbound stream ended unexpectedly");
                    return Err(IpcError::Transport("inbound stream ended".to_string()));
                }
            }
        }
    }
}

async fn route(dispatcher: Arc<Dispatcher>, acks: AckRegistry, raw: RawMessage) {
    let Some(envelope) = dispatcher.decode(&raw) else {
        return;
    };
    if envelope.is_response() {
        let correlation_id = envelope.correlation_id.clone();
        if !acks.resolve(&correlation_id, envelope) {
            debug!(
                correlation_id = %correlation_id,
                channel = %raw.channel,
                "response has no pending waiter"
            );
        }
        return;
    }
    dispatcher.dispatch(&raw.channel, envelope).await;
}
