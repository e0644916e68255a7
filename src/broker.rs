use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::codec::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::error::{IpcError, Result};
use crate::interfaces::pubsub::PubSub;
use crate::services::pubsub::tcp::{max_frame_len, write_frame, Frame, FrameReader};
use crate::services::pubsub::MemoryPubSub;

/// Frames queued per connection before forwarded messages are dropped.
const OUTBOUND_BUFFER: usize = 1024;

/// Publish/subscribe broker shared by processes over TCP.
pub struct Broker {
    listener: TcpListener,
    bus: MemoryPubSub,
    max_frame_len: usize,
}

impl Broker {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IpcError::Transport(format!("bind {addr}: {e}")))?;
        Ok(Self {
            listener,
            bus: MemoryPubSub::new(),
            max_frame_len: max_frame_len(DEFAULT_MAX_PAYLOAD_BYTES),
        })
    }

    /// Connections sending a line longer than this payload allows are closed.
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_frame_len = max_frame_len(max_payload_bytes);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| IpcError::Transport(e.to_string()))
    }

    pub async fn run(self) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "broker listening");
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| IpcError::Transport(e.to_string()))?;
            let bus = self.bus.clone();
            let max_frame_len = self.max_frame_len;
            tokio::spawn(async move {
                debug!(%peer, "broker connection opened");
                if let Err(err) = serve_connection(stream, bus, max_frame_len).await {
                    warn!(%peer, error = %err, "broker connection failed");
                }
                debug!(%peer, "broker connection closed");
            });
        }
    }
}

async fn serve_connection(stream: TcpStream, bus: MemoryPubSub, max_frame_len: usize) -> Result<()> {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "could not disable nagle on broker connection");
    }
    let (read, mut write) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_frame(&mut write, &frame).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders = Vec::new();
    let mut frames = FrameReader::new(read, max_frame_len);
    let result = loop {
        let frame = match frames.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        match frame {
            Frame::Publish { channel, payload } => match Frame::decode_payload(&payload) {
                Ok(payload) => {
                    bus.publish_counted(&channel, payload);
                }
                Err(err) => debug!(error = %err, "dropping publish with bad payload"),
            },
            Frame::Subscribe { channels, patterns } => {
                let mut subscription = match bus.subscribe(&channels, &patterns).await {
                    Ok(subscription) => subscription,
                    Err(err) => {
                        debug!(error = %err, "rejecting subscription");
                        let rejected = Frame::Rejected {
                            reason: err.to_string(),
                        };
                        if out_tx.send(rejected).await.is_err() {
                            break Ok(());
                        }
                        continue;
                    }
                };
                // Queued ahead of anything the forwarder sends.
                if out_tx.send(Frame::Subscribed).await.is_err() {
                    break Ok(());
                }
                let out = out_tx.clone();
                forwarders.push(tokio::spawn(async move {
                    while let Some(message) = subscription.recv().await {
                        match out.try_send(Frame::message(&message)) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                warn!(channel = %message.channel, "subscriber is lagging, dropping message");
                            }
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                }));
            }
            Frame::Subscribed | Frame::Rejected { .. } | Frame::Message { .. } => {
                debug!("ignoring broker-side frame sent by a client")
            }
        }
    };

    for forwarder in forwarders {
        forwarder.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    result
}
