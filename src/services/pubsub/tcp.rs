use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::error::{IpcError, Result};
use crate::interfaces::pubsub::{PubSub, RawMessage, Subscription};

/// Room for the channel names and JSON framing around an encoded payload.
const FRAME_OVERHEAD: usize = 64 * 1024;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker line protocol: one JSON object per line, payloads base64-encoded.
///
/// A client sends `subscribe` and the broker answers `subscribed` once the
/// subscription is live (or `rejected`); only then can it miss nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Frame {
    Subscribe {
        channels: Vec<String>,
        patterns: Vec<String>,
    },
    Subscribed,
    Rejected {
        reason: String,
    },
    Publish {
        channel: String,
        payload: String,
    },
    Message {
        channel: String,
        #[serde(default)]
        pattern: Option<String>,
        payload: String,
    },
}

impl Frame {
    pub fn publish(channel: &str, payload: &[u8]) -> Self {
        Self::Publish {
            channel: channel.to_string(),
            payload: BASE64.encode(payload),
        }
    }

    pub fn message(message: &RawMessage) -> Self {
        Self::Message {
            channel: message.channel.clone(),
            pattern: message.pattern.clone(),
            payload: BASE64.encode(&message.payload),
        }
    }

    pub fn decode_payload(payload: &str) -> Result<Bytes> {
        BASE64
            .decode(payload.as_bytes())
            .map(Bytes::from)
            .map_err(|e| IpcError::Serialization(e.to_string()))
    }
}

/// Longest line a peer may send when payloads are capped at `max_payload_bytes`.
pub fn max_frame_len(max_payload_bytes: usize) -> usize {
    max_payload_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(FRAME_OVERHEAD)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let mut line = serde_json::to_vec(frame).map_err(|e| IpcError::Serialization(e.to_string()))?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|e| IpcError::Transport(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| IpcError::Transport(e.to_string()))
}

/// Reads frames line by line without ever buffering more than `max_len` bytes.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(read),
            line: Vec::new(),
            max_len,
        }
    }

    /// Next well-formed frame, or `None` at end of stream. Malformed lines are
    /// skipped; an overlong line is an error because the stream cannot resync.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let limit = (self.max_len as u64).saturating_add(1);
        loop {
            self.line.clear();
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| IpcError::Transport(e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            if self.line.last() != Some(&b'\n') {
                if read as u64 >= limit {
                    return Err(IpcError::Transport(format!(
                        "frame exceeds {} bytes",
                        self.max_len
                    )));
                }
                // Peer went away mid-line.
                return Ok(None);
            }
            match serde_json::from_slice::<Frame>(&self.line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => debug!(error = %err, "dropping malformed frame"),
            }
        }
    }
}

/// Client for `cluster-ipc-broker`. Publishes share one lazily opened connection;
/// every subscription gets a connection of its own.
pub struct TcpPubSub {
    addr: String,
    max_payload_bytes: usize,
    publisher: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpPubSub {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            publisher: Mutex::new(None),
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| IpcError::Transport(format!("connect {}: {e}", self.addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| IpcError::Transport(e.to_string()))?;
        Ok(stream)
    }
}

#[async_trait]
impl PubSub for TcpPubSub {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        if payload.len() > self.max_payload_bytes {
            return Err(IpcError::Transport(format!(
                "payload of {} bytes exceeds the {} byte limit",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        let mut guard = self.publisher.lock().await;
        if guard.is_none() {
            let (_, write) = self.connect().await?.into_split();
            *guard = Some(write);
        }
        let frame = Frame::publish(channel, &payload);
        let Some(writer) = guard.as_mut() else {
            return Err(IpcError::Transport("publisher connection missing".to_string()));
        };
        if let Err(err) = write_frame(writer, &frame).await {
            // Reconnect on the next publish.
            *guard = None;
            return Err(err);
        }
        Ok(())
    }

    /// Returns once the broker confirmed the subscription, so nothing published
    /// afterwards is missed.
    async fn subscribe(&self, channels: &[String], patterns: &[String]) -> Result<Subscription> {
        let (read, mut write) = self.connect().await?.into_split();
        write_frame(
            &mut write,
            &Frame::Subscribe {
                channels: channels.to_vec(),
                patterns: patterns.to_vec(),
            },
        )
        .await?;

        let mut frames = FrameReader::new(read, max_frame_len(self.max_payload_bytes));
        let confirmation = tokio::time::timeout(SUBSCRIBE_TIMEOUT, frames.next_frame())
            .await
            .map_err(|_| {
                IpcError::Transport(format!("broker {} did not confirm the subscription", self.addr))
            })??;
        match confirmation {
            Some(Frame::Subscribed) => {}
            Some(Frame::Rejected { reason }) => {
                return Err(IpcError::Transport(format!("subscription rejected: {reason}")))
            }
            Some(other) => {
                return Err(IpcError::Transport(format!(
                    "unexpected frame before subscription confirmation: {other:?}"
                )))
            }
            None => {
                return Err(IpcError::Transport(
                    "broker closed the connection before confirming the subscription".to_string(),
                ))
            }
        }

        let (tx, subscription) = Subscription::pair();
        let addr = self.addr.clone();
        tokio::spawn(async move {
            let _write = write;
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    frame = frames.next_frame() => match frame {
                        Ok(Some(Frame::Message { channel, pattern, payload })) => {
                            let payload = match Frame::decode_payload(&payload) {
                                Ok(payload) => payload,
                                Err(err) => {
                                    debug!(error = %err, "dropping undecodable broker payload");
                                    continue;
                                }
                            };
                            let message = RawMessage { channel, pattern, payload };
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Ok(Some(_)) => continue,
                        Ok(None) => {
                            warn!(broker = %addr, "broker closed the subscription");
                            break;
                        }
                        Err(err) => {
                            warn!(broker = %addr, error = %err, "subscription read failed");
                            break;
                        }
                    }
                }
            }
        });
        Ok(subscription)
    }
}
