use thiserror::Error;

use crate::domains::envelope::{Envelope, ErrorPayload};

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("correlation id {0} is already registered")]
    RegistryCollision(String),
    #[error("timed out waiting for a response to {correlation_id}")]
    Timeout { correlation_id: String },
    #[error("expected {expected} responses to {correlation_id}, got {}", .received.len())]
    CountMismatch {
        correlation_id: String,
        expected: usize,
        received: Vec<Envelope>,
    },
    #[error("cluster {cluster_id:?} answered with an error: {error}")]
    Remote {
        cluster_id: Option<u16>,
        error: ErrorPayload,
    },
    #[error("handler error: {0}")]
    Handler(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope carries both a result and an error")]
    ConflictingOutcome,
}

pub type Result<T> = std::result::Result<T, IpcError>;
