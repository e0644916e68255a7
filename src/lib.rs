pub mod broker;
pub mod codec;
pub mod config;
pub mod domains;
pub mod error;
pub mod handlers;
pub mod interfaces;
pub mod node;
pub mod plugins;
pub mod services;

pub use crate::codec::EnvelopeCodec;
pub use crate::config::IpcConfig;
pub use crate::domains::envelope::{ClusterAddress, Envelope, ErrorKind, ErrorPayload, Outcome, Target};
pub use crate::error::{DecodeError, IpcError, Result};
pub use crate::node::IpcNode;
pub use crate::services::request::RequestClient;
pub use crate::services::tasks::{SubmitOutcome, TaskSubmission, TaskSubmitter};
