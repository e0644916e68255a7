pub mod acks;
pub mod cache;
pub mod dispatcher;
pub mod pubsub;
pub mod request;
pub mod tasks;
pub mod transport;
