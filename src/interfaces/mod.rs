pub mod handlers;
pub mod pubsub;
