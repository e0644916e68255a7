pub mod memory;
pub mod pattern;
pub mod tcp;

pub use memory::MemoryPubSub;
pub use tcp::TcpPubSub;
