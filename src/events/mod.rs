mod backoff;
mod consumer;
mod kafka;
mod memory;

pub use backoff::Backoff;
pub use consumer::{EventConsumer, Step};
pub use kafka::KafkaEventSource;
pub use memory::MemoryEventSource;
