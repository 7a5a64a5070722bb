//! Event transports for the transformation service.
//!
//! This crate provides:
//! - `EventEmitter` / `EventReceiver` / `EventHandler` traits
//! - An in-process bounded channel transport
//! - A Redis Streams transport with partitioning and bounded retry

pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod memory;
pub mod metrics;
pub mod stream;
pub mod transport;

pub use broker::{StreamEmitter, StreamReceiver};
pub use config::{partition_stream, QueueConfig, StartOffset, TransportKind};
pub use error::{QueueError, QueueResult};
pub use handler::{EventHandler, HandlerError};
pub use memory::{InProcessEmitter, InProcessQueue, InProcessReceiver};
pub use stream::{partition_for, RedisStreams, StreamBackend, StreamRecord};
pub use transport::{EventEmitter, EventReceiver, EventTransport};
