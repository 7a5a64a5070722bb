//! Emitter/receiver traits and transport selection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vedit_models::Event;

use crate::broker::{StreamEmitter, StreamReceiver};
use crate::config::{QueueConfig, TransportKind};
use crate::error::QueueResult;
use crate::handler::EventHandler;
use crate::memory::InProcessQueue;
use crate::stream::{RedisStreams, StreamBackend};

/// Publishes events for asynchronous processing.
///
/// Dropping the returned future abandons the send.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn send(&self, event: Event) -> QueueResult<()>;

    /// Probe the transport for readiness checks.
    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Delivers events to a handler until cancelled.
#[async_trait]
pub trait EventReceiver: Send + Sync {
    /// Run the receive loop. Handler calls never overlap within one receiver.
    async fn receive(&self, cancel: CancellationToken, handler: &dyn EventHandler);
}

/// A constructed transport, shared by the intake side and the workers.
#[derive(Clone)]
pub enum EventTransport {
    InProcess(InProcessQueue),
    Streams {
        backend: Arc<dyn StreamBackend>,
        config: QueueConfig,
    },
}

impl EventTransport {
    /// Build the transport selected by `config.transport`.
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        match config.transport {
            TransportKind::Memory => {
                info!("Using in-process queue (capacity {})", config.capacity);
                Ok(EventTransport::InProcess(InProcessQueue::new(config.capacity)))
            }
            TransportKind::Redis => {
                info!(
                    "Using Redis Streams transport: topic={} partitions={} group={}",
                    config.topic, config.partitions, config.consumer_group
                );
                let backend = RedisStreams::new(&config.redis_url)?;
                Ok(EventTransport::Streams {
                    backend: Arc::new(backend),
                    config: config.clone(),
                })
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            EventTransport::InProcess(_) => TransportKind::Memory,
            EventTransport::Streams { .. } => TransportKind::Redis,
        }
    }

    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        match self {
            EventTransport::InProcess(queue) => Arc::new(queue.emitter()),
            EventTransport::Streams { backend, config } => {
                Arc::new(StreamEmitter::new(backend.clone(), config))
            }
        }
    }

    /// Create a receiver; `consumer` names this worker within the consumer group.
    pub fn receiver(&self, consumer: impl Into<String>) -> Box<dyn EventReceiver> {
        match self {
            EventTransport::InProcess(queue) => Box::new(queue.receiver()),
            EventTransport::Streams { backend, config } => Box::new(StreamReceiver::new(
                backend.clone(),
                config.clone(),
                consumer,
            )),
        }
    }
}
