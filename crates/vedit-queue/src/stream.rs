//! Redis Streams access behind a small backend trait.

use async_trait::async_trait;
use redis::streams::StreamReadReply;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};

/// Field holding the event id in each stream entry.
pub const KEY_FIELD: &str = "key";
/// Field holding the JSON-encoded event in each stream entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// One entry read from a partition stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Stream the entry was read from
    pub stream: String,
    /// Entry ID assigned by Redis
    pub id: String,
    /// Event id, if present
    pub key: Option<String>,
    /// Raw payload; empty when the field is missing
    pub payload: String,
}

/// Choose the partition for an event id.
///
/// Stable across processes and restarts: the first four bytes of the
/// SHA-256 digest, modulo the partition count.
pub fn partition_for(id: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(id.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % partitions.max(1)
}

/// Minimal stream operations needed by the broker transport.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Create the consumer group on `stream` (and the stream itself) if missing.
    async fn ensure_group(&self, stream: &str, group: &str, start_id: &str) -> QueueResult<()>;

    /// Append an entry, returning its ID.
    async fn append(&self, stream: &str, key: &str, payload: &str) -> QueueResult<String>;

    /// Read new entries for `consumer` from any of `streams`.
    ///
    /// `count` applies per stream. Returns an empty list when the block timeout elapses.
    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
        block_ms: u64,
    ) -> QueueResult<Vec<StreamRecord>>;

    /// Acknowledge an entry for the group.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> QueueResult<()>;

    /// Check connectivity.
    async fn ping(&self) -> QueueResult<()>;
}

/// Redis-backed [`StreamBackend`].
#[derive(Debug, Clone)]
pub struct RedisStreams {
    client: redis::Client,
}

impl RedisStreams {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl StreamBackend for RedisStreams {
    async fn ensure_group(&self, stream: &str, group: &str, start_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {} on {}", group, stream),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group {} already exists on {}", group, stream);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn append(&self, stream: &str, key: &str, payload: &str) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let entry_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        Ok(entry_id)
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
        block_ms: u64,
    ) -> QueueResult<Vec<StreamRecord>> {
        if streams.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS");
        for stream in streams {
            cmd.arg(stream);
        }
        for _ in streams {
            cmd.arg(">");
        }

        // A timed-out block returns nil.
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                records.push(StreamRecord {
                    stream: stream_key.key.clone(),
                    key: field(&entry.map, KEY_FIELD),
                    payload: field(&entry.map, PAYLOAD_FIELD).unwrap_or_default(),
                    id: entry.id,
                });
            }
        }

        Ok(records)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

fn field(map: &std::collections::HashMap<String, redis::Value>, name: &str) -> Option<String> {
    match map.get(name) {
        Some(redis::Value::BulkString(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Some(redis::Value::SimpleString(s)) => Some(s.clone()),
        _ => None,
    }
}
