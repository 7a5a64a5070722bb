//! Transport configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::QueueError;

/// Which transport carries events between intake and workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Bounded channel inside this process
    #[default]
    Memory,
    /// Redis Streams with consumer groups
    Redis,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Memory => "memory",
            TransportKind::Redis => "redis",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inprocess" | "in-process" => Ok(TransportKind::Memory),
            "redis" | "broker" => Ok(TransportKind::Redis),
            other => Err(QueueError::invalid_config(format!(
                "unknown transport {:?}",
                other
            ))),
        }
    }
}

/// Where a new consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartOffset {
    /// Everything already in the stream
    Earliest,
    /// Only entries appended after the group is created
    #[default]
    Latest,
}

impl StartOffset {
    /// Stream ID passed to `XGROUP CREATE`.
    pub fn stream_id(&self) -> &'static str {
        match self {
            StartOffset::Earliest => "0",
            StartOffset::Latest => "$",
        }
    }
}

impl FromStr for StartOffset {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(StartOffset::Earliest),
            "latest" => Ok(StartOffset::Latest),
            other => Err(QueueError::invalid_config(format!(
                "unknown start offset {:?}",
                other
            ))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Selected transport
    pub transport: TransportKind,
    /// In-process channel capacity
    pub capacity: usize,
    /// Redis URL
    pub redis_url: String,
    /// Stream name prefix; partitions are `<topic>:<n>`
    pub topic: String,
    /// Number of partition streams
    pub partitions: u32,
    /// Consumer group name
    pub consumer_group: String,
    /// Start position for newly created groups
    pub offset: StartOffset,
    /// Handler attempts per record
    pub max_attempts: u32,
    /// Max records per poll
    pub batch_size: usize,
    /// How long a poll blocks waiting for records
    pub block_timeout: Duration,
    /// Pause after a failed poll
    pub error_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Memory,
            capacity: 1024,
            redis_url: "redis://localhost:6379".to_string(),
            topic: "vedit:events".to_string(),
            partitions: 4,
            consumer_group: "vedit:workers".to_string(),
            offset: StartOffset::Latest,
            max_attempts: 5,
            batch_size: 10,
            block_timeout: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(5000),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// Unknown transport or offset names are rejected rather than defaulted.
    pub fn from_env() -> Result<Self, QueueError> {
        let defaults = Self::default();

        let transport = match std::env::var("QUEUE_TRANSPORT") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.transport,
        };
        let offset = match std::env::var("QUEUE_OFFSET") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.offset,
        };

        Ok(Self {
            transport,
            capacity: env_parse("QUEUE_CAPACITY").unwrap_or(defaults.capacity),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            topic: std::env::var("QUEUE_TOPIC").unwrap_or(defaults.topic),
            partitions: env_parse("QUEUE_PARTITIONS").unwrap_or(defaults.partitions),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            offset,
            max_attempts: env_parse("QUEUE_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            batch_size: env_parse("QUEUE_BATCH_SIZE").unwrap_or(defaults.batch_size),
            block_timeout: env_parse("QUEUE_BLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_timeout),
            error_backoff: env_parse("QUEUE_ERROR_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.error_backoff),
        })
    }

    /// Names of all partition streams, in partition order.
    pub fn partition_streams(&self) -> Vec<String> {
        (0..self.partitions.max(1))
            .map(|p| partition_stream(&self.topic, p))
            .collect()
    }
}

/// Stream key for one partition of a topic.
pub fn partition_stream(topic: &str, partition: u32) -> String {
    format!("{}:{}", topic, partition)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
