//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent receiver loops
    pub workers: usize,
    /// FFmpeg binary name or path
    pub ffmpeg_path: PathBuf,
    /// Root for per-job output directories, also served under `/files`
    pub output_path: PathBuf,
    /// Host used in file URLs sent to webhooks
    pub public_host: String,
    /// Port used in file URLs; omitted from the URL when unset
    pub public_port: Option<u16>,
    /// Timeout for one webhook POST
    pub webhook_timeout: Duration,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            output_path: PathBuf::from("./data/output"),
            public_host: "localhost".to_string(),
            public_port: Some(8080),
            webhook_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            workers: std::env::var("JOB_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            output_path: std::env::var("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/output")),
            public_host: std::env::var("API_PUBLIC_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            // An empty value drops the port from generated URLs.
            public_port: match std::env::var("API_PUBLIC_PORT") {
                Ok(s) => s.parse().ok(),
                Err(_) => Some(8080),
            },
            webhook_timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
