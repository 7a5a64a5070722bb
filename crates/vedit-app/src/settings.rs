//! Process-level settings assembled from each crate's config.

use std::path::{Path, PathBuf};

use anyhow::Context;

use vedit_api::ApiConfig;
use vedit_queue::QueueConfig;
use vedit_worker::WorkerConfig;

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub api_enabled: bool,
    pub job_enabled: bool,
    pub metrics_enabled: bool,
    pub log_json: bool,
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
}

impl AppSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_enabled: env_flag("API_ENABLED", true),
            job_enabled: env_flag("JOB_ENABLED", true),
            metrics_enabled: env_flag("METRICS_ENABLED", true),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
            api: ApiConfig::from_env(),
            worker: WorkerConfig::from_env(),
            queue: QueueConfig::from_env().context("invalid queue configuration")?,
        })
    }

    /// Create the input and output directories and make every configured
    /// path absolute, so output file paths share a prefix with the root.
    pub fn prepare_directories(&mut self) -> anyhow::Result<()> {
        let input = ensure_dir(&self.api.input_path)?;
        let output = ensure_dir(&self.api.output_path)?;
        let worker_output = ensure_dir(&self.worker.output_path)?;

        self.api.input_path = input;
        self.api.output_path = output;
        self.worker.output_path = worker_output;
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))?;
    std::fs::canonicalize(path)
        .with_context(|| format!("failed to resolve directory {}", path.display()))
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
