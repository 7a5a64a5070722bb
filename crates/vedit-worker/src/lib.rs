//! Event processing worker.
//!
//! This crate provides:
//! - Job coordination (invoke, then notify)
//! - Webhook delivery and public file URLs
//! - A multi-slot executor with graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod webhook;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use job::JobHandler;
pub use logging::{JobLogger, JobStage};
pub use webhook::{FileUrlBuilder, WebhookNotifier};
