//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Webhook delivery failed: {0}")]
    Notification(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }
}
