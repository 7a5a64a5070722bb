//! Event handler seam between receivers and job processing.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use vedit_models::Event;

/// Failure reported by an [`EventHandler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The transformation itself failed.
    #[error("invocation failed: {message}")]
    Invocation { message: String, retryable: bool },

    /// The transformation succeeded but the completion notice could not be delivered.
    #[error("notification failed: {0}")]
    Notification(String),
}

impl HandlerError {
    pub fn invocation(message: impl Into<String>, retryable: bool) -> Self {
        Self::Invocation {
            message: message.into(),
            retryable,
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification(message.into())
    }

    /// Whether a receiver that retries may call the handler again.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Invocation { retryable, .. } => *retryable,
            HandlerError::Notification(_) => true,
        }
    }
}

/// Processes one event.
///
/// Implementations must observe `cancel` for long-running work.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event, cancel: &CancellationToken) -> Result<(), HandlerError>;
}
