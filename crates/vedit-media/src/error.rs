//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while invoking FFmpeg.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no valid input file provided")]
    InvalidInput,

    #[error("Invalid output pattern: {0}")]
    InvalidOutput(String),

    #[error("FFmpeg binary not found: {0}")]
    BinaryNotFound(PathBuf),

    #[error("FFmpeg command failed: {message}")]
    ProcessFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("process killed")]
    ProcessKilled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a process failure error.
    pub fn process_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProcessFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Whether running the same request again could succeed.
    ///
    /// Bad input, a missing binary and cancellation are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::ProcessFailed { .. } | MediaError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!MediaError::InvalidInput.is_retryable());
        assert!(!MediaError::ProcessKilled.is_retryable());
        assert!(!MediaError::BinaryNotFound(PathBuf::from("ffmpeg")).is_retryable());
        assert!(MediaError::process_failed("exit status: 1", None, Some(1)).is_retryable());
    }

    #[test]
    fn test_process_failed_message() {
        let err = MediaError::process_failed("exit status: 1", Some("boom".into()), Some(1));
        assert_eq!(err.to_string(), "FFmpeg command failed: exit status: 1");
    }
}
