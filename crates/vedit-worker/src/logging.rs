//! Structured job logging utilities.
//!
//! Every line carries the event id and the job stage so one event can be
//! followed across workers.

use tracing::{error, info, Span};

use vedit_models::EventId;

/// Lifecycle of one event inside a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    Invoking,
    Succeeded,
    Failed,
    Notified,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Invoking => "invoking",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
            JobStage::Notified => "notified",
        }
    }
}

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    event_id: String,
    worker: String,
}

impl JobLogger {
    /// Create a logger for one event handled by `worker`.
    pub fn new(event_id: &EventId, worker: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            worker: worker.to_string(),
        }
    }

    /// Log entry into a stage.
    pub fn stage(&self, stage: JobStage, message: &str) {
        info!(
            event_id = %self.event_id,
            worker = %self.worker,
            stage = stage.as_str(),
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            event_id = %self.event_id,
            worker = %self.worker,
            "Job error: {}", message
        );
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            event_id = %self.event_id,
            worker = %self.worker
        )
    }
}
