//! Per-event job coordination.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use vedit_media::Invoker;
use vedit_models::{Event, WebhookResponse};
use vedit_queue::{EventHandler, HandlerError};

use crate::error::WorkerResult;
use crate::logging::{JobLogger, JobStage};
use crate::webhook::{FileUrlBuilder, WebhookNotifier};

/// Runs the invoker for each event and reports the outcome to its webhook.
#[derive(Clone)]
pub struct JobHandler {
    invoker: Arc<dyn Invoker>,
    notifier: WebhookNotifier,
    urls: FileUrlBuilder,
    worker: String,
}

impl JobHandler {
    pub fn new(invoker: Arc<dyn Invoker>, notifier: WebhookNotifier, urls: FileUrlBuilder) -> Self {
        Self {
            invoker,
            notifier,
            urls,
            worker: "worker".to_string(),
        }
    }

    /// Name used in log lines for this handler's worker slot.
    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }

    async fn run(
        &self,
        event: &Event,
        cancel: &CancellationToken,
        logger: &JobLogger,
    ) -> Result<(), HandlerError> {
        logger.stage(JobStage::Received, "Event received");

        logger.stage(JobStage::Invoking, "Invoking transformation");
        let result = self.invoker.invoke(&event.request, cancel).await;

        let response = match &result {
            Ok(files) => {
                logger.stage(
                    JobStage::Succeeded,
                    &format!("Transformation produced {} file(s)", files.len()),
                );
                WebhookResponse::success(event.id.clone(), self.urls.urls_for(files))
            }
            Err(e) => {
                logger.stage(JobStage::Failed, &format!("Transformation failed: {}", e));
                WebhookResponse::error(event.id.clone(), e.to_string())
            }
        };

        let notified = self.notify(event, &response, logger).await;

        match (result, notified) {
            (Err(e), notified) => {
                if let Err(n) = notified {
                    logger.log_error(&format!("Failed to deliver failure webhook: {}", n));
                }
                Err(HandlerError::invocation(e.to_string(), e.is_retryable()))
            }
            (Ok(files), Err(n)) => {
                logger.log_error(&format!("Failed to deliver webhook: {}", n));
                // A retry re-invokes into a fresh directory.
                if let Err(e) = self.invoker.discard(&files).await {
                    logger.log_error(&format!("Failed to discard undelivered output: {}", e));
                }
                Err(HandlerError::notification(n.to_string()))
            }
            (Ok(_), Ok(())) => Ok(()),
        }
    }

    async fn notify(
        &self,
        event: &Event,
        response: &WebhookResponse,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let Some(url) = event.request.webhook_url() else {
            debug!(event_id = %event.id, "No webhook configured");
            return Ok(());
        };

        self.notifier.notify(url, response).await?;
        logger.stage(
            JobStage::Notified,
            &format!("Webhook sent ({})", response.status.as_str()),
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JobHandler {
    async fn handle(&self, event: &Event, cancel: &CancellationToken) -> Result<(), HandlerError> {
        let logger = JobLogger::new(&event.id, &self.worker);
        let span = logger.create_span();
        self.run(event, cancel, &logger).instrument(span).await
    }
}
