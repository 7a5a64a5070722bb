//! Job executor.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use vedit_media::{FfmpegInvoker, InvokerConfig};
use vedit_queue::EventTransport;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::job::JobHandler;
use crate::webhook::{FileUrlBuilder, WebhookNotifier};

/// Runs `workers` receiver loops over one transport.
pub struct JobExecutor {
    config: WorkerConfig,
    transport: EventTransport,
    handler: JobHandler,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, transport: EventTransport, handler: JobHandler) -> Self {
        Self {
            config,
            transport,
            handler,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Build the FFmpeg-backed handler from config.
    pub fn from_config(config: WorkerConfig, transport: EventTransport) -> WorkerResult<Self> {
        let invoker = FfmpegInvoker::new(InvokerConfig {
            binary_path: config.ffmpeg_path.clone(),
            output_root: config.output_path.clone(),
        });
        let notifier = WebhookNotifier::new(config.webhook_timeout)?;
        let urls = FileUrlBuilder::new(
            config.output_path.clone(),
            config.public_host.clone(),
            config.public_port,
        );
        let handler = JobHandler::new(Arc::new(invoker), notifier, urls);

        Ok(Self::new(config, transport, handler))
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until `cancel` fires and every worker has stopped.
    ///
    /// In-flight jobs observe the same token, so running FFmpeg processes are
    /// killed. Workers still running after the shutdown timeout are aborted.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerResult<()> {
        let workers = self.config.workers.max(1);
        info!(
            "Starting job executor '{}' with {} worker(s) on {} transport",
            self.consumer_name,
            workers,
            self.transport.kind()
        );

        let mut tasks = JoinSet::new();
        for slot in 0..workers {
            let name = format!("{}-{}", self.consumer_name, slot);
            let receiver = self.transport.receiver(name.clone());
            let handler = self.handler.clone().with_worker(name);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                receiver.receive(cancel, &handler).await;
            });
        }

        cancel.cancelled().await;
        info!("Shutdown signal received, waiting for workers to stop...");

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Worker task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Workers did not stop within {:?}, aborting",
                self.config.shutdown_timeout
            );
            tasks.abort_all();
        }

        info!("Job executor stopped");
        Ok(())
    }
}
