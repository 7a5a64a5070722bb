//! Broker transport over partitioned streams.
//!
//! Events are keyed by id and routed to `<topic>:<partition>`, so every
//! message for one id stays in order on one stream. Records are
//! acknowledged as soon as they are polled; redelivery after a crash is
//! not attempted.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vedit_models::Event;

use crate::config::{partition_stream, QueueConfig};
use crate::error::{QueueError, QueueResult};
use crate::handler::EventHandler;
use crate::metrics;
use crate::stream::{partition_for, StreamBackend, StreamRecord};
use crate::transport::{EventEmitter, EventReceiver};

/// Producer side of the broker transport.
pub struct StreamEmitter {
    backend: Arc<dyn StreamBackend>,
    topic: String,
    partitions: u32,
}

impl StreamEmitter {
    pub fn new(backend: Arc<dyn StreamBackend>, config: &QueueConfig) -> Self {
        Self {
            backend,
            topic: config.topic.clone(),
            partitions: config.partitions,
        }
    }

    /// Stream an event id is routed to.
    pub fn stream_for(&self, id: &str) -> String {
        partition_stream(&self.topic, partition_for(id, self.partitions))
    }
}

#[async_trait]
impl EventEmitter for StreamEmitter {
    async fn send(&self, event: Event) -> QueueResult<()> {
        let payload = serde_json::to_string(&event)?;
        let stream = self.stream_for(event.id.as_str());

        let entry_id = self
            .backend
            .append(&stream, event.id.as_str(), &payload)
            .await?;

        metrics::record_emitted("redis");
        debug!(event_id = %event.id, stream = %stream, record_id = %entry_id, "Appended event");
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        self.backend.ping().await
    }
}

/// Consumer side of the broker transport.
pub struct StreamReceiver {
    backend: Arc<dyn StreamBackend>,
    config: QueueConfig,
    consumer: String,
    streams: Vec<String>,
}

impl StreamReceiver {
    pub fn new(
        backend: Arc<dyn StreamBackend>,
        config: QueueConfig,
        consumer: impl Into<String>,
    ) -> Self {
        let streams = config.partition_streams();
        Self {
            backend,
            config,
            consumer: consumer.into(),
            streams,
        }
    }

    /// Create the consumer group on every partition, retrying until it
    /// succeeds. Returns `false` if cancelled first.
    async fn ensure_groups(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.try_ensure_groups().await {
                Ok(()) => return true,
                Err(e) => {
                    error!("Failed to create consumer groups: {}", e);
                    if !self.backoff(cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn try_ensure_groups(&self) -> QueueResult<()> {
        let start_id = self.config.offset.stream_id();
        for stream in &self.streams {
            self.backend
                .ensure_group(stream, &self.config.consumer_group, start_id)
                .await?;
        }
        Ok(())
    }

    /// Sleep for the error back-off. Returns `false` if cancelled.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.error_backoff) => true,
        }
    }

    async fn poll(&self) -> QueueResult<Vec<StreamRecord>> {
        self.backend
            .read_group(
                &self.config.consumer_group,
                &self.consumer,
                &self.streams,
                self.config.batch_size.max(1),
                self.config.block_timeout.as_millis() as u64,
            )
            .await
    }

    async fn process(
        &self,
        record: StreamRecord,
        cancel: &CancellationToken,
        handler: &dyn EventHandler,
    ) {
        if let Err(e) = self
            .backend
            .ack(&record.stream, &self.config.consumer_group, &record.id)
            .await
        {
            warn!(
                stream = %record.stream,
                record_id = %record.id,
                "Failed to acknowledge record: {}", e
            );
        }

        let event = match decode(&record) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    stream = %record.stream,
                    record_id = %record.id,
                    "Skipping malformed record: {}", e
                );
                metrics::record_malformed();
                return;
            }
        };

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match handler.handle(&event, cancel).await {
                Ok(()) => {
                    debug!(event_id = %event.id, attempt, "Event handled");
                    metrics::record_handled("success");
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    error!(event_id = %event.id, attempt, "Event failed, not retrying: {}", e);
                    metrics::record_handled("failure");
                    return;
                }
                Err(e) if attempt == max_attempts => {
                    error!(
                        event_id = %event.id,
                        attempt,
                        "Event failed after {} attempts: {}", max_attempts, e
                    );
                    metrics::record_handled("exhausted");
                    return;
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        warn!(event_id = %event.id, attempt, "Event failed during shutdown: {}", e);
                        metrics::record_handled("failure");
                        return;
                    }
                    warn!(event_id = %event.id, attempt, "Event failed, retrying: {}", e);
                }
            }
        }
    }
}

fn decode(record: &StreamRecord) -> QueueResult<Event> {
    serde_json::from_str(&record.payload).map_err(|e| QueueError::Deserialization(e.to_string()))
}

#[async_trait]
impl EventReceiver for StreamReceiver {
    async fn receive(&self, cancel: CancellationToken, handler: &dyn EventHandler) {
        if !self.ensure_groups(&cancel).await {
            return;
        }

        info!(
            "Stream receiver {} started on {} partition(s)",
            self.consumer,
            self.streams.len()
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let records = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poll() => polled,
            };

            let records = match records {
                Ok(records) => records,
                Err(e) => {
                    error!("Failed to poll streams: {}", e);
                    if !self.backoff(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            // Every polled record is handled, even after cancellation; the
            // handler sees the cancelled token and fails fast.
            for record in records {
                self.process(record, &cancel, handler).await;
            }
        }

        info!("Stream receiver {} stopped", self.consumer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use crate::stream::fake::FakeStreams;
    use std::sync::Mutex;
    use std::time::Duration;
    use vedit_models::{Input, Output, TransformRequest};

    /// Handler that replays a scripted sequence of results.
    struct Scripted {
        calls: Mutex<Vec<String>>,
        results: Mutex<Vec<Result<(), HandlerError>>>,
        cancels: bool,
    }

    impl Scripted {
        /// `results` are consumed front to back; once empty, calls succeed.
        fn new(results: Vec<Result<(), HandlerError>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                results: Mutex::new(results),
                cancels: false,
            }
        }

        fn always_failing(retryable: bool) -> Self {
            Self::new(
                (0..100)
                    .map(|_| Err(HandlerError::invocation("exit status: 1", retryable)))
                    .collect(),
            )
        }

        /// Cancel the receiver's token from inside every call.
        fn cancelling(mut self) -> Self {
            self.cancels = true;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Scripted {
        async fn handle(
            &self,
            event: &Event,
            cancel: &CancellationToken,
        ) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(event.id.to_string());
            if self.cancels {
                cancel.cancel();
            }
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(())
            } else {
                results.remove(0)
            }
        }
    }

    fn config() -> QueueConfig {
        QueueConfig {
            topic: "test".into(),
            partitions: 1,
            error_backoff: Duration::from_millis(10),
            block_timeout: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn event(id: &str) -> Event {
        Event::with_id(
            id,
            TransformRequest::new(Output::new("out.jpg")).with_input(Input::local("in.mp4")),
        )
    }

    /// Run a receiver until the backend has no pending records, then cancel.
    async fn run_until_drained(backend: Arc<FakeStreams>, config: QueueConfig, handler: &Scripted) {
        let receiver = StreamReceiver::new(backend.clone(), config, "worker-0");
        let cancel = CancellationToken::new();
        let stopper = {
            let cancel = cancel.clone();
            async move {
                while !backend.is_drained() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(receiver.receive(cancel.clone(), handler), stopper) },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_emitter_routes_json_by_id() {
        let backend = Arc::new(FakeStreams::new());
        let config = QueueConfig {
            partitions: 4,
            ..config()
        };
        let emitter = StreamEmitter::new(backend.clone(), &config);

        let ev = event("abc");
        emitter.send(ev.clone()).await.unwrap();
        emitter.send(ev.clone()).await.unwrap();

        let appended = backend.appended();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].stream, appended[1].stream);
        assert_eq!(appended[0].stream, format!("test:{}", partition_for("abc", 4)));
        assert_eq!(appended[0].key.as_deref(), Some("abc"));

        let decoded: Event = serde_json::from_str(&appended[0].payload).unwrap();
        assert_eq!(decoded, ev);
        let raw: serde_json::Value = serde_json::from_str(&appended[0].payload).unwrap();
        assert!(raw.get("editor_request").is_some());
    }

    #[tokio::test]
    async fn test_emitter_surfaces_append_errors() {
        let backend = Arc::new(FakeStreams::new());
        backend.fail_appends();
        let emitter = StreamEmitter::new(backend, &config());

        assert!(emitter.send(event("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_retryable_failure_is_attempted_five_times() {
        let backend = Arc::new(FakeStreams::new());
        let emitter = StreamEmitter::new(backend.clone(), &config());
        emitter.send(event("bad")).await.unwrap();
        emitter.send(event("next")).await.unwrap();

        let handler = Scripted::new(
            (0..5)
                .map(|_| Err(HandlerError::invocation("exit status: 1", true)))
                .collect(),
        );
        run_until_drained(backend.clone(), config(), &handler).await;

        assert_eq!(handler.calls(), vec!["bad", "bad", "bad", "bad", "bad", "next"]);
        assert_eq!(backend.acked().len(), 2);
        assert!(backend.has_group("test:0", "vedit:workers"));
    }

    #[tokio::test]
    async fn test_attempts_are_configurable() {
        let backend = Arc::new(FakeStreams::new());
        StreamEmitter::new(backend.clone(), &config())
            .send(event("bad"))
            .await
            .unwrap();

        let handler = Scripted::always_failing(true);
        run_until_drained(backend, QueueConfig { max_attempts: 2, ..config() }, &handler).await;

        assert_eq!(handler.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_success_after_retry_stops() {
        let backend = Arc::new(FakeStreams::new());
        StreamEmitter::new(backend.clone(), &config())
            .send(event("flaky"))
            .await
            .unwrap();

        let handler = Scripted::new(vec![Err(HandlerError::notification("timeout"))]);
        run_until_drained(backend, config(), &handler).await;

        assert_eq!(handler.calls(), vec!["flaky", "flaky"]);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_attempted_once() {
        let backend = Arc::new(FakeStreams::new());
        StreamEmitter::new(backend.clone(), &config())
            .send(event("invalid"))
            .await
            .unwrap();

        let handler = Scripted::always_failing(false);
        run_until_drained(backend, config(), &handler).await;

        assert_eq!(handler.calls(), vec!["invalid"]);
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_handler() {
        let backend = Arc::new(FakeStreams::new());
        backend.push_raw("test:0", "junk", "{not json");
        StreamEmitter::new(backend.clone(), &config())
            .send(event("good"))
            .await
            .unwrap();

        let handler = Scripted::new(Vec::new());
        run_until_drained(backend.clone(), config(), &handler).await;

        assert_eq!(handler.calls(), vec!["good"]);
        assert_eq!(backend.acked().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_errors_back_off_and_recover() {
        let backend = Arc::new(FakeStreams::new());
        backend.fail_reads(2);
        StreamEmitter::new(backend.clone(), &config())
            .send(event("later"))
            .await
            .unwrap();

        let handler = Scripted::new(Vec::new());
        run_until_drained(backend, config(), &handler).await;

        assert_eq!(handler.calls(), vec!["later"]);
    }

    /// Run a receiver until it returns on its own.
    async fn run_to_completion(backend: Arc<FakeStreams>, handler: &Scripted) {
        let receiver = StreamReceiver::new(backend, config(), "worker-0");
        tokio::time::timeout(
            Duration::from_secs(5),
            receiver.receive(CancellationToken::new(), handler),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_mid_batch_still_handles_polled_records() {
        let backend = Arc::new(FakeStreams::new());
        let emitter = StreamEmitter::new(backend.clone(), &config());
        for id in ["a", "b", "c"] {
            emitter.send(event(id)).await.unwrap();
        }

        let handler = Scripted::new(Vec::new()).cancelling();
        run_to_completion(backend.clone(), &handler).await;

        assert_eq!(handler.calls(), vec!["a", "b", "c"]);
        assert_eq!(backend.acked().len(), 3);
        assert!(backend.is_drained());
    }

    #[tokio::test]
    async fn test_cancellation_between_attempts_stops_retries() {
        let backend = Arc::new(FakeStreams::new());
        StreamEmitter::new(backend.clone(), &config())
            .send(event("killed"))
            .await
            .unwrap();

        let handler = Scripted::always_failing(true).cancelling();
        run_to_completion(backend.clone(), &handler).await;

        assert_eq!(handler.calls(), vec!["killed"]);
        assert_eq!(backend.acked().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_returns() {
        let backend = Arc::new(FakeStreams::new());
        backend.fail_reads(u32::MAX);
        let receiver = StreamReceiver::new(
            backend,
            QueueConfig {
                error_backoff: Duration::from_secs(60),
                ..config()
            },
            "worker-0",
        );

        let cancel = CancellationToken::new();
        let trigger = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        };
        let handler = Scripted::new(Vec::new());

        tokio::time::timeout(
            Duration::from_secs(2),
            async { tokio::join!(receiver.receive(cancel.clone(), &handler), trigger) },
        )
        .await
        .unwrap();
    }
}
