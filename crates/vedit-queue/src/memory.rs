//! In-process transport over a bounded MPMC channel.

use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use vedit_models::Event;

use crate::error::QueueResult;
use crate::handler::EventHandler;
use crate::metrics;
use crate::transport::{EventEmitter, EventReceiver};

/// Shared queue handle. Clones refer to the same channel.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl InProcessQueue {
    /// Create a queue holding at most `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn emitter(&self) -> InProcessEmitter {
        InProcessEmitter {
            sender: self.sender.clone(),
        }
    }

    pub fn receiver(&self) -> InProcessReceiver {
        InProcessReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Number of events waiting to be received.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Fire-and-forget producer side.
#[derive(Debug, Clone)]
pub struct InProcessEmitter {
    sender: Sender<Event>,
}

#[async_trait]
impl EventEmitter for InProcessEmitter {
    /// Enqueue without waiting. A full queue drops the new event; the call still succeeds.
    async fn send(&self, event: Event) -> QueueResult<()> {
        match self.sender.try_send(event) {
            Ok(()) => {
                metrics::record_emitted("memory");
            }
            Err(TrySendError::Full(event)) => {
                error!(event_id = %event.id, "In-process queue full, dropping event");
                metrics::record_dropped();
            }
            Err(TrySendError::Closed(event)) => {
                error!(event_id = %event.id, "In-process queue closed, dropping event");
                metrics::record_dropped();
            }
        }
        Ok(())
    }
}

/// Consumer side. Each event is handled once; failures are not retried.
#[derive(Debug, Clone)]
pub struct InProcessReceiver {
    receiver: Receiver<Event>,
}

#[async_trait]
impl EventReceiver for InProcessReceiver {
    async fn receive(&self, cancel: CancellationToken, handler: &dyn EventHandler) {
        info!("In-process receiver started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.receiver.recv() => match received {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            debug!(event_id = %event.id, "Received event");

            match handler.handle(&event, &cancel).await {
                Ok(()) => metrics::record_handled("success"),
                Err(e) => {
                    error!(event_id = %event.id, "Failed to handle event: {}", e);
                    metrics::record_handled("failure");
                }
            }
        }

        info!("In-process receiver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use std::sync::Mutex;
    use std::time::Duration;
    use vedit_models::{Output, TransformRequest};

    /// Records every event id; fails each call when `fail` is set.
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(
            &self,
            event: &Event,
            _cancel: &CancellationToken,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.id.to_string());
            if self.fail {
                Err(HandlerError::invocation("exit status: 1", true))
            } else {
                Ok(())
            }
        }
    }

    fn event(id: &str) -> Event {
        Event::with_id(id, TransformRequest::new(Output::new("out.jpg")))
    }

    /// Run the receiver until the queue drains, then cancel it.
    async fn drain(queue: &InProcessQueue, handler: &Recorder) {
        let cancel = CancellationToken::new();
        let receiver = queue.receiver();
        let stopper = {
            let cancel = cancel.clone();
            let queue = queue.clone();
            async move {
                while !queue.is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            }
        };
        tokio::join!(receiver.receive(cancel.clone(), handler), stopper);
    }

    #[tokio::test]
    async fn test_events_handled_in_order() {
        let queue = InProcessQueue::new(8);
        let emitter = queue.emitter();
        for id in ["a", "b", "c"] {
            emitter.send(event(id)).await.unwrap();
        }

        let handler = Recorder::new(false);
        drain(&queue, &handler).await;

        assert_eq!(handler.seen(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_event_is_not_retried() {
        let queue = InProcessQueue::new(8);
        queue.emitter().send(event("only")).await.unwrap();

        let handler = Recorder::new(true);
        drain(&queue, &handler).await;

        assert_eq!(handler.seen(), vec!["only"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest_and_reports_success() {
        let queue = InProcessQueue::new(2);
        let emitter = queue.emitter();

        emitter.send(event("first")).await.unwrap();
        emitter.send(event("second")).await.unwrap();
        emitter.send(event("third")).await.unwrap();
        assert_eq!(queue.len(), 2);

        let handler = Recorder::new(false);
        drain(&queue, &handler).await;

        assert_eq!(handler.seen(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_cancelled_receiver_returns_promptly() {
        let queue = InProcessQueue::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handler = Recorder::new(false);
        tokio::time::timeout(
            Duration::from_secs(1),
            queue.receiver().receive(cancel, &handler),
        )
        .await
        .unwrap();

        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn test_each_event_goes_to_one_receiver() {
        let queue = InProcessQueue::new(16);
        let emitter = queue.emitter();
        for i in 0..10 {
            emitter.send(event(&format!("e{}", i))).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let (a, b) = (Recorder::new(false), Recorder::new(false));
        let (ra, rb) = (queue.receiver(), queue.receiver());
        let stopper = {
            let cancel = cancel.clone();
            let queue = queue.clone();
            async move {
                while !queue.is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            }
        };
        tokio::join!(ra.receive(cancel.clone(), &a), rb.receive(cancel.clone(), &b), stopper);

        let mut all = a.seen();
        all.extend(b.seen());
        all.sort();
        let mut expected: Vec<String> = (0..10).map(|i| format!("e{}", i)).collect();
        expected.sort();
        assert_eq!(all, expected);
    }
}
