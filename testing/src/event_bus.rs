//! In-memory event bus that records every publication.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use raffle_core::event::SerializedEvent;
use raffle_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// Recording event bus with live subscriptions.
///
/// Every successful publish is kept (topic + event) for assertions, and
/// forwarded to subscribers of that topic. `set_failing(true)` makes every
/// publish fail, for testing that dispatch failures never roll back state.
#[derive(Clone, Debug)]
pub struct InMemoryEventBus {
    published: Arc<RwLock<Vec<(String, SerializedEvent)>>>,
    sender: broadcast::Sender<(String, SerializedEvent)>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            sender,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Toggle publish failures.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Event type names published to `topic`, in order.
    #[must_use]
    pub fn published_types(&self, topic: &str) -> Vec<String> {
        self.published
            .read()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.event_type.clone())
            .collect()
    }

    /// Total number of successful publications.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.read().unwrap().len()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected publish failure".to_string(),
                });
            }
            self.published
                .write()
                .unwrap()
                .push((topic.clone(), event.clone()));
            // No subscribers is not an error.
            let _ = self.sender.send((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let receiver = self.sender.subscribe();
        Box::pin(async move {
            let stream = futures::stream::unfold(
                (receiver, topics),
                |(mut receiver, topics)| async move {
                    loop {
                        match receiver.recv().await {
                            Ok((topic, event)) => {
                                if topics.contains(&topic) {
                                    return Some((Ok(event), (receiver, topics)));
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                let error = EventBusError::TransportError(format!(
                                    "subscriber lagged by {skipped} events"
                                ));
                                return Some((Err(error), (receiver, topics)));
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                },
            );
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
