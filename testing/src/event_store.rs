//! In-memory event store with optimistic concurrency and fault injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use raffle_core::event::SerializedEvent;
use raffle_core::event_store::{EventStore, EventStoreError};
use raffle_core::stream::{StreamId, Version};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// `HashMap`-backed event store.
///
/// Enforces the same expected-version contract as a database-backed store, and
/// can be told to fail the next N appends so tests can exercise storage-error
/// paths (for example the expiry sweep retrying on the next tick).
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<StreamId, Vec<SerializedEvent>>>>,
    failing_appends: Arc<AtomicUsize>,
    passing_appends: Arc<AtomicUsize>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with `DatabaseError`.
    pub fn fail_next_appends(&self, count: usize) {
        self.fail_appends_after(0, count);
    }

    /// Let `passing` appends through, then fail the following `count`.
    pub fn fail_appends_after(&self, passing: usize, count: usize) {
        self.passing_appends.store(passing, Ordering::SeqCst);
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Number of events stored in a stream.
    #[must_use]
    pub fn event_count(&self, stream_id: &StreamId) -> usize {
        self.streams
            .read()
            .unwrap()
            .get(stream_id)
            .map_or(0, Vec::len)
    }

    /// Event type names stored in a stream, oldest first.
    #[must_use]
    pub fn event_types(&self, stream_id: &StreamId) -> Vec<String> {
        self.streams
            .read()
            .unwrap()
            .get(stream_id)
            .map(|events| events.iter().map(|e| e.event_type.clone()).collect())
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        if self.failing_appends.load(Ordering::SeqCst) == 0 {
            return false;
        }
        let passed = self
            .passing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if passed {
            return false;
        }
        self.failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            if self.take_injected_failure() {
                return Err(EventStoreError::DatabaseError(
                    "injected append failure".to_string(),
                ));
            }

            let mut streams = self.streams.write().unwrap();
            let stream = streams.entry(stream_id.clone()).or_default();
            let actual = Version::new(stream.len() as u64);

            if let Some(expected) = expected_version {
                if expected != actual {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual,
                    });
                }
            }

            let appended = events.len() as u64;
            stream.extend(events);
            Ok(actual.advance(appended))
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let streams = self.streams.read().unwrap();
            let skip = from_version.map_or(0, |v| usize::try_from(v.value()).unwrap_or(usize::MAX));
            Ok(streams
                .get(&stream_id)
                .map(|events| events.iter().skip(skip).cloned().collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> SerializedEvent {
        SerializedEvent::new(name.to_string(), vec![1], None)
    }

    #[tokio::test]
    async fn append_checks_expected_version() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("campaign-1");

        let v1 = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("A.v1")])
            .await
            .unwrap();
        assert_eq!(v1, Version::new(1));

        let stale = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("B.v1")])
            .await;
        assert!(matches!(
            stale,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
        ));
        assert_eq!(store.event_types(&stream), vec!["A.v1".to_string()]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("campaign-2");
        store.fail_next_appends(1);

        assert!(store.append_events(stream.clone(), None, vec![event("A.v1")]).await.is_err());
        assert!(store.append_events(stream.clone(), None, vec![event("A.v1")]).await.is_ok());
        assert_eq!(store.event_count(&stream), 1);
    }

    #[tokio::test]
    async fn failure_can_be_deferred() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("campaign-4");
        store.fail_appends_after(1, 1);

        assert!(store.append_events(stream.clone(), None, vec![event("A.v1")]).await.is_ok());
        assert!(store.append_events(stream.clone(), None, vec![event("B.v1")]).await.is_err());
        assert!(store.append_events(stream.clone(), None, vec![event("C.v1")]).await.is_ok());
        assert_eq!(store.event_types(&stream), vec!["A.v1".to_string(), "C.v1".to_string()]);
    }

    #[tokio::test]
    async fn load_skips_to_version() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("campaign-3");
        store
            .append_events(stream.clone(), None, vec![event("A.v1"), event("B.v1"), event("C.v1")])
            .await
            .unwrap();

        let tail = store.load_events(stream, Some(Version::new(2))).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event_type, "C.v1");
    }
}
