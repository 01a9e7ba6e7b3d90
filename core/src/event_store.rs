//! Event store seam: durable, append-only event streams with optimistic
//! concurrency.
//!
//! The raffle engine persists every campaign state change as an event in the
//! campaign's stream. Appends carry the version the writer last observed; a
//! mismatch means another writer got there first and surfaces as
//! [`EventStoreError::ConcurrencyConflict`] rather than a silent overwrite.
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! store can be shared as `Arc<dyn EventStore>`.

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Append-only storage for event streams.
pub trait EventStore: Send + Sync {
    /// Append events to a stream.
    ///
    /// - `Some(version)`: the stream must currently be at `version`
    /// - `None`: append unconditionally
    ///
    /// Returns the stream version after the append. Appends are all-or-nothing:
    /// either every event in `events` is stored or none is.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the stream moved past `expected_version`
    /// - `DatabaseError`: the backend failed
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load events from a stream, oldest first.
    ///
    /// `from_version` skips the first `from_version` events. A stream that
    /// does not exist yields an empty vector.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>;
}
