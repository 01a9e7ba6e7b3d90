//! Event trait and the serialized wire format.
//!
//! Events are facts about something that already happened. They are encoded
//! with `bincode` for storage and transport; the `event_type` string carries a
//! version suffix (`"TicketsReserved.v1"`) so schemas can evolve.
//!
//! # Example
//!
//! ```
//! use raffle_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
//! enum DrawEvent {
//!     WinnerDrawn { ticket: u32 },
//! }
//!
//! impl Event for DrawEvent {
//!     fn event_type(&self) -> &'static str {
//!         "WinnerDrawn.v1"
//!     }
//! }
//!
//! let event = DrawEvent::WinnerDrawn { ticket: 7 };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "WinnerDrawn.v1");
//! assert_eq!(DrawEvent::from_bytes(&serialized.data).unwrap(), event);
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be stored and replayed to reconstruct state.
pub trait Event: Send + Sync + 'static {
    /// Stable, versioned type identifier, e.g. `"PaymentConfirmed.v1"`.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupt or
    /// belong to an incompatible schema.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for storage or publication.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "WinnerDrawn.v1").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata such as `campaign_id` or `actor`.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an `Event`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        Reserved { number: u32 },
        Released { number: u32 },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Reserved { .. } => "TestEvent.Reserved.v1",
                Self::Released { .. } => "TestEvent.Released.v1",
            }
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn serialized_event_keeps_type_and_metadata() {
        let event = TestEvent::Released { number: 9 };
        let metadata = serde_json::json!({ "campaign_id": "c-1" });

        let serialized = SerializedEvent::from_event(&event, Some(metadata.clone()))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "TestEvent.Released.v1");
        assert_eq!(serialized.metadata, Some(metadata));
        assert_eq!(
            TestEvent::from_bytes(&serialized.data).expect("decodes"),
            event
        );
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        let result = TestEvent::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(EventError::DeserializationError(_))));
    }

    #[test]
    fn display_reports_size() {
        let serialized = SerializedEvent::new("TestEvent.v1".to_string(), vec![1, 2, 3], None);
        assert_eq!(
            serialized.to_string(),
            "SerializedEvent { type: TestEvent.v1, size: 3 bytes }"
        );
    }
}
