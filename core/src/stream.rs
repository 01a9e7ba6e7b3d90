//! Event stream identification and versioning.
//!
//! Each campaign owns exactly one stream. The stream version is the number of
//! events it holds and doubles as the optimistic-concurrency token on append.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Identifier of one event stream, e.g. `"campaign-<uuid>"`.
///
/// `FromStr` validates (rejects empty input); `new` and `From` do not and are
/// meant for identifiers the engine builds itself.
///
/// # Examples
///
/// ```
/// use raffle_core::stream::StreamId;
///
/// let stream_id = StreamId::new("campaign-42");
/// assert_eq!(stream_id.as_str(), "campaign-42");
/// assert!("".parse::<StreamId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stream version: the count of events appended so far.
///
/// # Examples
///
/// ```
/// use raffle_core::stream::Version;
///
/// let v0 = Version::INITIAL;
/// assert_eq!(v0.advance(3), Version::new(3));
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of an empty stream.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Version after appending `count` more events.
    #[must_use]
    pub const fn advance(self, count: u64) -> Self {
        Self(self.0 + count)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_rejects_blank_input() {
        assert!("   ".parse::<StreamId>().is_err());
        assert_eq!(
            "campaign-1".parse::<StreamId>().ok(),
            Some(StreamId::new("campaign-1"))
        );
    }

    #[test]
    fn version_ordering_follows_value() {
        assert!(Version::new(2) > Version::new(1));
        assert_eq!(Version::INITIAL.next().next(), Version::new(2));
    }
}
