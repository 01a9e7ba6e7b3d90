//! Engine configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Longest hold a reservation may be given (7 days).
pub const MAX_RESERVATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long an unpaid reservation holds its numbers, in seconds
    pub reservation_ttl_secs: u64,
    /// Period of the expiry sweep, in seconds
    pub sweep_interval_secs: u64,
    /// Upper bound on numbers in one reservation request
    pub max_numbers_per_reservation: usize,
    /// Reject reservations on sold-out campaigns with a state error
    pub sold_out_blocks_reservations: bool,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Falls back to defaults for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reservation_ttl_secs: env::var("RAFFLE_RESERVATION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reservation_ttl_secs),
            sweep_interval_secs: env::var("RAFFLE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            max_numbers_per_reservation: env::var("RAFFLE_MAX_NUMBERS_PER_RESERVATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_numbers_per_reservation),
            sold_out_blocks_reservations: env::var("RAFFLE_SOLD_OUT_BLOCKS_RESERVATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sold_out_blocks_reservations),
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero or oversized TTL, a zero
    /// sweep interval, or a zero reservation size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reservation_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "reservation_ttl_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.reservation_ttl_secs > MAX_RESERVATION_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "reservation_ttl_secs",
                reason: format!("must not exceed {MAX_RESERVATION_TTL_SECS}"),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_numbers_per_reservation == 0 {
            return Err(ConfigError::Invalid {
                field: "max_numbers_per_reservation",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Reservation hold duration
    #[must_use]
    pub fn reservation_ttl(&self) -> chrono::Duration {
        let secs = self.reservation_ttl_secs.min(MAX_RESERVATION_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    /// Expiry sweep period
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 900,
            sweep_interval_secs: 30,
            max_numbers_per_reservation: 100,
            sold_out_blocks_reservations: true,
            log_filter: "info,raffle_engine=debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reservation_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_values() {
        let config = EngineConfig {
            reservation_ttl_secs: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "reservation_ttl_secs", .. })
        ));

        let config = EngineConfig {
            max_numbers_per_reservation: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_ttl() {
        let config = EngineConfig {
            reservation_ttl_secs: MAX_RESERVATION_TTL_SECS + 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
