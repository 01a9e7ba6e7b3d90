//! Error types returned by engine operations.

use crate::payment::PaymentError;
use crate::types::{BuyerId, CampaignId, CampaignStatus, TicketNumber, WinnerRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Coarse classification of a [`RaffleError`].
///
/// Outer controllers map these to transport status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Contested ticket numbers, duplicate draw, or a lost write race
    Conflict,
    /// Unknown campaign, ticket or reservation
    NotFound,
    /// Operation illegal for the campaign's current status
    State,
    /// Reservation or sales window elapsed
    Expired,
    /// Per-buyer cap exceeded
    LimitExceeded,
    /// Payment processor refused to start the payment
    Payment,
    /// Event store failure
    Storage,
}

/// Errors returned by the raffle engine.
#[derive(Error, Debug, Clone)]
pub enum RaffleError {
    /// Malformed or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// One or more requested numbers are held by another ticket
    #[error("Ticket numbers already held: {numbers:?}")]
    NumbersHeld {
        /// Every contested number, ascending
        numbers: Vec<TicketNumber>,
    },

    /// Another writer appended to the campaign stream first
    #[error("Campaign {campaign_id} was modified concurrently")]
    ConcurrentWrite {
        /// Contested campaign
        campaign_id: CampaignId,
    },

    /// Unknown entity
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity looked up
        entity: &'static str,
        /// Identifier looked up
        id: String,
    },

    /// Operation not allowed in the campaign's current status
    #[error("Cannot {operation} while campaign is {status}")]
    InvalidState {
        /// Operation attempted
        operation: &'static str,
        /// Status at the time
        status: CampaignStatus,
    },

    /// The campaign already has a winner
    #[error("Campaign already drawn (winning ticket {})", .winner.ticket_number)]
    AlreadyDrawn {
        /// The existing winner
        winner: Box<WinnerRecord>,
    },

    /// A draw was attempted with no completed tickets
    #[error("Campaign {campaign_id} has no completed tickets to draw from")]
    NoEligibleTickets {
        /// Campaign
        campaign_id: CampaignId,
    },

    /// A prize claim by someone other than the winner
    #[error("Buyer {buyer_id} is not the recorded winner")]
    NotWinner {
        /// Claimant
        buyer_id: BuyerId,
    },

    /// A second prize claim
    #[error("Prize already claimed at {claimed_at}")]
    PrizeAlreadyClaimed {
        /// Time of the first claim
        claimed_at: DateTime<Utc>,
    },

    /// A time window has elapsed
    #[error("Expired: {0}")]
    Expired(String),

    /// The buyer would hold more tickets than allowed
    #[error("Ticket limit of {limit} per buyer exceeded (holding {held}, requested {requested})")]
    LimitExceeded {
        /// Configured cap
        limit: u32,
        /// Live tickets already held
        held: u32,
        /// Tickets requested
        requested: u32,
    },

    /// The payment processor refused the payment; the reservation was released
    #[error("Payment could not be initiated: {0}")]
    Payment(#[from] PaymentError),

    /// Event store failure; nothing was changed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RaffleError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NotWinner { .. } => ErrorKind::Validation,
            Self::NumbersHeld { .. } | Self::ConcurrentWrite { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. }
            | Self::AlreadyDrawn { .. }
            | Self::NoEligibleTickets { .. }
            | Self::PrizeAlreadyClaimed { .. } => ErrorKind::State,
            Self::Expired(_) => ErrorKind::Expired,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::Payment(_) => ErrorKind::Payment,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Shorthand for [`RaffleError::NotFound`] on a campaign
    #[must_use]
    pub fn campaign_not_found(campaign_id: CampaignId) -> Self {
        Self::NotFound {
            entity: "campaign",
            id: campaign_id.to_string(),
        }
    }

    /// The existing winner, if this is a repeat draw
    #[must_use]
    pub fn existing_winner(&self) -> Option<&WinnerRecord> {
        match self {
            Self::AlreadyDrawn { winner } => Some(winner.as_ref()),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type RaffleResult<T> = Result<T, RaffleError>;
