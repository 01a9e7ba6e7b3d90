//! Campaign events.
//!
//! Every state change of a campaign is one of these, appended to the
//! campaign's stream and then published on the bus. Replaying a stream
//! rebuilds the campaign exactly.

use crate::types::{
    BuyerId, CampaignId, CampaignPatch, CampaignStats, CampaignStatus, ComplianceProfile,
    FailureReason, Money, OrganizerId, PaymentMethod, Prize, ReservationId, TicketNumber,
    TransactionId, WinnerRecord,
};
use chrono::{DateTime, Utc};
use raffle_core::event::Event;
use raffle_core::stream::StreamId;
use serde::{Deserialize, Serialize};

/// Topic for campaign lifecycle events
pub const CAMPAIGNS_TOPIC: &str = "raffle-campaigns";
/// Topic for reservation and payment events
pub const TICKETS_TOPIC: &str = "raffle-tickets";
/// Topic for draw and prize events
pub const DRAWS_TOPIC: &str = "raffle-draws";

/// Stream holding one campaign's events
#[must_use]
pub fn campaign_stream(campaign_id: CampaignId) -> StreamId {
    StreamId::new(format!("campaign-{campaign_id}"))
}

/// Everything that can happen to a campaign
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignEvent {
    /// Campaign registered
    CampaignCreated {
        /// Campaign
        campaign_id: CampaignId,
        /// Owner
        organizer_id: OrganizerId,
        /// Title
        title: String,
        /// Prize
        prize: Prize,
        /// Ticket price
        ticket_price: Money,
        /// Inventory size
        total_tickets: u32,
        /// Sales open
        start_date: DateTime<Utc>,
        /// Sales close
        end_date: DateTime<Utc>,
        /// Per-buyer cap
        max_tickets_per_user: Option<u32>,
        /// Initial status (draft or active)
        status: CampaignStatus,
        /// Creation time
        created_at: DateTime<Utc>,
        /// Regulatory metadata for the compliance record
        compliance: ComplianceProfile,
    },

    /// Campaign metadata changed
    CampaignUpdated {
        /// Campaign
        campaign_id: CampaignId,
        /// Fields changed
        patch: CampaignPatch,
        /// Who changed them
        actor: String,
        /// When
        updated_at: DateTime<Utc>,
    },

    /// Draft opened for sales
    CampaignActivated {
        /// Campaign
        campaign_id: CampaignId,
        /// Who opened it
        actor: String,
        /// When
        activated_at: DateTime<Utc>,
    },

    /// Last number completed
    CampaignSoldOut {
        /// Campaign
        campaign_id: CampaignId,
        /// When
        sold_out_at: DateTime<Utc>,
    },

    /// Campaign cancelled; completed tickets need refunds
    CampaignCancelled {
        /// Campaign
        campaign_id: CampaignId,
        /// Who cancelled
        actor: String,
        /// Completed numbers to refund
        refunds: Vec<TicketNumber>,
        /// When
        cancelled_at: DateTime<Utc>,
    },

    /// Numbers moved to pending under one transaction
    TicketsReserved {
        /// Campaign
        campaign_id: CampaignId,
        /// Reservation
        reservation_id: ReservationId,
        /// Transaction the processor will report
        transaction_id: TransactionId,
        /// Buyer
        buyer_id: BuyerId,
        /// Numbers, ascending
        numbers: Vec<TicketNumber>,
        /// Payment method
        payment_method: PaymentMethod,
        /// When
        reserved_at: DateTime<Utc>,
        /// Hold expiry
        expires_at: DateTime<Utc>,
    },

    /// Pending tickets of a transaction completed
    PaymentConfirmed {
        /// Campaign
        campaign_id: CampaignId,
        /// Transaction
        transaction_id: TransactionId,
        /// Numbers completed
        numbers: Vec<TicketNumber>,
        /// Amount collected
        amount: Money,
        /// When
        confirmed_at: DateTime<Utc>,
    },

    /// Pending tickets of a transaction failed; their numbers are free again
    TicketsFailed {
        /// Campaign
        campaign_id: CampaignId,
        /// Transaction
        transaction_id: TransactionId,
        /// Numbers released
        numbers: Vec<TicketNumber>,
        /// Why
        reason: FailureReason,
        /// When
        failed_at: DateTime<Utc>,
    },

    /// Derived statistics recomputed from the ledger
    StatsRecomputed {
        /// Campaign
        campaign_id: CampaignId,
        /// New statistics
        stats: CampaignStats,
        /// When
        computed_at: DateTime<Utc>,
    },

    /// Winner selected; campaign is now drawn
    WinnerDrawn {
        /// The winner
        winner: WinnerRecord,
    },

    /// Winner collected the prize
    PrizeClaimed {
        /// Campaign
        campaign_id: CampaignId,
        /// Winner
        buyer_id: BuyerId,
        /// When
        claimed_at: DateTime<Utc>,
    },
}

impl CampaignEvent {
    /// Campaign this event belongs to
    #[must_use]
    pub const fn campaign_id(&self) -> CampaignId {
        match self {
            Self::CampaignCreated { campaign_id, .. }
            | Self::CampaignUpdated { campaign_id, .. }
            | Self::CampaignActivated { campaign_id, .. }
            | Self::CampaignSoldOut { campaign_id, .. }
            | Self::CampaignCancelled { campaign_id, .. }
            | Self::TicketsReserved { campaign_id, .. }
            | Self::PaymentConfirmed { campaign_id, .. }
            | Self::TicketsFailed { campaign_id, .. }
            | Self::StatsRecomputed { campaign_id, .. }
            | Self::PrizeClaimed { campaign_id, .. } => *campaign_id,
            Self::WinnerDrawn { winner } => winner.campaign_id,
        }
    }

    /// Bus topic for this event's family
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::CampaignCreated { .. }
            | Self::CampaignUpdated { .. }
            | Self::CampaignActivated { .. }
            | Self::CampaignSoldOut { .. }
            | Self::CampaignCancelled { .. }
            | Self::StatsRecomputed { .. } => CAMPAIGNS_TOPIC,
            Self::TicketsReserved { .. }
            | Self::PaymentConfirmed { .. }
            | Self::TicketsFailed { .. } => TICKETS_TOPIC,
            Self::WinnerDrawn { .. } | Self::PrizeClaimed { .. } => DRAWS_TOPIC,
        }
    }
}

impl Event for CampaignEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::CampaignCreated { .. } => "CampaignCreated.v1",
            Self::CampaignUpdated { .. } => "CampaignUpdated.v1",
            Self::CampaignActivated { .. } => "CampaignActivated.v1",
            Self::CampaignSoldOut { .. } => "CampaignSoldOut.v1",
            Self::CampaignCancelled { .. } => "CampaignCancelled.v1",
            Self::TicketsReserved { .. } => "TicketsReserved.v1",
            Self::PaymentConfirmed { .. } => "PaymentConfirmed.v1",
            Self::TicketsFailed { .. } => "TicketsFailed.v1",
            Self::StatsRecomputed { .. } => "StatsRecomputed.v1",
            Self::WinnerDrawn { .. } => "WinnerDrawn.v1",
            Self::PrizeClaimed { .. } => "PrizeClaimed.v1",
        }
    }
}
