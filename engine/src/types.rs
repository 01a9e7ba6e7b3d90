//! Domain types for the raffle engine.
//!
//! Value objects (identifiers, money), the campaign and ticket entities, and the
//! result types returned by engine operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a campaign
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CampaignId(Uuid);

impl CampaignId {
    /// Creates a new random `CampaignId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation (one reserve call)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment transaction reference shared with the payment processor.
///
/// Minted by the engine when numbers are reserved, so every callback refers to
/// a transaction the ledger already knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random `TransactionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque organizer identifier issued by the identity provider
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizerId(String);

impl OrganizerId {
    /// Wrap an identity-provider subject
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque buyer identifier issued by the identity provider
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuyerId(String);

impl BuyerId {
    /// Wrap an identity-provider subject
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ticket number, `1..=total_tickets`
pub type TicketNumber = u32;

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the maximum representable value
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity, clamping at the maximum representable value
    #[must_use]
    pub const fn saturating_multiply(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Campaign
// ============================================================================

/// Campaign lifecycle status.
///
/// ```text
/// draft -> active -> sold_out -> drawn
///            |                    ^
///            +--------------------+
/// any non-terminal -> cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Created, not yet selling
    Draft,
    /// Selling tickets
    Active,
    /// Every number completed
    SoldOut,
    /// Winner selected (terminal)
    Drawn,
    /// Cancelled by the organizer (terminal)
    Cancelled,
}

impl CampaignStatus {
    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Drawn | Self::Cancelled)
    }

    /// Whether tickets may be drawn from a campaign in this status
    #[must_use]
    pub const fn is_drawable(self) -> bool {
        matches!(self, Self::Active | Self::SoldOut)
    }

    /// Whether the state machine allows `self -> next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::SoldOut | Self::Drawn)
                | (Self::SoldOut, Self::Drawn)
                | (Self::Draft | Self::Active | Self::SoldOut, Self::Cancelled)
        )
    }

    /// Lowercase name used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::SoldOut => "sold_out",
            Self::Drawn => "drawn",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prize on offer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    /// Human-readable description
    pub description: String,
    /// Declared value
    pub value: Money,
}

/// Regulatory metadata supplied when a campaign is created
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceProfile {
    /// Jurisdiction the raffle is licensed in
    pub jurisdiction: String,
    /// Gaming license number, if the jurisdiction issues one
    pub license_number: Option<String>,
}

/// Input to `create_campaign`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSpec {
    /// Organizer creating the campaign
    pub organizer_id: OrganizerId,
    /// Display title
    pub title: String,
    /// Prize on offer
    pub prize: Prize,
    /// Price of one ticket, must be non-zero
    pub ticket_price: Money,
    /// Number of tickets, numbered `1..=total_tickets`
    pub total_tickets: u32,
    /// When sales open
    pub start_date: DateTime<Utc>,
    /// When sales close and the draw becomes due
    pub end_date: DateTime<Utc>,
    /// Optional cap on live tickets per buyer
    pub max_tickets_per_user: Option<u32>,
    /// Regulatory metadata
    pub compliance: ComplianceProfile,
}

/// Partial update applied by `update_campaign`.
///
/// `ticket_price` and `total_tickets` may only change while the campaign is a
/// draft, since tickets already sold were priced and numbered against them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPatch {
    /// New title
    pub title: Option<String>,
    /// New prize
    pub prize: Option<Prize>,
    /// New end date
    pub end_date: Option<DateTime<Utc>>,
    /// New per-buyer cap (`Some(None)` removes it)
    pub max_tickets_per_user: Option<Option<u32>>,
    /// New ticket price (draft only)
    pub ticket_price: Option<Money>,
    /// New inventory size (draft only)
    pub total_tickets: Option<u32>,
}

impl CampaignPatch {
    /// Whether the patch changes anything
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.prize.is_none()
            && self.end_date.is_none()
            && self.max_tickets_per_user.is_none()
            && self.ticket_price.is_none()
            && self.total_tickets.is_none()
    }

    /// Whether the patch touches pricing or inventory
    #[must_use]
    pub const fn changes_inventory(&self) -> bool {
        self.ticket_price.is_some() || self.total_tickets.is_some()
    }
}

/// Statistics derived from the ticket ledger
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    /// `completed_tickets * ticket_price`
    pub total_revenue: Money,
    /// Distinct buyers with at least one completed ticket
    pub unique_buyers: u32,
    /// Tickets paid for
    pub completed_tickets: u32,
    /// Tickets awaiting payment
    pub pending_tickets: u32,
    /// Tickets whose payment failed, expired or was abandoned
    pub failed_tickets: u32,
    /// `completed * 10_000 / total`
    pub sell_through_basis_points: u32,
}

/// A raffle campaign
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign identifier
    pub id: CampaignId,
    /// Owning organizer
    pub organizer_id: OrganizerId,
    /// Display title
    pub title: String,
    /// Prize on offer
    pub prize: Prize,
    /// Price of one ticket
    pub ticket_price: Money,
    /// Inventory size
    pub total_tickets: u32,
    /// Count of completed tickets
    pub sold_tickets: u32,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// When sales open
    pub start_date: DateTime<Utc>,
    /// When sales close
    pub end_date: DateTime<Utc>,
    /// Optional per-buyer cap
    pub max_tickets_per_user: Option<u32>,
    /// Set exactly once by the draw
    pub winner: Option<WinnerRecord>,
    /// Last recomputed statistics
    pub stats: CampaignStats,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Tickets
// ============================================================================

/// Payment status of a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Reserved, awaiting payment
    Pending,
    /// Paid
    Completed,
    /// Payment failed, hold expired or released
    Failed,
}

impl PaymentStatus {
    /// Lowercase name used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the buyer intends to pay; passed through to the payment processor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Card payment
    Card {
        /// Last four digits
        last_four: String,
    },
    /// Bank transfer
    BankTransfer,
    /// Wallet provider (e.g. a mobile money service)
    Wallet {
        /// Provider name
        provider: String,
    },
    /// Cash collected by the organizer
    Cash,
}

/// Why a ticket ended up failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// The payment processor reported a failure
    PaymentDeclined,
    /// The payment processor refused to start the payment
    PaymentNotInitiated,
    /// The hold passed its expiry unpaid
    Expired,
    /// The buyer released the hold
    Abandoned,
    /// The campaign was cancelled while the hold was pending
    CampaignCancelled,
    /// The draw happened while the hold was pending
    CampaignClosed,
}

impl FailureReason {
    /// Lowercase name used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentDeclined => "payment_declined",
            Self::PaymentNotInitiated => "payment_not_initiated",
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
            Self::CampaignCancelled => "campaign_cancelled",
            Self::CampaignClosed => "campaign_closed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One numbered claim on a campaign's inventory.
///
/// Tickets are never deleted; they move `pending -> completed | failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// Ticket number
    pub number: TicketNumber,
    /// Holder
    pub buyer_id: BuyerId,
    /// Reservation that created the ticket
    pub reservation_id: ReservationId,
    /// When the number was reserved
    pub purchased_at: DateTime<Utc>,
    /// Payment method named at reservation
    pub payment_method: PaymentMethod,
    /// Current payment status
    pub payment_status: PaymentStatus,
    /// Payment transaction covering this ticket
    pub transaction_id: TransactionId,
    /// When an unpaid hold lapses
    pub expires_at: DateTime<Utc>,
    /// Set when the ticket fails
    pub failure_reason: Option<FailureReason>,
    /// When the ticket left `pending`
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Pending and past its expiry
    #[must_use]
    pub fn is_expired_hold(&self, now: DateTime<Utc>) -> bool {
        self.payment_status == PaymentStatus::Pending && now >= self.expires_at
    }

    /// Completed, or pending and not yet expired
    #[must_use]
    pub fn blocks_number(&self, now: DateTime<Utc>) -> bool {
        match self.payment_status {
            PaymentStatus::Completed => true,
            PaymentStatus::Pending => now < self.expires_at,
            PaymentStatus::Failed => false,
        }
    }
}

/// Request to reserve a set of numbers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Campaign to reserve in
    pub campaign_id: CampaignId,
    /// Numbers wanted, all or nothing
    pub numbers: Vec<TicketNumber>,
    /// Buyer
    pub buyer_id: BuyerId,
    /// How the buyer will pay
    pub payment_method: PaymentMethod,
}

/// Proof of a successful reservation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationToken {
    /// Reservation identifier
    pub reservation_id: ReservationId,
    /// Campaign reserved in
    pub campaign_id: CampaignId,
    /// Transaction the payment processor will report against
    pub transaction_id: TransactionId,
    /// Reserved numbers, ascending
    pub numbers: Vec<TicketNumber>,
    /// When the hold lapses if unpaid
    pub expires_at: DateTime<Utc>,
    /// `numbers.len() * ticket_price`
    pub amount_due: Money,
}

/// Result reported by the payment collaborator's callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// Funds captured
    Succeeded,
    /// Payment failed
    Failed {
        /// Processor-supplied reason
        reason: String,
    },
}

/// Resolution of one payment transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// Transaction resolved
    pub transaction_id: TransactionId,
    /// Campaign the transaction belongs to
    pub campaign_id: CampaignId,
    /// Final ticket status
    pub status: PaymentStatus,
    /// Numbers covered
    pub numbers: Vec<TicketNumber>,
    /// Set when the tickets failed
    pub failure_reason: Option<FailureReason>,
    /// The transaction had already been resolved; nothing changed
    pub replayed: bool,
    /// Payment succeeded after the hold was lost; the buyer needs a refund
    pub late_payment: bool,
}

/// Result of `confirm_payment`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The transaction is known; see the confirmation for its final state
    Resolved(Confirmation),
    /// No ticket carries this transaction id; nothing changed
    UnknownTransaction(TransactionId),
}

/// Result of `cancel_campaign`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancellationOutcome {
    /// The cancelled campaign
    pub campaign: Campaign,
    /// Completed tickets the organizer must refund
    pub refunds: Vec<Ticket>,
    /// Numbers whose pending holds were released
    pub released: Vec<TicketNumber>,
}

// ============================================================================
// Draw
// ============================================================================

/// The single winner of a campaign
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    /// Campaign drawn
    pub campaign_id: CampaignId,
    /// Winning number
    pub ticket_number: TicketNumber,
    /// Holder of the winning ticket
    pub buyer_id: BuyerId,
    /// Transaction that paid for the winning ticket
    pub transaction_id: TransactionId,
    /// When the draw happened
    pub drawn_at: DateTime<Utc>,
    /// Who triggered the draw
    pub drawn_by: String,
    /// Randomness method identifier
    pub draw_method: String,
    /// Witnesses registered on the compliance record at draw time
    pub witnesses: Vec<String>,
    /// Size of the eligible set
    pub eligible_count: u32,
    /// SHA-256 of the sorted eligible numbers, base64url
    pub eligible_digest: String,
    /// Whether the prize was handed over
    pub claimed: bool,
    /// When the prize was claimed
    pub claimed_at: Option<DateTime<Utc>>,
}
