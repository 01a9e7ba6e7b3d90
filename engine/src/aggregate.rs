//! Campaign aggregate: campaign metadata plus its ticket ledger.
//!
//! State changes only through [`CampaignAggregate::apply`], which is also how
//! a campaign is rebuilt from its event stream. Command validation lives with
//! the component that owns the command; this module has no side effects.

use crate::error::{RaffleError, RaffleResult};
use crate::events::CampaignEvent;
use crate::ledger::{NewReservation, TicketLedger};
use crate::revenue::derive_stats;
use crate::types::{Campaign, CampaignId, CampaignStats, CampaignStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use raffle_core::stream::Version;

/// One campaign's full state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignAggregate {
    campaign: Campaign,
    ledger: TicketLedger,
    version: Version,
}

impl CampaignAggregate {
    /// Build the aggregate from its creation event
    ///
    /// Returns `None` for any other event.
    #[must_use]
    pub fn from_created(event: &CampaignEvent) -> Option<Self> {
        let CampaignEvent::CampaignCreated {
            campaign_id,
            organizer_id,
            title,
            prize,
            ticket_price,
            total_tickets,
            start_date,
            end_date,
            max_tickets_per_user,
            status,
            created_at,
            ..
        } = event
        else {
            return None;
        };

        Some(Self {
            campaign: Campaign {
                id: *campaign_id,
                organizer_id: organizer_id.clone(),
                title: title.clone(),
                prize: prize.clone(),
                ticket_price: *ticket_price,
                total_tickets: *total_tickets,
                sold_tickets: 0,
                status: *status,
                start_date: *start_date,
                end_date: *end_date,
                max_tickets_per_user: *max_tickets_per_user,
                winner: None,
                stats: CampaignStats::default(),
                created_at: *created_at,
            },
            ledger: TicketLedger::new(*total_tickets),
            version: Version::new(1),
        })
    }

    /// Rebuild from a full event stream
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the stream is empty or does not start with
    /// `CampaignCreated`.
    pub fn replay(campaign_id: CampaignId, events: &[CampaignEvent]) -> RaffleResult<Self> {
        let (first, rest) = events.split_first().ok_or_else(|| {
            RaffleError::Storage(format!("stream for campaign {campaign_id} is empty"))
        })?;
        let mut aggregate = Self::from_created(first).ok_or_else(|| {
            RaffleError::Storage(format!(
                "stream for campaign {campaign_id} does not start with CampaignCreated"
            ))
        })?;
        for event in rest {
            aggregate.apply(event);
        }
        aggregate.version = Version::new(events.len() as u64);
        Ok(aggregate)
    }

    /// Campaign metadata
    #[must_use]
    pub const fn campaign(&self) -> &Campaign {
        &self.campaign
    }

    /// Ticket ledger
    #[must_use]
    pub const fn ledger(&self) -> &TicketLedger {
        &self.ledger
    }

    /// Stream version this state corresponds to
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    pub(crate) const fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Status
    #[must_use]
    pub const fn status(&self) -> CampaignStatus {
        self.campaign.status
    }

    /// Apply one event to state
    pub fn apply(&mut self, event: &CampaignEvent) {
        match event {
            CampaignEvent::CampaignCreated { .. } => {
                tracing::warn!(
                    campaign_id = %self.campaign.id,
                    "Ignoring duplicate CampaignCreated"
                );
            }
            CampaignEvent::CampaignUpdated { patch, .. } => {
                let campaign = &mut self.campaign;
                if let Some(title) = &patch.title {
                    campaign.title.clone_from(title);
                }
                if let Some(prize) = &patch.prize {
                    campaign.prize = prize.clone();
                }
                if let Some(end_date) = patch.end_date {
                    campaign.end_date = end_date;
                }
                if let Some(cap) = patch.max_tickets_per_user {
                    campaign.max_tickets_per_user = cap;
                }
                if let Some(price) = patch.ticket_price {
                    campaign.ticket_price = price;
                }
                if let Some(total) = patch.total_tickets {
                    campaign.total_tickets = total;
                    self.ledger.set_total(total);
                }
            }
            CampaignEvent::CampaignActivated { .. } => {
                self.campaign.status = CampaignStatus::Active;
            }
            CampaignEvent::CampaignSoldOut { .. } => {
                self.campaign.status = CampaignStatus::SoldOut;
            }
            CampaignEvent::CampaignCancelled { .. } => {
                self.campaign.status = CampaignStatus::Cancelled;
            }
            CampaignEvent::TicketsReserved {
                campaign_id,
                reservation_id,
                transaction_id,
                buyer_id,
                numbers,
                payment_method,
                reserved_at,
                expires_at,
            } => {
                self.ledger.reserve(&NewReservation {
                    campaign_id: *campaign_id,
                    reservation_id: *reservation_id,
                    transaction_id: *transaction_id,
                    buyer_id,
                    numbers,
                    payment_method,
                    reserved_at: *reserved_at,
                    expires_at: *expires_at,
                });
            }
            CampaignEvent::PaymentConfirmed {
                transaction_id,
                confirmed_at,
                ..
            } => {
                self.ledger.complete(*transaction_id, *confirmed_at);
                self.campaign.sold_tickets = self.ledger.count(PaymentStatus::Completed);
            }
            CampaignEvent::TicketsFailed {
                transaction_id,
                reason,
                failed_at,
                ..
            } => {
                self.ledger.fail(*transaction_id, *reason, *failed_at);
            }
            CampaignEvent::StatsRecomputed { stats, .. } => {
                self.campaign.stats = *stats;
            }
            CampaignEvent::WinnerDrawn { winner } => {
                self.campaign.status = CampaignStatus::Drawn;
                self.campaign.winner = Some(winner.clone());
            }
            CampaignEvent::PrizeClaimed { claimed_at, .. } => {
                if let Some(winner) = self.campaign.winner.as_mut() {
                    winner.claimed = true;
                    winner.claimed_at = Some(*claimed_at);
                }
            }
        }
    }

    /// Events that keep derived state in step with the ledger.
    ///
    /// Yields `StatsRecomputed` when the derived statistics differ from the
    /// stored ones, and `CampaignSoldOut` when an active campaign has every
    /// number completed.
    #[must_use]
    pub fn follow_up(&self, now: DateTime<Utc>) -> Vec<CampaignEvent> {
        let mut events = Vec::new();
        let stats = derive_stats(
            &self.ledger,
            self.campaign.ticket_price,
            self.campaign.total_tickets,
        );
        if stats != self.campaign.stats {
            events.push(CampaignEvent::StatsRecomputed {
                campaign_id: self.campaign.id,
                stats,
                computed_at: now,
            });
        }
        if self.campaign.status == CampaignStatus::Active
            && self.campaign.sold_tickets >= self.campaign.total_tickets
        {
            events.push(CampaignEvent::CampaignSoldOut {
                campaign_id: self.campaign.id,
                sold_out_at: now,
            });
        }
        events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{
        BuyerId, ComplianceProfile, Money, OrganizerId, PaymentMethod, Prize, ReservationId,
        TransactionId,
    };
    use chrono::Duration;

    fn created(campaign_id: CampaignId, total: u32, now: DateTime<Utc>) -> CampaignEvent {
        CampaignEvent::CampaignCreated {
            campaign_id,
            organizer_id: OrganizerId::new("org"),
            title: "Harvest raffle".to_string(),
            prize: Prize {
                description: "Bicycle".to_string(),
                value: Money::from_cents(20_000),
            },
            ticket_price: Money::from_cents(500),
            total_tickets: total,
            start_date: now,
            end_date: now + Duration::days(7),
            max_tickets_per_user: None,
            status: CampaignStatus::Active,
            created_at: now,
            compliance: ComplianceProfile::default(),
        }
    }

    fn reserved(campaign_id: CampaignId, numbers: Vec<u32>, now: DateTime<Utc>) -> (TransactionId, CampaignEvent) {
        let transaction_id = TransactionId::new();
        let event = CampaignEvent::TicketsReserved {
            campaign_id,
            reservation_id: ReservationId::new(),
            transaction_id,
            buyer_id: BuyerId::new("buyer"),
            numbers,
            payment_method: PaymentMethod::Cash,
            reserved_at: now,
            expires_at: now + Duration::minutes(15),
        };
        (transaction_id, event)
    }

    #[test]
    fn replay_requires_creation_first() {
        let now = Utc::now();
        let id = CampaignId::new();
        let (_, event) = reserved(id, vec![1], now);

        assert!(CampaignAggregate::replay(id, &[]).is_err());
        assert!(CampaignAggregate::replay(id, &[event]).is_err());
    }

    #[test]
    fn confirmation_updates_sold_tickets_and_triggers_sold_out() {
        let now = Utc::now();
        let id = CampaignId::new();
        let (txn, reserve) = reserved(id, vec![1, 2], now);
        let confirm = CampaignEvent::PaymentConfirmed {
            campaign_id: id,
            transaction_id: txn,
            numbers: vec![1, 2],
            amount: Money::from_cents(1000),
            confirmed_at: now,
        };

        let aggregate =
            CampaignAggregate::replay(id, &[created(id, 2, now), reserve, confirm]).unwrap();

        assert_eq!(aggregate.campaign().sold_tickets, 2);
        assert_eq!(aggregate.version(), Version::new(3));

        let follow_up = aggregate.follow_up(now);
        assert!(matches!(follow_up[0], CampaignEvent::StatsRecomputed { stats, .. } if stats.total_revenue == Money::from_cents(1000)));
        assert!(matches!(follow_up[1], CampaignEvent::CampaignSoldOut { .. }));
    }
}
