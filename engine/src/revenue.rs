//! Revenue aggregator.
//!
//! Statistics are always derived from the ticket ledger, never maintained
//! incrementally. Each recomputation that changes them is persisted as a
//! `StatsRecomputed` event, so the history of every figure is auditable.

use crate::error::RaffleResult;
use crate::ledger::TicketLedger;
use crate::registry::CampaignRegistry;
use crate::types::{BuyerId, CampaignId, CampaignStats, CampaignStatus, Money, OrganizerId, PaymentStatus};
use raffle_core::environment::Clock;
use std::collections::HashSet;
use std::sync::Arc;

const ACTOR: &str = "revenue-aggregator";

/// Derive campaign statistics from its ledger.
///
/// `total_revenue = completed * ticket_price`; `unique_buyers` counts distinct
/// holders of completed tickets.
#[must_use]
pub fn derive_stats(ledger: &TicketLedger, ticket_price: Money, total_tickets: u32) -> CampaignStats {
    let completed = ledger.completed();
    let completed_tickets = u32::try_from(completed.len()).unwrap_or(u32::MAX);
    let unique_buyers: HashSet<&BuyerId> = completed.iter().map(|ticket| &ticket.buyer_id).collect();
    let sell_through_basis_points = if total_tickets == 0 {
        0
    } else {
        u32::try_from(u64::from(completed_tickets) * 10_000 / u64::from(total_tickets))
            .unwrap_or(u32::MAX)
    };

    CampaignStats {
        total_revenue: ticket_price.saturating_multiply(completed_tickets),
        unique_buyers: u32::try_from(unique_buyers.len()).unwrap_or(u32::MAX),
        completed_tickets,
        pending_tickets: ledger.count(PaymentStatus::Pending),
        failed_tickets: ledger.count(PaymentStatus::Failed),
        sell_through_basis_points,
    }
}

/// Totals across one organizer's campaigns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizerSummary {
    /// Organizer
    pub organizer_id: OrganizerId,
    /// Campaigns owned
    pub campaigns: u32,
    /// Campaigns currently selling
    pub active_campaigns: u32,
    /// Completed tickets across campaigns
    pub completed_tickets: u32,
    /// Revenue across campaigns
    pub total_revenue: Money,
    /// Distinct buyers across campaigns
    pub unique_buyers: u32,
}

/// Recomputes and reports campaign statistics
pub struct RevenueAggregator {
    registry: Arc<CampaignRegistry>,
}

impl RevenueAggregator {
    /// Create an aggregator over the registry's campaigns
    #[must_use]
    pub const fn new(registry: Arc<CampaignRegistry>) -> Self {
        Self { registry }
    }

    /// Recompute a campaign's statistics from its ledger and persist any change
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown campaign
    /// - `ConcurrentWrite`, `Storage` if the change cannot be persisted
    pub async fn recompute_stats(&self, campaign_id: CampaignId) -> RaffleResult<CampaignStats> {
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();

        let (stats, committed) = {
            let mut aggregate = handle.lock().await;
            let events = aggregate.follow_up(now);
            let committed = self.registry.commit(&mut aggregate, events).await?;
            (aggregate.campaign().stats, committed)
        };

        if !committed.is_empty() {
            self.registry.dispatch(&committed, ACTOR).await;
            tracing::debug!(
                %campaign_id,
                revenue_cents = stats.total_revenue.cents(),
                unique_buyers = stats.unique_buyers,
                "Campaign stats recomputed"
            );
        }
        Ok(stats)
    }

    /// Totals across every campaign of an organizer, derived from each ledger
    pub async fn organizer_summary(&self, organizer_id: &OrganizerId) -> OrganizerSummary {
        let mut summary = OrganizerSummary {
            organizer_id: organizer_id.clone(),
            campaigns: 0,
            active_campaigns: 0,
            completed_tickets: 0,
            total_revenue: Money::ZERO,
            unique_buyers: 0,
        };
        let mut buyers = HashSet::new();

        for (_, handle) in self.registry.handles().await {
            let aggregate = handle.lock().await;
            let campaign = aggregate.campaign();
            if &campaign.organizer_id != organizer_id {
                continue;
            }
            let stats = derive_stats(aggregate.ledger(), campaign.ticket_price, campaign.total_tickets);
            summary.campaigns += 1;
            if campaign.status == CampaignStatus::Active {
                summary.active_campaigns += 1;
            }
            summary.completed_tickets = summary.completed_tickets.saturating_add(stats.completed_tickets);
            summary.total_revenue = summary.total_revenue.saturating_add(stats.total_revenue);
            buyers.extend(
                aggregate
                    .ledger()
                    .completed()
                    .into_iter()
                    .map(|ticket| ticket.buyer_id.clone()),
            );
        }

        summary.unique_buyers = u32::try_from(buyers.len()).unwrap_or(u32::MAX);
        summary
    }
}
