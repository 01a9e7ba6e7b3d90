//! Draw engine: exactly-once, verifiable winner selection.
//!
//! The draw runs under the campaign lock. The completed set is read, the
//! winner picked with the injected [`RandomSource`], outstanding holds are
//! failed and `WinnerDrawn` is appended in one commit at the version the lock
//! holder observed. A second caller, in this process or another, either sees
//! the winner under the lock or loses the version check; it never produces a
//! second winner.
//!
//! [`RandomSource`]: raffle_core::environment::RandomSource

use crate::aggregate::CampaignAggregate;
use crate::compliance::documents_method;
use crate::error::{RaffleError, RaffleResult};
use crate::events::CampaignEvent;
use crate::metrics;
use crate::registry::{CampaignRegistry, release_pending};
use crate::types::{
    BuyerId, CampaignId, CampaignStatus, FailureReason, PaymentStatus, TicketNumber, WinnerRecord,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const SCHEDULER_ACTOR: &str = "scheduler";

/// SHA-256 over the numbers as big-endian `u32`s, base64url
#[must_use]
pub fn eligible_digest(numbers: &[TicketNumber]) -> String {
    let mut hasher = Sha256::new();
    for number in numbers {
        hasher.update(number.to_be_bytes());
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Result of re-checking a recorded draw against the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawVerification {
    /// Winning ticket is completed
    pub ticket_completed: bool,
    /// Winning ticket belongs to the recorded buyer
    pub owner_matches: bool,
    /// Completed set still hashes to the recorded digest
    pub digest_matches: bool,
    /// Completed set still has the recorded size
    pub count_matches: bool,
    /// Published draw documentation names the method the draw used;
    /// `None` if nothing is published
    pub method_documented: Option<bool>,
}

impl DrawVerification {
    /// All checks passed
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.ticket_completed
            && self.owner_matches
            && self.digest_matches
            && self.count_matches
            && !matches!(self.method_documented, Some(false))
    }
}

/// Outcome of one auto-close pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// Campaigns drawn (including ones another caller drew first)
    pub drawn: usize,
    /// Past-end campaigns left open because nothing was paid
    pub without_tickets: usize,
    /// Campaigns whose draw failed and will be retried
    pub failed: usize,
}

/// Selects winners and hands over prizes
pub struct DrawEngine {
    registry: Arc<CampaignRegistry>,
}

impl DrawEngine {
    /// Create a draw engine over the registry's campaigns
    #[must_use]
    pub const fn new(registry: Arc<CampaignRegistry>) -> Self {
        Self { registry }
    }

    /// Draw the campaign's winner.
    ///
    /// # Errors
    ///
    /// - `AlreadyDrawn` carrying the existing record if a winner exists
    /// - `InvalidState` if the campaign is not active or sold out
    /// - `NoEligibleTickets` if no ticket is completed; status is unchanged
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn draw_winner(&self, campaign_id: CampaignId, actor: &str) -> RaffleResult<WinnerRecord> {
        let result = self.try_draw(campaign_id, actor).await;
        match &result {
            Ok(_) => metrics::record_draw("drawn"),
            Err(RaffleError::AlreadyDrawn { .. }) => {
                metrics::record_draw("already_drawn");
                tracing::debug!(%campaign_id, actor, "Campaign already drawn");
            }
            Err(error) => {
                metrics::record_draw("rejected");
                tracing::warn!(%campaign_id, actor, %error, "Draw rejected");
            }
        }
        result
    }

    async fn try_draw(&self, campaign_id: CampaignId, actor: &str) -> RaffleResult<WinnerRecord> {
        let handle = self.registry.handle(campaign_id).await?;
        let witnesses = self.registry.compliance().witnesses(campaign_id).await;

        let (winner, committed) = {
            let mut aggregate = handle.lock().await;
            let now = self.registry.env().clock.now();
            let (events, winner) = self.plan_draw(&aggregate, actor, witnesses, now)?;
            let committed = self
                .registry
                .commit_with_follow_up(&mut aggregate, events, now)
                .await?;
            (winner, committed)
        };
        self.registry.dispatch(&committed, actor).await;

        tracing::info!(
            %campaign_id,
            ticket_number = winner.ticket_number,
            buyer_id = %winner.buyer_id,
            eligible = winner.eligible_count,
            method = %winner.draw_method,
            "Winner drawn"
        );
        Ok(winner)
    }

    fn plan_draw(
        &self,
        aggregate: &CampaignAggregate,
        actor: &str,
        witnesses: Vec<String>,
        now: DateTime<Utc>,
    ) -> RaffleResult<(Vec<CampaignEvent>, WinnerRecord)> {
        let campaign = aggregate.campaign();
        if let Some(winner) = &campaign.winner {
            return Err(RaffleError::AlreadyDrawn {
                winner: Box::new(winner.clone()),
            });
        }
        if !campaign.status.is_drawable() {
            return Err(RaffleError::InvalidState {
                operation: "draw winner",
                status: campaign.status,
            });
        }

        let eligible = aggregate.ledger().completed();
        let Some(last) = eligible.len().checked_sub(1) else {
            return Err(RaffleError::NoEligibleTickets { campaign_id: campaign.id });
        };
        let random = &self.registry.env().random;
        let index = random.pick_index(eligible.len()).min(last);
        let Some(ticket) = eligible.get(index) else {
            return Err(RaffleError::NoEligibleTickets { campaign_id: campaign.id });
        };
        let numbers: Vec<TicketNumber> = eligible.iter().map(|ticket| ticket.number).collect();

        let winner = WinnerRecord {
            campaign_id: campaign.id,
            ticket_number: ticket.number,
            buyer_id: ticket.buyer_id.clone(),
            transaction_id: ticket.transaction_id,
            drawn_at: now,
            drawn_by: actor.to_string(),
            draw_method: random.method().to_string(),
            witnesses,
            eligible_count: u32::try_from(numbers.len()).unwrap_or(u32::MAX),
            eligible_digest: eligible_digest(&numbers),
            claimed: false,
            claimed_at: None,
        };

        let mut events = release_pending(aggregate, FailureReason::CampaignClosed, now);
        events.push(CampaignEvent::WinnerDrawn {
            winner: winner.clone(),
        });
        Ok((events, winner))
    }

    /// Mark the prize as handed over to the winner.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the campaign has not been drawn
    /// - `NotWinner` if `buyer_id` is not the recorded winner
    /// - `PrizeAlreadyClaimed` on a second claim
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn claim_prize(
        &self,
        campaign_id: CampaignId,
        buyer_id: &BuyerId,
    ) -> RaffleResult<WinnerRecord> {
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();

        let (winner, committed) = {
            let mut aggregate = handle.lock().await;
            let campaign = aggregate.campaign();
            let Some(winner) = campaign.winner.as_ref() else {
                return Err(RaffleError::InvalidState {
                    operation: "claim prize",
                    status: campaign.status,
                });
            };
            if &winner.buyer_id != buyer_id {
                return Err(RaffleError::NotWinner {
                    buyer_id: buyer_id.clone(),
                });
            }
            if let Some(claimed_at) = winner.claimed_at {
                return Err(RaffleError::PrizeAlreadyClaimed { claimed_at });
            }
            let event = CampaignEvent::PrizeClaimed {
                campaign_id,
                buyer_id: buyer_id.clone(),
                claimed_at: now,
            };
            let committed = self.registry.commit(&mut aggregate, vec![event]).await?;
            let winner = aggregate
                .campaign()
                .winner
                .clone()
                .ok_or_else(|| RaffleError::Storage("winner missing after claim".to_string()))?;
            (winner, committed)
        };
        self.registry.dispatch(&committed, buyer_id.as_str()).await;

        tracing::info!(%campaign_id, %buyer_id, "Prize claimed");
        Ok(winner)
    }

    /// Re-check a recorded draw against the current ledger.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the campaign has not been drawn
    /// - `NotFound` for an unknown campaign
    pub async fn verify_draw(&self, campaign_id: CampaignId) -> RaffleResult<DrawVerification> {
        let aggregate = self.registry.snapshot(campaign_id).await?;
        let Some(winner) = aggregate.campaign().winner.as_ref() else {
            return Err(RaffleError::InvalidState {
                operation: "verify draw",
                status: aggregate.status(),
            });
        };

        let ledger = aggregate.ledger();
        let holder = ledger.holder(winner.ticket_number);
        let numbers: Vec<TicketNumber> = ledger.completed().iter().map(|t| t.number).collect();
        let method_documented = match self.registry.compliance().record(campaign_id).await {
            Ok(record) if record.transparency.draw_method_documentation.is_some() => {
                Some(documents_method(&record.transparency, &winner.draw_method))
            }
            _ => None,
        };

        let verification = DrawVerification {
            ticket_completed: holder.is_some_and(|t| t.payment_status == PaymentStatus::Completed),
            owner_matches: holder.is_some_and(|t| {
                t.buyer_id == winner.buyer_id && t.transaction_id == winner.transaction_id
            }),
            digest_matches: eligible_digest(&numbers) == winner.eligible_digest,
            count_matches: u32::try_from(numbers.len()).ok() == Some(winner.eligible_count),
            method_documented,
        };
        if !verification.is_valid() {
            tracing::warn!(%campaign_id, ?verification, "Draw verification failed");
        }
        Ok(verification)
    }

    /// Draw every active or sold-out campaign whose end date has passed.
    ///
    /// Campaigns without a completed ticket stay as they are; failures are
    /// logged and retried on the next pass.
    pub async fn close_expired_campaigns(&self) -> CloseReport {
        let mut report = CloseReport::default();
        let now = self.registry.env().clock.now();

        for (campaign_id, handle) in self.registry.handles().await {
            let due = {
                let aggregate = handle.lock().await;
                let campaign = aggregate.campaign();
                matches!(campaign.status, CampaignStatus::Active | CampaignStatus::SoldOut)
                    && campaign.end_date <= now
            };
            if !due {
                continue;
            }
            match self.draw_winner(campaign_id, SCHEDULER_ACTOR).await {
                Ok(_) | Err(RaffleError::AlreadyDrawn { .. }) => report.drawn += 1,
                Err(RaffleError::NoEligibleTickets { .. }) => {
                    tracing::info!(%campaign_id, "Past end date with no paid tickets");
                    report.without_tickets += 1;
                }
                Err(error) => {
                    tracing::error!(%campaign_id, %error, "Auto-close draw failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// The campaign's winner, if drawn
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign.
    pub async fn get_winner(&self, campaign_id: CampaignId) -> RaffleResult<Option<WinnerRecord>> {
        Ok(self.registry.get_campaign(campaign_id).await?.winner)
    }
}
