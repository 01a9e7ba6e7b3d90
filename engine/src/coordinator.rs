//! Reservation coordinator: atomic multi-number reservation, asynchronous
//! payment confirmation, and expiry of unpaid holds.
//!
//! A reservation is decided and committed under the campaign lock; the
//! payment processor is only contacted after the lock is released. The
//! processor reports back through [`ReservationCoordinator::confirm_payment`],
//! which tolerates unknown and repeated transaction ids.

use crate::aggregate::CampaignAggregate;
use crate::config::EngineConfig;
use crate::error::{RaffleError, RaffleResult};
use crate::events::CampaignEvent;
use crate::ledger::AvailableNumbers;
use crate::metrics;
use crate::payment::PaymentRequest;
use crate::registry::{CampaignHandle, CampaignRegistry, fail_transaction};
use crate::types::{
    BuyerId, CampaignId, CampaignStatus, Confirmation, ConfirmationOutcome, FailureReason,
    PaymentOutcome, PaymentStatus, ReservationId, ReservationRequest, ReservationToken, Ticket,
    TicketNumber, TransactionId,
};
use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;
use std::sync::Arc;
use std::time::Instant;

const PAYMENT_ACTOR: &str = "payment-processor";
const SWEEP_ACTOR: &str = "expiry-sweep";

/// Outcome of one expiry sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Campaigns inspected
    pub campaigns_checked: usize,
    /// Transactions whose holds were failed
    pub expired_transactions: usize,
    /// Numbers released
    pub released_numbers: usize,
    /// Campaigns whose expiry could not be persisted (retried next sweep)
    pub failed_campaigns: usize,
}

/// Orchestrates reservations against the ticket ledger
pub struct ReservationCoordinator {
    registry: Arc<CampaignRegistry>,
}

impl ReservationCoordinator {
    /// Create a coordinator over the registry's campaigns
    #[must_use]
    pub const fn new(registry: Arc<CampaignRegistry>) -> Self {
        Self { registry }
    }

    /// Reserve a set of numbers for a buyer, all or nothing.
    ///
    /// On success every number is pending until the returned token's
    /// `expires_at`, and the payment processor has accepted the request.
    ///
    /// # Errors
    ///
    /// - `Validation`: empty request, duplicates, too many numbers, out of range
    /// - `NumbersHeld`: some numbers are held; names every contested number
    /// - `InvalidState`: campaign not active (or sold out)
    /// - `Expired`: sales have closed
    /// - `LimitExceeded`: per-buyer cap
    /// - `Payment`: processor refused; the hold was released
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn reserve(&self, request: ReservationRequest) -> RaffleResult<ReservationToken> {
        let result = self.try_reserve(&request).await;
        match &result {
            Ok(_) => metrics::record_reservation("reserved"),
            Err(RaffleError::NumbersHeld { numbers }) => {
                metrics::record_reservation("conflict");
                metrics::record_conflict("numbers_held");
                tracing::warn!(
                    campaign_id = %request.campaign_id,
                    buyer_id = %request.buyer_id,
                    ?numbers,
                    "Reservation conflict"
                );
            }
            Err(error) => {
                metrics::record_reservation("rejected");
                tracing::warn!(
                    campaign_id = %request.campaign_id,
                    buyer_id = %request.buyer_id,
                    %error,
                    "Reservation rejected"
                );
            }
        }
        result
    }

    async fn try_reserve(&self, request: &ReservationRequest) -> RaffleResult<ReservationToken> {
        let config = self.registry.config();
        let numbers = validate_numbers(&request.numbers, config.max_numbers_per_reservation)?;
        let handle = self.registry.handle(request.campaign_id).await?;
        let now = self.registry.env().clock.now();

        let (token, committed) = {
            let mut aggregate = handle.lock().await;
            let (events, token) = plan_reservation(&aggregate, request, numbers, config, now)?;
            let committed = self.registry.commit(&mut aggregate, events).await?;
            (token, committed)
        };
        self.registry
            .dispatch(&committed, request.buyer_id.as_str())
            .await;

        tracing::info!(
            campaign_id = %token.campaign_id,
            transaction_id = %token.transaction_id,
            buyer_id = %request.buyer_id,
            numbers = ?token.numbers,
            expires_at = %token.expires_at,
            "Tickets reserved"
        );

        let payment = PaymentRequest {
            transaction_id: token.transaction_id,
            reservation_id: token.reservation_id,
            campaign_id: token.campaign_id,
            buyer_id: request.buyer_id.clone(),
            amount: token.amount_due,
            payment_method: request.payment_method.clone(),
        };
        if let Err(error) = self.registry.env().payments.initiate_payment(payment).await {
            tracing::warn!(
                transaction_id = %token.transaction_id,
                %error,
                "Payment not initiated, releasing hold"
            );
            if let Err(release_error) = self
                .release(
                    token.campaign_id,
                    token.transaction_id,
                    FailureReason::PaymentNotInitiated,
                    PAYMENT_ACTOR,
                )
                .await
            {
                tracing::error!(
                    transaction_id = %token.transaction_id,
                    error = %release_error,
                    "Hold not released; the expiry sweep will free it"
                );
            }
            return Err(RaffleError::Payment(error));
        }

        Ok(token)
    }

    /// Apply the payment processor's verdict for a transaction.
    ///
    /// Unknown transactions and transactions already resolved are no-ops; the
    /// latter report the recorded outcome with `replayed = true`. A success
    /// arriving after the hold was lost fails nothing further and is flagged
    /// `late_payment` for refund handling.
    ///
    /// # Errors
    ///
    /// `ConcurrentWrite` or `Storage` if the outcome cannot be persisted.
    pub async fn confirm_payment(
        &self,
        transaction_id: TransactionId,
        outcome: PaymentOutcome,
    ) -> RaffleResult<ConfirmationOutcome> {
        let Some(campaign_id) = self.registry.locate_transaction(transaction_id).await else {
            tracing::debug!(%transaction_id, "Confirmation for unknown transaction ignored");
            metrics::record_payment("unknown");
            return Ok(ConfirmationOutcome::UnknownTransaction(transaction_id));
        };
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();

        let (confirmation, committed) = {
            let mut aggregate = handle.lock().await;
            let Some((events, confirmation)) =
                plan_confirmation(&aggregate, transaction_id, &outcome, now)
            else {
                return Ok(ConfirmationOutcome::UnknownTransaction(transaction_id));
            };
            let committed = self
                .registry
                .commit_with_follow_up(&mut aggregate, events, now)
                .await?;
            (confirmation, committed)
        };
        self.registry.dispatch(&committed, PAYMENT_ACTOR).await;

        let label = if confirmation.replayed {
            "replayed"
        } else if confirmation.late_payment {
            "late"
        } else if confirmation.status == PaymentStatus::Completed {
            "completed"
        } else {
            "failed"
        };
        metrics::record_payment(label);
        if confirmation.status == PaymentStatus::Completed && !confirmation.replayed {
            for event in &committed {
                if let CampaignEvent::PaymentConfirmed { amount, .. } = event {
                    metrics::record_revenue(amount.cents());
                }
            }
        }

        tracing::info!(
            %campaign_id,
            %transaction_id,
            status = %confirmation.status,
            replayed = confirmation.replayed,
            late_payment = confirmation.late_payment,
            "Payment outcome applied"
        );
        Ok(ConfirmationOutcome::Resolved(confirmation))
    }

    /// Buyer abandons a pending reservation; returns the released numbers.
    ///
    /// Releasing an already-failed reservation releases nothing.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist or belongs to someone else
    /// - `InvalidState` if it has been paid
    /// - `ConcurrentWrite`, `Storage`
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        buyer_id: &BuyerId,
    ) -> RaffleResult<Vec<TicketNumber>> {
        let not_found = || RaffleError::NotFound {
            entity: "reservation",
            id: reservation_id.to_string(),
        };
        let (campaign_id, transaction_id) = self
            .registry
            .locate_reservation(reservation_id)
            .await
            .ok_or_else(not_found)?;
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();

        let (released, committed) = {
            let mut aggregate = handle.lock().await;
            let tickets = aggregate.ledger().transaction(transaction_id);
            let Some(first) = tickets.first() else {
                return Err(not_found());
            };
            if &first.buyer_id != buyer_id {
                return Err(not_found());
            }
            match first.payment_status {
                PaymentStatus::Failed => return Ok(Vec::new()),
                PaymentStatus::Completed => {
                    return Err(RaffleError::InvalidState {
                        operation: "release a paid reservation",
                        status: aggregate.status(),
                    });
                }
                PaymentStatus::Pending => {}
            }
            let reason = if first.is_expired_hold(now) {
                FailureReason::Expired
            } else {
                FailureReason::Abandoned
            };
            let event = fail_transaction(&aggregate, transaction_id, reason, now);
            let released = failed_numbers(std::slice::from_ref(&event));
            let committed = self
                .registry
                .commit_with_follow_up(&mut aggregate, vec![event], now)
                .await?;
            (released, committed)
        };
        self.registry.dispatch(&committed, buyer_id.as_str()).await;

        tracing::info!(%campaign_id, %reservation_id, released = ?released, "Reservation released by buyer");
        Ok(released)
    }

    /// Fail every pending hold past its expiry.
    ///
    /// Each campaign is handled under its own lock and each transaction is
    /// failed only if it is still pending and still expired at that moment, so
    /// a concurrent confirmation either lands first or finds the hold failed.
    /// A campaign whose stream moved on under another writer is rehydrated
    /// and swept again at once. Derived events a previous change failed to
    /// persist (a missed sold-out transition) are committed here too. Storage
    /// errors are logged and the campaign is retried on the next sweep.
    pub async fn expire_reservations(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        for (campaign_id, handle) in self.registry.handles().await {
            report.campaigns_checked += 1;

            let mut outcome = self.sweep_campaign(&handle).await;
            if matches!(outcome, Err(RaffleError::ConcurrentWrite { .. })) {
                tracing::warn!(%campaign_id, "Campaign stream moved on, rehydrating before sweep");
                outcome = match self.registry.rehydrate(campaign_id).await {
                    Ok(_) => self.sweep_campaign(&handle).await,
                    Err(error) => Err(error),
                };
            }
            let committed = match outcome {
                Ok(committed) if committed.is_empty() => continue,
                Ok(committed) => committed,
                Err(error) => {
                    tracing::error!(%campaign_id, %error, "Expiry sweep failed for campaign");
                    report.failed_campaigns += 1;
                    continue;
                }
            };

            let expired = committed
                .iter()
                .filter(|event| matches!(event, CampaignEvent::TicketsFailed { .. }))
                .count();
            let released = failed_numbers(&committed);
            report.expired_transactions += expired;
            report.released_numbers += released.len();
            if expired > 0 {
                tracing::info!(%campaign_id, expired, released = ?released, "Expired holds released");
            }
            self.registry.dispatch(&committed, SWEEP_ACTOR).await;
        }

        metrics::record_sweep(
            report.released_numbers as u64,
            started.elapsed().as_secs_f64(),
        );
        report
    }

    /// Numbers currently reservable, ascending and lazily enumerated
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign.
    pub async fn available_numbers(&self, campaign_id: CampaignId) -> RaffleResult<AvailableNumbers> {
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();
        let aggregate = handle.lock().await;
        Ok(aggregate.ledger().available_numbers(now))
    }

    /// Every ticket a buyer has held in a campaign, in creation order
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign.
    pub async fn tickets_for_buyer(
        &self,
        campaign_id: CampaignId,
        buyer_id: &BuyerId,
    ) -> RaffleResult<Vec<Ticket>> {
        let handle = self.registry.handle(campaign_id).await?;
        let aggregate = handle.lock().await;
        Ok(aggregate
            .ledger()
            .for_buyer(buyer_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Tickets covered by a payment transaction
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown transaction.
    pub async fn ticket_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> RaffleResult<Vec<Ticket>> {
        let not_found = || RaffleError::NotFound {
            entity: "transaction",
            id: transaction_id.to_string(),
        };
        let campaign_id = self
            .registry
            .locate_transaction(transaction_id)
            .await
            .ok_or_else(not_found)?;
        let handle = self.registry.handle(campaign_id).await?;
        let aggregate = handle.lock().await;
        Ok(aggregate
            .ledger()
            .transaction(transaction_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn sweep_campaign(&self, handle: &CampaignHandle) -> RaffleResult<Vec<CampaignEvent>> {
        let now = self.registry.env().clock.now();
        let mut aggregate = handle.lock().await;
        let events: Vec<CampaignEvent> = aggregate
            .ledger()
            .expired_transactions(now)
            .into_iter()
            .map(|transaction_id| {
                fail_transaction(&aggregate, transaction_id, FailureReason::Expired, now)
            })
            .collect();
        if events.is_empty() {
            let follow_up = aggregate.follow_up(now);
            let sold_out_missed = follow_up
                .iter()
                .any(|event| matches!(event, CampaignEvent::CampaignSoldOut { .. }));
            if !sold_out_missed {
                return Ok(Vec::new());
            }
            tracing::info!(campaign_id = %aggregate.campaign().id, "Committing missed sold-out transition");
            return self.registry.commit(&mut aggregate, follow_up).await;
        }
        self.registry
            .commit_with_follow_up(&mut aggregate, events, now)
            .await
    }

    async fn release(
        &self,
        campaign_id: CampaignId,
        transaction_id: TransactionId,
        reason: FailureReason,
        actor: &str,
    ) -> RaffleResult<()> {
        let handle = self.registry.handle(campaign_id).await?;
        let now = self.registry.env().clock.now();
        let committed = {
            let mut aggregate = handle.lock().await;
            let event = fail_transaction(&aggregate, transaction_id, reason, now);
            if failed_numbers(std::slice::from_ref(&event)).is_empty() {
                return Ok(());
            }
            self.registry
                .commit_with_follow_up(&mut aggregate, vec![event], now)
                .await?
        };
        self.registry.dispatch(&committed, actor).await;
        Ok(())
    }
}

/// Validate request shape and return the numbers ascending
fn validate_numbers(numbers: &[TicketNumber], max: usize) -> RaffleResult<Vec<TicketNumber>> {
    if numbers.is_empty() {
        return Err(RaffleError::Validation(
            "at least one ticket number is required".to_string(),
        ));
    }
    if numbers.len() > max {
        return Err(RaffleError::Validation(format!(
            "at most {max} numbers may be reserved at once, got {}",
            numbers.len()
        )));
    }
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    let mut duplicates: Vec<TicketNumber> = sorted
        .windows(2)
        .filter(|pair| pair[0] == pair[1])
        .map(|pair| pair[0])
        .collect();
    duplicates.dedup();
    if !duplicates.is_empty() {
        return Err(RaffleError::Validation(format!(
            "duplicate ticket numbers: {duplicates:?}"
        )));
    }
    Ok(sorted)
}

fn plan_reservation(
    aggregate: &CampaignAggregate,
    request: &ReservationRequest,
    numbers: Vec<TicketNumber>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> RaffleResult<(Vec<CampaignEvent>, ReservationToken)> {
    let campaign = aggregate.campaign();
    let ledger = aggregate.ledger();

    match campaign.status {
        CampaignStatus::Active => {}
        CampaignStatus::SoldOut if !config.sold_out_blocks_reservations => {}
        status => {
            return Err(RaffleError::InvalidState {
                operation: "reserve tickets",
                status,
            });
        }
    }
    if now >= campaign.end_date {
        return Err(RaffleError::Expired(format!(
            "sales for campaign {} closed at {}",
            campaign.id, campaign.end_date
        )));
    }

    let out_of_range: Vec<TicketNumber> = numbers
        .iter()
        .copied()
        .filter(|number| !ledger.in_range(*number))
        .collect();
    if !out_of_range.is_empty() {
        return Err(RaffleError::Validation(format!(
            "ticket numbers outside 1..={}: {out_of_range:?}",
            ledger.total()
        )));
    }

    let contested = ledger.conflicts(&numbers, now);
    if !contested.is_empty() {
        return Err(RaffleError::NumbersHeld { numbers: contested });
    }

    let requested = u32::try_from(numbers.len()).unwrap_or(u32::MAX);
    if let Some(limit) = campaign.max_tickets_per_user {
        let held = ledger.live_count_for_buyer(&request.buyer_id, now);
        if held.saturating_add(requested) > limit {
            return Err(RaffleError::LimitExceeded {
                limit,
                held,
                requested,
            });
        }
    }

    let amount_due = campaign
        .ticket_price
        .checked_multiply(requested)
        .ok_or_else(|| RaffleError::Validation("amount due overflows".to_string()))?;

    let mut events: Vec<CampaignEvent> = ledger
        .expired_holders(&numbers, now)
        .into_iter()
        .map(|transaction_id| fail_transaction(aggregate, transaction_id, FailureReason::Expired, now))
        .collect();

    let token = ReservationToken {
        reservation_id: ReservationId::new(),
        campaign_id: campaign.id,
        transaction_id: TransactionId::new(),
        numbers,
        expires_at: now + config.reservation_ttl(),
        amount_due,
    };
    events.push(CampaignEvent::TicketsReserved {
        campaign_id: campaign.id,
        reservation_id: token.reservation_id,
        transaction_id: token.transaction_id,
        buyer_id: request.buyer_id.clone(),
        numbers: token.numbers.clone(),
        payment_method: request.payment_method.clone(),
        reserved_at: now,
        expires_at: token.expires_at,
    });

    Ok((events, token))
}

fn plan_confirmation(
    aggregate: &CampaignAggregate,
    transaction_id: TransactionId,
    outcome: &PaymentOutcome,
    now: DateTime<Utc>,
) -> Option<(Vec<CampaignEvent>, Confirmation)> {
    let campaign = aggregate.campaign();
    let tickets = aggregate.ledger().transaction(transaction_id);
    let first = tickets.first()?;
    let numbers: Vec<TicketNumber> = tickets.iter().map(|ticket| ticket.number).collect();
    let succeeded = matches!(outcome, PaymentOutcome::Succeeded);

    let mut confirmation = Confirmation {
        transaction_id,
        campaign_id: campaign.id,
        status: first.payment_status,
        numbers: numbers.clone(),
        failure_reason: first.failure_reason,
        replayed: false,
        late_payment: false,
    };

    if first.payment_status != PaymentStatus::Pending {
        confirmation.replayed = true;
        confirmation.late_payment = succeeded && first.payment_status == PaymentStatus::Failed;
        return Some((Vec::new(), confirmation));
    }

    let event = match outcome {
        PaymentOutcome::Succeeded if !first.is_expired_hold(now) => {
            confirmation.status = PaymentStatus::Completed;
            CampaignEvent::PaymentConfirmed {
                campaign_id: campaign.id,
                transaction_id,
                amount: campaign.ticket_price.saturating_multiply(
                    u32::try_from(numbers.len()).unwrap_or(u32::MAX),
                ),
                numbers,
                confirmed_at: now,
            }
        }
        PaymentOutcome::Succeeded => {
            confirmation.status = PaymentStatus::Failed;
            confirmation.failure_reason = Some(FailureReason::Expired);
            confirmation.late_payment = true;
            fail_transaction(aggregate, transaction_id, FailureReason::Expired, now)
        }
        PaymentOutcome::Failed { reason } => {
            tracing::debug!(%transaction_id, %reason, "Processor reported payment failure");
            confirmation.status = PaymentStatus::Failed;
            confirmation.failure_reason = Some(FailureReason::PaymentDeclined);
            fail_transaction(aggregate, transaction_id, FailureReason::PaymentDeclined, now)
        }
    };
    Some((vec![event], confirmation))
}

fn failed_numbers(events: &[CampaignEvent]) -> Vec<TicketNumber> {
    let mut numbers: Vec<TicketNumber> = events
        .iter()
        .flat_map(|event| match event {
            CampaignEvent::TicketsFailed { numbers, .. } => numbers.clone(),
            _ => Vec::new(),
        })
        .collect();
    numbers.sort_unstable();
    numbers
}
