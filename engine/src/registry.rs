//! Campaign registry: campaign metadata, the campaign state machine, and the
//! per-campaign write path shared by every other component.
//!
//! Each campaign is a single-writer unit: its aggregate sits behind its own
//! `tokio::sync::Mutex`, and every change is appended to the campaign's event
//! stream (with the expected version) before the in-memory aggregate is
//! touched. No lock spans more than one campaign.

use crate::aggregate::CampaignAggregate;
use crate::compliance::ComplianceRecorder;
use crate::config::EngineConfig;
use crate::environment::EngineEnvironment;
use crate::error::{RaffleError, RaffleResult};
use crate::events::{CampaignEvent, campaign_stream};
use crate::metrics;
use crate::types::{
    Campaign, CampaignId, CampaignPatch, CampaignSpec, CampaignStatus, CancellationOutcome,
    FailureReason, OrganizerId, PaymentStatus, ReservationId, TicketNumber, TransactionId,
};
use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;
use raffle_core::event::{Event, SerializedEvent};
use raffle_core::event_store::EventStoreError;
use raffle_core::stream::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Largest inventory a campaign may have
pub const MAX_TOTAL_TICKETS: u32 = 1_000_000;

pub(crate) type CampaignHandle = Arc<Mutex<CampaignAggregate>>;

/// Owns every campaign aggregate and its indices
pub struct CampaignRegistry {
    env: EngineEnvironment,
    config: EngineConfig,
    compliance: Arc<ComplianceRecorder>,
    campaigns: RwLock<HashMap<CampaignId, CampaignHandle>>,
    transactions: RwLock<HashMap<TransactionId, CampaignId>>,
    reservations: RwLock<HashMap<ReservationId, (CampaignId, TransactionId)>>,
}

impl CampaignRegistry {
    /// Create an empty registry over an already validated config
    #[must_use]
    pub(crate) fn new(
        env: EngineEnvironment,
        config: EngineConfig,
        compliance: Arc<ComplianceRecorder>,
    ) -> Self {
        Self {
            env,
            config,
            compliance,
            campaigns: RwLock::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new campaign.
    ///
    /// The campaign starts `active` when `start_date <= now`, else `draft`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a zero price, an empty or oversized inventory, an
    ///   end date not in the future, or a start date after the end date
    /// - `Storage` if the creation event cannot be persisted
    pub async fn create_campaign(&self, spec: CampaignSpec) -> RaffleResult<Campaign> {
        let now = self.env.clock.now();
        Self::validate_spec(&spec, now)?;

        let campaign_id = CampaignId::new();
        let status = if spec.start_date <= now {
            CampaignStatus::Active
        } else {
            CampaignStatus::Draft
        };
        let event = CampaignEvent::CampaignCreated {
            campaign_id,
            organizer_id: spec.organizer_id.clone(),
            title: spec.title,
            prize: spec.prize,
            ticket_price: spec.ticket_price,
            total_tickets: spec.total_tickets,
            start_date: spec.start_date,
            end_date: spec.end_date,
            max_tickets_per_user: spec.max_tickets_per_user,
            status,
            created_at: now,
            compliance: spec.compliance.clone(),
        };
        let aggregate = CampaignAggregate::from_created(&event)
            .ok_or_else(|| RaffleError::Storage("creation event rejected".to_string()))?;

        self.append(campaign_id, Version::INITIAL, std::slice::from_ref(&event))
            .await?;
        let campaign = aggregate.campaign().clone();
        self.campaigns
            .write()
            .await
            .insert(campaign_id, Arc::new(Mutex::new(aggregate)));
        if let Err(error) = self
            .compliance
            .open(campaign_id, spec.organizer_id.clone(), spec.compliance)
            .await
        {
            tracing::warn!(%campaign_id, %error, "Compliance record not opened");
        }
        self.dispatch(&[event], spec.organizer_id.as_str()).await;

        tracing::info!(
            %campaign_id,
            organizer_id = %campaign.organizer_id,
            total_tickets = campaign.total_tickets,
            status = %campaign.status,
            "Campaign created"
        );
        Ok(campaign)
    }

    /// Change campaign metadata while the campaign is a draft or active
    ///
    /// # Errors
    ///
    /// - `InvalidState` outside draft/active, or when pricing or inventory
    ///   changes after the draft stage
    /// - `Validation` for malformed values
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn update_campaign(
        &self,
        campaign_id: CampaignId,
        patch: CampaignPatch,
        actor: &str,
    ) -> RaffleResult<Campaign> {
        let handle = self.handle(campaign_id).await?;
        let now = self.env.clock.now();

        let (campaign, committed) = {
            let mut aggregate = handle.lock().await;
            Self::validate_update(aggregate.campaign(), &patch, now)?;
            let event = CampaignEvent::CampaignUpdated {
                campaign_id,
                patch,
                actor: actor.to_string(),
                updated_at: now,
            };
            let committed = self.commit(&mut aggregate, vec![event]).await?;
            (aggregate.campaign().clone(), committed)
        };

        self.dispatch(&committed, actor).await;
        tracing::info!(%campaign_id, actor, "Campaign updated");
        Ok(campaign)
    }

    /// Open a draft campaign for sales
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the campaign is a draft
    /// - `Expired` if the end date has passed
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn activate_campaign(
        &self,
        campaign_id: CampaignId,
        actor: &str,
    ) -> RaffleResult<Campaign> {
        let handle = self.handle(campaign_id).await?;
        let now = self.env.clock.now();

        let (campaign, committed) = {
            let mut aggregate = handle.lock().await;
            let campaign = aggregate.campaign();
            if !campaign.status.can_transition_to(CampaignStatus::Active) {
                return Err(RaffleError::InvalidState {
                    operation: "activate campaign",
                    status: campaign.status,
                });
            }
            if now >= campaign.end_date {
                return Err(RaffleError::Expired(format!(
                    "campaign {campaign_id} ended at {}",
                    campaign.end_date
                )));
            }
            let event = CampaignEvent::CampaignActivated {
                campaign_id,
                actor: actor.to_string(),
                activated_at: now,
            };
            let committed = self.commit(&mut aggregate, vec![event]).await?;
            (aggregate.campaign().clone(), committed)
        };

        self.dispatch(&committed, actor).await;
        tracing::info!(%campaign_id, actor, "Campaign activated");
        Ok(campaign)
    }

    /// Cancel a campaign that has not been drawn.
    ///
    /// Pending holds are failed so their numbers are released; completed
    /// tickets are returned for refund handling.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the campaign is drawn or already cancelled
    /// - `NotFound`, `ConcurrentWrite`, `Storage`
    pub async fn cancel_campaign(
        &self,
        campaign_id: CampaignId,
        actor: &str,
    ) -> RaffleResult<CancellationOutcome> {
        let handle = self.handle(campaign_id).await?;
        let now = self.env.clock.now();

        let (outcome, committed) = {
            let mut aggregate = handle.lock().await;
            let status = aggregate.status();
            if !status.can_transition_to(CampaignStatus::Cancelled) {
                return Err(RaffleError::InvalidState {
                    operation: "cancel campaign",
                    status,
                });
            }

            let mut events = release_pending(&aggregate, FailureReason::CampaignCancelled, now);
            let mut released: Vec<TicketNumber> = events
                .iter()
                .flat_map(|event| match event {
                    CampaignEvent::TicketsFailed { numbers, .. } => numbers.clone(),
                    _ => Vec::new(),
                })
                .collect();
            released.sort_unstable();
            let refunds: Vec<_> = aggregate
                .ledger()
                .completed()
                .into_iter()
                .cloned()
                .collect();
            events.push(CampaignEvent::CampaignCancelled {
                campaign_id,
                actor: actor.to_string(),
                refunds: refunds.iter().map(|ticket| ticket.number).collect(),
                cancelled_at: now,
            });

            let committed = self.commit_with_follow_up(&mut aggregate, events, now).await?;
            let outcome = CancellationOutcome {
                campaign: aggregate.campaign().clone(),
                refunds,
                released,
            };
            (outcome, committed)
        };

        self.dispatch(&committed, actor).await;
        tracing::info!(
            %campaign_id,
            actor,
            refunds = outcome.refunds.len(),
            released = outcome.released.len(),
            "Campaign cancelled"
        );
        Ok(outcome)
    }

    /// Snapshot of one campaign
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign.
    pub async fn get_campaign(&self, campaign_id: CampaignId) -> RaffleResult<Campaign> {
        let handle = self.handle(campaign_id).await?;
        let aggregate = handle.lock().await;
        Ok(aggregate.campaign().clone())
    }

    /// Snapshot of one campaign's aggregate, tickets included
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign.
    pub async fn snapshot(&self, campaign_id: CampaignId) -> RaffleResult<CampaignAggregate> {
        let handle = self.handle(campaign_id).await?;
        let aggregate = handle.lock().await;
        Ok(aggregate.clone())
    }

    /// Campaigns, optionally restricted to one organizer, oldest first
    pub async fn list_campaigns(&self, organizer_id: Option<&OrganizerId>) -> Vec<Campaign> {
        let mut campaigns = Vec::new();
        for (_, handle) in self.handles().await {
            let aggregate = handle.lock().await;
            let campaign = aggregate.campaign();
            if organizer_id.is_none_or(|organizer| &campaign.organizer_id == organizer) {
                campaigns.push(campaign.clone());
            }
        }
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        campaigns
    }

    /// Rebuild a campaign from its event stream and install it.
    ///
    /// The campaign's compliance record is reloaded from its own stream too.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the stream is empty
    /// - `Storage` if events cannot be loaded or decoded
    pub async fn rehydrate(&self, campaign_id: CampaignId) -> RaffleResult<CampaignAggregate> {
        let stored = self
            .env
            .event_store
            .load_events(campaign_stream(campaign_id), None)
            .await
            .map_err(|error| RaffleError::Storage(error.to_string()))?;
        if stored.is_empty() {
            return Err(RaffleError::campaign_not_found(campaign_id));
        }
        let events = stored
            .iter()
            .map(|serialized| CampaignEvent::from_bytes(&serialized.data))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| RaffleError::Storage(error.to_string()))?;

        let aggregate = CampaignAggregate::replay(campaign_id, &events)?;
        if let Some(CampaignEvent::CampaignCreated {
            organizer_id,
            compliance,
            ..
        }) = events.first()
        {
            self.compliance
                .open(campaign_id, organizer_id.clone(), compliance.clone())
                .await?;
        }
        for event in &events {
            self.index(event).await;
        }

        let existing = self.campaigns.read().await.get(&campaign_id).cloned();
        match existing {
            Some(handle) => *handle.lock().await = aggregate.clone(),
            None => {
                self.campaigns
                    .write()
                    .await
                    .insert(campaign_id, Arc::new(Mutex::new(aggregate.clone())));
            }
        }

        tracing::info!(
            %campaign_id,
            events = events.len(),
            version = %aggregate.version(),
            "Campaign rehydrated"
        );
        Ok(aggregate)
    }

    // ------------------------------------------------------------------------
    // Shared write path
    // ------------------------------------------------------------------------

    pub(crate) const fn env(&self) -> &EngineEnvironment {
        &self.env
    }

    pub(crate) const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn compliance(&self) -> &ComplianceRecorder {
        &self.compliance
    }

    pub(crate) async fn handle(&self, campaign_id: CampaignId) -> RaffleResult<CampaignHandle> {
        self.campaigns
            .read()
            .await
            .get(&campaign_id)
            .cloned()
            .ok_or_else(|| RaffleError::campaign_not_found(campaign_id))
    }

    pub(crate) async fn handles(&self) -> Vec<(CampaignId, CampaignHandle)> {
        let mut handles: Vec<_> = self
            .campaigns
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }

    pub(crate) async fn locate_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Option<CampaignId> {
        self.transactions.read().await.get(&transaction_id).copied()
    }

    pub(crate) async fn locate_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Option<(CampaignId, TransactionId)> {
        self.reservations.read().await.get(&reservation_id).copied()
    }

    /// Persist `events` at the aggregate's version, then apply them.
    ///
    /// Nothing is applied if the append fails.
    pub(crate) async fn commit(
        &self,
        aggregate: &mut CampaignAggregate,
        events: Vec<CampaignEvent>,
    ) -> RaffleResult<Vec<CampaignEvent>> {
        if events.is_empty() {
            return Ok(events);
        }
        let campaign_id = aggregate.campaign().id;
        let version = self.append(campaign_id, aggregate.version(), &events).await?;
        for event in &events {
            aggregate.apply(event);
            self.index(event).await;
        }
        aggregate.set_version(version);
        Ok(events)
    }

    /// [`commit`](Self::commit), then commit whatever derived events the new
    /// state calls for (stats, sold out).
    ///
    /// A failed follow-up is logged and left for the next change to pick up;
    /// the primary events are already durable. A missed sold-out transition is
    /// also committed by the expiry sweep.
    pub(crate) async fn commit_with_follow_up(
        &self,
        aggregate: &mut CampaignAggregate,
        events: Vec<CampaignEvent>,
        now: DateTime<Utc>,
    ) -> RaffleResult<Vec<CampaignEvent>> {
        let mut committed = self.commit(aggregate, events).await?;
        let follow_up = aggregate.follow_up(now);
        if !follow_up.is_empty() {
            match self.commit(aggregate, follow_up).await {
                Ok(mut derived) => committed.append(&mut derived),
                Err(error) => tracing::warn!(
                    campaign_id = %aggregate.campaign().id,
                    %error,
                    "Derived events not persisted"
                ),
            }
        }
        Ok(committed)
    }

    /// Record committed events in the compliance trail and publish them.
    ///
    /// Failures are logged and counted; committed state is never rolled back.
    pub(crate) async fn dispatch(&self, events: &[CampaignEvent], actor: &str) {
        for event in events {
            let campaign_id = event.campaign_id();
            let action = event
                .event_type()
                .split('.')
                .next()
                .unwrap_or_else(|| event.event_type());
            let details = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
            let recorded = match event {
                CampaignEvent::WinnerDrawn { winner } => {
                    self.compliance
                        .record_draw(campaign_id, &winner.draw_method, actor, details)
                        .await
                }
                _ => {
                    self.compliance
                        .record_audit(campaign_id, action, actor, details)
                        .await
                }
            };
            if let Err(error) = recorded {
                tracing::warn!(%campaign_id, action, %error, "Compliance entry not recorded");
            }

            let topic = event.topic();
            let serialized = match Self::serialize(event) {
                Ok(serialized) => serialized,
                Err(error) => {
                    tracing::warn!(%campaign_id, action, %error, "Event not published");
                    metrics::record_dispatch_failure(topic);
                    continue;
                }
            };
            if let Err(error) = self.env.event_bus.publish(topic, &serialized).await {
                tracing::warn!(%campaign_id, topic, action, %error, "Event publish failed");
                metrics::record_dispatch_failure(topic);
            }
        }
    }

    async fn append(
        &self,
        campaign_id: CampaignId,
        expected: Version,
        events: &[CampaignEvent],
    ) -> RaffleResult<Version> {
        let serialized = events
            .iter()
            .map(Self::serialize)
            .collect::<RaffleResult<Vec<_>>>()?;

        match self
            .env
            .event_store
            .append_events(campaign_stream(campaign_id), Some(expected), serialized)
            .await
        {
            Ok(version) => Ok(version),
            Err(EventStoreError::ConcurrencyConflict { expected, actual, .. }) => {
                tracing::warn!(%campaign_id, %expected, %actual, "Lost write race on campaign stream");
                metrics::record_conflict("concurrent_write");
                Err(RaffleError::ConcurrentWrite { campaign_id })
            }
            Err(error) => Err(RaffleError::Storage(error.to_string())),
        }
    }

    fn serialize(event: &CampaignEvent) -> RaffleResult<SerializedEvent> {
        let metadata = serde_json::json!({ "campaign_id": event.campaign_id().to_string() });
        SerializedEvent::from_event(event, Some(metadata))
            .map_err(|error| RaffleError::Storage(error.to_string()))
    }

    async fn index(&self, event: &CampaignEvent) {
        if let CampaignEvent::TicketsReserved {
            campaign_id,
            reservation_id,
            transaction_id,
            ..
        } = event
        {
            self.transactions
                .write()
                .await
                .insert(*transaction_id, *campaign_id);
            self.reservations
                .write()
                .await
                .insert(*reservation_id, (*campaign_id, *transaction_id));
        }
    }

    fn validate_spec(spec: &CampaignSpec, now: DateTime<Utc>) -> RaffleResult<()> {
        if spec.title.trim().is_empty() {
            return Err(RaffleError::Validation("title must not be empty".to_string()));
        }
        if spec.ticket_price.is_zero() {
            return Err(RaffleError::Validation(
                "ticket price must be greater than zero".to_string(),
            ));
        }
        Self::validate_total(spec.total_tickets)?;
        if spec.end_date <= now {
            return Err(RaffleError::Validation(
                "end date must be in the future".to_string(),
            ));
        }
        if spec.start_date >= spec.end_date {
            return Err(RaffleError::Validation(
                "start date must be before end date".to_string(),
            ));
        }
        if spec.max_tickets_per_user == Some(0) {
            return Err(RaffleError::Validation(
                "per-buyer limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_total(total: u32) -> RaffleResult<()> {
        if total == 0 || total > MAX_TOTAL_TICKETS {
            return Err(RaffleError::Validation(format!(
                "total tickets must be between 1 and {MAX_TOTAL_TICKETS}, got {total}"
            )));
        }
        Ok(())
    }

    fn validate_update(
        campaign: &Campaign,
        patch: &CampaignPatch,
        now: DateTime<Utc>,
    ) -> RaffleResult<()> {
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Active) {
            return Err(RaffleError::InvalidState {
                operation: "update campaign",
                status: campaign.status,
            });
        }
        if patch.is_empty() {
            return Err(RaffleError::Validation("patch changes nothing".to_string()));
        }
        if patch.changes_inventory() && campaign.status != CampaignStatus::Draft {
            return Err(RaffleError::InvalidState {
                operation: "change ticket price or inventory",
                status: campaign.status,
            });
        }
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(RaffleError::Validation("title must not be empty".to_string()));
        }
        if let Some(end_date) = patch.end_date {
            if end_date <= now || end_date <= campaign.start_date {
                return Err(RaffleError::Validation(
                    "end date must be in the future and after the start date".to_string(),
                ));
            }
        }
        if patch.max_tickets_per_user == Some(Some(0)) {
            return Err(RaffleError::Validation(
                "per-buyer limit must be at least 1".to_string(),
            ));
        }
        if patch.ticket_price.is_some_and(|price| price.is_zero()) {
            return Err(RaffleError::Validation(
                "ticket price must be greater than zero".to_string(),
            ));
        }
        if let Some(total) = patch.total_tickets {
            Self::validate_total(total)?;
        }
        Ok(())
    }
}

/// `TicketsFailed` for every pending transaction of the campaign
pub(crate) fn release_pending(
    aggregate: &CampaignAggregate,
    reason: FailureReason,
    now: DateTime<Utc>,
) -> Vec<CampaignEvent> {
    aggregate
        .ledger()
        .pending_transactions()
        .into_iter()
        .map(|transaction_id| fail_transaction(aggregate, transaction_id, reason, now))
        .collect()
}

/// `TicketsFailed` for the pending tickets of one transaction
pub(crate) fn fail_transaction(
    aggregate: &CampaignAggregate,
    transaction_id: TransactionId,
    reason: FailureReason,
    now: DateTime<Utc>,
) -> CampaignEvent {
    let numbers = aggregate
        .ledger()
        .transaction(transaction_id)
        .into_iter()
        .filter(|ticket| ticket.payment_status == PaymentStatus::Pending)
        .map(|ticket| ticket.number)
        .collect();
    CampaignEvent::TicketsFailed {
        campaign_id: aggregate.campaign().id,
        transaction_id,
        numbers,
        reason,
        failed_at: now,
    }
}
