//! Compliance recorder: append-only, hash-chained audit trail per campaign.
//!
//! Each campaign has one [`ComplianceRecord`] holding regulatory metadata,
//! transparency features and its history. History entries are linked by
//! SHA-256 (`hash = H(sequence, previous_hash, action, actor, timestamp,
//! details)`), so any edit or truncation of a stored copy is detectable by
//! [`verify_chain`]. The recorder has no operation that modifies or removes an
//! entry.
//!
//! Records are event sourced like campaigns: every change is a
//! [`ComplianceEvent`] appended to the `compliance-<campaign>` stream before
//! the cached record is touched, so any engine over the same store replays
//! the same history.
//!
//! Audit status is independent of campaign status: a campaign may be drawn
//! while review is still pending.

use crate::error::{RaffleError, RaffleResult};
use crate::types::{CampaignId, ComplianceProfile, OrganizerId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;
use raffle_core::event::{Event, EventError, SerializedEvent};
use raffle_core::event_store::{EventStore, EventStoreError};
use raffle_core::stream::{StreamId, Version};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// `previous_hash` of the first entry in every chain
pub const GENESIS_HASH: &str = "genesis";

/// Points awarded per transparency feature
pub const TRANSPARENCY_FEATURE_POINTS: u8 = 25;

/// Regulatory review status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditStatus {
    /// Not yet reviewed
    Pending,
    /// Approved by the regulator
    Approved,
    /// Rejected by the regulator
    Rejected,
    /// Review in progress
    UnderReview,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::UnderReview => write!(f, "under_review"),
        }
    }
}

/// Evidence that the draw was conducted in the open.
///
/// URLs point into the external document store and are not validated here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparencyFeatures {
    /// Named witnesses of the draw
    pub witnesses: Vec<String>,
    /// Recording of the draw
    pub recording_url: Option<String>,
    /// Public announcement of the result
    pub public_announcement_url: Option<String>,
    /// Published description of the draw procedure
    pub draw_method_documentation: Option<String>,
}

/// Changes to [`TransparencyFeatures`]; `None` leaves a field as is
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparencyPatch {
    /// Replace the witness list
    pub witnesses: Option<Vec<String>>,
    /// Set the recording reference
    pub recording_url: Option<String>,
    /// Set the announcement reference
    pub public_announcement_url: Option<String>,
    /// Set the draw method documentation
    pub draw_method_documentation: Option<String>,
}

/// One immutable history entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, from 0
    pub sequence: u64,
    /// What happened (e.g. `"TicketsReserved"`)
    pub action: String,
    /// Who did it
    pub actor: String,
    /// When
    pub timestamp: DateTime<Utc>,
    /// Structured details
    pub details: serde_json::Value,
    /// Hash of the previous entry, or [`GENESIS_HASH`]
    pub previous_hash: String,
    /// Hash of this entry
    pub hash: String,
}

/// Regulatory record of one campaign
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    /// Campaign
    pub campaign_id: CampaignId,
    /// Organizer
    pub organizer_id: OrganizerId,
    /// Jurisdiction
    pub jurisdiction: String,
    /// License number
    pub license_number: Option<String>,
    /// Review status
    pub audit_status: AuditStatus,
    /// Reviewer notes from the last status change
    pub audit_notes: Option<String>,
    /// Transparency evidence
    pub transparency: TransparencyFeatures,
    /// Method the recorded draw used, once drawn
    pub draw_method: Option<String>,
    /// Append-only history
    pub history: Vec<AuditEntry>,
}

impl ComplianceRecord {
    /// Rebuild a record from its stream, which must open with
    /// [`ComplianceEvent::RecordOpened`]
    #[must_use]
    pub fn replay(events: &[ComplianceEvent]) -> Option<Self> {
        let (first, rest) = events.split_first()?;
        let ComplianceEvent::RecordOpened {
            campaign_id,
            organizer_id,
            profile,
            ..
        } = first
        else {
            return None;
        };
        let mut record = Self {
            campaign_id: *campaign_id,
            organizer_id: organizer_id.clone(),
            jurisdiction: profile.jurisdiction.clone(),
            license_number: profile.license_number.clone(),
            audit_status: AuditStatus::Pending,
            audit_notes: None,
            transparency: TransparencyFeatures::default(),
            draw_method: None,
            history: Vec::new(),
        };
        for event in rest {
            record.apply(event);
        }
        Some(record)
    }

    /// Apply one stored change
    pub fn apply(&mut self, event: &ComplianceEvent) {
        match event {
            ComplianceEvent::RecordOpened { .. } => return,
            ComplianceEvent::EntryAppended { .. } => {}
            ComplianceEvent::DrawRecorded { draw_method, .. } => {
                self.draw_method = Some(draw_method.clone());
            }
            ComplianceEvent::AuditStatusChanged { status, notes, .. } => {
                self.audit_status = *status;
                self.audit_notes.clone_from(notes);
            }
            ComplianceEvent::TransparencyUpdated { transparency, .. } => {
                self.transparency = transparency.clone();
            }
        }
        if let Some(entry) = event.entry() {
            self.history.push(entry.clone());
        }
    }

    /// The entry that would extend this record's chain
    #[must_use]
    pub fn next_entry(
        &self,
        action: &str,
        actor: &str,
        timestamp: DateTime<Utc>,
        details: serde_json::Value,
    ) -> AuditEntry {
        let sequence = self.history.len() as u64;
        let previous_hash = self
            .history
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |entry| entry.hash.clone());
        let hash = entry_hash(sequence, &previous_hash, action, actor, timestamp, &details);
        AuditEntry {
            sequence,
            action: action.to_string(),
            actor: actor.to_string(),
            timestamp,
            details,
            previous_hash,
            hash,
        }
    }
}

/// Stream holding one campaign's compliance record
#[must_use]
pub fn compliance_stream(campaign_id: CampaignId) -> StreamId {
    StreamId::new(format!("compliance-{campaign_id}"))
}

/// Changes to a [`ComplianceRecord`].
///
/// Entry details are free-form JSON, which bincode cannot decode, so these
/// events are stored as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceEvent {
    /// Record created alongside its campaign
    RecordOpened {
        /// Campaign
        campaign_id: CampaignId,
        /// Organizer
        organizer_id: OrganizerId,
        /// Regulatory metadata
        profile: ComplianceProfile,
        /// When
        opened_at: DateTime<Utc>,
    },
    /// A plain history entry
    EntryAppended {
        /// The entry
        entry: AuditEntry,
    },
    /// The draw's history entry, pinning the method it used
    DrawRecorded {
        /// Method identifier from the winner record
        draw_method: String,
        /// The entry
        entry: AuditEntry,
    },
    /// Regulatory review status changed
    AuditStatusChanged {
        /// New status
        status: AuditStatus,
        /// Reviewer notes
        notes: Option<String>,
        /// The entry
        entry: AuditEntry,
    },
    /// Transparency evidence changed
    TransparencyUpdated {
        /// Evidence after the change
        transparency: TransparencyFeatures,
        /// The entry
        entry: AuditEntry,
    },
}

impl ComplianceEvent {
    /// History entry carried by this event
    #[must_use]
    pub const fn entry(&self) -> Option<&AuditEntry> {
        match self {
            Self::RecordOpened { .. } => None,
            Self::EntryAppended { entry }
            | Self::DrawRecorded { entry, .. }
            | Self::AuditStatusChanged { entry, .. }
            | Self::TransparencyUpdated { entry, .. } => Some(entry),
        }
    }
}

impl Event for ComplianceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::RecordOpened { .. } => "ComplianceRecordOpened.v1",
            Self::EntryAppended { .. } => "ComplianceEntryAppended.v1",
            Self::DrawRecorded { .. } => "ComplianceDrawRecorded.v1",
            Self::AuditStatusChanged { .. } => "AuditStatusChanged.v1",
            Self::TransparencyUpdated { .. } => "TransparencyUpdated.v1",
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Result of re-walking a history chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainVerification {
    /// Entries checked
    pub entries: usize,
    /// First entry whose link or hash does not match
    pub broken_at: Option<usize>,
}

impl ChainVerification {
    /// Whether every link matched
    #[must_use]
    pub const fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

fn entry_hash(
    sequence: u64,
    previous_hash: &str,
    action: &str,
    actor: &str,
    timestamp: DateTime<Utc>,
    details: &serde_json::Value,
) -> String {
    let stamp = timestamp.to_rfc3339();
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    for part in [previous_hash, action, actor, stamp.as_str()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update(details.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Recompute a history chain and report the first broken link
#[must_use]
pub fn verify_chain(history: &[AuditEntry]) -> ChainVerification {
    let mut previous = GENESIS_HASH.to_string();
    for (index, entry) in history.iter().enumerate() {
        let expected = entry_hash(
            index as u64,
            &previous,
            &entry.action,
            &entry.actor,
            entry.timestamp,
            &entry.details,
        );
        if entry.sequence != index as u64 || entry.previous_hash != previous || entry.hash != expected
        {
            return ChainVerification {
                entries: history.len(),
                broken_at: Some(index),
            };
        }
        previous = expected;
    }
    ChainVerification {
        entries: history.len(),
        broken_at: None,
    }
}

/// Whether the published documentation names `draw_method`
#[must_use]
pub fn documents_method(features: &TransparencyFeatures, draw_method: &str) -> bool {
    features
        .draw_method_documentation
        .as_deref()
        .is_some_and(|documentation| documentation.contains(draw_method))
}

/// Transparency score in `0..=100`, 25 per feature present.
///
/// Once a draw is recorded, its documentation only counts if it names the
/// method the draw actually used.
#[must_use]
pub fn transparency_score(features: &TransparencyFeatures, draw_method: Option<&str>) -> u8 {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|s| !s.trim().is_empty());
    let has_witnesses = features.witnesses.iter().any(|w| !w.trim().is_empty());
    let documented = present(&features.draw_method_documentation)
        && draw_method.is_none_or(|method| documents_method(features, method));

    [
        has_witnesses,
        present(&features.recording_url),
        present(&features.public_announcement_url),
        documented,
    ]
    .into_iter()
    .filter(|&feature| feature)
    .map(|_| TRANSPARENCY_FEATURE_POINTS)
    .sum()
}

#[derive(Clone)]
struct Slot {
    record: ComplianceRecord,
    version: Version,
}

type SlotHandle = Arc<Mutex<Slot>>;

/// Keeps one compliance record per campaign, backed by its own stream.
///
/// Records are cached after first use. A cached record that fell behind its
/// stream is reloaded when an append conflicts.
pub struct ComplianceRecorder {
    clock: Arc<dyn Clock>,
    event_store: Arc<dyn EventStore>,
    records: RwLock<HashMap<CampaignId, SlotHandle>>,
}

impl ComplianceRecorder {
    /// Create a recorder over `event_store`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, event_store: Arc<dyn EventStore>) -> Self {
        Self {
            clock,
            event_store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Open the record for a campaign.
    ///
    /// A record already in the store is loaded as is, so reopening after a
    /// restart keeps the existing history.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the compliance stream cannot be read or written.
    pub async fn open(
        &self,
        campaign_id: CampaignId,
        organizer_id: OrganizerId,
        profile: ComplianceProfile,
    ) -> RaffleResult<ComplianceRecord> {
        if let Some(slot) = self.load(campaign_id).await? {
            let record = slot.record.clone();
            self.install(campaign_id, slot).await;
            return Ok(record);
        }

        let event = ComplianceEvent::RecordOpened {
            campaign_id,
            organizer_id,
            profile,
            opened_at: self.clock.now(),
        };
        let slot = match self.append(campaign_id, Version::INITIAL, &event).await {
            Ok(version) => Slot {
                record: ComplianceRecord::replay(std::slice::from_ref(&event))
                    .ok_or_else(|| Self::not_found(campaign_id))?,
                version,
            },
            // Opened by another engine in the meantime
            Err(EventStoreError::ConcurrencyConflict { .. }) => self
                .load(campaign_id)
                .await?
                .ok_or_else(|| Self::not_found(campaign_id))?,
            Err(error) => return Err(RaffleError::Storage(error.to_string())),
        };
        let record = slot.record.clone();
        self.install(campaign_id, slot).await;

        tracing::debug!(%campaign_id, "Compliance record opened");
        Ok(record)
    }

    /// Append an entry to a campaign's history
    ///
    /// # Errors
    ///
    /// - `NotFound` if the campaign has no compliance record
    /// - `ConcurrentWrite`, `Storage` if the entry could not be stored
    pub async fn record_audit(
        &self,
        campaign_id: CampaignId,
        action: &str,
        actor: &str,
        details: serde_json::Value,
    ) -> RaffleResult<AuditEntry> {
        let event = self
            .write(campaign_id, |record, now| ComplianceEvent::EntryAppended {
                entry: record.next_entry(action, actor, now, details.clone()),
            })
            .await?;
        Self::into_entry(event, campaign_id)
    }

    /// Append the draw's entry and pin the method the draw used
    ///
    /// # Errors
    ///
    /// Same as [`ComplianceRecorder::record_audit`].
    pub async fn record_draw(
        &self,
        campaign_id: CampaignId,
        draw_method: &str,
        actor: &str,
        details: serde_json::Value,
    ) -> RaffleResult<AuditEntry> {
        let event = self
            .write(campaign_id, |record, now| ComplianceEvent::DrawRecorded {
                draw_method: draw_method.to_string(),
                entry: record.next_entry("WinnerDrawn", actor, now, details.clone()),
            })
            .await?;
        Self::into_entry(event, campaign_id)
    }

    /// Change the regulatory review status
    ///
    /// # Errors
    ///
    /// Same as [`ComplianceRecorder::record_audit`].
    pub async fn set_audit_status(
        &self,
        campaign_id: CampaignId,
        status: AuditStatus,
        notes: Option<String>,
        actor: &str,
    ) -> RaffleResult<ComplianceRecord> {
        let record = self
            .write_and_snapshot(campaign_id, |record, now| {
                let details = serde_json::json!({
                    "from": record.audit_status.to_string(),
                    "to": status.to_string(),
                    "notes": notes,
                });
                ComplianceEvent::AuditStatusChanged {
                    status,
                    notes: notes.clone(),
                    entry: record.next_entry("AuditStatusChanged", actor, now, details),
                }
            })
            .await?;

        tracing::info!(%campaign_id, to = %status, "Audit status changed");
        Ok(record)
    }

    /// Update transparency evidence
    ///
    /// # Errors
    ///
    /// Same as [`ComplianceRecorder::record_audit`].
    pub async fn set_transparency(
        &self,
        campaign_id: CampaignId,
        patch: TransparencyPatch,
        actor: &str,
    ) -> RaffleResult<ComplianceRecord> {
        let details = serde_json::to_value(&patch).unwrap_or(serde_json::Value::Null);
        let record = self
            .write_and_snapshot(campaign_id, |record, now| {
                let mut transparency = record.transparency.clone();
                if let Some(witnesses) = &patch.witnesses {
                    transparency.witnesses.clone_from(witnesses);
                }
                if patch.recording_url.is_some() {
                    transparency.recording_url.clone_from(&patch.recording_url);
                }
                if patch.public_announcement_url.is_some() {
                    transparency
                        .public_announcement_url
                        .clone_from(&patch.public_announcement_url);
                }
                if patch.draw_method_documentation.is_some() {
                    transparency
                        .draw_method_documentation
                        .clone_from(&patch.draw_method_documentation);
                }
                ComplianceEvent::TransparencyUpdated {
                    transparency,
                    entry: record.next_entry("TransparencyUpdated", actor, now, details.clone()),
                }
            })
            .await?;
        Ok(record)
    }

    /// Transparency score of a campaign
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the campaign has no compliance record.
    pub async fn compute_transparency_score(&self, campaign_id: CampaignId) -> RaffleResult<u8> {
        let handle = self.slot(campaign_id).await?;
        let slot = handle.lock().await;
        Ok(transparency_score(
            &slot.record.transparency,
            slot.record.draw_method.as_deref(),
        ))
    }

    /// Snapshot of a campaign's record
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the campaign has no compliance record.
    pub async fn record(&self, campaign_id: CampaignId) -> RaffleResult<ComplianceRecord> {
        let handle = self.slot(campaign_id).await?;
        let record = handle.lock().await.record.clone();
        Ok(record)
    }

    /// Copy of a campaign's history
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the campaign has no compliance record.
    pub async fn history(&self, campaign_id: CampaignId) -> RaffleResult<Vec<AuditEntry>> {
        let handle = self.slot(campaign_id).await?;
        let history = handle.lock().await.record.history.clone();
        Ok(history)
    }

    /// Re-walk a campaign's stored hash chain
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the campaign has no compliance record.
    pub async fn verify_history(&self, campaign_id: CampaignId) -> RaffleResult<ChainVerification> {
        let handle = self.slot(campaign_id).await?;
        let verification = verify_chain(&handle.lock().await.record.history);
        Ok(verification)
    }

    /// Witnesses currently registered, empty if the record is missing
    pub async fn witnesses(&self, campaign_id: CampaignId) -> Vec<String> {
        match self.slot(campaign_id).await {
            Ok(handle) => handle.lock().await.record.transparency.witnesses.clone(),
            Err(_) => Vec::new(),
        }
    }

    async fn write_and_snapshot<F>(
        &self,
        campaign_id: CampaignId,
        build: F,
    ) -> RaffleResult<ComplianceRecord>
    where
        F: Fn(&ComplianceRecord, DateTime<Utc>) -> ComplianceEvent,
    {
        let handle = self.slot(campaign_id).await?;
        let mut slot = handle.lock().await;
        self.commit(campaign_id, &mut slot, build).await?;
        Ok(slot.record.clone())
    }

    /// Build an event from the current record, append it and apply it.
    ///
    /// On a version conflict the record is reloaded and the event rebuilt
    /// once, so a second engine's entries stay in the chain.
    async fn write<F>(&self, campaign_id: CampaignId, build: F) -> RaffleResult<ComplianceEvent>
    where
        F: Fn(&ComplianceRecord, DateTime<Utc>) -> ComplianceEvent,
    {
        let handle = self.slot(campaign_id).await?;
        let mut slot = handle.lock().await;
        self.commit(campaign_id, &mut slot, build).await
    }

    async fn commit<F>(
        &self,
        campaign_id: CampaignId,
        slot: &mut Slot,
        build: F,
    ) -> RaffleResult<ComplianceEvent>
    where
        F: Fn(&ComplianceRecord, DateTime<Utc>) -> ComplianceEvent,
    {
        let now = self.clock.now();
        let mut event = build(&slot.record, now);
        let version = match self.append(campaign_id, slot.version, &event).await {
            Ok(version) => version,
            Err(EventStoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                tracing::warn!(%campaign_id, %expected, %actual, "Compliance stream moved on, reloading");
                *slot = self
                    .load(campaign_id)
                    .await?
                    .ok_or_else(|| Self::not_found(campaign_id))?;
                event = build(&slot.record, now);
                self.append(campaign_id, slot.version, &event)
                    .await
                    .map_err(|error| Self::store_error(campaign_id, &error))?
            }
            Err(error) => return Err(Self::store_error(campaign_id, &error)),
        };
        slot.record.apply(&event);
        slot.version = version;

        if let Some(entry) = event.entry() {
            tracing::debug!(
                %campaign_id,
                sequence = entry.sequence,
                action = %entry.action,
                actor = %entry.actor,
                "Compliance entry appended"
            );
        }
        Ok(event)
    }

    async fn append(
        &self,
        campaign_id: CampaignId,
        expected: Version,
        event: &ComplianceEvent,
    ) -> Result<Version, EventStoreError> {
        let metadata = serde_json::json!({ "campaign_id": campaign_id.to_string() });
        let serialized = SerializedEvent::from_event(event, Some(metadata))
            .map_err(|error| EventStoreError::SerializationError(error.to_string()))?;
        self.event_store
            .append_events(compliance_stream(campaign_id), Some(expected), vec![serialized])
            .await
    }

    async fn load(&self, campaign_id: CampaignId) -> RaffleResult<Option<Slot>> {
        let stored = self
            .event_store
            .load_events(compliance_stream(campaign_id), None)
            .await
            .map_err(|error| RaffleError::Storage(error.to_string()))?;
        if stored.is_empty() {
            return Ok(None);
        }
        let events = stored
            .iter()
            .map(|serialized| ComplianceEvent::from_bytes(&serialized.data))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| RaffleError::Storage(error.to_string()))?;
        let record = ComplianceRecord::replay(&events).ok_or_else(|| {
            RaffleError::Storage(format!(
                "compliance stream of {campaign_id} does not open with a record"
            ))
        })?;
        Ok(Some(Slot {
            record,
            version: Version::new(events.len() as u64),
        }))
    }

    async fn install(&self, campaign_id: CampaignId, slot: Slot) -> SlotHandle {
        let handle = Arc::clone(
            self.records
                .write()
                .await
                .entry(campaign_id)
                .or_insert_with(|| Arc::new(Mutex::new(slot.clone()))),
        );
        *handle.lock().await = slot;
        handle
    }

    async fn slot(&self, campaign_id: CampaignId) -> RaffleResult<SlotHandle> {
        let cached = self.records.read().await.get(&campaign_id).cloned();
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let slot = self
            .load(campaign_id)
            .await?
            .ok_or_else(|| Self::not_found(campaign_id))?;
        Ok(self.install(campaign_id, slot).await)
    }

    fn into_entry(event: ComplianceEvent, campaign_id: CampaignId) -> RaffleResult<AuditEntry> {
        event
            .entry()
            .cloned()
            .ok_or_else(|| Self::not_found(campaign_id))
    }

    fn store_error(campaign_id: CampaignId, error: &EventStoreError) -> RaffleError {
        match error {
            EventStoreError::ConcurrencyConflict { .. } => RaffleError::ConcurrentWrite { campaign_id },
            other => RaffleError::Storage(other.to_string()),
        }
    }

    fn not_found(campaign_id: CampaignId) -> RaffleError {
        RaffleError::NotFound {
            entity: "compliance record",
            id: campaign_id.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use raffle_testing::{InMemoryEventStore, ManualClock, test_clock};

    fn recorder_over(store: &InMemoryEventStore) -> ComplianceRecorder {
        let clock = ManualClock::new(test_clock().now());
        ComplianceRecorder::new(Arc::new(clock), Arc::new(store.clone()))
    }

    async fn recorder_with_campaign() -> (ComplianceRecorder, CampaignId) {
        let recorder = recorder_over(&InMemoryEventStore::new());
        let campaign_id = CampaignId::new();
        recorder
            .open(
                campaign_id,
                OrganizerId::new("org-1"),
                ComplianceProfile {
                    jurisdiction: "KE".to_string(),
                    license_number: Some("BCLB-001".to_string()),
                },
            )
            .await
            .unwrap();
        (recorder, campaign_id)
    }

    #[tokio::test]
    async fn history_is_chained() {
        let (recorder, campaign_id) = recorder_with_campaign().await;

        let first = recorder
            .record_audit(campaign_id, "CampaignCreated", "org-1", serde_json::json!({}))
            .await
            .unwrap();
        let second = recorder
            .record_audit(campaign_id, "TicketsReserved", "buyer-1", serde_json::json!({"n": [1]}))
            .await
            .unwrap();

        assert_eq!(first.previous_hash, GENESIS_HASH);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(second.sequence, 1);
        assert!(recorder.verify_history(campaign_id).await.unwrap().is_intact());
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let (recorder, campaign_id) = recorder_with_campaign().await;
        for action in ["CampaignCreated", "TicketsReserved", "PaymentConfirmed"] {
            recorder
                .record_audit(campaign_id, action, "system", serde_json::json!({}))
                .await
                .unwrap();
        }

        let mut history = recorder.history(campaign_id).await.unwrap();
        history[1].actor = "someone-else".to_string();
        assert_eq!(verify_chain(&history).broken_at, Some(1));

        let mut truncated = recorder.history(campaign_id).await.unwrap();
        truncated.remove(0);
        assert_eq!(verify_chain(&truncated).broken_at, Some(0));
    }

    #[tokio::test]
    async fn score_counts_each_feature_once() {
        let (recorder, campaign_id) = recorder_with_campaign().await;
        assert_eq!(recorder.compute_transparency_score(campaign_id).await.unwrap(), 0);

        recorder
            .set_transparency(
                campaign_id,
                TransparencyPatch {
                    witnesses: Some(vec!["chief".to_string(), "notary".to_string()]),
                    recording_url: Some("https://media.example/draw.mp4".to_string()),
                    ..TransparencyPatch::default()
                },
                "org-1",
            )
            .await
            .unwrap();
        assert_eq!(recorder.compute_transparency_score(campaign_id).await.unwrap(), 50);

        recorder
            .set_transparency(
                campaign_id,
                TransparencyPatch {
                    public_announcement_url: Some("https://news.example/result".to_string()),
                    draw_method_documentation: Some("os-csprng-uniform-v1".to_string()),
                    ..TransparencyPatch::default()
                },
                "org-1",
            )
            .await
            .unwrap();
        assert_eq!(recorder.compute_transparency_score(campaign_id).await.unwrap(), 100);
        assert_eq!(recorder.history(campaign_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn documentation_must_name_the_recorded_method() {
        let (recorder, campaign_id) = recorder_with_campaign().await;
        recorder
            .set_transparency(
                campaign_id,
                TransparencyPatch {
                    draw_method_documentation: Some("os-csprng-uniform-v1, index mod n".to_string()),
                    ..TransparencyPatch::default()
                },
                "org-1",
            )
            .await
            .unwrap();
        assert_eq!(recorder.compute_transparency_score(campaign_id).await.unwrap(), 25);

        recorder
            .record_draw(campaign_id, "hand-picked", "org-1", serde_json::json!({}))
            .await
            .unwrap();
        let record = recorder.record(campaign_id).await.unwrap();
        assert_eq!(record.draw_method.as_deref(), Some("hand-picked"));
        assert_eq!(record.history.last().unwrap().action, "WinnerDrawn");
        assert!(!documents_method(&record.transparency, "hand-picked"));
        assert_eq!(recorder.compute_transparency_score(campaign_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn audit_status_is_recorded() {
        let (recorder, campaign_id) = recorder_with_campaign().await;

        let record = recorder
            .set_audit_status(
                campaign_id,
                AuditStatus::UnderReview,
                Some("awaiting regulator".to_string()),
                "regulator-7",
            )
            .await
            .unwrap();

        assert_eq!(record.audit_status, AuditStatus::UnderReview);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].action, "AuditStatusChanged");
        assert_eq!(record.history[0].details["from"], "pending");
    }

    #[tokio::test]
    async fn unknown_campaign_is_not_found() {
        let (recorder, _) = recorder_with_campaign().await;
        let result = recorder
            .record_audit(CampaignId::new(), "X", "y", serde_json::Value::Null)
            .await;
        assert!(matches!(result, Err(RaffleError::NotFound { .. })));
    }

    #[tokio::test]
    async fn second_recorder_replays_and_extends_the_chain() {
        let store = InMemoryEventStore::new();
        let first = recorder_over(&store);
        let campaign_id = CampaignId::new();
        let profile = ComplianceProfile {
            jurisdiction: "KE".to_string(),
            license_number: None,
        };
        first
            .open(campaign_id, OrganizerId::new("org-1"), profile.clone())
            .await
            .unwrap();
        first
            .record_audit(campaign_id, "CampaignCreated", "org-1", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        first
            .set_audit_status(campaign_id, AuditStatus::Approved, None, "regulator")
            .await
            .unwrap();

        let second = recorder_over(&store);
        let reopened = second
            .open(campaign_id, OrganizerId::new("org-1"), profile)
            .await
            .unwrap();
        assert_eq!(reopened.audit_status, AuditStatus::Approved);
        assert_eq!(reopened.history, first.history(campaign_id).await.unwrap());

        second
            .record_audit(campaign_id, "TicketsReserved", "buyer-1", serde_json::json!({}))
            .await
            .unwrap();
        // The first recorder's cache is now stale; its next append reloads.
        first
            .record_audit(campaign_id, "PaymentConfirmed", "payments", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(second.history(campaign_id).await.unwrap().len(), 3);
        let reloaded = recorder_over(&store);
        let history = reloaded.history(campaign_id).await.unwrap();
        let actions: Vec<&str> = history.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            ["CampaignCreated", "AuditStatusChanged", "TicketsReserved", "PaymentConfirmed"]
        );
        assert!(reloaded.verify_history(campaign_id).await.unwrap().is_intact());
        assert!(first.verify_history(campaign_id).await.unwrap().is_intact());
    }
}
