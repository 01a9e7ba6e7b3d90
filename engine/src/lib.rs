//! Raffle Engine - ticket reservation, fair draw and compliance audit for
//! limited-inventory prize draws.
//!
//! Numbered tickets are sold per campaign. The engine guarantees that a number
//! is never held by two buyers at once, that unpaid holds expire and free
//! their numbers, that a campaign's winner is drawn exactly once from its paid
//! tickets with an injected cryptographically strong random source, and that
//! every state change lands in a tamper-evident compliance trail.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!   reserve ──────▶│ ReservationCoordinator│──── initiate ────▶ PaymentProcessor
//!   confirm ──────▶│                      │◀─── callback ─────
//!                  └──────────┬───────────┘
//!   draw/claim ──▶ DrawEngine │   RevenueAggregator
//!                       │     │          │
//!                       ▼     ▼          ▼
//!                  ┌──────────────────────┐
//!                  │   CampaignRegistry   │  one Mutex<CampaignAggregate>
//!                  │  (campaign + ledger) │  per campaign
//!                  └──────────┬───────────┘
//!                    append   │   publish + audit
//!                  ┌──────────┴──────┐   ┌───────────┐   ┌────────────────────┐
//!                  │   EventStore    │   │ EventBus  │   │ ComplianceRecorder │
//!                  └─────────────────┘   └───────────┘   └────────────────────┘
//! ```
//!
//! Each campaign is an independent unit of concurrency: its state lives behind
//! its own lock, and every change is appended to the campaign's event stream
//! at the expected version before it is applied in memory. Publication and
//! audit happen after the lock is released and never roll back a commit. The
//! compliance trail is event sourced too, on a `compliance-<campaign>` stream
//! in the same store.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = RaffleEngine::new(env, EngineConfig::from_env())?;
//! let campaign = engine.registry().create_campaign(spec).await?;
//! let token = engine.coordinator().reserve(request).await?;
//! engine
//!     .coordinator()
//!     .confirm_payment(token.transaction_id, PaymentOutcome::Succeeded)
//!     .await?;
//! let winner = engine.draws().draw_winner(campaign.id, "organizer").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod compliance;
pub mod config;
pub mod coordinator;
pub mod draw;
pub mod environment;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod payment;
pub mod registry;
pub mod revenue;
pub mod sweeper;
pub mod types;

pub use aggregate::CampaignAggregate;
pub use compliance::{
    AuditEntry, AuditStatus, ChainVerification, ComplianceEvent, ComplianceRecord,
    ComplianceRecorder, TransparencyFeatures, TransparencyPatch,
};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{ReservationCoordinator, SweepReport};
pub use draw::{CloseReport, DrawEngine, DrawVerification};
pub use environment::EngineEnvironment;
pub use error::{ErrorKind, RaffleError, RaffleResult};
pub use events::CampaignEvent;
pub use payment::{MockPaymentProcessor, PaymentError, PaymentProcessor, PaymentRequest};
pub use registry::CampaignRegistry;
pub use revenue::{OrganizerSummary, RevenueAggregator};
pub use sweeper::ExpirySweeper;
pub use types::*;

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// All engine components wired over one registry
pub struct RaffleEngine {
    registry: Arc<CampaignRegistry>,
    coordinator: Arc<ReservationCoordinator>,
    draws: Arc<DrawEngine>,
    compliance: Arc<ComplianceRecorder>,
    revenue: Arc<RevenueAggregator>,
}

impl RaffleEngine {
    /// Validate `config` and wire the engine components
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails validation.
    pub fn new(env: EngineEnvironment, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let compliance = Arc::new(ComplianceRecorder::new(
            Arc::clone(&env.clock),
            Arc::clone(&env.event_store),
        ));
        let registry = Arc::new(CampaignRegistry::new(env, config, Arc::clone(&compliance)));
        Ok(Self {
            coordinator: Arc::new(ReservationCoordinator::new(Arc::clone(&registry))),
            draws: Arc::new(DrawEngine::new(Arc::clone(&registry))),
            revenue: Arc::new(RevenueAggregator::new(Arc::clone(&registry))),
            compliance,
            registry,
        })
    }

    /// Campaign registry
    #[must_use]
    pub fn registry(&self) -> Arc<CampaignRegistry> {
        Arc::clone(&self.registry)
    }

    /// Reservation coordinator
    #[must_use]
    pub fn coordinator(&self) -> Arc<ReservationCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Draw engine
    #[must_use]
    pub fn draws(&self) -> Arc<DrawEngine> {
        Arc::clone(&self.draws)
    }

    /// Compliance recorder
    #[must_use]
    pub fn compliance(&self) -> Arc<ComplianceRecorder> {
        Arc::clone(&self.compliance)
    }

    /// Revenue aggregator
    #[must_use]
    pub fn revenue(&self) -> Arc<RevenueAggregator> {
        Arc::clone(&self.revenue)
    }

    /// Start the expiry sweeper at the configured interval
    #[must_use]
    pub fn spawn_sweeper(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        ExpirySweeper::spawn(
            Arc::clone(&self.coordinator),
            self.registry.config().sweep_interval(),
            shutdown,
        )
    }
}
