//! Shared harness for engine integration tests.

#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use chrono::{DateTime, Duration, Utc};
use raffle_core::environment::{Clock, RandomSource};
use raffle_engine::{
    BuyerId, Campaign, CampaignId, CampaignSpec, ComplianceProfile, ConfirmationOutcome,
    EngineConfig, EngineEnvironment, MockPaymentProcessor, Money, OrganizerId, PaymentMethod,
    PaymentOutcome, Prize, RaffleEngine, ReservationRequest, ReservationToken, TicketNumber,
};
use raffle_testing::{InMemoryEventBus, InMemoryEventStore, ManualClock, SeededRandom, test_clock};
use std::sync::Arc;

pub const ORGANIZER: &str = "org-harvest";
pub const TICKET_PRICE_CENTS: u64 = 500;

pub struct Harness {
    pub engine: RaffleEngine,
    pub clock: ManualClock,
    pub store: InMemoryEventStore,
    pub bus: InMemoryEventBus,
    pub payments: Arc<MockPaymentProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(SeededRandom::new(7)), EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with(Arc::new(SeededRandom::new(7)), config)
    }

    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        Self::with(random, EngineConfig::default())
    }

    pub fn with(random: Arc<dyn RandomSource>, config: EngineConfig) -> Self {
        let clock = ManualClock::new(test_clock().now());
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new();
        let payments = MockPaymentProcessor::shared();
        let env = environment(&clock, random, &store, &bus, payments.clone());
        Self {
            engine: RaffleEngine::new(env, config).expect("valid config"),
            clock,
            store,
            bus,
            payments,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn spec(&self, total_tickets: u32, max_tickets_per_user: Option<u32>) -> CampaignSpec {
        let now = self.now();
        CampaignSpec {
            organizer_id: OrganizerId::new(ORGANIZER),
            title: "Harvest festival raffle".to_string(),
            prize: Prize {
                description: "Hand-built bicycle".to_string(),
                value: Money::from_cents(40_000),
            },
            ticket_price: Money::from_cents(TICKET_PRICE_CENTS),
            total_tickets,
            start_date: now,
            end_date: now + Duration::days(14),
            max_tickets_per_user,
            compliance: ComplianceProfile {
                jurisdiction: "BC".to_string(),
                license_number: Some("GL-1187".to_string()),
            },
        }
    }

    /// Active campaign created now
    pub async fn campaign(&self, total_tickets: u32, max_tickets_per_user: Option<u32>) -> Campaign {
        self.engine
            .registry()
            .create_campaign(self.spec(total_tickets, max_tickets_per_user))
            .await
            .expect("campaign is created")
    }

    pub async fn reserve(
        &self,
        campaign_id: CampaignId,
        buyer: &str,
        numbers: &[TicketNumber],
    ) -> raffle_engine::RaffleResult<ReservationToken> {
        self.engine
            .coordinator()
            .reserve(request(campaign_id, buyer, numbers))
            .await
    }

    pub async fn confirm(&self, token: &ReservationToken, outcome: PaymentOutcome) -> ConfirmationOutcome {
        self.engine
            .coordinator()
            .confirm_payment(token.transaction_id, outcome)
            .await
            .expect("confirmation is applied")
    }

    /// Reserve and pay in one step
    pub async fn buy(
        &self,
        campaign_id: CampaignId,
        buyer: &str,
        numbers: &[TicketNumber],
    ) -> ReservationToken {
        let token = self
            .reserve(campaign_id, buyer, numbers)
            .await
            .expect("numbers are free");
        self.confirm(&token, PaymentOutcome::Succeeded).await;
        token
    }
}

pub fn environment(
    clock: &ManualClock,
    random: Arc<dyn RandomSource>,
    store: &InMemoryEventStore,
    bus: &InMemoryEventBus,
    payments: Arc<MockPaymentProcessor>,
) -> EngineEnvironment {
    EngineEnvironment::new(
        Arc::new(clock.clone()),
        random,
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        payments,
    )
}

/// A second engine sharing the harness's store and clock, as another process would
pub fn peer_engine(h: &Harness) -> RaffleEngine {
    let env = environment(
        &h.clock,
        Arc::new(SeededRandom::new(11)),
        &h.store,
        &InMemoryEventBus::new(),
        MockPaymentProcessor::shared(),
    );
    RaffleEngine::new(env, EngineConfig::default()).expect("valid config")
}

pub fn request(campaign_id: CampaignId, buyer: &str, numbers: &[TicketNumber]) -> ReservationRequest {
    ReservationRequest {
        campaign_id,
        numbers: numbers.to_vec(),
        buyer_id: BuyerId::new(buyer),
        payment_method: PaymentMethod::Card {
            last_four: "4242".to_string(),
        },
    }
}
