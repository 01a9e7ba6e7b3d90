//! Raffle engine demo
//!
//! Runs one campaign end to end against in-memory infrastructure:
//! - campaign creation with a compliance profile
//! - concurrent reservations, one of which loses a contested number
//! - payment success and failure callbacks
//! - the draw, prize claim and draw verification
//! - compliance chain verification and the organizer summary
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --bin demo
//! ```

use anyhow::Context;
use chrono::Duration;
use metrics_exporter_prometheus::PrometheusBuilder;
use raffle_core::environment::{Clock, OsRandom, SystemClock};
use raffle_engine::{
    BuyerId, CampaignSpec, ComplianceProfile, ConfirmationOutcome, EngineConfig,
    EngineEnvironment, MockPaymentProcessor, Money, OrganizerId, PaymentMethod, PaymentOutcome,
    Prize, RaffleEngine, RaffleError, ReservationRequest, TransparencyPatch,
    metrics::register_metrics,
};
use raffle_testing::{InMemoryEventBus, InMemoryEventStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;
    register_metrics();

    println!("\n============================================");
    println!("   Raffle Engine - Live Demo");
    println!("============================================\n");

    let clock = Arc::new(SystemClock);
    let env = EngineEnvironment::new(
        clock.clone(),
        Arc::new(OsRandom),
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
        MockPaymentProcessor::shared(),
    );
    let engine = RaffleEngine::new(env, config)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let sweeper = engine.spawn_sweeper(shutdown_rx);

    // 1. Campaign
    let now = clock.now();
    let organizer = OrganizerId::new("parish-council");
    let campaign = engine
        .registry()
        .create_campaign(CampaignSpec {
            organizer_id: organizer.clone(),
            title: "Spring fundraiser".to_string(),
            prize: Prize {
                description: "Weekend for two".to_string(),
                value: Money::from_cents(50_000),
            },
            ticket_price: Money::from_cents(500),
            total_tickets: 50,
            start_date: now - Duration::minutes(1),
            end_date: now + Duration::days(7),
            max_tickets_per_user: Some(5),
            compliance: ComplianceProfile {
                jurisdiction: "ON".to_string(),
                license_number: Some("LIC-2041".to_string()),
            },
        })
        .await?;
    println!("1. Created campaign {} ({})", campaign.id, campaign.status);

    engine
        .compliance()
        .set_transparency(
            campaign.id,
            TransparencyPatch {
                witnesses: Some(vec!["auditor".to_string(), "notary".to_string()]),
                draw_method_documentation: Some(format!("{}: uniform index over paid tickets", OsRandom::METHOD)),
                ..TransparencyPatch::default()
            },
            organizer.as_str(),
        )
        .await?;

    // 2. Two buyers race for number 7
    let coordinator = engine.coordinator();
    let request = |buyer: &str, numbers: Vec<u32>| ReservationRequest {
        campaign_id: campaign.id,
        numbers,
        buyer_id: BuyerId::new(buyer),
        payment_method: PaymentMethod::Card {
            last_four: "4242".to_string(),
        },
    };
    let (alice, bob) = tokio::join!(
        coordinator.reserve(request("alice", vec![3, 7, 12])),
        coordinator.reserve(request("bob", vec![7, 8])),
    );
    let mut tokens = Vec::new();
    for (buyer, result) in [("alice", alice), ("bob", bob)] {
        match result {
            Ok(token) => {
                println!("2. {buyer} holds {:?} until {}", token.numbers, token.expires_at);
                tokens.push(token);
            }
            Err(RaffleError::NumbersHeld { numbers }) => {
                println!("2. {buyer} lost the race for {numbers:?}");
            }
            Err(error) => return Err(error.into()),
        }
    }
    let carol = coordinator.reserve(request("carol", vec![20, 21])).await?;
    let dave = coordinator.reserve(request("dave", vec![30])).await?;

    // 3. Payment callbacks
    for token in &tokens {
        coordinator
            .confirm_payment(token.transaction_id, PaymentOutcome::Succeeded)
            .await?;
    }
    coordinator
        .confirm_payment(carol.transaction_id, PaymentOutcome::Succeeded)
        .await?;
    let declined = coordinator
        .confirm_payment(
            dave.transaction_id,
            PaymentOutcome::Failed {
                reason: "insufficient funds".to_string(),
            },
        )
        .await?;
    if let ConfirmationOutcome::Resolved(confirmation) = declined {
        println!("3. dave's payment {} ({:?})", confirmation.status, confirmation.failure_reason);
    }
    let stats = engine.revenue().recompute_stats(campaign.id).await?;
    println!(
        "3. {} tickets paid by {} buyers, revenue {}",
        stats.completed_tickets, stats.unique_buyers, stats.total_revenue
    );

    // 4. Draw and claim
    let winner = engine.draws().draw_winner(campaign.id, organizer.as_str()).await?;
    println!(
        "4. Winning ticket #{} held by {} (method {}, {} eligible)",
        winner.ticket_number, winner.buyer_id, winner.draw_method, winner.eligible_count
    );
    let claimed = engine.draws().claim_prize(campaign.id, &winner.buyer_id).await?;
    println!("4. Prize claimed at {:?}", claimed.claimed_at);
    let verification = engine.draws().verify_draw(campaign.id).await?;
    println!("4. Draw verification passed: {}", verification.is_valid());

    // 5. Compliance and revenue
    let chain = engine.compliance().verify_history(campaign.id).await?;
    let score = engine.compliance().compute_transparency_score(campaign.id).await?;
    println!(
        "5. Audit trail: {} entries, intact: {}, transparency score {score}",
        chain.entries,
        chain.is_intact()
    );
    let summary = engine.revenue().organizer_summary(&organizer).await;
    println!(
        "5. {} has {} campaign(s), {} paid tickets, revenue {}",
        summary.organizer_id, summary.campaigns, summary.completed_tickets, summary.total_revenue
    );

    let _ = shutdown_tx.send(());
    sweeper.await?;

    println!("\n--- metrics ---\n{}", prometheus.render());
    Ok(())
}
