//! End-to-end campaign scenarios.
//!
//! Run with: `cargo test --test scenario_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{Harness, ORGANIZER};
use raffle_core::environment::Clock;
use raffle_engine::{
    BuyerId, CampaignStatus, CloseReport, ConfigError, EngineConfig, ErrorKind, FailureReason,
    MockPaymentProcessor, Money, PaymentOutcome, PaymentStatus, RaffleEngine, RaffleError,
};
use raffle_testing::{InMemoryEventBus, InMemoryEventStore, ManualClock, SeededRandom, test_clock};
use std::sync::Arc;

/// Zero TTL or sweep interval never reaches a running engine.
#[test]
fn engine_rejects_invalid_config() {
    let clock = ManualClock::new(test_clock().now());
    let build = |config: EngineConfig| {
        let env = common::environment(
            &clock,
            Arc::new(SeededRandom::new(7)),
            &InMemoryEventStore::new(),
            &InMemoryEventBus::new(),
            MockPaymentProcessor::shared(),
        );
        RaffleEngine::new(env, config)
    };

    let zero_ttl = build(EngineConfig {
        reservation_ttl_secs: 0,
        ..EngineConfig::default()
    });
    assert!(matches!(
        zero_ttl,
        Err(ConfigError::Invalid { field: "reservation_ttl_secs", .. })
    ));

    let zero_sweep = build(EngineConfig {
        sweep_interval_secs: 0,
        ..EngineConfig::default()
    });
    assert!(matches!(
        zero_sweep,
        Err(ConfigError::Invalid { field: "sweep_interval_secs", .. })
    ));

    assert!(build(EngineConfig::default()).is_ok());
}

/// Scenario A: three completed tickets at 5.00 give 15.00 revenue.
#[tokio::test]
async fn completed_tickets_drive_revenue() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    h.buy(campaign.id, "ana", &[1]).await;
    h.buy(campaign.id, "ben", &[4]).await;
    h.buy(campaign.id, "ana", &[7]).await;

    let stats = h.engine.revenue().recompute_stats(campaign.id).await.unwrap();
    assert_eq!(stats.total_revenue, Money::from_cents(1500));
    assert_eq!(stats.total_revenue.to_string(), "15.00");
    assert!(stats.unique_buyers <= 3);
    assert_eq!(stats.unique_buyers, 2);
    assert_eq!(stats.completed_tickets, 3);
    assert_eq!(stats.sell_through_basis_points, 3000);

    let campaign = h.engine.registry().get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.sold_tickets, 3);
    assert_eq!(campaign.stats, stats);
}

/// Scenario B: Y's overlapping request names the contested number; the retry
/// without it succeeds.
#[tokio::test]
async fn conflict_names_contested_number_and_retry_succeeds() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;

    let x = h.reserve(campaign.id, "buyer-x", &[2, 3]).await.unwrap();
    assert_eq!(x.numbers, vec![2, 3]);
    assert_eq!(x.amount_due, Money::from_cents(1000));

    let conflict = h.reserve(campaign.id, "buyer-y", &[3, 9]).await.unwrap_err();
    assert_eq!(conflict.kind(), ErrorKind::Conflict);
    assert!(matches!(&conflict, RaffleError::NumbersHeld { numbers } if numbers == &vec![3]));
    assert!(conflict.to_string().contains('3'));

    let retry = h.reserve(campaign.id, "buyer-y", &[9]).await.unwrap();
    assert_eq!(retry.numbers, vec![9]);

    let available: Vec<u32> = h
        .engine
        .coordinator()
        .available_numbers(campaign.id)
        .await
        .unwrap()
        .collect();
    assert_eq!(available, vec![1, 4, 5, 6, 7, 8, 10]);
}

/// Scenario C: no completed tickets, no draw, status untouched.
#[tokio::test]
async fn draw_without_completed_tickets_changes_nothing() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    h.reserve(campaign.id, "ana", &[5]).await.unwrap();

    let result = h.engine.draws().draw_winner(campaign.id, ORGANIZER).await;
    assert!(matches!(result, Err(RaffleError::NoEligibleTickets { .. })));

    let after = h.engine.registry().get_campaign(campaign.id).await.unwrap();
    assert_eq!(after.status, CampaignStatus::Active);
    assert!(after.winner.is_none());
    let tickets = h
        .engine
        .coordinator()
        .tickets_for_buyer(campaign.id, &BuyerId::new("ana"))
        .await
        .unwrap();
    assert_eq!(tickets[0].payment_status, PaymentStatus::Pending);
}

/// Scenario D: cancelling a drawn campaign fails; cancelling an active one
/// surfaces the completed tickets for refund.
#[tokio::test]
async fn cancellation_refunds_completed_tickets_and_respects_terminal_states() {
    let h = Harness::new();

    let drawn = h.campaign(10, None).await;
    h.buy(drawn.id, "ana", &[1]).await;
    h.engine.draws().draw_winner(drawn.id, ORGANIZER).await.unwrap();
    let refused = h.engine.registry().cancel_campaign(drawn.id, ORGANIZER).await;
    assert!(matches!(
        refused,
        Err(RaffleError::InvalidState {
            status: CampaignStatus::Drawn,
            ..
        })
    ));

    let active = h.campaign(10, None).await;
    h.buy(active.id, "ana", &[2]).await;
    h.buy(active.id, "ben", &[6]).await;
    h.reserve(active.id, "cy", &[8]).await.unwrap();

    let outcome = h.engine.registry().cancel_campaign(active.id, ORGANIZER).await.unwrap();
    assert_eq!(outcome.campaign.status, CampaignStatus::Cancelled);
    let mut refunded: Vec<u32> = outcome.refunds.iter().map(|t| t.number).collect();
    refunded.sort_unstable();
    assert_eq!(refunded, vec![2, 6]);
    assert_eq!(outcome.released, vec![8]);

    let held = h
        .engine
        .coordinator()
        .tickets_for_buyer(active.id, &BuyerId::new("cy"))
        .await
        .unwrap();
    assert_eq!(held[0].failure_reason, Some(FailureReason::CampaignCancelled));

    let draw = h.engine.draws().draw_winner(active.id, ORGANIZER).await;
    assert!(matches!(draw, Err(RaffleError::InvalidState { .. })));
    let again = h.engine.registry().cancel_campaign(active.id, ORGANIZER).await;
    assert!(matches!(again, Err(RaffleError::InvalidState { .. })));
}

/// Round trip: create, reserve, pay, draw, claim.
#[tokio::test]
async fn round_trip_ends_with_one_claimed_winner() {
    let h = Harness::new();
    let campaign = h.campaign(10, Some(4)).await;

    let token = h.reserve(campaign.id, "ana", &[3, 4]).await.unwrap();
    let initiated = h.payments.initiated().await;
    assert_eq!(initiated.len(), 1);
    assert_eq!(initiated[0].transaction_id, token.transaction_id);
    assert_eq!(initiated[0].amount, Money::from_cents(1000));

    h.confirm(&token, PaymentOutcome::Succeeded).await;

    let winner = h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    assert!(winner.ticket_number == 3 || winner.ticket_number == 4);
    assert_eq!(winner.buyer_id, BuyerId::new("ana"));
    assert_eq!(winner.eligible_count, 2);
    assert_eq!(winner.draw_method, "seeded-test-v1");

    let not_winner = h.engine.draws().claim_prize(campaign.id, &BuyerId::new("ben")).await;
    assert!(matches!(not_winner, Err(RaffleError::NotWinner { .. })));

    let claimed = h
        .engine
        .draws()
        .claim_prize(campaign.id, &BuyerId::new("ana"))
        .await
        .unwrap();
    assert!(claimed.claimed);
    assert_eq!(claimed.claimed_at, Some(h.now()));

    let twice = h
        .engine
        .draws()
        .claim_prize(campaign.id, &BuyerId::new("ana"))
        .await;
    assert!(matches!(twice, Err(RaffleError::PrizeAlreadyClaimed { .. })));

    let campaign = h.engine.registry().get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Drawn);
    assert_eq!(campaign.sold_tickets, 2);
    let record = campaign.winner.unwrap();
    assert!(record.claimed);
    assert_eq!(record.ticket_number, winner.ticket_number);

    assert!(h.engine.draws().verify_draw(campaign.id).await.unwrap().is_valid());
    assert_eq!(
        h.engine.draws().get_winner(campaign.id).await.unwrap(),
        Some(record)
    );
}

/// The last paid number flips the campaign to sold out, which a draw accepts.
#[tokio::test]
async fn last_completed_number_sells_out_campaign() {
    let h = Harness::new();
    let campaign = h.campaign(3, None).await;
    h.buy(campaign.id, "ana", &[1, 2]).await;
    assert_eq!(
        h.engine.registry().get_campaign(campaign.id).await.unwrap().status,
        CampaignStatus::Active
    );

    h.buy(campaign.id, "ben", &[3]).await;
    let sold_out = h.engine.registry().get_campaign(campaign.id).await.unwrap();
    assert_eq!(sold_out.status, CampaignStatus::SoldOut);
    assert_eq!(sold_out.sold_tickets, 3);

    let blocked = h.reserve(campaign.id, "cy", &[1]).await;
    assert!(matches!(
        blocked,
        Err(RaffleError::InvalidState {
            status: CampaignStatus::SoldOut,
            ..
        })
    ));

    let winner = h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    assert!((1..=3).contains(&winner.ticket_number));
}

/// The scheduled auto-close draws campaigns past their end date and leaves
/// unsold or still-running campaigns alone.
#[tokio::test]
async fn auto_close_draws_only_campaigns_past_end_date() {
    let h = Harness::new();
    let sold = h.campaign(10, None).await;
    let unsold = h.campaign(10, None).await;
    let mut later_spec = h.spec(10, None);
    later_spec.end_date = h.now() + Duration::days(30);
    let later = h.engine.registry().create_campaign(later_spec).await.unwrap();
    h.buy(sold.id, "ana", &[5]).await;
    h.buy(later.id, "ben", &[6]).await;

    h.clock.advance(Duration::days(15));
    let report = h.engine.draws().close_expired_campaigns().await;
    assert_eq!(
        report,
        CloseReport {
            drawn: 1,
            without_tickets: 1,
            failed: 0,
        }
    );

    let winner = h.engine.draws().get_winner(sold.id).await.unwrap().unwrap();
    assert_eq!(winner.ticket_number, 5);
    assert_eq!(
        h.engine.registry().get_campaign(unsold.id).await.unwrap().status,
        CampaignStatus::Active
    );
    assert!(h.engine.draws().get_winner(later.id).await.unwrap().is_none());

    let second = h.engine.draws().close_expired_campaigns().await;
    assert_eq!(second.drawn, 0);
    assert_eq!(second.without_tickets, 1);
}
