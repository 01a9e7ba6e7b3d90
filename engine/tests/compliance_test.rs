//! Compliance trail and revenue reporting across a campaign's life.
//!
//! Run with: `cargo test --test compliance_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, ORGANIZER};
use raffle_engine::compliance::verify_chain;
use raffle_engine::{AuditStatus, CampaignStatus, Money, OrganizerId, TransparencyPatch};
use raffle_testing::{ScriptedRandom, SeededRandom};
use std::sync::Arc;

#[tokio::test]
async fn every_state_change_is_chained_in_history() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    let token = h.buy(campaign.id, "ana", &[4]).await;
    h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    h.engine
        .draws()
        .claim_prize(campaign.id, &raffle_engine::BuyerId::new("ana"))
        .await
        .unwrap();

    let history = h.engine.compliance().history(campaign.id).await.unwrap();
    let actions: Vec<&str> = history.iter().map(|e| e.action.as_str()).collect();
    for expected in [
        "CampaignCreated",
        "TicketsReserved",
        "PaymentConfirmed",
        "StatsRecomputed",
        "WinnerDrawn",
        "PrizeClaimed",
    ] {
        assert!(actions.contains(&expected), "missing {expected} in {actions:?}");
    }
    assert_eq!(actions.first(), Some(&"CampaignCreated"));
    assert_eq!(actions.last(), Some(&"PrizeClaimed"));

    let reserved = history.iter().find(|e| e.action == "TicketsReserved").unwrap();
    assert_eq!(reserved.actor, "ana");
    let confirmed = history.iter().find(|e| e.action == "PaymentConfirmed").unwrap();
    assert_eq!(confirmed.actor, "payment-processor");
    assert!(confirmed.details.to_string().contains(&token.transaction_id.to_string()));

    let verification = h.engine.compliance().verify_history(campaign.id).await.unwrap();
    assert!(verification.is_intact());
    assert_eq!(verification.entries, history.len());
    for (index, entry) in history.iter().enumerate() {
        assert_eq!(entry.sequence, index as u64);
    }
}

#[tokio::test]
async fn tampered_copy_is_detected() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    h.buy(campaign.id, "ana", &[1]).await;
    h.buy(campaign.id, "ben", &[2]).await;

    let mut history = h.engine.compliance().history(campaign.id).await.unwrap();
    history[2].actor = "someone-else".to_string();
    assert_eq!(verify_chain(&history).broken_at, Some(2));

    let mut truncated = h.engine.compliance().history(campaign.id).await.unwrap();
    truncated.remove(1);
    assert_eq!(verify_chain(&truncated).broken_at, Some(1));

    assert!(h.engine.compliance().verify_history(campaign.id).await.unwrap().is_intact());
}

#[tokio::test]
async fn transparency_score_and_witnesses_reach_the_draw() {
    let h = Harness::with_random(Arc::new(ScriptedRandom::always(1)));
    let campaign = h.campaign(10, None).await;
    let compliance = h.engine.compliance();
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 0);

    compliance
        .set_transparency(
            campaign.id,
            TransparencyPatch {
                witnesses: Some(vec!["notary".to_string(), "council clerk".to_string()]),
                recording_url: Some("https://media.example/draw.mp4".to_string()),
                ..TransparencyPatch::default()
            },
            ORGANIZER,
        )
        .await
        .unwrap();
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 50);

    compliance
        .set_transparency(
            campaign.id,
            TransparencyPatch {
                public_announcement_url: Some("https://news.example/winner".to_string()),
                draw_method_documentation: Some("index drawn uniformly".to_string()),
                ..TransparencyPatch::default()
            },
            ORGANIZER,
        )
        .await
        .unwrap();
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 100);

    h.buy(campaign.id, "ana", &[3]).await;
    h.buy(campaign.id, "ben", &[8]).await;
    let winner = h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    assert_eq!(winner.ticket_number, 8);
    assert_eq!(winner.witnesses, vec!["notary", "council clerk"]);
    assert_eq!(winner.draw_method, ScriptedRandom::METHOD);
}

#[tokio::test]
async fn draw_method_must_match_published_documentation() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    h.buy(campaign.id, "ana", &[2]).await;
    let compliance = h.engine.compliance();
    compliance
        .set_transparency(
            campaign.id,
            TransparencyPatch {
                draw_method_documentation: Some("os-csprng-uniform-v1 over paid tickets".to_string()),
                ..TransparencyPatch::default()
            },
            ORGANIZER,
        )
        .await
        .unwrap();
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 25);

    let winner = h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    assert_eq!(winner.draw_method, SeededRandom::METHOD);
    let record = compliance.record(campaign.id).await.unwrap();
    assert_eq!(record.draw_method.as_deref(), Some(SeededRandom::METHOD));

    let verification = h.engine.draws().verify_draw(campaign.id).await.unwrap();
    assert!(verification.digest_matches && verification.owner_matches);
    assert_eq!(verification.method_documented, Some(false));
    assert!(!verification.is_valid());
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 0);

    compliance
        .set_transparency(
            campaign.id,
            TransparencyPatch {
                draw_method_documentation: Some(format!("{} over paid tickets", SeededRandom::METHOD)),
                ..TransparencyPatch::default()
            },
            ORGANIZER,
        )
        .await
        .unwrap();
    let verification = h.engine.draws().verify_draw(campaign.id).await.unwrap();
    assert_eq!(verification.method_documented, Some(true));
    assert!(verification.is_valid());
    assert_eq!(compliance.compute_transparency_score(campaign.id).await.unwrap(), 25);
}

#[tokio::test]
async fn audit_status_is_independent_of_campaign_status() {
    let h = Harness::new();
    let campaign = h.campaign(10, None).await;
    h.buy(campaign.id, "ana", &[5]).await;

    let compliance = h.engine.compliance();
    let record = compliance
        .set_audit_status(
            campaign.id,
            AuditStatus::UnderReview,
            Some("license renewal pending".to_string()),
            "regulator",
        )
        .await
        .unwrap();
    assert_eq!(record.audit_status, AuditStatus::UnderReview);
    assert_eq!(record.jurisdiction, "BC");
    assert_eq!(record.license_number.as_deref(), Some("GL-1187"));

    h.engine.draws().draw_winner(campaign.id, ORGANIZER).await.unwrap();
    let campaign_now = h.engine.registry().get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign_now.status, CampaignStatus::Drawn);
    let record = compliance.record(campaign.id).await.unwrap();
    assert_eq!(record.audit_status, AuditStatus::UnderReview);
    assert!(record.history.iter().any(|e| e.action == "AuditStatusChanged"));
}

#[tokio::test]
async fn organizer_summary_totals_campaigns() {
    let h = Harness::new();
    let first = h.campaign(10, None).await;
    let second = h.campaign(20, None).await;
    h.buy(first.id, "ana", &[1, 2]).await;
    h.buy(second.id, "ana", &[5]).await;
    h.buy(second.id, "ben", &[6]).await;
    h.reserve(second.id, "cy", &[7]).await.unwrap();
    h.engine.registry().cancel_campaign(first.id, ORGANIZER).await.unwrap();

    let summary = h
        .engine
        .revenue()
        .organizer_summary(&OrganizerId::new(ORGANIZER))
        .await;
    assert_eq!(summary.campaigns, 2);
    assert_eq!(summary.active_campaigns, 1);
    assert_eq!(summary.completed_tickets, 4);
    assert_eq!(summary.total_revenue, Money::from_cents(2000));
    assert_eq!(summary.unique_buyers, 2);

    let stats = h.engine.revenue().recompute_stats(second.id).await.unwrap();
    assert_eq!(stats.pending_tickets, 1);
    assert_eq!(stats.completed_tickets, 2);
    assert_eq!(stats.sell_through_basis_points, 1000);
}
