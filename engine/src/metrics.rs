//! Business metrics for the raffle engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `raffle_reservations_total{status}` - reserve attempts by outcome (reserved, conflict, rejected)
//! - `raffle_payments_total{outcome}` - payment callbacks by outcome
//! - `raffle_revenue_cents_total` - revenue from completed tickets in cents
//! - `raffle_conflicts_total{source}` - contested numbers and lost write races
//! - `raffle_draws_total{outcome}` - draw attempts by outcome
//! - `raffle_expired_tickets_total` - tickets failed by the expiry sweep
//! - `raffle_dispatch_failures_total{topic}` - event bus publish failures
//!
//! ## Histograms
//! - `raffle_sweep_duration_seconds` - duration of one expiry sweep

use metrics::{describe_counter, describe_histogram};

/// Register descriptions for every engine metric.
///
/// Call once at startup, after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "raffle_reservations_total",
        "Reservation attempts by status (reserved, conflict, rejected)"
    );
    describe_counter!(
        "raffle_payments_total",
        "Payment callbacks by outcome (completed, failed, late, replayed, unknown)"
    );
    describe_counter!(
        "raffle_revenue_cents_total",
        "Revenue from completed tickets in cents"
    );
    describe_counter!(
        "raffle_conflicts_total",
        "Conflicts by source (numbers_held, concurrent_write)"
    );
    describe_counter!(
        "raffle_draws_total",
        "Draw attempts by outcome (drawn, already_drawn, rejected)"
    );
    describe_counter!(
        "raffle_expired_tickets_total",
        "Tickets failed by the expiry sweep"
    );
    describe_counter!(
        "raffle_dispatch_failures_total",
        "Event bus publish failures by topic"
    );
    describe_histogram!(
        "raffle_sweep_duration_seconds",
        "Time taken by one expiry sweep"
    );

    tracing::info!("Raffle metrics registered");
}

/// Record a reservation attempt.
pub fn record_reservation(status: &'static str) {
    metrics::counter!("raffle_reservations_total", "status" => status).increment(1);
}

/// Record a payment callback.
pub fn record_payment(outcome: &'static str) {
    metrics::counter!("raffle_payments_total", "outcome" => outcome).increment(1);
}

/// Record collected revenue.
pub fn record_revenue(amount_cents: u64) {
    metrics::counter!("raffle_revenue_cents_total").increment(amount_cents);
}

/// Record a conflict.
pub fn record_conflict(source: &'static str) {
    metrics::counter!("raffle_conflicts_total", "source" => source).increment(1);
}

/// Record a draw attempt.
pub fn record_draw(outcome: &'static str) {
    metrics::counter!("raffle_draws_total", "outcome" => outcome).increment(1);
}

/// Record tickets failed by the sweep and how long it took.
pub fn record_sweep(expired_tickets: u64, duration_secs: f64) {
    metrics::counter!("raffle_expired_tickets_total").increment(expired_tickets);
    metrics::histogram!("raffle_sweep_duration_seconds").record(duration_secs);
    tracing::debug!(expired_tickets, duration_secs, "Recorded sweep metrics");
}

/// Record a failed publish.
pub fn record_dispatch_failure(topic: &'static str) {
    metrics::counter!("raffle_dispatch_failures_total", "topic" => topic).increment(1);
}
