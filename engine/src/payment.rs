//! Payment processor seam.
//!
//! The engine never talks to a gateway protocol directly. It asks the
//! processor to start collecting money for a transaction it has already
//! minted; the processor later reports the result through
//! `ReservationCoordinator::confirm_payment`.

use crate::types::{BuyerId, CampaignId, Money, PaymentMethod, ReservationId, TransactionId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

/// Payment processor error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The processor declined to start the payment
    #[error("Payment declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },
    /// The processor could not be reached
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

/// Everything the processor needs to collect a reservation's amount
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Merchant reference for callbacks
    pub transaction_id: TransactionId,
    /// Reservation being paid
    pub reservation_id: ReservationId,
    /// Campaign
    pub campaign_id: CampaignId,
    /// Payer
    pub buyer_id: BuyerId,
    /// Amount to collect
    pub amount: Money,
    /// Payment method chosen by the buyer
    pub payment_method: PaymentMethod,
}

/// Payment processor trait
///
/// Returns `Pin<Box<dyn Future>>` so it can be held as `Arc<dyn PaymentProcessor>`.
pub trait PaymentProcessor: Send + Sync {
    /// Start collecting payment for a reservation.
    ///
    /// Success only means the processor accepted the request; the outcome
    /// arrives later through `confirm_payment`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the processor refuses the request.
    fn initiate_payment(
        &self,
        request: PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + '_>>;
}

/// Mock payment processor that records every request.
///
/// Accepts everything unless told to refuse. Tests drive the asynchronous
/// callback themselves via `confirm_payment`.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentProcessor {
    initiated: Arc<Mutex<Vec<PaymentRequest>>>,
    refusing: Arc<AtomicBool>,
}

impl MockPaymentProcessor {
    /// Creates a new mock processor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Refuse (or stop refusing) every subsequent request
    pub fn refuse_payments(&self, refuse: bool) {
        self.refusing.store(refuse, Ordering::SeqCst);
    }

    /// Requests received so far, oldest first
    pub async fn initiated(&self) -> Vec<PaymentRequest> {
        self.initiated.lock().await.clone()
    }
}

impl PaymentProcessor for MockPaymentProcessor {
    fn initiate_payment(
        &self,
        request: PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + '_>> {
        Box::pin(async move {
            if self.refusing.load(Ordering::SeqCst) {
                tracing::info!(
                    transaction_id = %request.transaction_id,
                    "Mock payment refused"
                );
                return Err(PaymentError::Declined {
                    reason: "mock processor refusing payments".to_string(),
                });
            }

            tracing::info!(
                transaction_id = %request.transaction_id,
                amount = request.amount.cents(),
                "Mock payment initiated"
            );
            self.initiated.lock().await.push(request);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            transaction_id: TransactionId::new(),
            reservation_id: ReservationId::new(),
            campaign_id: CampaignId::new(),
            buyer_id: BuyerId::new("buyer-1"),
            amount: Money::from_cents(1000),
            payment_method: PaymentMethod::Card {
                last_four: "4242".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn records_accepted_requests() {
        let processor = MockPaymentProcessor::new();
        let request = request();

        processor.initiate_payment(request.clone()).await.unwrap();

        assert_eq!(processor.initiated().await, vec![request]);
    }

    #[tokio::test]
    async fn refusal_records_nothing() {
        let processor = MockPaymentProcessor::new();
        processor.refuse_payments(true);

        let result = processor.initiate_payment(request()).await;

        assert!(matches!(result, Err(PaymentError::Declined { .. })));
        assert!(processor.initiated().await.is_empty());
    }
}
