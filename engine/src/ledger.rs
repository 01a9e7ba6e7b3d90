//! Ticket ledger: the append-only record of who holds which number.
//!
//! A number is *held* while a ticket for it is pending or completed. At most
//! one held ticket exists per number; a number becomes reservable again only
//! after its ticket fails. Tickets are never removed.

use crate::types::{
    BuyerId, CampaignId, FailureReason, PaymentMethod, PaymentStatus, ReservationId, Ticket,
    TicketNumber, TransactionId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

/// New tickets for one reservation
#[derive(Clone, Debug)]
pub struct NewReservation<'a> {
    /// Campaign
    pub campaign_id: CampaignId,
    /// Reservation
    pub reservation_id: ReservationId,
    /// Transaction
    pub transaction_id: TransactionId,
    /// Buyer
    pub buyer_id: &'a BuyerId,
    /// Numbers to hold
    pub numbers: &'a [TicketNumber],
    /// Payment method
    pub payment_method: &'a PaymentMethod,
    /// Reservation time
    pub reserved_at: DateTime<Utc>,
    /// Hold expiry
    pub expires_at: DateTime<Utc>,
}

/// Per-campaign ticket ledger
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketLedger {
    total: u32,
    tickets: Vec<Ticket>,
    /// number -> index of its pending or completed ticket
    held: HashMap<TicketNumber, usize>,
    by_transaction: HashMap<TransactionId, Vec<usize>>,
}

impl TicketLedger {
    /// Empty ledger for numbers `1..=total`
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Inventory size
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Resize inventory (only valid before any ticket exists)
    pub(crate) const fn set_total(&mut self, total: u32) {
        self.total = total;
    }

    /// Every ticket ever created, in creation order
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Whether `number` is inside `1..=total`
    #[must_use]
    pub fn in_range(&self, number: TicketNumber) -> bool {
        (1..=self.total).contains(&number)
    }

    /// The pending or completed ticket for `number`
    #[must_use]
    pub fn holder(&self, number: TicketNumber) -> Option<&Ticket> {
        self.held.get(&number).map(|&index| &self.tickets[index])
    }

    /// Numbers among `numbers` that another ticket blocks at `now`, ascending.
    ///
    /// Pending tickets past their expiry do not block.
    #[must_use]
    pub fn conflicts(&self, numbers: &[TicketNumber], now: DateTime<Utc>) -> Vec<TicketNumber> {
        let contested: BTreeSet<TicketNumber> = numbers
            .iter()
            .copied()
            .filter(|number| {
                self.holder(*number)
                    .is_some_and(|ticket| ticket.blocks_number(now))
            })
            .collect();
        contested.into_iter().collect()
    }

    /// Transactions holding any of `numbers` with an expired pending hold
    #[must_use]
    pub fn expired_holders(
        &self,
        numbers: &[TicketNumber],
        now: DateTime<Utc>,
    ) -> Vec<TransactionId> {
        let mut seen = HashSet::new();
        let mut sorted = numbers.to_vec();
        sorted.sort_unstable();
        sorted
            .into_iter()
            .filter_map(|number| self.holder(number))
            .filter(|ticket| ticket.is_expired_hold(now))
            .map(|ticket| ticket.transaction_id)
            .filter(|transaction_id| seen.insert(*transaction_id))
            .collect()
    }

    /// Transactions whose pending hold has expired at `now`, oldest first
    #[must_use]
    pub fn expired_transactions(&self, now: DateTime<Utc>) -> Vec<TransactionId> {
        self.pending_transactions_where(|ticket| ticket.is_expired_hold(now))
    }

    /// Every transaction with pending tickets, oldest first
    #[must_use]
    pub fn pending_transactions(&self) -> Vec<TransactionId> {
        self.pending_transactions_where(|_| true)
    }

    fn pending_transactions_where(&self, predicate: impl Fn(&Ticket) -> bool) -> Vec<TransactionId> {
        let mut seen = HashSet::new();
        self.tickets
            .iter()
            .filter(|ticket| ticket.payment_status == PaymentStatus::Pending && predicate(ticket))
            .map(|ticket| ticket.transaction_id)
            .filter(|transaction_id| seen.insert(*transaction_id))
            .collect()
    }

    /// Tickets belonging to a transaction
    #[must_use]
    pub fn transaction(&self, transaction_id: TransactionId) -> Vec<&Ticket> {
        self.by_transaction
            .get(&transaction_id)
            .map(|indices| indices.iter().map(|&index| &self.tickets[index]).collect())
            .unwrap_or_default()
    }

    /// Tickets held or once held by a buyer
    #[must_use]
    pub fn for_buyer(&self, buyer_id: &BuyerId) -> Vec<&Ticket> {
        self.tickets
            .iter()
            .filter(|ticket| &ticket.buyer_id == buyer_id)
            .collect()
    }

    /// Tickets a buyer currently blocks (completed or unexpired pending)
    #[must_use]
    pub fn live_count_for_buyer(&self, buyer_id: &BuyerId, now: DateTime<Utc>) -> u32 {
        let count = self
            .held
            .values()
            .map(|&index| &self.tickets[index])
            .filter(|ticket| &ticket.buyer_id == buyer_id && ticket.blocks_number(now))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Completed tickets sorted by number
    #[must_use]
    pub fn completed(&self) -> Vec<&Ticket> {
        let mut completed: Vec<&Ticket> = self
            .held
            .values()
            .map(|&index| &self.tickets[index])
            .filter(|ticket| ticket.payment_status == PaymentStatus::Completed)
            .collect();
        completed.sort_by_key(|ticket| ticket.number);
        completed
    }

    /// Count of tickets in `status`
    #[must_use]
    pub fn count(&self, status: PaymentStatus) -> u32 {
        let count = self
            .tickets
            .iter()
            .filter(|ticket| ticket.payment_status == status)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Lazily enumerate numbers not blocked at `now`
    #[must_use]
    pub fn available_numbers(&self, now: DateTime<Utc>) -> AvailableNumbers {
        let blocked = self
            .held
            .iter()
            .filter(|(_, index)| self.tickets[**index].blocks_number(now))
            .map(|(number, _)| *number)
            .collect();
        AvailableNumbers {
            next: 1,
            total: self.total,
            blocked,
        }
    }

    /// Record pending tickets for a reservation.
    ///
    /// Callers must have checked [`conflicts`](Self::conflicts) and failed any
    /// expired holders first.
    pub(crate) fn reserve(&mut self, reservation: &NewReservation<'_>) {
        for &number in reservation.numbers {
            let index = self.tickets.len();
            self.tickets.push(Ticket {
                campaign_id: reservation.campaign_id,
                number,
                buyer_id: reservation.buyer_id.clone(),
                reservation_id: reservation.reservation_id,
                purchased_at: reservation.reserved_at,
                payment_method: reservation.payment_method.clone(),
                payment_status: PaymentStatus::Pending,
                transaction_id: reservation.transaction_id,
                expires_at: reservation.expires_at,
                failure_reason: None,
                resolved_at: None,
            });
            self.held.insert(number, index);
            self.by_transaction
                .entry(reservation.transaction_id)
                .or_default()
                .push(index);
        }
    }

    /// Complete the pending tickets of a transaction; returns their numbers
    pub(crate) fn complete(
        &mut self,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> Vec<TicketNumber> {
        let indices = self.pending_indices(transaction_id);
        for &index in &indices {
            let ticket = &mut self.tickets[index];
            ticket.payment_status = PaymentStatus::Completed;
            ticket.resolved_at = Some(at);
        }
        indices.iter().map(|&index| self.tickets[index].number).collect()
    }

    /// Fail the pending tickets of a transaction and release their numbers
    pub(crate) fn fail(
        &mut self,
        transaction_id: TransactionId,
        reason: FailureReason,
        at: DateTime<Utc>,
    ) -> Vec<TicketNumber> {
        let indices = self.pending_indices(transaction_id);
        for &index in &indices {
            let ticket = &mut self.tickets[index];
            ticket.payment_status = PaymentStatus::Failed;
            ticket.failure_reason = Some(reason);
            ticket.resolved_at = Some(at);
            let number = ticket.number;
            if self.held.get(&number) == Some(&index) {
                self.held.remove(&number);
            }
        }
        indices.iter().map(|&index| self.tickets[index].number).collect()
    }

    fn pending_indices(&self, transaction_id: TransactionId) -> Vec<usize> {
        self.by_transaction
            .get(&transaction_id)
            .map(|indices| {
                indices
                    .iter()
                    .copied()
                    .filter(|&index| self.tickets[index].payment_status == PaymentStatus::Pending)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Lazy, ascending sequence of reservable numbers.
///
/// Owns a snapshot of the blocked set, so it stays valid after the campaign
/// lock is released.
#[derive(Clone, Debug)]
pub struct AvailableNumbers {
    next: TicketNumber,
    total: u32,
    blocked: HashSet<TicketNumber>,
}

impl Iterator for AvailableNumbers {
    type Item = TicketNumber;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next <= self.total {
            let candidate = self.next;
            self.next += 1;
            if !self.blocked.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total.saturating_sub(self.next) + 1).unwrap_or(0);
        (0, Some(if self.next > self.total { 0 } else { remaining }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Fixture {
        ledger: TicketLedger,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new(total: u32) -> Self {
            Self {
                ledger: TicketLedger::new(total),
                campaign_id: CampaignId::new(),
                now: Utc::now(),
            }
        }

        fn reserve(&mut self, buyer: &str, numbers: &[TicketNumber]) -> TransactionId {
            let transaction_id = TransactionId::new();
            let buyer_id = BuyerId::new(buyer);
            self.ledger.reserve(&NewReservation {
                campaign_id: self.campaign_id,
                reservation_id: ReservationId::new(),
                transaction_id,
                buyer_id: &buyer_id,
                numbers,
                payment_method: &PaymentMethod::Cash,
                reserved_at: self.now,
                expires_at: self.now + Duration::minutes(15),
            });
            transaction_id
        }
    }

    #[test]
    fn held_numbers_conflict_until_failed() {
        let mut fx = Fixture::new(10);
        let txn = fx.reserve("x", &[2, 3]);

        assert_eq!(fx.ledger.conflicts(&[9, 3, 2], fx.now), vec![2, 3]);

        fx.ledger.fail(txn, FailureReason::PaymentDeclined, fx.now);
        assert!(fx.ledger.conflicts(&[2, 3], fx.now).is_empty());
        assert_eq!(fx.ledger.count(PaymentStatus::Failed), 2);
    }

    #[test]
    fn expired_holds_stop_blocking() {
        let mut fx = Fixture::new(5);
        let txn = fx.reserve("x", &[1]);
        let later = fx.now + Duration::minutes(16);

        assert!(fx.ledger.conflicts(&[1], later).is_empty());
        assert_eq!(fx.ledger.expired_holders(&[1, 2], later), vec![txn]);
        assert_eq!(fx.ledger.expired_transactions(later), vec![txn]);
        assert!(fx.ledger.expired_transactions(fx.now).is_empty());
    }

    #[test]
    fn completion_is_only_from_pending() {
        let mut fx = Fixture::new(5);
        let txn = fx.reserve("x", &[4, 5]);

        assert_eq!(fx.ledger.complete(txn, fx.now), vec![4, 5]);
        assert!(fx.ledger.complete(txn, fx.now).is_empty());
        assert!(fx.ledger.fail(txn, FailureReason::Expired, fx.now).is_empty());
        assert_eq!(fx.ledger.count(PaymentStatus::Completed), 2);
        assert_eq!(
            fx.ledger.completed().iter().map(|t| t.number).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[test]
    fn available_numbers_skip_blocked() {
        let mut fx = Fixture::new(6);
        let paid = fx.reserve("x", &[1, 4]);
        fx.ledger.complete(paid, fx.now);
        fx.reserve("y", &[2]);

        let available: Vec<_> = fx.ledger.available_numbers(fx.now).collect();
        assert_eq!(available, vec![3, 5, 6]);

        let later = fx.now + Duration::hours(1);
        let available: Vec<_> = fx.ledger.available_numbers(later).collect();
        assert_eq!(available, vec![2, 3, 5, 6]);
    }

    #[test]
    fn buyer_live_count_ignores_failed() {
        let mut fx = Fixture::new(10);
        let buyer = BuyerId::new("x");
        let first = fx.reserve("x", &[1, 2]);
        fx.reserve("x", &[3]);
        fx.ledger.fail(first, FailureReason::Abandoned, fx.now);

        assert_eq!(fx.ledger.live_count_for_buyer(&buyer, fx.now), 1);
        assert_eq!(fx.ledger.for_buyer(&buyer).len(), 3);
    }
}
