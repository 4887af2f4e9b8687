//! Balance oracle bookkeeping.
//!
//! [`BalanceTracker`] decides when a fetch must start and whether a
//! response may be applied. Every request carries a [`BalanceTicket`]; a
//! response whose ticket is no longer the one in flight is discarded, so
//! a slow answer for a previous card can never overwrite the balance of
//! the current one.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use vendo_sdk::objects::{CardIdentity, CardSnapshot};

/// Errors returned by a [`BalanceSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// The backend answered but refused to report a balance.
    #[error("balance unavailable: {}", .0.as_deref().unwrap_or("no reason given"))]
    Rejected(Option<String>),

    #[error("balance request failed: {0}")]
    Request(String),
}

/// The external service that knows a card's spendable balance.
#[async_trait]
pub trait BalanceSource: Send + Sync + 'static {
    async fn fetch_balance(&self, card: &CardSnapshot) -> Result<Decimal, BalanceError>;
}

/// Authoritative balance of the displayed card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balance {
    /// `None` until a fetch for `as_of` succeeds.
    pub amount: Option<Decimal>,
    pub as_of: Option<CardIdentity>,
    pub checking: bool,
    pub error: Option<String>,
}

impl Balance {
    /// The amount, if it is known and belongs to `identity`.
    pub fn amount_for(&self, identity: &CardIdentity) -> Option<Decimal> {
        match &self.as_of {
            Some(id) if id == identity => self.amount,
            _ => None,
        }
    }
}

/// Tag attached to every balance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTicket {
    pub id: u64,
    pub card: CardSnapshot,
}

impl BalanceTicket {
    pub fn identity(&self) -> CardIdentity {
        self.card.identity()
    }
}

/// What the owner of the tracker must do after observing a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceDirective {
    /// Nothing to do: same card as before.
    Keep,
    /// Abort any in-flight request and start this one.
    Fetch(BalanceTicket),
    /// Abort any in-flight request; no card is displayed.
    Clear,
}

#[derive(Debug, Default)]
pub struct BalanceTracker {
    balance: Balance,
    card: Option<CardSnapshot>,
    in_flight: Option<u64>,
    next_id: u64,
}

impl BalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Record the card currently displayed by the session.
    pub fn observe(&mut self, card: Option<&CardSnapshot>) -> BalanceDirective {
        let current = self.card.as_ref().map(CardSnapshot::identity);
        let observed = card.map(CardSnapshot::identity);
        if current == observed {
            return BalanceDirective::Keep;
        }

        self.card = card.cloned();
        match card {
            Some(card) => BalanceDirective::Fetch(self.issue(card.clone())),
            None => {
                if let Some(id) = self.in_flight.take() {
                    debug!(request_id = id, "Dropping balance request, card removed");
                }
                self.balance = Balance::default();
                BalanceDirective::Clear
            }
        }
    }

    /// Re-fetch the current card's balance unless a request for it is
    /// already in flight.
    pub fn refresh(&mut self) -> Option<BalanceTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        let card = self.card.clone()?;
        Some(self.issue(card))
    }

    /// Apply a response. Returns `false` when the ticket is stale and the
    /// response was discarded.
    pub fn complete(
        &mut self,
        ticket: &BalanceTicket,
        result: Result<Decimal, BalanceError>,
    ) -> bool {
        if self.in_flight != Some(ticket.id) {
            debug!(
                request_id = ticket.id,
                card = %ticket.identity(),
                "Discarding stale balance response"
            );
            return false;
        }
        self.in_flight = None;
        self.balance.checking = false;
        match result {
            Ok(amount) => {
                self.balance.amount = Some(amount);
                self.balance.error = None;
            }
            Err(e) => {
                self.balance.amount = None;
                self.balance.error = Some(e.to_string());
            }
        }
        true
    }

    fn issue(&mut self, card: CardSnapshot) -> BalanceTicket {
        self.next_id += 1;
        let id = self.next_id;
        let identity = card.identity();
        if self.balance.as_of.as_ref() != Some(&identity) {
            self.balance.amount = None;
        }
        self.balance.as_of = Some(identity);
        self.balance.checking = true;
        self.balance.error = None;
        self.in_flight = Some(id);
        BalanceTicket { id, card }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, credit: i64) -> CardSnapshot {
        CardSnapshot {
            user_id: id.to_string(),
            user_name: format!("user {id}"),
            credit: Decimal::from(credit),
        }
    }

    fn ticket(directive: BalanceDirective) -> BalanceTicket {
        match directive {
            BalanceDirective::Fetch(ticket) => ticket,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_one_fetch_per_identity() {
        let mut tracker = BalanceTracker::new();
        let first = ticket(tracker.observe(Some(&card("a", 10))));
        assert!(tracker.balance().checking);

        // Same identity with a different card-local credit.
        assert_eq!(tracker.observe(Some(&card("a", 99))), BalanceDirective::Keep);
        assert_eq!(tracker.refresh(), None);

        assert!(tracker.complete(&first, Ok(Decimal::from(100))));
        let balance = tracker.balance();
        assert_eq!(balance.amount, Some(Decimal::from(100)));
        assert!(!balance.checking);
        assert_eq!(
            balance.amount_for(&CardIdentity("a".to_string())),
            Some(Decimal::from(100))
        );
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let mut tracker = BalanceTracker::new();
        let for_a = ticket(tracker.observe(Some(&card("a", 10))));
        let for_b = ticket(tracker.observe(Some(&card("b", 20))));
        assert_ne!(for_a.id, for_b.id);

        assert!(tracker.complete(&for_b, Ok(Decimal::from(20))));
        assert!(!tracker.complete(&for_a, Ok(Decimal::from(999))));
        assert_eq!(tracker.balance().amount, Some(Decimal::from(20)));
        assert_eq!(tracker.balance().as_of, Some(CardIdentity("b".to_string())));
    }

    #[test]
    fn test_card_removal_clears_and_drops_in_flight() {
        let mut tracker = BalanceTracker::new();
        let for_a = ticket(tracker.observe(Some(&card("a", 10))));
        assert_eq!(tracker.observe(None), BalanceDirective::Clear);
        assert_eq!(tracker.balance(), &Balance::default());
        assert!(!tracker.complete(&for_a, Ok(Decimal::from(10))));
        assert_eq!(tracker.refresh(), None);
    }

    #[test]
    fn test_refresh_after_settle_keeps_previous_amount_visible() {
        let mut tracker = BalanceTracker::new();
        let first = ticket(tracker.observe(Some(&card("a", 10))));
        tracker.complete(&first, Ok(Decimal::from(100)));

        let second = tracker.refresh().unwrap();
        assert!(tracker.balance().checking);
        assert_eq!(tracker.balance().amount, Some(Decimal::from(100)));

        tracker.complete(&second, Err(BalanceError::Rejected(None)));
        assert_eq!(tracker.balance().amount, None);
        assert!(tracker.balance().error.is_some());
    }
}
