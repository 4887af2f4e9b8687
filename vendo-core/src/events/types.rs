//! Event type definitions.

use bytes::Bytes;
use vendo_sdk::objects::CardSnapshot;

use crate::dispensing::DispenseOutcome;

/// Lifecycle and payload events of the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connected to the broker; subscription is being set up.
    Connected,
    /// An established connection dropped.
    Disconnected,
    /// A reconnection attempt is about to start.
    Reconnecting,
    /// Raw payload received on the response topic.
    Message(Bytes),
    /// Connect or subscribe failure.
    Error(String),
}

/// Input of the balance watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEvent {
    /// The card presented by the session changed identity.
    CardChanged(Option<CardSnapshot>),
    /// Re-fetch the balance of the current card, e.g. after an order.
    Refresh,
}

/// Signals emitted by a dispensing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSignal {
    /// Every unit has been resolved. Emitted at most once per run.
    Completed(DispenseOutcome),
    /// The screen should navigate away.
    Leave,
}
