//! Event channel factories and handles.

use super::types::{BalanceEvent, RunSignal, TransportEvent};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Sender handle for TransportEvent events.
pub type TransportEventSender = mpsc::Sender<TransportEvent>;
/// Receiver handle for TransportEvent events.
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

/// Sender handle for BalanceEvent events.
pub type BalanceEventSender = mpsc::Sender<BalanceEvent>;
/// Receiver handle for BalanceEvent events.
pub type BalanceEventReceiver = mpsc::Receiver<BalanceEvent>;

/// Sender handle for RunSignal events.
pub type RunSignalSender = mpsc::Sender<RunSignal>;
/// Receiver handle for RunSignal events.
pub type RunSignalReceiver = mpsc::Receiver<RunSignal>;

/// Create a new TransportEvent channel.
pub fn transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new BalanceEvent channel.
///
/// The session driver holds one sender; screens may clone it to request
/// a refresh after an order.
pub fn balance_event_channel() -> (BalanceEventSender, BalanceEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new RunSignal channel.
pub fn run_signal_channel() -> (RunSignalSender, RunSignalReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
