//! Event system connecting the kiosk processors.
//!
//! # Event Flow
//!
//! 1. `TransportChannel` emits `TransportEvent` -> `CardSessionDriver`
//! 2. `CardSessionDriver` emits `BalanceEvent::CardChanged` -> `BalanceWatcher`
//! 3. `DispensingRun` emits `RunSignal` -> the screen that started it
//!
//! Session and balance state are published through `watch` channels so
//! any number of screens can observe them without side effects.

pub mod channels;
pub mod types;

pub use channels::{
    BalanceEventReceiver, BalanceEventSender, DEFAULT_CHANNEL_BUFFER, RunSignalReceiver,
    RunSignalSender, TransportEventReceiver, TransportEventSender, balance_event_channel,
    run_signal_channel, transport_event_channel,
};

pub use types::{BalanceEvent, RunSignal, TransportEvent};
