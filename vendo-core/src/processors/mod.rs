//! Event processors.
//!
//! - `TransportChannel`: talks to the broker, emits `TransportEvent`
//! - `CardSessionDriver`: receives `TransportEvent`, owns the removal
//!   timer, publishes `SessionView`, emits `BalanceEvent`
//! - `BalanceWatcher`: receives `BalanceEvent`, publishes `Balance`
//! - `DispensingRun`: drives one dispensing run, emits `RunSignal`
//!
//! Every processor stops when its shutdown `watch` flips to `true` and
//! cancels the timers and tasks it owns on the way out.

pub mod balance_watcher;
pub mod dispenser;
pub mod session_driver;
pub mod transport;

pub use balance_watcher::BalanceWatcher;
pub use dispenser::DispensingRun;
pub use session_driver::CardSessionDriver;
pub use transport::TransportChannel;
