//! CardSessionDriver processor.
//!
//! The driver is the only owner of the removal-debounce timer. The timer
//! is a deadline polled inside the main `select!`, so cancelling it is
//! just forgetting the deadline, and dropping the driver on shutdown
//! leaves nothing behind that could fire later.

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::events::{BalanceEvent, BalanceEventSender, TransportEventReceiver};
use crate::session::{CardSession, Effect, SessionEvent, SessionView};

pub struct CardSessionDriver {
    session: CardSession,
    view_tx: watch::Sender<SessionView>,
    balance_tx: Option<BalanceEventSender>,
    removal_deadline: Option<Instant>,
}

impl CardSessionDriver {
    /// Create a driver and the receiver observers use to follow the session.
    ///
    /// The receiver can be cloned freely; observing never feeds back into
    /// the transport.
    pub fn new(config: SessionConfig) -> (Self, watch::Receiver<SessionView>) {
        let (view_tx, view_rx) = watch::channel(SessionView::connecting());
        let driver = Self {
            session: CardSession::new(config.removal_timeout),
            view_tx,
            balance_tx: None,
            removal_deadline: None,
        };
        (driver, view_rx)
    }

    /// Forward card identity changes to a balance watcher.
    pub fn with_balance_events(mut self, balance_tx: BalanceEventSender) -> Self {
        self.balance_tx = Some(balance_tx);
        self
    }

    /// Run until shutdown is signaled or the transport channel closes.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut transport_rx: TransportEventReceiver,
    ) {
        info!("CardSessionDriver started");

        loop {
            let deadline = self.removal_deadline;
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("CardSessionDriver received shutdown signal");
                        break;
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(deadline) = deadline {
                        debug!("Card removal debounce elapsed");
                        self.removal_deadline = None;
                        self.handle(SessionEvent::RemovalElapsed { deadline }).await;
                    }
                }

                Some(event) = transport_rx.recv() => {
                    debug!(event = ?event, "Received TransportEvent");
                    self.handle(event.into()).await;
                }

                else => {
                    info!("TransportEvent channel closed");
                    break;
                }
            }
        }

        if self.removal_deadline.take().is_some() {
            debug!("Cancelled pending removal timer");
        }
        info!("CardSessionDriver shutdown complete");
    }

    async fn handle(&mut self, event: SessionEvent) {
        let effects = self.session.apply(event, Instant::now());
        for effect in effects {
            match effect {
                Effect::CancelRemovalTimer => {
                    self.removal_deadline = None;
                }
                Effect::StartRemovalTimer { deadline } => {
                    self.removal_deadline = Some(deadline);
                }
                Effect::FetchBalance(card) => {
                    self.send_balance_event(BalanceEvent::CardChanged(Some(card)))
                        .await;
                }
                Effect::ClearBalance => {
                    self.send_balance_event(BalanceEvent::CardChanged(None)).await;
                }
            }
        }
        self.view_tx.send_replace(self.session.view().clone());
    }

    async fn send_balance_event(&mut self, event: BalanceEvent) {
        let Some(balance_tx) = &self.balance_tx else {
            return;
        };
        if let Err(e) = balance_tx.send(event).await {
            warn!(error = %e, "Failed to send BalanceEvent, receiver dropped");
            self.balance_tx = None;
        }
    }
}
