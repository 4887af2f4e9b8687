//! BalanceWatcher processor.
//!
//! Receives `BalanceEvent`s from the session driver, fetches balances
//! through a [`BalanceSource`] and publishes the authoritative [`Balance`].
//! Each fetch runs in its own task; a superseded fetch is aborted and, if
//! its answer still arrives, discarded by ticket.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::balance::{
    Balance, BalanceDirective, BalanceError, BalanceSource, BalanceTicket, BalanceTracker,
};
use crate::events::{BalanceEvent, BalanceEventReceiver, DEFAULT_CHANNEL_BUFFER};

type FetchResult = (BalanceTicket, Result<Decimal, BalanceError>);

pub struct BalanceWatcher<S> {
    source: Arc<S>,
    tracker: BalanceTracker,
    balance_tx: watch::Sender<Balance>,
    result_tx: mpsc::Sender<FetchResult>,
    result_rx: mpsc::Receiver<FetchResult>,
    in_flight: Option<JoinHandle<()>>,
}

impl<S: BalanceSource> BalanceWatcher<S> {
    pub fn new(source: Arc<S>) -> (Self, watch::Receiver<Balance>) {
        let (balance_tx, balance_rx) = watch::channel(Balance::default());
        let (result_tx, result_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let watcher = Self {
            source,
            tracker: BalanceTracker::new(),
            balance_tx,
            result_tx,
            result_rx,
            in_flight: None,
        };
        (watcher, balance_rx)
    }

    /// Run until shutdown is signaled or the event channel closes.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: BalanceEventReceiver,
    ) {
        info!("BalanceWatcher started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("BalanceWatcher received shutdown signal");
                        break;
                    }
                }

                Some((ticket, result)) = self.result_rx.recv() => {
                    if self.tracker.complete(&ticket, result) {
                        self.in_flight = None;
                        self.publish();
                    }
                }

                event = event_rx.recv() => {
                    let Some(event) = event else {
                        info!("BalanceEvent channel closed");
                        break;
                    };
                    self.handle(event);
                }
            }
        }

        self.abort_in_flight();
        info!("BalanceWatcher shutdown complete");
    }

    fn handle(&mut self, event: BalanceEvent) {
        match event {
            BalanceEvent::CardChanged(card) => match self.tracker.observe(card.as_ref()) {
                BalanceDirective::Keep => {}
                BalanceDirective::Fetch(ticket) => self.start(ticket),
                BalanceDirective::Clear => self.abort_in_flight(),
            },
            BalanceEvent::Refresh => match self.tracker.refresh() {
                Some(ticket) => self.start(ticket),
                None => debug!("Balance refresh skipped, nothing to refresh or already checking"),
            },
        }
        self.publish();
    }

    fn start(&mut self, ticket: BalanceTicket) {
        self.abort_in_flight();
        debug!(request_id = ticket.id, card = %ticket.identity(), "Fetching balance");

        let source = Arc::clone(&self.source);
        let result_tx = self.result_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = source.fetch_balance(&ticket.card).await;
            if let Err(e) = &result {
                warn!(card = %ticket.identity(), error = %e, "Balance fetch failed");
            }
            let _ = result_tx.send((ticket, result)).await;
        }));
    }

    fn abort_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }

    fn publish(&self) {
        self.balance_tx.send_replace(self.tracker.balance().clone());
    }
}
