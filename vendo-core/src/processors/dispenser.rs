//! DispensingRun processor.
//!
//! A single task owns the cursor of one run: it resolves failed units
//! immediately, holds every other unit in `Dispensing` for the dwell
//! time, publishes a [`DispenseSnapshot`] after each change and finally
//! emits `Completed` once followed by `Leave` after the grace interval.
//! Shutting the run down mid-way drops its timers with it.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use vendo_sdk::objects::ConfirmedLine;

use crate::config::DispenseConfig;
use crate::dispensing::{DispensePlan, DispenseSequence, DispenseSnapshot, Step};
use crate::events::{RunSignal, RunSignalSender};

pub struct DispensingRun {
    sequence: Option<DispenseSequence>,
    config: DispenseConfig,
    snapshot_tx: watch::Sender<DispenseSnapshot>,
}

impl DispensingRun {
    /// Prepare a run for the confirmed lines of an order.
    pub fn new(
        lines: &[ConfirmedLine],
        config: DispenseConfig,
    ) -> (Self, watch::Receiver<DispenseSnapshot>) {
        let sequence = DispensePlan::from_confirmed(lines).map(DispenseSequence::new);
        let initial = sequence
            .as_ref()
            .map(DispenseSequence::snapshot)
            .unwrap_or_default();
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let run = Self {
            sequence,
            config,
            snapshot_tx,
        };
        (run, snapshot_rx)
    }

    /// Drive the run to completion, or until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, signal_tx: RunSignalSender) {
        let Some(mut sequence) = self.sequence else {
            warn!("Nothing to dispense, leaving immediately");
            let _ = signal_tx.send(RunSignal::Leave).await;
            return;
        };
        info!(units = sequence.statuses().len(), "DispensingRun started");

        loop {
            let step = sequence.advance();
            self.snapshot_tx.send_replace(sequence.snapshot());
            match step {
                Step::Dispense(index) => {
                    debug!(unit = index, "Dispensing unit");
                    if !wait(&mut shutdown_rx, self.config.dwell).await {
                        info!("DispensingRun received shutdown signal");
                        return;
                    }
                }
                Step::Resolved(index) => debug!(unit = index, "Unit dispensed"),
                Step::Skipped(index) => debug!(unit = index, "Unit failed by backend, skipped"),
                Step::Completed => {
                    let outcome = sequence.outcome();
                    info!(
                        completed = outcome.completed,
                        failed = outcome.failed,
                        "All units processed"
                    );
                    if signal_tx.send(RunSignal::Completed(outcome)).await.is_err() {
                        warn!("Failed to send RunSignal, receiver dropped");
                        return;
                    }
                    break;
                }
                Step::Idle => break,
            }
        }

        if wait(&mut shutdown_rx, self.config.grace).await {
            let _ = signal_tx.send(RunSignal::Leave).await;
        }
        info!("DispensingRun finished");
    }
}

/// Sleep for `duration`. Returns `false` if shutdown fired first.
async fn wait(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return false;
                }
            }

            _ = &mut sleep => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispensing::{DispenseOutcome, ProductDisplayStatus, UnitStatus};
    use crate::events::run_signal_channel;
    use tokio::time::Instant;

    fn assert_near(elapsed: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    fn line(id: i64, quantity: i64, failed: bool) -> ConfirmedLine {
        ConfirmedLine {
            id: Some(id),
            name: Some(format!("product-{id}")),
            quantity: Some(quantity),
            failed,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_units_then_grace() {
        let (run, mut snapshot_rx) = DispensingRun::new(&[line(1, 2, false)], DispenseConfig::default());
        let (signal_tx, mut signal_rx) = run_signal_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = Instant::now();
        tokio::spawn(run.run(shutdown_rx, signal_tx));

        let mut max_dispensing = 0;
        let observer = tokio::spawn(async move {
            while snapshot_rx.changed().await.is_ok() {
                let snapshot = snapshot_rx.borrow_and_update().clone();
                let dispensing = snapshot
                    .units
                    .iter()
                    .filter(|(_, s)| *s == UnitStatus::Dispensing)
                    .count();
                max_dispensing = max_dispensing.max(dispensing);
                if snapshot.all_completed {
                    assert_eq!(snapshot.products[0].status, ProductDisplayStatus::Completed);
                }
            }
            max_dispensing
        });

        assert_eq!(
            signal_rx.recv().await,
            Some(RunSignal::Completed(DispenseOutcome {
                completed: 2,
                failed: 0
            }))
        );
        assert_near(started.elapsed(), 6000);

        assert_eq!(signal_rx.recv().await, Some(RunSignal::Leave));
        assert_near(started.elapsed(), 11000);
        assert_eq!(signal_rx.recv().await, None);
        assert_eq!(observer.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_units_skip_dwell() {
        let (run, snapshot_rx) =
            DispensingRun::new(&[line(1, 2, true), line(2, 1, false)], DispenseConfig::default());
        let (signal_tx, mut signal_rx) = run_signal_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = Instant::now();
        tokio::spawn(run.run(shutdown_rx, signal_tx));

        assert_eq!(
            signal_rx.recv().await,
            Some(RunSignal::Completed(DispenseOutcome {
                completed: 1,
                failed: 2
            }))
        );
        assert_near(started.elapsed(), 3000);
        let snapshot = snapshot_rx.borrow().clone();
        assert_eq!(snapshot.products[0].status, ProductDisplayStatus::Failed);
        assert_eq!(snapshot.products[1].status, ProductDisplayStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_cart_leaves_immediately() {
        let (run, _snapshot_rx) =
            DispensingRun::new(&[ConfirmedLine::default()], DispenseConfig::default());
        let (signal_tx, mut signal_rx) = run_signal_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = Instant::now();
        tokio::spawn(run.run(shutdown_rx, signal_tx));

        assert_eq!(signal_rx.recv().await, Some(RunSignal::Leave));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(signal_rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_mid_run_emits_nothing() {
        let (run, _snapshot_rx) = DispensingRun::new(&[line(1, 3, false)], DispenseConfig::default());
        let (signal_tx, mut signal_rx) = run_signal_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run.run(shutdown_rx, signal_tx));

        tokio::time::sleep(Duration::from_millis(4000)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(signal_rx.recv().await, None);
    }
}
