// crates/hodl-daemon/src/scheduler.rs
//
// Epoch scheduler loop for the HODL ledger daemon.
//
// Every check interval the scheduler runs one epoch check on the blocking
// pool. Ticks are single-flight: if the previous check still holds the
// guard, the new tick is dropped rather than queued. Failures are reported
// and the loop carries on; the next tick re-runs the same check.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use hodl_core::traits::ErrorReporter;
use hodl_ledger::{EpochKeeper, EpochTick};

/// Periodically ensures a current epoch exists and rolls it over.
pub struct EpochScheduler {
    keeper: Arc<EpochKeeper>,
    reporter: Arc<dyn ErrorReporter>,
    interval: Duration,
    in_flight: Arc<Mutex<()>>,
}

impl EpochScheduler {
    pub fn new(
        keeper: Arc<EpochKeeper>,
        reporter: Arc<dyn ErrorReporter>,
        interval: Duration,
    ) -> Self {
        Self {
            keeper,
            reporter,
            interval,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Run until `shutdown` flips to true. The first check runs immediately.
    /// On shutdown an in-flight check is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Epoch scheduler started (interval={}s)",
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Epoch scheduler received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.try_tick();
                }
            }
        }

        // Wait for the in-flight check, if any, to release the guard.
        let _guard = self.in_flight.lock().await;
        tracing::info!("Epoch scheduler stopped");
    }

    /// Start one epoch check unless the previous one is still running.
    /// Returns the check's handle, or `None` if the tick was skipped.
    pub fn try_tick(&self) -> Option<JoinHandle<Option<EpochTick>>> {
        let guard = match self.in_flight.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Previous epoch check still running; tick skipped");
                return None;
            }
        };
        let keeper = self.keeper.clone();
        let reporter = self.reporter.clone();
        Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            check_epoch(&keeper, reporter.as_ref())
        }))
    }
}

/// One tick body. Errors stop at this boundary.
fn check_epoch(keeper: &EpochKeeper, reporter: &dyn ErrorReporter) -> Option<EpochTick> {
    match keeper.check_increment_epoch(Utc::now()) {
        Ok(tick) => {
            if let EpochTick::Unchanged(ref epoch) = tick {
                tracing::debug!("{} is current; no rollover needed", epoch);
            }
            Some(tick)
        }
        Err(e) => {
            reporter.report("epoch_check", &e);
            None
        }
    }
}
