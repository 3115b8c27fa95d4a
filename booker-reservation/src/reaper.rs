//! Background reclamation of lapsed holds.
//!
//! Each tick scans for unpaid holds past their deadline and moves them to
//! `expired`, releasing their seats. The scan is re-run from scratch every
//! tick, so a tick that dies halfway leaves nothing to recover.

use booker_core::{
    retry_with_backoff, Clock, HoldStore, ReservationResult, RetryPolicy, SeatLedger,
    StoreError, TransitionExtra,
};
use booker_shared::{Hold, HoldStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::engine::ReservationEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum ReclaimOutcome {
    /// The hold moved to `expired` and its seats were released.
    Reclaimed(Hold),
    /// Someone else settled the hold first.
    AlreadySettled(HoldStatus),
}

/// Gives a cancelled or expired hold's seats back to the ledger, then clears
/// its release-pending mark. Safe to repeat: the ledger applies a given
/// hold's release once.
pub async fn return_seats(
    store: &dyn HoldStore,
    ledger: &dyn SeatLedger,
    retry: &RetryPolicy,
    hold: &Hold,
) -> ReservationResult<()> {
    retry_with_backoff(retry, || ledger.release(hold.event_id, hold.id, hold.seats_count)).await?;
    retry_with_backoff(retry, || store.mark_released(hold.id)).await?;
    Ok(())
}

/// Expires one unpaid hold and returns its seats to the ledger.
///
/// The conditional transition decides the winner: if the hold was confirmed
/// or cancelled in the meantime, nothing is released. A release that still
/// fails after retrying stays pending and is replayed by the next tick.
pub async fn reclaim_hold(
    store: &dyn HoldStore,
    ledger: &dyn SeatLedger,
    retry: &RetryPolicy,
    hold: &Hold,
) -> ReservationResult<ReclaimOutcome> {
    let expired = match store
        .transition(hold.id, HoldStatus::Unpaid, HoldStatus::Expired, TransitionExtra::default())
        .await
    {
        Ok(expired) => expired,
        Err(StoreError::StaleState { actual, .. }) => return Ok(ReclaimOutcome::AlreadySettled(actual)),
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = return_seats(store, ledger, retry, &expired).await {
        warn!(
            hold_id = %expired.id,
            event_id = %expired.event_id,
            seats = expired.seats_count,
            "Hold expired, seat release left pending: {}",
            e
        );
        return Ok(ReclaimOutcome::Reclaimed(expired));
    }

    info!(
        hold_id = %expired.id,
        event_id = %expired.event_id,
        seats = expired.seats_count,
        "Expired hold reclaimed"
    );
    Ok(ReclaimOutcome::Reclaimed(expired))
}

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub batch_limit: usize,
    pub max_batches_per_tick: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_limit: 100,
            max_batches_per_tick: 10,
        }
    }
}

/// Per-tick counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Releases left pending by earlier cancels or expiries, now applied.
    pub released: usize,
}

impl ReapReport {
    pub fn is_idle(&self) -> bool {
        self.scanned == 0 && self.released == 0 && self.failed == 0
    }
}

pub struct ExpiryReaper {
    store: Arc<dyn HoldStore>,
    ledger: Arc<dyn SeatLedger>,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
    retry: RetryPolicy,
}

impl ExpiryReaper {
    pub fn new(
        store: Arc<dyn HoldStore>,
        ledger: Arc<dyn SeatLedger>,
        clock: Arc<dyn Clock>,
        config: ReaperConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            config,
            retry,
        }
    }

    /// A reaper working against the same backends as `engine`.
    pub fn for_engine(engine: &ReservationEngine, config: ReaperConfig, retry: RetryPolicy) -> Self {
        Self::new(engine.store(), engine.ledger(), engine.clock(), config, retry)
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Runs one reclamation pass.
    pub async fn tick(&self) -> ReservationResult<ReapReport> {
        let now = self.clock.now();
        let limit = self.config.batch_limit.max(1);
        let mut report = ReapReport::default();

        let pending = retry_with_backoff(&self.retry, || self.store.find_release_pending(limit)).await?;
        for hold in &pending {
            match return_seats(self.store.as_ref(), self.ledger.as_ref(), &self.retry, hold).await {
                Ok(()) => {
                    info!(hold_id = %hold.id, event_id = %hold.event_id, seats = hold.seats_count, "Pending release applied");
                    report.released += 1;
                }
                Err(e) => {
                    warn!(hold_id = %hold.id, "Pending release failed again: {}", e);
                    report.failed += 1;
                }
            }
        }

        for _ in 0..self.config.max_batches_per_tick.max(1) {
            let batch = retry_with_backoff(&self.retry, || self.store.find_expired(now, limit)).await?;
            let batch_len = batch.len();
            let mut progressed = false;

            for hold in &batch {
                report.scanned += 1;
                match reclaim_hold(self.store.as_ref(), self.ledger.as_ref(), &self.retry, hold).await {
                    Ok(ReclaimOutcome::Reclaimed(_)) => {
                        report.expired += 1;
                        progressed = true;
                    }
                    Ok(ReclaimOutcome::AlreadySettled(status)) => {
                        debug!(hold_id = %hold.id, %status, "Hold settled since scan, skipping");
                        report.skipped += 1;
                        progressed = true;
                    }
                    Err(e) => {
                        warn!(hold_id = %hold.id, "Failed to reclaim hold: {}", e);
                        report.failed += 1;
                    }
                }
            }

            // A short batch means the backlog is drained; a batch with no
            // progress would only return the same holds again.
            if batch_len < limit || !progressed {
                break;
            }
        }

        Ok(report)
    }

    /// Ticks on a fixed interval until `shutdown` flips to true.
    pub async fn run<F>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, mut on_report: F)
    where
        F: FnMut(&ReapReport) + Send,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_limit = self.config.batch_limit,
            "Expiry reaper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => {
                            if report.is_idle() {
                                debug!("Reaper tick: nothing to reclaim");
                            } else {
                                info!(
                                    scanned = report.scanned,
                                    expired = report.expired,
                                    skipped = report.skipped,
                                    failed = report.failed,
                                    released = report.released,
                                    "Reaper tick complete"
                                );
                            }
                            on_report(&report);
                        }
                        Err(e) => error!("Reaper tick failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Expiry reaper stopping");
                        return;
                    }
                }
            }
        }
    }
}
