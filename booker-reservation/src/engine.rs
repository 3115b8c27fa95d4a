use booker_core::{
    retry_with_backoff, Clock, EventCatalog, HoldStore, ReservationError, ReservationResult,
    ReservationToken, RetryPolicy, SeatLedger, TransactionalBooking, TransitionExtra,
};
use booker_shared::{Event, EventDetail, Hold, HoldStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::reaper::{reclaim_hold, return_seats, ReclaimOutcome};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single request, on top of the event's capacity.
    pub max_seats_per_hold: i32,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_seats_per_hold: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates hold creation, confirmation and cancellation against the
/// seat ledger and the hold store.
///
/// Capacity is only ever changed through `SeatLedger::try_reserve`/`release`
/// and hold status only through `HoldStore::transition`, so any number of
/// engines (in one process or many) can share the same backends.
pub struct ReservationEngine {
    catalog: Arc<dyn EventCatalog>,
    ledger: Arc<dyn SeatLedger>,
    store: Arc<dyn HoldStore>,
    clock: Arc<dyn Clock>,
    booking: Option<Arc<dyn TransactionalBooking>>,
    config: EngineConfig,
    lazily_expired: AtomicU64,
}

impl ReservationEngine {
    pub fn new(
        catalog: Arc<dyn EventCatalog>,
        ledger: Arc<dyn SeatLedger>,
        store: Arc<dyn HoldStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            store,
            clock,
            booking: None,
            config,
            lazily_expired: AtomicU64::new(0),
        }
    }

    /// Places holds through `booking` in one transaction instead of
    /// reserving on the ledger and persisting separately.
    pub fn with_transactional_booking(mut self, booking: Arc<dyn TransactionalBooking>) -> Self {
        self.booking = Some(booking);
        self
    }

    pub fn ledger(&self) -> Arc<dyn SeatLedger> {
        self.ledger.clone()
    }

    pub fn store(&self) -> Arc<dyn HoldStore> {
        self.store.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Holds this engine expired itself while serving requests, as opposed
    /// to ones the reaper reclaimed.
    pub fn lazily_expired(&self) -> u64 {
        self.lazily_expired.load(Ordering::Relaxed)
    }

    /// Places an unpaid hold on `seats` seats.
    ///
    /// Reserve-then-persist: if the hold cannot be written after the ledger
    /// committed capacity, the capacity is released again before failing.
    pub async fn create_hold(&self, event_id: Uuid, user_id: &str, seats: i32) -> ReservationResult<Hold> {
        if seats < 1 {
            return Err(ReservationError::Validation(
                "seats_count must be at least 1".to_string(),
            ));
        }
        if seats > self.config.max_seats_per_hold {
            return Err(ReservationError::Validation(format!(
                "seats_count must not exceed {}",
                self.config.max_seats_per_hold
            )));
        }

        let event = self.load_event(event_id).await?;
        if seats > event.total_seats {
            return Err(ReservationError::Validation(format!(
                "seats_count {} exceeds event capacity {}",
                seats, event.total_seats
            )));
        }

        let now = self.clock.now();
        let hold = Hold::new_unpaid(event.id, user_id, seats, now, event.hold_deadline(now));

        let placed = match &self.booking {
            Some(booking) => booking
                .reserve_and_create(&hold, event.total_seats)
                .await
                .map_err(ReservationError::from),
            None => self.reserve_then_persist(&event, &hold).await,
        };
        let token = match placed {
            Ok(token) => token,
            Err(err) => {
                if let ReservationError::SoldOut { available, .. } = &err {
                    info!(event_id = %event.id, seats, available = *available, "Hold rejected: sold out");
                }
                return Err(err);
            }
        };

        info!(
            hold_id = %hold.id,
            event_id = %event.id,
            user_id,
            seats,
            remaining = token.remaining,
            expires_at = ?hold.expires_at,
            "Hold created"
        );
        Ok(hold)
    }

    /// Records payment for an unpaid hold. Confirmed seats stay committed.
    ///
    /// Payment takes effect at the instant the deadline is checked; that
    /// instant is stored as `paid_at`, and the store refuses a `paid_at` past
    /// `expires_at`.
    pub async fn confirm_hold(&self, hold_id: Uuid, user_id: &str) -> ReservationResult<Hold> {
        let hold = self.load_owned(hold_id, user_id).await?;
        let now = self.clock.now();
        self.ensure_open(&hold, hold.is_lapsed(now)).await?;

        let paid = self
            .store
            .transition(hold.id, HoldStatus::Unpaid, HoldStatus::Paid, TransitionExtra::paid(now))
            .await
            .map_err(|e| stale_to_expired(hold.id, e.into()))?;

        info!(hold_id = %paid.id, event_id = %paid.event_id, user_id, "Hold confirmed");
        Ok(paid)
    }

    /// Cancels an unpaid hold and returns its seats to the pool.
    pub async fn cancel_hold(&self, hold_id: Uuid, user_id: &str) -> ReservationResult<Hold> {
        let hold = self.load_owned(hold_id, user_id).await?;
        self.ensure_open(&hold, hold.is_lapsed(self.clock.now())).await?;

        let cancelled = self
            .store
            .transition(hold.id, HoldStatus::Unpaid, HoldStatus::Cancelled, TransitionExtra::default())
            .await
            .map_err(|e| stale_to_expired(hold.id, e.into()))?;

        if let Err(e) = return_seats(
            self.store.as_ref(),
            self.ledger.as_ref(),
            &self.config.retry,
            &cancelled,
        )
        .await
        {
            warn!(
                hold_id = %cancelled.id,
                event_id = %cancelled.event_id,
                seats = cancelled.seats_count,
                "Hold cancelled, seat release left pending for the reaper: {}",
                e
            );
        }

        info!(
            hold_id = %cancelled.id,
            event_id = %cancelled.event_id,
            user_id,
            seats = cancelled.seats_count,
            "Hold cancelled"
        );
        Ok(cancelled)
    }

    /// Returns the caller's hold, reclaiming it first if its window lapsed.
    /// Holds owned by someone else are reported as missing.
    pub async fn get_hold(&self, hold_id: Uuid, user_id: &str) -> ReservationResult<Hold> {
        let hold = self
            .fetch_hold(hold_id)
            .await?
            .filter(|h| h.is_owned_by(user_id))
            .ok_or(ReservationError::NotFound(hold_id))?;

        self.settle(hold).await
    }

    pub async fn list_user_holds(&self, user_id: &str) -> ReservationResult<Vec<Hold>> {
        let holds = retry_with_backoff(&self.config.retry, || self.store.list_by_user(user_id)).await?;

        let mut settled = Vec::with_capacity(holds.len());
        for hold in holds {
            settled.push(self.settle(hold).await?);
        }
        Ok(settled)
    }

    /// `total_seats - committed`, read from the ledger without scanning holds.
    pub async fn get_availability(&self, event_id: Uuid) -> ReservationResult<i32> {
        let event = self.load_event(event_id).await?;
        self.availability_of(&event).await
    }

    pub async fn event_detail(&self, event_id: Uuid) -> ReservationResult<EventDetail> {
        let event = self.load_event(event_id).await?;

        let holds = retry_with_backoff(&self.config.retry, || self.store.list_active_by_event(event_id)).await?;
        let mut active_bookings = Vec::with_capacity(holds.len());
        for hold in holds {
            let hold = self.settle(hold).await?;
            if hold.status.holds_capacity() {
                active_bookings.push(hold);
            }
        }

        let available_seats = self.availability_of(&event).await?;

        Ok(EventDetail {
            event,
            available_seats,
            active_bookings,
        })
    }

    pub async fn list_events(&self) -> ReservationResult<Vec<Event>> {
        Ok(retry_with_backoff(&self.config.retry, || self.catalog.list_events()).await?)
    }

    /// Reserve on the ledger, then write the hold. If the write fails the
    /// seats are handed back, unless a read shows the write landed anyway.
    async fn reserve_then_persist(&self, event: &Event, hold: &Hold) -> ReservationResult<ReservationToken> {
        let token = self
            .ledger
            .try_reserve(event.id, event.total_seats, hold.seats_count)
            .await?;

        let persisted = retry_with_backoff(&self.config.retry, || self.store.create(hold)).await;
        let Err(write_err) = persisted else {
            return Ok(token);
        };

        match retry_with_backoff(&self.config.retry, || self.store.get(hold.id)).await {
            Ok(Some(_)) => {
                warn!(
                    hold_id = %hold.id,
                    event_id = %event.id,
                    "Hold write reported failure but the record exists, keeping seats: {}",
                    write_err
                );
                return Ok(token);
            }
            Ok(None) => {}
            Err(read_err) => {
                // Releasing here could free seats for a hold that does exist.
                error!(
                    hold_id = %hold.id,
                    event_id = %event.id,
                    seats = hold.seats_count,
                    "Hold write outcome unknown, seats stay committed: {}",
                    read_err
                );
                return Err(write_err.into());
            }
        }

        warn!(
            event_id = %event.id,
            hold_id = %hold.id,
            seats = hold.seats_count,
            "Hold write failed, releasing reserved seats: {}",
            write_err
        );
        let released = retry_with_backoff(&self.config.retry, || {
            self.ledger.release(event.id, hold.id, hold.seats_count)
        })
        .await;
        if let Err(release_err) = released {
            error!(
                event_id = %event.id,
                seats = hold.seats_count,
                "Compensating release failed, capacity leaked: {}",
                release_err
            );
        }
        Err(write_err.into())
    }

    async fn availability_of(&self, event: &Event) -> ReservationResult<i32> {
        let committed = retry_with_backoff(&self.config.retry, || self.ledger.committed(event.id)).await?;
        let available = event.total_seats - committed;
        if available < 0 {
            error!(
                event_id = %event.id,
                total = event.total_seats,
                committed,
                "Ledger is over-committed"
            );
        }
        Ok(available)
    }

    async fn load_event(&self, event_id: Uuid) -> ReservationResult<Event> {
        retry_with_backoff(&self.config.retry, || self.catalog.get_event(event_id))
            .await?
            .ok_or(ReservationError::EventNotFound(event_id))
    }

    async fn fetch_hold(&self, hold_id: Uuid) -> ReservationResult<Option<Hold>> {
        Ok(retry_with_backoff(&self.config.retry, || self.store.get(hold_id)).await?)
    }

    async fn load_owned(&self, hold_id: Uuid, user_id: &str) -> ReservationResult<Hold> {
        let hold = self
            .fetch_hold(hold_id)
            .await?
            .ok_or(ReservationError::NotFound(hold_id))?;

        if !hold.is_owned_by(user_id) {
            return Err(ReservationError::Forbidden(hold_id));
        }
        Ok(hold)
    }

    /// Fails unless the hold is unpaid and `lapsed` is false. A lapsed hold is
    /// reclaimed on the spot.
    async fn ensure_open(&self, hold: &Hold, lapsed: bool) -> ReservationResult<()> {
        match hold.status {
            HoldStatus::Unpaid => {}
            HoldStatus::Expired => return Err(ReservationError::Expired(hold.id)),
            actual => {
                return Err(ReservationError::StaleState {
                    hold_id: hold.id,
                    expected: HoldStatus::Unpaid,
                    actual,
                })
            }
        }

        if lapsed {
            match reclaim_hold(self.store.as_ref(), self.ledger.as_ref(), &self.config.retry, hold).await {
                Ok(ReclaimOutcome::Reclaimed(_)) => {
                    self.lazily_expired.fetch_add(1, Ordering::Relaxed);
                }
                Ok(ReclaimOutcome::AlreadySettled(_)) => {}
                Err(e) => {
                    warn!(hold_id = %hold.id, "Lazy expiry failed, leaving it to the reaper: {}", e);
                }
            }
            return Err(ReservationError::Expired(hold.id));
        }
        Ok(())
    }

    /// Reclaims a lapsed hold and returns its current record.
    async fn settle(&self, hold: Hold) -> ReservationResult<Hold> {
        if !hold.is_lapsed(self.clock.now()) {
            return Ok(hold);
        }

        match reclaim_hold(self.store.as_ref(), self.ledger.as_ref(), &self.config.retry, &hold).await {
            Ok(ReclaimOutcome::Reclaimed(expired)) => {
                self.lazily_expired.fetch_add(1, Ordering::Relaxed);
                Ok(expired)
            }
            Ok(ReclaimOutcome::AlreadySettled(_)) => {
                Ok(self.fetch_hold(hold.id).await?.unwrap_or(hold))
            }
            Err(e) => {
                warn!(hold_id = %hold.id, "Lazy expiry failed, leaving it to the reaper: {}", e);
                Ok(hold)
            }
        }
    }
}

/// A lost race against expiry is reported as `Expired`, not `StaleState`.
fn stale_to_expired(hold_id: Uuid, err: ReservationError) -> ReservationError {
    match err {
        ReservationError::StaleState {
            actual: HoldStatus::Expired,
            ..
        } => ReservationError::Expired(hold_id),
        other => other,
    }
}
