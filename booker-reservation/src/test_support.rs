use async_trait::async_trait;
use booker_core::memory::{MemoryCatalog, MemoryHoldStore, MemoryLedger};
use booker_core::{
    Clock, HoldStore, LedgerError, ManualClock, ReservationToken, RetryPolicy, SeatLedger,
    StoreError, TransactionalBooking, TransitionExtra,
};
use booker_shared::{Event, Hold, HoldStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::{EngineConfig, ReservationEngine};

pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub ledger: Arc<BlipLedger>,
    pub store: Arc<dyn HoldStore>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<ReservationEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryHoldStore::new()))
    }

    pub fn with_store(store: Arc<dyn HoldStore>) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let ledger = Arc::new(BlipLedger::default());
        let clock = Arc::new(ManualClock::default());
        let config = EngineConfig {
            max_seats_per_hold: 100,
            retry: fast_retry(),
        };
        let engine = Arc::new(ReservationEngine::new(
            catalog.clone(),
            ledger.clone(),
            store.clone(),
            clock.clone(),
            config,
        ));

        Self {
            catalog,
            ledger,
            store,
            clock,
            engine,
        }
    }

    /// Harness whose engine books through `MemoryBooking`.
    pub fn transactional() -> (Self, Arc<MemoryBooking>) {
        let mut h = Self::new();
        let booking = Arc::new(MemoryBooking {
            ledger: h.ledger.clone(),
            store: h.store.clone(),
            calls: AtomicUsize::new(0),
        });
        let config = EngineConfig {
            max_seats_per_hold: 100,
            retry: fast_retry(),
        };
        h.engine = Arc::new(
            ReservationEngine::new(
                h.catalog.clone(),
                h.ledger.clone(),
                h.store.clone(),
                h.clock.clone(),
                config,
            )
            .with_transactional_booking(booking.clone()),
        );
        (h, booking)
    }

    pub fn add_event(&self, total_seats: i32, payment_timeout_minutes: i32) -> Uuid {
        let now = self.clock.now();
        let event = Event {
            id: Uuid::new_v4(),
            name: "Test Event".to_string(),
            event_date: now + Duration::days(30),
            total_seats,
            payment_timeout_minutes,
            created_at: now,
        };
        let id = event.id;
        self.catalog.insert(event);
        id
    }

    pub async fn available(&self, event_id: Uuid) -> i32 {
        self.engine.get_availability(event_id).await.unwrap()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(2),
        multiplier: 2.0,
    }
}

/// Ledger whose releases fail while `fail_releases` is above zero. Each
/// failed call counts it down by one.
#[derive(Default)]
pub struct BlipLedger {
    pub inner: MemoryLedger,
    pub fail_releases: AtomicUsize,
    pub release_calls: AtomicUsize,
}

impl BlipLedger {
    pub fn fail_next_releases(&self, count: usize) {
        self.fail_releases.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SeatLedger for BlipLedger {
    async fn try_reserve(
        &self,
        event_id: Uuid,
        total_seats: i32,
        seats: i32,
    ) -> Result<ReservationToken, LedgerError> {
        self.inner.try_reserve(event_id, total_seats, seats).await
    }

    async fn release(&self, event_id: Uuid, hold_id: Uuid, seats: i32) -> Result<(), LedgerError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let blip = self
            .fail_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if blip {
            return Err(LedgerError::Unavailable("connection reset".to_string()));
        }
        self.inner.release(event_id, hold_id, seats).await
    }

    async fn committed(&self, event_id: Uuid) -> Result<i32, LedgerError> {
        self.inner.committed(event_id).await
    }
}

/// Reserves and writes the hold in one step over the in-memory adapters.
pub struct MemoryBooking {
    pub ledger: Arc<BlipLedger>,
    pub store: Arc<dyn HoldStore>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TransactionalBooking for MemoryBooking {
    async fn reserve_and_create(&self, hold: &Hold, total_seats: i32) -> Result<ReservationToken, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let token = self
            .ledger
            .try_reserve(hold.event_id, total_seats, hold.seats_count)
            .await?;
        if let Err(e) = self.store.create(hold).await {
            self.ledger
                .release(hold.event_id, hold.id, hold.seats_count)
                .await?;
            return Err(LedgerError::Unavailable(e.to_string()));
        }
        Ok(token)
    }
}

/// Hold store whose writes can be switched off. With `lose_create_acks` the
/// write lands but the caller is told it failed.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryHoldStore,
    pub fail_creates: AtomicBool,
    pub lose_create_acks: AtomicBool,
    pub fail_transitions: AtomicBool,
}

impl FlakyStore {
    fn outage(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HoldStore for FlakyStore {
    async fn create(&self, hold: &Hold) -> Result<(), StoreError> {
        self.outage(&self.fail_creates)?;
        self.inner.create(hold).await?;
        self.outage(&self.lose_create_acks)
    }

    async fn transition(
        &self,
        hold_id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        extra: TransitionExtra,
    ) -> Result<Hold, StoreError> {
        self.outage(&self.fail_transitions)?;
        self.inner.transition(hold_id, from, to, extra).await
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, StoreError> {
        self.inner.find_expired(now, limit).await
    }

    async fn get(&self, hold_id: Uuid) -> Result<Option<Hold>, StoreError> {
        self.inner.get(hold_id).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Hold>, StoreError> {
        self.inner.list_by_user(user_id).await
    }

    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Hold>, StoreError> {
        self.inner.list_active_by_event(event_id).await
    }

    async fn find_release_pending(&self, limit: usize) -> Result<Vec<Hold>, StoreError> {
        self.inner.find_release_pending(limit).await
    }

    async fn mark_released(&self, hold_id: Uuid) -> Result<(), StoreError> {
        self.inner.mark_released(hold_id).await
    }
}
