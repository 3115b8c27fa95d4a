//! In-memory adapters for the catalogue, ledger and hold store.
//!
//! The ledger keeps one atomic counter per event; reservations for different
//! events never touch the same counter, and the map lock is only held long
//! enough to find (or insert) the counter. Each counter also remembers which
//! holds it has already released.

use async_trait::async_trait;
use booker_shared::{Event, Hold, HoldStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::repository::{
    apply_transition, EventCatalog, HoldStore, LedgerError, ReservationToken, SeatLedger, StoreError,
    TransitionExtra,
};

#[derive(Default)]
pub struct MemoryCatalog {
    events: RwLock<HashMap<Uuid, Event>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event: Event) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event.id, event);
    }
}

#[async_trait]
impl EventCatalog for MemoryCatalog {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        Ok(events.get(&id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<Event> = events.values().cloned().collect();
        list.sort_by_key(|e| e.event_date);
        Ok(list)
    }
}

struct CapacitySlot {
    total: i32,
    committed: AtomicI32,
    released: Mutex<HashSet<Uuid>>,
}

#[derive(Default)]
pub struct MemoryLedger {
    slots: RwLock<HashMap<Uuid, Arc<CapacitySlot>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, event_id: Uuid) -> Option<Arc<CapacitySlot>> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event_id)
            .cloned()
    }

    fn slot_or_open(&self, event_id: Uuid, total_seats: i32) -> Arc<CapacitySlot> {
        if let Some(slot) = self.slot(event_id) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(event_id)
            .or_insert_with(|| {
                Arc::new(CapacitySlot {
                    total: total_seats,
                    committed: AtomicI32::new(0),
                    released: Mutex::new(HashSet::new()),
                })
            })
            .clone()
    }
}

#[async_trait]
impl SeatLedger for MemoryLedger {
    async fn try_reserve(
        &self,
        event_id: Uuid,
        total_seats: i32,
        seats: i32,
    ) -> Result<ReservationToken, LedgerError> {
        let slot = self.slot_or_open(event_id, total_seats);
        let mut current = slot.committed.load(Ordering::Acquire);

        loop {
            let available = slot.total - current;
            if seats > available {
                return Err(LedgerError::InsufficientCapacity {
                    requested: seats,
                    available,
                });
            }

            match slot.committed.compare_exchange(
                current,
                current + seats,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(ReservationToken {
                        event_id,
                        seats,
                        remaining: available - seats,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    async fn release(&self, event_id: Uuid, hold_id: Uuid, seats: i32) -> Result<(), LedgerError> {
        let slot = self.slot(event_id).ok_or(LedgerError::Underflow {
            event_id,
            committed: 0,
            seats,
        })?;

        let mut released = slot.released.lock().unwrap_or_else(|e| e.into_inner());
        if released.contains(&hold_id) {
            return Ok(());
        }

        let mut current = slot.committed.load(Ordering::Acquire);
        loop {
            if current < seats {
                return Err(LedgerError::Underflow {
                    event_id,
                    committed: current,
                    seats,
                });
            }

            match slot.committed.compare_exchange(
                current,
                current - seats,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    released.insert(hold_id);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    async fn committed(&self, event_id: Uuid) -> Result<i32, LedgerError> {
        Ok(self
            .slot(event_id)
            .map(|slot| slot.committed.load(Ordering::Acquire))
            .unwrap_or(0))
    }
}

#[derive(Default)]
struct HoldTable {
    holds: HashMap<Uuid, Hold>,
    release_pending: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryHoldStore {
    table: RwLock<HoldTable>,
}

impl MemoryHoldStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(mut holds: Vec<Hold>) -> Vec<Hold> {
        holds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        holds
    }
}

#[async_trait]
impl HoldStore for MemoryHoldStore {
    async fn create(&self, hold: &Hold) -> Result<(), StoreError> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        table.holds.entry(hold.id).or_insert_with(|| hold.clone());
        Ok(())
    }

    async fn transition(
        &self,
        hold_id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        extra: TransitionExtra,
    ) -> Result<Hold, StoreError> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let hold = table.holds.get_mut(&hold_id).ok_or(StoreError::NotFound(hold_id))?;
        apply_transition(hold, from, to, extra)?;
        let updated = hold.clone();
        if !to.holds_capacity() {
            table.release_pending.insert(hold_id);
        }
        Ok(updated)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let mut expired: Vec<Hold> = table
            .holds
            .values()
            .filter(|h| h.status == HoldStatus::Unpaid && h.expires_at.is_some_and(|at| at < now))
            .cloned()
            .collect();
        expired.sort_by_key(|h| h.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn get(&self, hold_id: Uuid) -> Result<Option<Hold>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        Ok(table.holds.get(&hold_id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Hold>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let mine = table.holds.values().filter(|h| h.user_id == user_id).cloned().collect();
        Ok(Self::newest_first(mine))
    }

    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Hold>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let active = table
            .holds
            .values()
            .filter(|h| h.event_id == event_id && h.status.holds_capacity())
            .cloned()
            .collect();
        Ok(Self::newest_first(active))
    }

    async fn find_release_pending(&self, limit: usize) -> Result<Vec<Hold>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<Hold> = table
            .release_pending
            .iter()
            .filter_map(|id| table.holds.get(id))
            .cloned()
            .collect();
        pending.sort_by_key(|h| h.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_released(&self, hold_id: Uuid) -> Result<(), StoreError> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if !table.holds.contains_key(&hold_id) {
            return Err(StoreError::NotFound(hold_id));
        }
        table.release_pending.remove(&hold_id);
        Ok(())
    }
}
