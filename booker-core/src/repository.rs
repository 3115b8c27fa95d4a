use async_trait::async_trait;
use booker_shared::{Event, Hold, HoldStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("Release of {seats} seats exceeds committed {committed} for event {event_id}")]
    Underflow {
        event_id: Uuid,
        committed: i32,
        seats: i32,
    },

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Hold not found: {0}")]
    NotFound(Uuid),

    #[error("Stale state for hold {hold_id}: expected {expected}, found {actual}")]
    StaleState {
        hold_id: Uuid,
        expected: HoldStatus,
        actual: HoldStatus,
    },

    #[error("Payment window for hold {0} has closed")]
    DeadlinePassed(Uuid),

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: HoldStatus, to: HoldStatus },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Proof that capacity was committed by `SeatLedger::try_reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationToken {
    pub event_id: Uuid,
    pub seats: i32,
    pub remaining: i32,
}

/// Extra fields written alongside a status change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionExtra {
    pub paid_at: Option<DateTime<Utc>>,
}

impl TransitionExtra {
    pub fn paid(at: DateTime<Utc>) -> Self {
        Self { paid_at: Some(at) }
    }
}

/// Read-only access to the event catalogue.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;
}

/// Authoritative committed-capacity counter, partitioned per event.
///
/// `try_reserve` must check and commit in one atomic step so that two callers
/// can never both succeed when only one fits.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    async fn try_reserve(
        &self,
        event_id: Uuid,
        total_seats: i32,
        seats: i32,
    ) -> Result<ReservationToken, LedgerError>;

    /// Returns `seats` held by `hold_id`. Keyed by hold so that a retried or
    /// replayed release is applied at most once.
    async fn release(&self, event_id: Uuid, hold_id: Uuid, seats: i32) -> Result<(), LedgerError>;

    /// Seats currently committed for the event. Zero for an untouched event.
    async fn committed(&self, event_id: Uuid) -> Result<i32, LedgerError>;
}

/// Durable hold records. Status only changes through `transition`.
#[async_trait]
pub trait HoldStore: Send + Sync {
    /// Inserts a new hold. Re-inserting the same id is a no-op.
    async fn create(&self, hold: &Hold) -> Result<(), StoreError>;

    /// Compare-and-swap on status. Leaving `unpaid` clears `expires_at`;
    /// moving to a status that frees capacity marks the hold release-pending
    /// until `mark_released` is called. A `paid_at` later than `expires_at`
    /// fails with `DeadlinePassed`.
    async fn transition(
        &self,
        hold_id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        extra: TransitionExtra,
    ) -> Result<Hold, StoreError>;

    /// Unpaid holds with `expires_at < now`, oldest deadline first.
    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, StoreError>;

    async fn get(&self, hold_id: Uuid) -> Result<Option<Hold>, StoreError>;

    /// Newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Hold>, StoreError>;

    /// Unpaid and paid holds for the event, newest first.
    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Hold>, StoreError>;

    /// Cancelled or expired holds whose seats have not been confirmed as
    /// returned to the ledger.
    async fn find_release_pending(&self, limit: usize) -> Result<Vec<Hold>, StoreError>;

    async fn mark_released(&self, hold_id: Uuid) -> Result<(), StoreError>;
}

/// Backends that can commit ledger capacity and the hold record in a single
/// transaction. When available the engine uses it instead of
/// reserve-then-persist, so there is nothing to compensate.
#[async_trait]
pub trait TransactionalBooking: Send + Sync {
    async fn reserve_and_create(&self, hold: &Hold, total_seats: i32) -> Result<ReservationToken, LedgerError>;
}

/// Applies a transition to an in-hand record. Shared by store adapters so the
/// field rules stay identical across backends.
pub fn apply_transition(
    hold: &mut Hold,
    from: HoldStatus,
    to: HoldStatus,
    extra: TransitionExtra,
) -> Result<(), StoreError> {
    if !from.can_transition_to(to) {
        return Err(StoreError::InvalidTransition { from, to });
    }
    if hold.status != from {
        return Err(StoreError::StaleState {
            hold_id: hold.id,
            expected: from,
            actual: hold.status,
        });
    }

    if let (Some(paid_at), Some(deadline)) = (extra.paid_at, hold.expires_at) {
        if paid_at > deadline {
            return Err(StoreError::DeadlinePassed(hold.id));
        }
    }

    hold.status = to;
    hold.expires_at = None;
    if let Some(paid_at) = extra.paid_at {
        hold.paid_at = Some(paid_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unpaid() -> Hold {
        let now = Utc::now();
        Hold::new_unpaid(Uuid::new_v4(), "user-1", 2, now, now + Duration::minutes(10))
    }

    #[test]
    fn test_apply_transition_confirm() {
        let mut hold = unpaid();
        let paid_at = Utc::now();

        apply_transition(&mut hold, HoldStatus::Unpaid, HoldStatus::Paid, TransitionExtra::paid(paid_at)).unwrap();

        assert_eq!(hold.status, HoldStatus::Paid);
        assert_eq!(hold.paid_at, Some(paid_at));
        assert!(hold.expires_at.is_none());
    }

    #[test]
    fn test_apply_transition_rejects_stale_from() {
        let mut hold = unpaid();
        hold.status = HoldStatus::Cancelled;

        let err = apply_transition(&mut hold, HoldStatus::Unpaid, HoldStatus::Paid, TransitionExtra::default())
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::StaleState { actual: HoldStatus::Cancelled, .. }
        ));
    }

    #[test]
    fn test_apply_transition_rejects_payment_after_deadline() {
        let mut hold = unpaid();
        let late = hold.expires_at.unwrap() + Duration::seconds(1);

        let err = apply_transition(&mut hold, HoldStatus::Unpaid, HoldStatus::Paid, TransitionExtra::paid(late))
            .unwrap_err();

        assert!(matches!(err, StoreError::DeadlinePassed(id) if id == hold.id));
        assert_eq!(hold.status, HoldStatus::Unpaid);
        assert!(hold.paid_at.is_none());
    }

    #[test]
    fn test_apply_transition_rejects_invalid_edge() {
        let mut hold = unpaid();
        hold.status = HoldStatus::Paid;

        let err = apply_transition(&mut hold, HoldStatus::Paid, HoldStatus::Cancelled, TransitionExtra::default())
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(hold.status, HoldStatus::Paid);
    }
}
