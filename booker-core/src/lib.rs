pub mod clock;
pub mod memory;
pub mod repository;
pub mod retry;

use booker_shared::HoldStatus;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use repository::{
    EventCatalog, HoldStore, LedgerError, ReservationToken, SeatLedger, StoreError,
    TransactionalBooking, TransitionExtra,
};
pub use retry::{retry_with_backoff, RetryPolicy, Transient};

/// Failures surfaced by the reservation engine. Every variant is scoped to
/// the single request that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Event not found: {0}")]
    EventNotFound(Uuid),
    #[error("No seats available: requested {requested}, available {available}")]
    SoldOut { requested: i32, available: i32 },
    #[error("Hold not found: {0}")]
    NotFound(Uuid),
    #[error("Hold {0} belongs to another user")]
    Forbidden(Uuid),
    #[error("Hold {0} has expired")]
    Expired(Uuid),
    #[error("Hold {hold_id} is {actual}, expected {expected}")]
    StaleState {
        hold_id: Uuid,
        expected: HoldStatus,
        actual: HoldStatus,
    },
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ReservationError::NotFound(id),
            StoreError::DeadlinePassed(id) => ReservationError::Expired(id),
            StoreError::StaleState { hold_id, expected, actual } => {
                ReservationError::StaleState { hold_id, expected, actual }
            }
            StoreError::InvalidTransition { from, to } => ReservationError::Validation(format!(
                "transition {} -> {} is not allowed",
                from, to
            )),
            StoreError::Unavailable(msg) | StoreError::InvalidRecord(msg) => {
                ReservationError::StorageUnavailable(msg)
            }
        }
    }
}

impl From<LedgerError> for ReservationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapacity { requested, available } => {
                ReservationError::SoldOut { requested, available }
            }
            other => ReservationError::StorageUnavailable(other.to_string()),
        }
    }
}
