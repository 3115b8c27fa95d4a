//! Hold placement for the Postgres ledger: the seat reservation and the hold
//! insert commit together or not at all.

use async_trait::async_trait;
use booker_core::{LedgerError, ReservationToken, TransactionalBooking};
use booker_shared::Hold;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::database::ledger_unavailable;
use crate::hold_repo::insert_hold;
use crate::ledger_repo::reserve_on;

#[derive(Clone)]
pub struct PgBooking {
    pool: Pool<Postgres>,
}

impl PgBooking {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalBooking for PgBooking {
    async fn reserve_and_create(&self, hold: &Hold, total_seats: i32) -> Result<ReservationToken, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_unavailable)?;

        // Dropping `tx` on any early return rolls the reservation back.
        let token = reserve_on(&mut tx, hold.event_id, total_seats, hold.seats_count).await?;
        insert_hold(&mut tx, hold).await.map_err(ledger_unavailable)?;

        tx.commit().await.map_err(ledger_unavailable)?;
        debug!(hold_id = %hold.id, remaining = token.remaining, "Hold placed in one transaction");
        Ok(token)
    }
}
