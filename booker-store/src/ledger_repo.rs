//! Postgres seat ledger.
//!
//! One row per event. A reservation is a single conditional `UPDATE`, so the
//! row lock Postgres takes for the statement is the only serialization point
//! and concurrent bookings for different events never touch each other.

use async_trait::async_trait;
use booker_core::{LedgerError, ReservationToken, SeatLedger};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::database::ledger_unavailable;

#[derive(Clone)]
pub struct PgSeatLedger {
    pool: Pool<Postgres>,
}

impl PgSeatLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

async fn seed(conn: &mut PgConnection, event_id: Uuid, total_seats: i32) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO seat_ledger (event_id, total_seats, committed_seats) \
         VALUES ($1, $2, 0) ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(total_seats)
    .execute(&mut *conn)
    .await
    .map_err(ledger_unavailable)?;
    Ok(())
}

async fn committed_on(conn: &mut PgConnection, event_id: Uuid) -> Result<i32, LedgerError> {
    let committed: Option<i32> =
        sqlx::query_scalar("SELECT committed_seats FROM seat_ledger WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(ledger_unavailable)?;

    Ok(committed.unwrap_or(0))
}

/// Check-and-commit on `conn`. Runs inside the caller's transaction when
/// given one.
pub(crate) async fn reserve_on(
    conn: &mut PgConnection,
    event_id: Uuid,
    total_seats: i32,
    seats: i32,
) -> Result<ReservationToken, LedgerError> {
    seed(conn, event_id, total_seats).await?;

    let remaining: Option<i32> = sqlx::query_scalar(
        "UPDATE seat_ledger \
         SET committed_seats = committed_seats + $2, updated_at = NOW() \
         WHERE event_id = $1 AND committed_seats + $2 <= total_seats \
         RETURNING total_seats - committed_seats",
    )
    .bind(event_id)
    .bind(seats)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ledger_unavailable)?;

    match remaining {
        Some(remaining) => Ok(ReservationToken {
            event_id,
            seats,
            remaining,
        }),
        None => {
            let available: i32 = sqlx::query_scalar(
                "SELECT total_seats - committed_seats FROM seat_ledger WHERE event_id = $1",
            )
            .bind(event_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(ledger_unavailable)?;

            Err(LedgerError::InsufficientCapacity {
                requested: seats,
                available: available.max(0),
            })
        }
    }
}

#[async_trait]
impl SeatLedger for PgSeatLedger {
    async fn try_reserve(
        &self,
        event_id: Uuid,
        total_seats: i32,
        seats: i32,
    ) -> Result<ReservationToken, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(ledger_unavailable)?;
        reserve_on(&mut conn, event_id, total_seats, seats).await
    }

    async fn release(&self, event_id: Uuid, hold_id: Uuid, seats: i32) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_unavailable)?;

        let recorded = sqlx::query(
            "INSERT INTO seat_releases (hold_id, event_id, seats) \
             VALUES ($1, $2, $3) ON CONFLICT (hold_id) DO NOTHING",
        )
        .bind(hold_id)
        .bind(event_id)
        .bind(seats)
        .execute(&mut *tx)
        .await
        .map_err(ledger_unavailable)?
        .rows_affected();

        if recorded == 0 {
            // Already returned by an earlier attempt.
            return Ok(());
        }

        let released: Option<i32> = sqlx::query_scalar(
            "UPDATE seat_ledger \
             SET committed_seats = committed_seats - $2, updated_at = NOW() \
             WHERE event_id = $1 AND committed_seats >= $2 \
             RETURNING committed_seats",
        )
        .bind(event_id)
        .bind(seats)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ledger_unavailable)?;

        if released.is_none() {
            let committed = committed_on(&mut tx, event_id).await?;
            tx.rollback().await.map_err(ledger_unavailable)?;
            return Err(LedgerError::Underflow {
                event_id,
                committed,
                seats,
            });
        }

        tx.commit().await.map_err(ledger_unavailable)?;
        Ok(())
    }

    async fn committed(&self, event_id: Uuid) -> Result<i32, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(ledger_unavailable)?;
        committed_on(&mut conn, event_id).await
    }
}
