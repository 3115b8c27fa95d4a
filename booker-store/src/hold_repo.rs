use async_trait::async_trait;
use booker_core::{HoldStore, StoreError, TransitionExtra};
use booker_shared::{Hold, HoldStatus};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::database::store_unavailable;

#[derive(Debug, sqlx::FromRow)]
struct HoldRow {
    id: Uuid,
    event_id: Uuid,
    user_id: String,
    seats_count: i32,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<HoldRow> for Hold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        let status: HoldStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("hold {}: {}", row.id, e)))?;

        Ok(Hold {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            seats_count: row.seats_count,
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
            paid_at: row.paid_at,
        })
    }
}

fn into_holds(rows: Vec<HoldRow>) -> Result<Vec<Hold>, StoreError> {
    rows.into_iter().map(Hold::try_from).collect()
}

/// Why a conditional transition matched no row. A row still in `from` can
/// only have been held back by the payment deadline guard.
fn lost_swap(hold_id: Uuid, from: HoldStatus, current: Option<Hold>) -> StoreError {
    match current {
        None => StoreError::NotFound(hold_id),
        Some(current) if current.status == from => StoreError::DeadlinePassed(hold_id),
        Some(current) => StoreError::StaleState {
            hold_id,
            expected: from,
            actual: current.status,
        },
    }
}

/// Inserts `hold` on `conn`. Replaying the same hold is a no-op.
pub(crate) async fn insert_hold(conn: &mut PgConnection, hold: &Hold) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO holds (id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(hold.id)
    .bind(hold.event_id)
    .bind(&hold.user_id)
    .bind(hold.seats_count)
    .bind(hold.status.as_str())
    .bind(hold.created_at)
    .bind(hold.expires_at)
    .bind(hold.paid_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgHoldStore {
    pool: Pool<Postgres>,
}

impl PgHoldStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldStore for PgHoldStore {
    async fn create(&self, hold: &Hold) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(store_unavailable)?;
        insert_hold(&mut conn, hold).await.map_err(store_unavailable)
    }

    async fn transition(
        &self,
        hold_id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        extra: TransitionExtra,
    ) -> Result<Hold, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        let row = sqlx::query_as::<_, HoldRow>(
            "UPDATE holds \
             SET status = $3, paid_at = COALESCE($4, paid_at), expires_at = NULL, \
                 release_pending = $5 \
             WHERE id = $1 AND status = $2 \
               AND (expires_at IS NULL OR $4::timestamptz IS NULL OR expires_at >= $4) \
             RETURNING id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at",
        )
        .bind(hold_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(extra.paid_at)
        .bind(!to.holds_capacity())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)?;

        if let Some(row) = row {
            return Hold::try_from(row);
        }

        Err(lost_swap(hold_id, from, self.get(hold_id).await?))
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(
            "SELECT id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at \
             FROM holds \
             WHERE status = 'unpaid' AND expires_at < $1 \
             ORDER BY expires_at ASC \
             LIMIT $2",
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)?;

        into_holds(rows)
    }

    async fn get(&self, hold_id: Uuid) -> Result<Option<Hold>, StoreError> {
        let row = sqlx::query_as::<_, HoldRow>(
            "SELECT id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at \
             FROM holds WHERE id = $1",
        )
        .bind(hold_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)?;

        row.map(Hold::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(
            "SELECT id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at \
             FROM holds WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)?;

        into_holds(rows)
    }

    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(
            "SELECT id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at \
             FROM holds WHERE event_id = $1 AND status IN ('unpaid', 'paid') \
             ORDER BY created_at DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)?;

        into_holds(rows)
    }

    async fn find_release_pending(&self, limit: usize) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(
            "SELECT id, event_id, user_id, seats_count, status, created_at, expires_at, paid_at \
             FROM holds WHERE release_pending \
             ORDER BY created_at ASC \
             LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)?;

        into_holds(rows)
    }

    async fn mark_released(&self, hold_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE holds SET release_pending = FALSE WHERE id = $1")
            .bind(hold_id)
            .execute(&self.pool)
            .await
            .map_err(store_unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(hold_id));
        }
        Ok(())
    }
}
