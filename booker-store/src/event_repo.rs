use async_trait::async_trait;
use booker_core::{EventCatalog, StoreError};
use booker_shared::Event;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::database::store_unavailable;

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    event_date: DateTime<Utc>,
    total_seats: i32,
    payment_timeout_minutes: i32,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            name: row.name,
            event_date: row.event_date,
            total_seats: row.total_seats,
            payment_timeout_minutes: row.payment_timeout_minutes,
            created_at: row.created_at,
        }
    }
}

const EVENT_COLUMNS: &str =
    "id, name, event_date, total_seats, payment_timeout_minutes, created_at";

#[derive(Clone)]
pub struct PgEventCatalog {
    pool: Pool<Postgres>,
}

impl PgEventCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventCatalog for PgEventCatalog {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)?;

        Ok(row.map(Event::from))
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events ORDER BY event_date ASC",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)?;

        Ok(rows.into_iter().map(Event::from).collect())
    }
}
