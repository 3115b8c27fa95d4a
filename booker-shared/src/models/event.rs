use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::hold::Hold;

/// An event with a fixed seat pool, owned by the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub total_seats: i32,
    pub payment_timeout_minutes: i32,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Deadline for a hold placed on this event at `created_at`.
    pub fn hold_deadline(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::minutes(i64::from(self.payment_timeout_minutes))
    }
}

/// Admin view of an event with live availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub event: Event,
    pub available_seats: i32,
    pub active_bookings: Vec<Hold>,
}
