use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a hold.
///
/// `Unpaid` is the only non-terminal state. It moves to `Paid` or `Cancelled`
/// on behalf of the owner, or to `Expired` when the payment window lapses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    Unpaid,
    Paid,
    Cancelled,
    Expired,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Unpaid => "unpaid",
            HoldStatus::Paid => "paid",
            HoldStatus::Cancelled => "cancelled",
            HoldStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Unpaid)
    }

    /// Seats of holds in these states count against the event's capacity.
    pub fn holds_capacity(&self) -> bool {
        matches!(self, HoldStatus::Unpaid | HoldStatus::Paid)
    }

    pub fn can_transition_to(&self, next: HoldStatus) -> bool {
        matches!(
            (self, next),
            (HoldStatus::Unpaid, HoldStatus::Paid)
                | (HoldStatus::Unpaid, HoldStatus::Cancelled)
                | (HoldStatus::Unpaid, HoldStatus::Expired)
        )
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown hold status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for HoldStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(HoldStatus::Unpaid),
            "paid" => Ok(HoldStatus::Paid),
            "cancelled" => Ok(HoldStatus::Cancelled),
            "expired" => Ok(HoldStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A time-bounded claim on a number of seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hold {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub seats_count: i32,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Hold {
    pub fn new_unpaid(
        event_id: Uuid,
        user_id: &str,
        seats_count: i32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id: user_id.to_string(),
            seats_count,
            status: HoldStatus::Unpaid,
            created_at,
            expires_at: Some(expires_at),
            paid_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// True for an unpaid hold whose payment window has closed.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Unpaid && self.expires_at.is_some_and(|at| now > at)
    }
}

/// Body of `POST /events/{id}/book`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub seats_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&HoldStatus::Unpaid).unwrap(), "\"unpaid\"");
        assert_eq!(serde_json::to_string(&HoldStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!("expired".parse::<HoldStatus>().unwrap(), HoldStatus::Expired);
        assert!("UNPAID".parse::<HoldStatus>().is_err());
    }

    #[test]
    fn test_only_unpaid_transitions_exist() {
        use HoldStatus::*;
        assert!(Unpaid.can_transition_to(Paid));
        assert!(Unpaid.can_transition_to(Cancelled));
        assert!(Unpaid.can_transition_to(Expired));

        for terminal in [Paid, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            for next in [Unpaid, Paid, Cancelled, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Unpaid.can_transition_to(Unpaid));
    }

    #[test]
    fn test_lapsed_only_while_unpaid() {
        let now = Utc::now();
        let mut hold = Hold::new_unpaid(Uuid::new_v4(), "user-1", 2, now, now + Duration::minutes(1));

        assert!(!hold.is_lapsed(now));
        assert!(hold.is_lapsed(now + Duration::minutes(2)));

        hold.status = HoldStatus::Paid;
        assert!(!hold.is_lapsed(now + Duration::minutes(2)));
    }

    #[test]
    fn test_paid_hold_serializes_without_expiry() {
        let now = Utc::now();
        let mut hold = Hold::new_unpaid(Uuid::new_v4(), "user-1", 1, now, now);
        hold.status = HoldStatus::Paid;
        hold.expires_at = None;
        hold.paid_at = Some(now);

        let json = serde_json::to_value(&hold).unwrap();
        assert_eq!(json["status"], "paid");
        assert!(json.get("expires_at").is_none());
        assert!(json.get("paid_at").is_some());
    }
}
