use async_trait::async_trait;
use booker_core::{LedgerError, ReservationToken, SeatLedger};
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

// Check-and-add in one script so no other client can interleave between the
// read and the INCRBY. Returns {ok, remaining-or-available}.
const RESERVE_SCRIPT: &str = r#"
    local committed = tonumber(redis.call("GET", KEYS[1]) or "0")
    local total = tonumber(ARGV[1])
    local seats = tonumber(ARGV[2])
    if committed + seats > total then
        return {0, total - committed}
    end
    local now = redis.call("INCRBY", KEYS[1], seats)
    return {1, total - now}
"#;

// Returns a hold's seats at most once and never lets the counter go
// negative. Returns {ok, committed}.
const RELEASE_SCRIPT: &str = r#"
    local committed = tonumber(redis.call("GET", KEYS[1]) or "0")
    if redis.call("SISMEMBER", KEYS[2], ARGV[2]) == 1 then
        return {1, committed}
    end
    local seats = tonumber(ARGV[1])
    if committed < seats then
        return {0, committed}
    end
    local now = redis.call("DECRBY", KEYS[1], seats)
    redis.call("SADD", KEYS[2], ARGV[2])
    return {1, now}
"#;

/// Seat ledger kept as one integer key per event.
#[derive(Clone)]
pub struct RedisSeatLedger {
    client: redis::Client,
}

impl RedisSeatLedger {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LedgerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }
}

pub fn ledger_key(event_id: Uuid) -> String {
    format!("booker:event:{}:committed", event_id)
}

pub fn released_key(event_id: Uuid) -> String {
    format!("booker:event:{}:released", event_id)
}

fn unavailable(err: redis::RedisError) -> LedgerError {
    LedgerError::Unavailable(err.to_string())
}

fn to_i32(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

#[async_trait]
impl SeatLedger for RedisSeatLedger {
    async fn try_reserve(
        &self,
        event_id: Uuid,
        total_seats: i32,
        seats: i32,
    ) -> Result<ReservationToken, LedgerError> {
        let mut conn = self.connection().await?;
        let (ok, value): (i64, i64) = redis::Script::new(RESERVE_SCRIPT)
            .key(ledger_key(event_id))
            .arg(total_seats)
            .arg(seats)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        if ok == 1 {
            debug!("Ledger {} reserved {}, {} left", event_id, seats, value);
            Ok(ReservationToken {
                event_id,
                seats,
                remaining: to_i32(value),
            })
        } else {
            Err(LedgerError::InsufficientCapacity {
                requested: seats,
                available: to_i32(value).max(0),
            })
        }
    }

    async fn release(&self, event_id: Uuid, hold_id: Uuid, seats: i32) -> Result<(), LedgerError> {
        let mut conn = self.connection().await?;
        let (ok, committed): (i64, i64) = redis::Script::new(RELEASE_SCRIPT)
            .key(ledger_key(event_id))
            .key(released_key(event_id))
            .arg(seats)
            .arg(hold_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        if ok == 1 {
            Ok(())
        } else {
            Err(LedgerError::Underflow {
                event_id,
                committed: to_i32(committed),
                seats,
            })
        }
    }

    async fn committed(&self, event_id: Uuid) -> Result<i32, LedgerError> {
        let mut conn = self.connection().await?;
        let committed: Option<i32> = conn.get(ledger_key(event_id)).await.map_err(unavailable)?;
        Ok(committed.unwrap_or(0))
    }
}
