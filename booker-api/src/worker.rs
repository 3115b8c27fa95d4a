use std::sync::Arc;

use booker_reservation::ExpiryReaper;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::metrics::Metrics;

/// Runs the expiry reaper in the background until `shutdown` flips to true.
pub fn spawn_expiry_worker(
    reaper: ExpiryReaper,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let reaper = Arc::new(reaper);
    info!("Expiry worker scheduled every {:?}", reaper.interval());

    tokio::spawn(async move {
        reaper
            .run(shutdown, move |report| metrics.record_reap(report))
            .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use booker_core::memory::{MemoryCatalog, MemoryHoldStore, MemoryLedger};
    use booker_core::{ManualClock, RetryPolicy};
    use booker_reservation::{EngineConfig, ReaperConfig, ReservationEngine};
    use booker_shared::Event;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_worker_records_ticks_and_stops() {
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = Arc::new(ManualClock::default());
        let event_id = Uuid::new_v4();
        catalog.insert(Event {
            id: event_id,
            name: "Matinee".to_string(),
            event_date: Utc::now() + ChronoDuration::days(3),
            total_seats: 2,
            payment_timeout_minutes: 1,
            created_at: Utc::now(),
        });

        let engine = ReservationEngine::new(
            catalog,
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryHoldStore::new()),
            clock.clone(),
            EngineConfig::default(),
        );
        engine.create_hold(event_id, "user-1", 2).await.unwrap();
        clock.advance(ChronoDuration::minutes(2));

        let metrics = Arc::new(Metrics::new().unwrap());
        let reaper = ExpiryReaper::for_engine(
            &engine,
            ReaperConfig {
                interval: Duration::from_millis(10),
                ..ReaperConfig::default()
            },
            RetryPolicy::none(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = spawn_expiry_worker(reaper, metrics.clone(), rx);

        for _ in 0..100 {
            if metrics.expired_total() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(metrics.expired_total(), 1);
        assert_eq!(engine.get_availability(event_id).await.unwrap(), 2);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
