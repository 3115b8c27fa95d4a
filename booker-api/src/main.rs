use anyhow::Context;
use booker_api::{app, metrics::Metrics, worker::spawn_expiry_worker, AppState};
use booker_core::{SeatLedger, SystemClock};
use booker_reservation::{EngineConfig, ExpiryReaper, ReaperConfig, ReservationEngine};
use booker_store::app_config::{Config, LedgerBackend};
use booker_store::{DbClient, PgBooking, PgEventCatalog, PgHoldStore, PgSeatLedger, RedisSeatLedger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "booker_api=debug,booker_reservation=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    tracing::info!("Starting Booker API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }

    let ledger: Arc<dyn SeatLedger> = match config.ledger.backend {
        LedgerBackend::Postgres => Arc::new(PgSeatLedger::new(db.pool.clone())),
        LedgerBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("Redis ledger selected without a [redis] section")?;
            Arc::new(RedisSeatLedger::new(&redis.url).context("Failed to open Redis client")?)
        }
    };
    tracing::info!(backend = ?config.ledger.backend, "Seat ledger ready");

    let retry = config.retry.policy();
    let mut engine = ReservationEngine::new(
        Arc::new(PgEventCatalog::new(db.pool.clone())),
        ledger,
        Arc::new(PgHoldStore::new(db.pool.clone())),
        Arc::new(SystemClock),
        EngineConfig {
            max_seats_per_hold: config.reservation.max_seats_per_hold,
            retry: retry.clone(),
        },
    );
    // Ledger and holds share a database, so a hold is placed in one transaction.
    if config.ledger.backend == LedgerBackend::Postgres {
        engine = engine.with_transactional_booking(Arc::new(PgBooking::new(db.pool.clone())));
    }
    let engine = Arc::new(engine);
    let metrics = Arc::new(Metrics::new()?);

    // Expiry worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = ExpiryReaper::for_engine(
        &engine,
        ReaperConfig {
            interval: config.reaper.interval(),
            batch_limit: config.reaper.batch_limit,
            max_batches_per_tick: config.reaper.max_batches_per_tick,
        },
        retry,
    );
    let worker = spawn_expiry_worker(reaper, metrics.clone(), shutdown_rx);

    let app = app(AppState::new(engine, metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::warn!("Expiry worker did not stop cleanly: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
