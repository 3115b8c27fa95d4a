//! Prometheus counters for the hold lifecycle.

use axum::{extract::State, http::header, response::IntoResponse};
use booker_reservation::ReapReport;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Mutex;
use thiserror::Error;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub struct Metrics {
    registry: Registry,
    pub holds_created: IntCounter,
    pub sold_out: IntCounter,
    pub confirmed: IntCounter,
    pub cancelled: IntCounter,
    /// Labelled by `path`: `reaper` or `lazy`.
    expired: IntCounterVec,
    reaper_ticks: IntCounter,
    releases_replayed: IntCounter,
    lazy_sync: Mutex<()>,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let holds_created = IntCounter::new("booker_holds_created_total", "Holds placed")?;
        let sold_out = IntCounter::new(
            "booker_holds_sold_out_total",
            "Hold requests rejected for lack of seats",
        )?;
        let confirmed = IntCounter::new("booker_holds_confirmed_total", "Holds confirmed as paid")?;
        let cancelled = IntCounter::new("booker_holds_cancelled_total", "Holds cancelled by their owner")?;
        let expired = IntCounterVec::new(
            Opts::new("booker_holds_expired_total", "Holds expired and released"),
            &["path"],
        )?;
        let reaper_ticks = IntCounter::new("booker_reaper_ticks_total", "Completed reaper passes")?;
        let releases_replayed = IntCounter::new(
            "booker_releases_replayed_total",
            "Seat releases applied by the reaper after an earlier failure",
        )?;

        registry.register(Box::new(holds_created.clone()))?;
        registry.register(Box::new(sold_out.clone()))?;
        registry.register(Box::new(confirmed.clone()))?;
        registry.register(Box::new(cancelled.clone()))?;
        registry.register(Box::new(expired.clone()))?;
        registry.register(Box::new(reaper_ticks.clone()))?;
        registry.register(Box::new(releases_replayed.clone()))?;

        Ok(Self {
            registry,
            holds_created,
            sold_out,
            confirmed,
            cancelled,
            expired,
            reaper_ticks,
            releases_replayed,
            lazy_sync: Mutex::new(()),
        })
    }

    pub fn record_reap(&self, report: &ReapReport) {
        self.reaper_ticks.inc();
        self.expired
            .with_label_values(&["reaper"])
            .inc_by(report.expired as u64);
        self.releases_replayed.inc_by(report.released as u64);
    }

    /// Catches the `lazy` series up with the engine's running total.
    pub fn sync_lazy_expired(&self, total: u64) {
        let _guard = self.lazy_sync.lock().unwrap_or_else(|e| e.into_inner());
        let counter = self.expired.with_label_values(&["lazy"]);
        let seen = counter.get();
        if total > seen {
            counter.inc_by(total - seen);
        }
    }

    pub fn expired_total(&self) -> u64 {
        self.expired.with_label_values(&["reaper"]).get()
            + self.expired.with_label_values(&["lazy"]).get()
    }

    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

pub async fn scrape(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.metrics.sync_lazy_expired(state.engine.lazily_expired());
    let body = state
        .metrics
        .encode_text()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], body))
}
