pub mod engine;
pub mod reaper;

#[cfg(test)]
mod test_support;

pub use engine::{EngineConfig, ReservationEngine};
pub use reaper::{reclaim_hold, return_seats, ExpiryReaper, ReapReport, ReaperConfig, ReclaimOutcome};
