pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod event_repo;
pub mod hold_repo;
pub mod ledger_repo;
pub mod redis_repo;

pub use booking_repo::PgBooking;
pub use database::DbClient;
pub use event_repo::PgEventCatalog;
pub use hold_repo::PgHoldStore;
pub use ledger_repo::PgSeatLedger;
pub use redis_repo::RedisSeatLedger;
