use serde::Deserialize;
use std::env;
use std::time::Duration;

use booker_core::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reservation: ReservationRules,
    #[serde(default)]
    pub reaper: ReaperSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Postgres,
    Redis,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    #[serde(default = "default_max_seats_per_hold")]
    pub max_seats_per_hold: i32,
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            max_seats_per_hold: default_max_seats_per_hold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperSettings {
    #[serde(default = "default_reaper_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches_per_tick: usize,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_reaper_interval(),
            batch_limit: default_batch_limit(),
            max_batches_per_tick: default_max_batches(),
        }
    }
}

impl ReaperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_true() -> bool { true }
fn default_max_seats_per_hold() -> i32 { 100 }
fn default_reaper_interval() -> u64 { 60 }
fn default_batch_limit() -> usize { 100 }
fn default_max_batches() -> usize { 10 }
fn default_max_retries() -> usize { 3 }
fn default_initial_delay_ms() -> u64 { 50 }
fn default_max_delay_ms() -> u64 { 1000 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `BOOKER__SERVER__PORT=9090` sets `server.port`
            .add_source(config::Environment::with_prefix("BOOKER").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Fails early on combinations that would only break at first use.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.ledger.backend == LedgerBackend::Redis && self.redis.is_none() {
            return Err(config::ConfigError::Message(
                "ledger.backend = \"redis\" requires a [redis] section".to_string(),
            ));
        }
        if self.reservation.max_seats_per_hold < 1 {
            return Err(config::ConfigError::Message(
                "reservation.max_seats_per_hold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg = parse(
            r#"
            [server]
            port = 8080

            [database]
            url = "postgres://localhost/booker"
            "#,
        );

        assert_eq!(cfg.ledger.backend, LedgerBackend::Postgres);
        assert_eq!(cfg.reservation.max_seats_per_hold, 100);
        assert_eq!(cfg.reaper.interval(), Duration::from_secs(60));
        assert_eq!(cfg.reaper.batch_limit, 100);
        assert_eq!(cfg.retry.policy().max_retries, 3);
        assert!(cfg.database.run_migrations);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_redis_ledger_requires_redis_section() {
        let cfg = parse(
            r#"
            [server]
            port = 8080

            [database]
            url = "postgres://localhost/booker"

            [ledger]
            backend = "redis"
            "#,
        );

        assert_eq!(cfg.ledger.backend, LedgerBackend::Redis);
        assert!(cfg.validate().is_err());
    }
}
