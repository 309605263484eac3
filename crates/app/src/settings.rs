//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and from `LEDGER__*` environment variables,
//! e.g. `LEDGER__SERVER__BIND=0.0.0.0:3000`.
//!
//! See `settings.toml` for the configuration.
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use engine::LedgerSettings;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    /// sea-orm connection string, e.g. `sqlite:./ledger.db?mode=rwc`.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    /// IANA name, e.g. `Asia/Jakarta`.
    pub timezone: String,
    pub max_attempts: u32,
    pub dispatch_interval_secs: u64,
    pub dispatch_batch: u64,
}

#[derive(Debug, Deserialize)]
pub struct Upstream {
    pub pos_url: String,
    pub balance_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub database: Database,
    pub ledger: Ledger,
    pub upstream: Upstream,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("server.bind", "127.0.0.1:3000")?
            .set_default("database.url", "sqlite:./ledger.db?mode=rwc")?
            .set_default("ledger.timezone", "UTC")?
            .set_default("ledger.max_attempts", 10)?
            .set_default("ledger.dispatch_interval_secs", 30)?
            .set_default("ledger.dispatch_batch", 100)?
            .set_default("upstream.timeout_ms", 5000)?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("LEDGER").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

impl Ledger {
    pub fn engine_settings(&self) -> Result<LedgerSettings, ConfigError> {
        let timezone = self
            .timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Message(format!("ledger.timezone: {err}")))?;
        Ok(LedgerSettings {
            timezone,
            max_attempts: self.max_attempts,
        })
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs.max(1))
    }
}

impl Upstream {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(timezone: &str) -> Ledger {
        Ledger {
            timezone: timezone.to_string(),
            max_attempts: 3,
            dispatch_interval_secs: 0,
            dispatch_batch: 10,
        }
    }

    #[test]
    fn timezone_is_parsed_as_iana_name() {
        let settings = ledger("Asia/Jakarta").engine_settings().unwrap();
        assert_eq!(settings.timezone, chrono_tz::Asia::Jakarta);
        assert_eq!(settings.max_attempts, 3);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(ledger("Mars/Olympus").engine_settings().is_err());
    }

    #[test]
    fn dispatch_interval_is_never_zero() {
        assert_eq!(ledger("UTC").dispatch_interval(), Duration::from_secs(1));
    }
}
