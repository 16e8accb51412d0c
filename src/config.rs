use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Server configuration loaded from environment variables.
///
/// | Env Var                        | Default                                    |
/// |--------------------------------|--------------------------------------------|
/// | `HOST`                         | `0.0.0.0`                                  |
/// | `PORT`                         | `5000`                                     |
/// | `DATABASE_URL`                 | `sqlite://labrooms.db?mode=rwc`            |
/// | `CORS_ORIGINS`                 | the hosted client plus two localhost ports |
/// | `HEARTBEAT_INTERVAL_SECS`      | `30`                                       |
/// | `SNAPSHOT_TTL_SECS`            | `3600`                                     |
/// | `SNAPSHOT_SWEEP_INTERVAL_SECS` | `300`                                      |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub heartbeat_interval: Duration,
    /// How long a room must stay empty before its canvas snapshot is evicted.
    pub snapshot_ttl: Duration,
    pub snapshot_sweep_interval: Duration,
}

const DEFAULT_CORS_ORIGINS: &str =
    "https://labrooms.vercel.app,http://localhost:5173,http://localhost:3000";

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_var(&lookup, "PORT", 5000)?;
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://labrooms.db?mode=rwc".into());

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let heartbeat_interval =
            Duration::from_secs(parse_var(&lookup, "HEARTBEAT_INTERVAL_SECS", 30)?);
        let snapshot_ttl = Duration::from_secs(parse_var(&lookup, "SNAPSHOT_TTL_SECS", 3600)?);
        let snapshot_sweep_interval =
            Duration::from_secs(parse_var(&lookup, "SNAPSHOT_SWEEP_INTERVAL_SECS", 300)?);

        if heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "HEARTBEAT_INTERVAL_SECS",
                value: "0".into(),
            });
        }
        if snapshot_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SNAPSHOT_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            host,
            port,
            database_url,
            cors_origins,
            heartbeat_interval,
            snapshot_ttl,
            snapshot_sweep_interval,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
