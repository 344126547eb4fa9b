//! Configuration management for the sync client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote tabular store's REST endpoint.
    /// `None` means no remote is configured and sync is a local no-op.
    pub remote_url: Option<String>,
    /// API key sent with every remote request.
    pub api_key: Option<String>,
    /// Directory for the durable local cache.
    pub data_dir: PathBuf,
    /// Pause between group pushes during a full sync.
    pub push_pacing: Duration,
    /// Capacity of the realtime event queue; bursts beyond it are dropped.
    pub realtime_queue: usize,
    /// Base delay for reconnect backoff.
    pub reconnect_base: Duration,
    /// Upper bound for reconnect backoff.
    pub reconnect_cap: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let remote_url = env::var("DIVVY_REMOTE_URL").ok();
        let api_key = env::var("DIVVY_API_KEY").ok();

        let data_dir = env::var("DIVVY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./divvy-data"));

        let push_pacing = millis_var("DIVVY_PUSH_PACING_MS", 200)?;
        let reconnect_base = millis_var("DIVVY_RECONNECT_BASE_MS", 5_000)?;
        let reconnect_cap = millis_var("DIVVY_RECONNECT_CAP_MS", 300_000)?;

        let realtime_queue = match env::var("DIVVY_REALTIME_QUEUE") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("DIVVY_REALTIME_QUEUE"))?,
            Err(_) => 32,
        };
        if realtime_queue == 0 {
            return Err(ConfigError::InvalidNumber("DIVVY_REALTIME_QUEUE"));
        }

        Ok(Self {
            remote_url,
            api_key,
            data_dir,
            push_pacing,
            realtime_queue,
            reconnect_base,
            reconnect_cap,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            data_dir: PathBuf::from("./divvy-data"),
            push_pacing: Duration::from_millis(200),
            realtime_queue: 32,
            reconnect_base: Duration::from_secs(5),
            reconnect_cap: Duration::from_secs(300),
        }
    }
}

fn millis_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.remote_url.is_none());
        assert_eq!(config.push_pacing, Duration::from_millis(200));
        assert_eq!(config.realtime_queue, 32);
        assert!(config.reconnect_base < config.reconnect_cap);
    }
}
