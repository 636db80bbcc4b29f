//! Pool configuration.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;

/// Default pool ceiling.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Limits applied to the pool created by [`DbHelper::connect`](crate::DbHelper::connect).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection before failing.
    pub acquire_timeout_secs: u64,
    /// Idle connections are closed after this many seconds.
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout_secs: 5,
            idle_timeout_secs: Some(600),
            max_lifetime_secs: Some(1800),
        }
    }
}

impl DbConfig {
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub(crate) fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(self.idle_timeout_secs.map(Duration::from_secs))
            .max_lifetime(self.max_lifetime_secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: DbConfig = serde_json::from_str(r#"{ "max_connections": 3 }"#).unwrap();
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.acquire_timeout_secs, 5);
        assert_eq!(config.idle_timeout_secs, Some(600));
    }

    #[test]
    fn null_disables_idle_timeout() {
        let config: DbConfig = serde_json::from_str(r#"{ "idle_timeout_secs": null }"#).unwrap();
        assert_eq!(config.idle_timeout_secs, None);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn pool_options_follow_config() {
        let options = DbConfig::default().with_max_connections(2).pool_options();
        assert_eq!(options.get_max_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
    }
}
