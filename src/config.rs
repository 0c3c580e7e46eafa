use crate::error::ConfigError;
use std::env;

/// Configuration loaded from environment variables
///
/// Both sources are optional individually, but at least one must be set or
/// the pipeline has nothing to poll. Validation happens once at startup;
/// a bad value is fatal before the poll loop is entered.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint for the block source, if block polling is enabled.
    pub rpc_url: Option<String>,
    /// GraphQL endpoint for the windowed activity source, if enabled.
    pub graph_url: Option<String>,
    pub db_path: String,
    /// Idle sleep between poll cycles, seconds.
    pub poll_interval_secs: u64,
    /// Width of each windowed query, seconds.
    pub window_secs: i64,
    /// How far behind real time the indexer is assumed to lag; a window is
    /// only queried once its end is at least this old, seconds.
    pub lag_buffer_secs: i64,
    /// Fetch retries per cycle before the cycle is abandoned.
    pub max_retries: u32,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    /// Events older than this are swept by retention, seconds.
    pub retention_secs: i64,
    /// Sweep cadence, seconds.
    pub retention_interval_secs: u64,
    /// Copy swept events into the archive tables before deleting.
    pub archive_on_retention: bool,
    pub rust_log: Option<String>,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError(format!("{} is not a valid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            rpc_url: env::var("RPC_URL").ok().filter(|s| !s.trim().is_empty()),
            graph_url: env::var("GRAPH_URL").ok().filter(|s| !s.trim().is_empty()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "chainflow.db".to_string()),
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", 10)?,
            window_secs: parse_var("WINDOW_SECS", 3600)?,
            lag_buffer_secs: parse_var("LAG_BUFFER_SECS", 300)?,
            max_retries: parse_var("MAX_RETRIES", 5)?,
            backoff_initial_secs: parse_var("BACKOFF_INITIAL_SECS", 1)?,
            backoff_max_secs: parse_var("BACKOFF_MAX_SECS", 60)?,
            retention_secs: parse_var("RETENTION_SECS", 86_400)?,
            retention_interval_secs: parse_var("RETENTION_INTERVAL_SECS", 3600)?,
            archive_on_retention: parse_var("ARCHIVE_ON_RETENTION", true)?,
            rust_log: env::var("RUST_LOG").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.is_none() && self.graph_url.is_none() {
            return Err(ConfigError(
                "at least one of RPC_URL or GRAPH_URL must be set".to_string(),
            ));
        }
        for url in [&self.rpc_url, &self.graph_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError(format!("not an http(s) url: {}", url)));
            }
        }
        if self.db_path.trim().is_empty() {
            return Err(ConfigError("DB_PATH must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError("POLL_INTERVAL_SECS must be positive".to_string()));
        }
        if self.window_secs <= 0 {
            return Err(ConfigError("WINDOW_SECS must be positive".to_string()));
        }
        if self.lag_buffer_secs < 0 {
            return Err(ConfigError("LAG_BUFFER_SECS must not be negative".to_string()));
        }
        if self.backoff_initial_secs == 0 || self.backoff_max_secs < self.backoff_initial_secs {
            return Err(ConfigError(
                "backoff bounds must satisfy 0 < initial <= max".to_string(),
            ));
        }
        if self.retention_secs <= 0 {
            return Err(ConfigError("RETENTION_SECS must be positive".to_string()));
        }
        Ok(())
    }
}
