use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// The root configuration structure for the runtime.
///
/// Every section has full defaults, so a missing `runtime.toml` yields a
/// working local configuration and individual keys can be overridden from
/// the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub sink: SinkSettings,
    #[serde(default)]
    pub market: MarketSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_concurrent_runs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.max_concurrent_runs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.executor.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.tick_interval_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.dispatch.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.poll_interval_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.dispatch.lease_duration_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.lease_duration_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.dispatch.max_retries < 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.max_retries".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if self.dispatch.backoff_cap_secs < self.dispatch.backoff_base_secs {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.backoff_cap_secs".to_string(),
                reason: "must be >= backoff_base_secs".to_string(),
            });
        }
        Ok(())
    }
}

/// Parameters for the strategy executor's bounded run pool.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    /// Upper bound on concurrently live execution units. `Start` returns a
    /// pool-exhausted backpressure error past this point.
    pub max_concurrent_runs: usize,
    /// Seconds between strategy evaluation ticks.
    pub tick_interval_secs: u64,
    /// How long `Stop` waits for a unit to observe cancellation before
    /// force-marking the run Stopped.
    pub stop_grace_secs: u64,
    /// Whether boot runs the restore pass that reattaches execution units to
    /// runs left Running by the previous process.
    pub restore_on_boot: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 16,
            tick_interval_secs: 60,
            stop_grace_secs: 5,
            restore_on_boot: true,
        }
    }
}

impl ExecutorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Parameters for the pending-order dispatch worker.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Seconds between queue polls.
    pub poll_interval_secs: u64,
    /// Seconds a dispatch lease is held before other workers may reclaim the
    /// order.
    pub lease_duration_secs: i64,
    /// Transient delivery failures tolerated before an order is terminalized
    /// as Failed.
    pub max_retries: i32,
    /// Maximum orders leased per poll.
    pub batch_size: i64,
    /// First retry delay; doubles per retry up to `backoff_cap_secs`.
    pub backoff_base_secs: i64,
    pub backoff_cap_secs: i64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            lease_duration_secs: 30,
            max_retries: 3,
            batch_size: 32,
            backoff_base_secs: 2,
            backoff_cap_secs: 300,
        }
    }
}

impl DispatchSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_duration_secs)
    }
}

/// Parameters for the outbound webhook signal sink.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkSettings {
    /// Target URL for dispatched signals. Empty disables real delivery,
    /// which is only useful for local dry runs.
    pub webhook_url: String,
    pub timeout_secs: u64,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: 10,
        }
    }
}

impl SinkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parameters for the ticker-price source the execution units poll.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    /// Ticker-price endpoint; the instrument is appended as `?symbol=`.
    pub ticker_url: String,
    pub timeout_secs: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            ticker_url: "https://api.binance.com/api/v3/ticker/price".to_string(),
            timeout_secs: 5,
        }
    }
}

impl MarketSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
