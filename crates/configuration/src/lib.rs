use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{DispatchSettings, ExecutorSettings, MarketSettings, Settings, SinkSettings};

/// Loads the runtime configuration from the `runtime.toml` file.
///
/// This function is the primary entry point for this crate. It reads the
/// configuration file, overlays any `MERIDIAN_`-prefixed environment
/// variables (e.g. `MERIDIAN_DISPATCH__LEASE_DURATION_SECS=45`), and
/// deserializes the result into our strongly-typed `Settings` struct.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from("runtime.toml")
}

/// Loads configuration from an explicit path; used by the CLI's `--config`
/// flag and by tests.
pub fn load_settings_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("MERIDIAN")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}
