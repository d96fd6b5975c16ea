//! Configuration management for the probe.
//!
//! Settings are loaded from three layers, highest priority first:
//! 1. The mandatory environment variables named in the external-interface
//!    contract (`SERVER_ORG_ID`, `APPLICATION_MODE`, `ENVIRONMENT`, ...).
//! 2. `MQD__*` environment overrides for ambient tunables (queue capacity,
//!    worker pool size, report window, ...).
//! 3. A TOML file (default `config/mqd.toml`, overridable via `MQD_CONFIG`).
//! 4. Struct defaults.
//!
//! # Usage
//!
//! ```no_run
//! use mqd_probe::config::Config;
//!
//! let config = Config::load().expect("failed to load configuration");
//! println!("Listening on: {}", config.server.bind_addr);
//! ```

mod models;
mod sources;
mod validation;

pub use models::{
    AggregatorConfig, ApplicationMode, CatalogConfig, Config, IdentityConfig, InboundTlsConfig,
    QueueConfig, ReportConfig, ServerConfig, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (mandatory env + `MQD__*` + TOML file).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file is malformed, a mandatory
    /// environment variable is missing or malformed, or cross-field
    /// validation fails (e.g. an incomplete mTLS pair).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific TOML path, bypassing `MQD_CONFIG`.
    /// Useful for tests that want an isolated fixture file.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn with_identity_env<F: FnOnce()>(f: F) {
        unsafe {
            std::env::set_var("SERVER_ORG_ID", "11111111-1111-1111-1111-111111111111");
            std::env::set_var("APPLICATION_MODE", "TRANSMITTER");
        }
        f();
        unsafe {
            std::env::remove_var("SERVER_ORG_ID");
            std::env::remove_var("APPLICATION_MODE");
        }
    }

    #[test]
    fn load_minimal_config_applies_defaults() {
        with_identity_env(|| {
            let temp_dir = TempDir::new().unwrap();
            let config_path = temp_dir.path().join("test.toml");
            fs::write(&config_path, "").unwrap();

            let config = Config::load_from_path(config_path).unwrap();
            assert_eq!(config.queue.capacity, 1000);
            assert_eq!(config.worker.pool_size, 1);
            assert_eq!(config.aggregator.max_xfapi_ids, 1000);
        });
    }

    #[test]
    fn load_full_config_example() {
        with_identity_env(|| {
            let temp_dir = TempDir::new().unwrap();
            let config_path = temp_dir.path().join("test.toml");

            let toml_content = r#"
[server]
bind_addr = "0.0.0.0:9090"
read_timeout_secs = 20
write_timeout_secs = 20

[catalog]
server_url = "https://central.example.org"
refresh_interval_secs = 7200

[report]
execution_window_minutes = 10
execution_number = 0

[queue]
capacity = 500

[worker]
pool_size = 4

[aggregator]
max_xfapi_ids = 250
            "#;

            fs::write(&config_path, toml_content).unwrap();

            let config = Config::load_from_path(config_path).unwrap();
            assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:9090");
            assert_eq!(config.catalog.server_url, "https://central.example.org");
            assert_eq!(config.queue.capacity, 500);
            assert_eq!(config.worker.pool_size, 4);
            assert_eq!(config.aggregator.max_xfapi_ids, 250);
        });
    }
}
