use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Top-level configuration, assembled from environment variables (the
/// mandatory settings named in the external-interfaces contract) layered
/// with a TOML file and `MQD__*` environment overrides for everything else.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub catalog: CatalogConfig,
    pub report: ReportConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub aggregator: AggregatorConfig,
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default)]
    pub tls: Option<InboundTlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
            tls: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_timeout_secs() -> u64 {
    20
}

/// Inbound TLS termination, populated only when `ENABLE_HTTPS` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundTlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Process identity and runtime mode, sourced from the mandatory
/// environment variables rather than the TOML/ambient layer.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub server_org_id: Uuid,
    pub application_mode: ApplicationMode,
    /// Raw `ENVIRONMENT` value, carried verbatim into report metrics.
    pub environment: String,
    pub logging_level: String,
}

impl IdentityConfig {
    pub fn is_dev(&self) -> bool {
        !self.environment.eq_ignore_ascii_case("PROD")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    Transmitter,
    Receiver,
}

impl ApplicationMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "TRANSMITTER" => Some(Self::Transmitter),
            "RECEIVER" => Some(Self::Receiver),
            _ => None,
        }
    }
}

/// Settings for talking to the central authority (catalog fetch, token
/// acquisition, report upload).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub client_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub client_key_file: Option<PathBuf>,
    #[serde(default = "default_fetch_retry_attempts")]
    pub fetch_retry_attempts: u32,
    #[serde(default = "default_fetch_retry_backoff_ms")]
    pub fetch_retry_backoff_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            client_id: None,
            refresh_interval_secs: default_refresh_interval_secs(),
            client_cert_file: None,
            client_key_file: None,
            fetch_retry_attempts: default_fetch_retry_attempts(),
            fetch_retry_backoff_ms: default_fetch_retry_backoff_ms(),
        }
    }
}

fn default_server_url() -> String {
    "https://conformance.directory.opebrasil.org".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    4 * 60 * 60
}

fn default_fetch_retry_attempts() -> u32 {
    3
}

fn default_fetch_retry_backoff_ms() -> u64 {
    1000
}

/// Reporting window and send-on-count thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_execution_window_minutes")]
    pub execution_window_minutes: u64,
    #[serde(default)]
    pub execution_number: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            execution_window_minutes: default_execution_window_minutes(),
            execution_number: 0,
        }
    }
}

fn default_execution_window_minutes() -> u64 {
    10
}

/// Bounded mpsc queue between the ingest server and the worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

/// Validation worker pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_pool_size")]
    pub pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_worker_pool_size(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    1
}

/// Result aggregator bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_max_xfapi_ids")]
    pub max_xfapi_ids: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_xfapi_ids: default_max_xfapi_ids(),
        }
    }
}

fn default_max_xfapi_ids() -> usize {
    1000
}

/// The subset of configuration loaded through the layered `config` crate
/// (TOML file + `MQD__*` environment overrides). Settings that the external
/// interface contract names directly (`SERVER_ORG_ID`, `APPLICATION_MODE`,
/// ...) are read separately in [`super::sources`] and merged in afterward.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LayeredSettings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}
