use super::models::{ApplicationMode, Config, IdentityConfig, LayeredSettings};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;
use uuid::Uuid;

const CONFIG_ENV_VAR: &str = "MQD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mqd.toml";
const ENV_PREFIX: &str = "MQD";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from all sources with priority (highest to lowest):
/// 1. The environment variables named explicitly in the external interface
///    contract (`SERVER_ORG_ID`, `APPLICATION_MODE`, `ENVIRONMENT`, ...)
/// 2. `MQD__*` environment overrides for the ambient tunables
/// 3. A TOML file (default `config/mqd.toml`, overridable via `MQD_CONFIG`)
/// 4. Struct defaults
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let layered = load_layered(config_path)?;
    let identity = load_identity()?;

    Ok(assemble(layered, identity))
}

/// Load configuration from a specific TOML path, bypassing `MQD_CONFIG`.
/// Used by tests that want an isolated fixture file.
pub fn load_from_path(path: PathBuf) -> Result<Config, ConfigError> {
    let layered = load_layered(path)?;
    let identity = load_identity()?;
    Ok(assemble(layered, identity))
}

fn load_layered(config_path: PathBuf) -> Result<LayeredSettings, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// Read the settings the external-interface contract names directly. A
/// missing or malformed mandatory value is a fatal startup condition, not a
/// recoverable `ConfigError::LoadError` (the caller maps this to a non-zero
/// exit code per the documented exit-code policy).
fn load_identity() -> Result<IdentityConfig, ConfigError> {
    let server_org_id_raw = env::var("SERVER_ORG_ID")
        .map_err(|_| ConfigError::NotFound("SERVER_ORG_ID".to_string()))?;
    let server_org_id = Uuid::parse_str(&server_org_id_raw).map_err(|e| {
        ConfigError::Message(format!("SERVER_ORG_ID is not a valid UUID: {e}"))
    })?;

    let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "PROD".to_string());
    let is_dev = !environment.eq_ignore_ascii_case("PROD");

    let application_mode_raw = env::var("APPLICATION_MODE")
        .map_err(|_| ConfigError::NotFound("APPLICATION_MODE".to_string()))?;
    let application_mode = ApplicationMode::parse(&application_mode_raw).ok_or_else(|| {
        ConfigError::Message(format!(
            "APPLICATION_MODE must be TRANSMITTER or RECEIVER, got '{application_mode_raw}'"
        ))
    })?;

    let logging_level = env::var("LOGGING_LEVEL").unwrap_or_else(|_| {
        if is_dev { "DEBUG" } else { "WARNING" }.to_string()
    });

    Ok(IdentityConfig {
        server_org_id,
        application_mode,
        environment,
        logging_level,
    })
}

fn assemble(mut layered: LayeredSettings, identity: IdentityConfig) -> Config {
    if let Ok(port) = env::var("API_PORT") {
        let addr = if let Some(stripped) = port.strip_prefix(':') {
            format!("0.0.0.0:{stripped}")
        } else if port.contains(':') {
            port.clone()
        } else {
            format!("0.0.0.0:{port}")
        };
        if let Ok(parsed) = addr.parse() {
            layered.server.bind_addr = parsed;
        } else {
            tracing::warn!(port, "Ignoring unparseable API_PORT override");
        }
    }

    if let Ok(url) = env::var("PROXY_URL") {
        layered.catalog.server_url = url;
    }
    if layered.catalog.client_id.is_none() {
        layered.catalog.client_id = Some(identity.server_org_id.to_string());
    }
    if let Ok(crt) = env::var("CLIENT_CRT_FILE") {
        layered.catalog.client_cert_file = Some(PathBuf::from(crt));
    }
    if let Ok(key) = env::var("CLIENT_KEY_FILE") {
        layered.catalog.client_key_file = Some(PathBuf::from(key));
    }

    if let Ok(window) = env::var("REPORT_EXECUTION_WINDOW") {
        if let Ok(minutes) = window.parse() {
            layered.report.execution_window_minutes = minutes;
        }
    } else if identity.is_dev() {
        layered.report.execution_window_minutes = 1;
    }

    if let Ok(count) = env::var("REPORT_EXECUTION_NUMBER") {
        if let Ok(n) = count.parse() {
            layered.report.execution_number = n;
        }
    } else if identity.is_dev() && layered.report.execution_number == 0 {
        layered.report.execution_number = 30;
    }

    if identity.is_dev() && env::var("MQD__CATALOG__REFRESH_INTERVAL_SECS").is_err() {
        layered.catalog.refresh_interval_secs = 2 * 60;
    }

    if env::var("ENABLE_HTTPS").map(|v| v == "true" || v == "1").unwrap_or(false) {
        if let (Ok(cert), Ok(key)) = (env::var("CERT_FILE_PATH"), env::var("KEY_FILE_PATH")) {
            layered.server.tls = Some(super::models::InboundTlsConfig {
                cert_file: PathBuf::from(cert),
                key_file: PathBuf::from(key),
            });
        }
    }

    Config {
        server: layered.server,
        identity,
        catalog: layered.catalog,
        report: layered.report,
        queue: layered.queue,
        worker: layered.worker,
        aggregator: layered.aggregator,
    }
}
