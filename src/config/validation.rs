use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("queue capacity must be positive")]
    InvalidQueueCapacity,

    #[error("worker pool size must be positive")]
    InvalidWorkerPoolSize,

    #[error("aggregator max_xfapi_ids must be positive")]
    InvalidMaxXfapiIds,

    #[error("report execution_window_minutes must be positive")]
    InvalidReportWindow,

    #[error("mTLS requires both client_cert_file and client_key_file, or neither")]
    IncompleteMtlsPair,

    #[error("inbound TLS requires both cert_file and key_file")]
    IncompleteInboundTlsPair,
}

/// Validate the entire configuration once all sources have been merged.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.queue.capacity == 0 {
        return Err(ValidationError::InvalidQueueCapacity);
    }
    if config.worker.pool_size == 0 {
        return Err(ValidationError::InvalidWorkerPoolSize);
    }
    if config.aggregator.max_xfapi_ids == 0 {
        return Err(ValidationError::InvalidMaxXfapiIds);
    }
    if config.report.execution_window_minutes == 0 {
        return Err(ValidationError::InvalidReportWindow);
    }

    let has_cert = config.catalog.client_cert_file.is_some();
    let has_key = config.catalog.client_key_file.is_some();
    if has_cert != has_key {
        return Err(ValidationError::IncompleteMtlsPair);
    }

    if let Some(tls) = &config.server.tls {
        if tls.cert_file.as_os_str().is_empty() || tls.key_file.as_os_str().is_empty() {
            return Err(ValidationError::IncompleteInboundTlsPair);
        }
    }

    Ok(())
}
