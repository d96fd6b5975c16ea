//! Process wiring: builds the catalog manager, aggregator, worker pool and
//! ingest server, and spawns the long-lived background tasks that keep
//! them running (refresh ticker, report ticker, worker loop, ingest
//! server).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::aggregator::Aggregator;
use crate::catalog::client::{CentralAuthorityClient, ClientError};
use crate::catalog::manager::{CatalogManager, ManagerError};
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::ingest::state::AppState;
use crate::observability::AtomicMetrics;
use crate::{ingest, queue, worker};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to build central authority client: {0}")]
    Client(#[from] ClientError),
    #[error("initial catalog load failed: {0}")]
    CatalogFatal(#[from] ManagerError),
    #[error("ingest server failed: {0}")]
    Server(String),
}

/// Wires the ingest plane, worker pool, aggregator and catalog manager
/// together and runs until the ingest server stops. A failure here before
/// the ingest server starts is a fatal first-load configuration failure.
pub async fn run(config: Config) -> Result<(), BootstrapError> {
    let is_transmitter = config.identity.application_mode == crate::config::ApplicationMode::Transmitter;
    let client_id = config.identity.server_org_id.to_string();

    let client = CentralAuthorityClient::new(
        config.catalog.server_url.clone(),
        config.catalog.client_id.clone().unwrap_or_else(|| client_id.clone()),
        config.catalog.client_cert_file.as_deref(),
        config.catalog.client_key_file.as_deref(),
        config.catalog.fetch_retry_attempts,
        config.catalog.fetch_retry_backoff_ms,
    )?;

    let store = Arc::new(CatalogStore::empty());
    let catalog_manager = Arc::new(CatalogManager::new(store, client, client_id.clone(), is_transmitter));

    info!("loading initial catalog from central authority");
    catalog_manager.initialize().await?;

    let _refresh_handle = Arc::clone(&catalog_manager)
        .spawn_refresh_loop(Duration::from_secs(config.catalog.refresh_interval_secs));

    let metrics: Arc<dyn crate::observability::MetricsSink> = Arc::new(AtomicMetrics::new());

    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&metrics),
        Arc::clone(&catalog_manager),
        client_id,
        config.identity.environment.clone(),
        config.report.clone(),
        config.aggregator.max_xfapi_ids,
    ));
    let _report_handle = Arc::clone(&aggregator).spawn_timer();

    let (producer, consumer) = queue::channel(config.queue.capacity);

    let _worker_handles = worker::spawn_pool(
        config.worker.pool_size,
        consumer,
        Arc::clone(&catalog_manager),
        Arc::clone(&metrics),
        Arc::clone(&aggregator),
    );

    let state = AppState {
        catalog: catalog_manager,
        producer,
        metrics,
    };

    ingest::run(state, config.server).await.map_err(|e| {
        error!(error = %e, "ingest server exited with error");
        BootstrapError::Server(e.to_string())
    })
}
