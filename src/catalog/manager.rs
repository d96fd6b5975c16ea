//! The catalog manager: fetches the versioned schema/endpoint catalog from
//! the central authority, incrementally materializes per-endpoint schema
//! documents, and atomically swaps the catalog in front of live traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::client::{CentralAuthorityClient, ClientError};
use super::settings::{ApiSettingWire, EndpointCatalogEntryWire, TopLevelDocument};
use super::CatalogStore;
use crate::model::{CatalogEntry, CatalogSnapshot, ThroughputClass};
use crate::report::Report;

const TOP_LEVEL_DOCUMENT_PATH: &str = "api_configuration.json";
const DIAGNOSTIC_LOG_CAPACITY: usize = 200;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("fetch from central authority failed: {0}")]
    Fetch(#[from] ClientError),
    #[error("configuration document was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CatalogManagerState {
    Init = 0,
    Loading = 1,
    Ready = 2,
    Refreshing = 3,
    Fatal = 4,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: i64,
}

/// One entry in the bounded diagnostic log of failed refresh attempts.
#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

type EndpointListCacheKey = (String, String);

pub struct CatalogManager {
    store: Arc<CatalogStore>,
    client: CentralAuthorityClient,
    client_id: String,
    is_transmitter: bool,
    state: AtomicU8,
    diagnostics: Mutex<VecDeque<DiagnosticEntry>>,
    token: Mutex<Option<CachedToken>>,
    /// `(group, api)` -> `(version, materialized endpoints)`, reused across
    /// refreshes when the api's version is unchanged.
    endpoint_cache: Mutex<HashMap<EndpointListCacheKey, (String, Vec<EndpointCatalogEntryWire>)>>,
    current_document_version: Mutex<Option<String>>,
}

impl CatalogManager {
    pub fn new(
        store: Arc<CatalogStore>,
        client: CentralAuthorityClient,
        client_id: String,
        is_transmitter: bool,
    ) -> Self {
        Self {
            store,
            client,
            client_id,
            is_transmitter,
            state: AtomicU8::new(CatalogManagerState::Init as u8),
            diagnostics: Mutex::new(VecDeque::new()),
            token: Mutex::new(None),
            endpoint_cache: Mutex::new(HashMap::new()),
            current_document_version: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CatalogManagerState {
        match self.state.load(Ordering::Relaxed) {
            0 => CatalogManagerState::Init,
            1 => CatalogManagerState::Loading,
            2 => CatalogManagerState::Ready,
            3 => CatalogManagerState::Refreshing,
            _ => CatalogManagerState::Fatal,
        }
    }

    fn set_state(&self, state: CatalogManagerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn lookup(&self, endpoint_name: &str) -> Option<(CatalogEntry, String)> {
        let snapshot = self.store.snapshot();
        snapshot
            .lookup(endpoint_name)
            .map(|(entry, version)| (entry.clone(), version.to_string()))
    }

    pub fn sampling_rate(&self, class: ThroughputClass) -> u8 {
        self.store.snapshot().sampling_rate(class)
    }

    pub async fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.diagnostics.lock().await.iter().cloned().collect()
    }

    /// Initial fetch on startup. A failure here is fatal — the caller maps
    /// the error to a non-zero exit code rather than retrying.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        self.set_state(CatalogManagerState::Loading);
        match self.refresh_inner(true).await {
            Ok(()) => {
                self.set_state(CatalogManagerState::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_state(CatalogManagerState::Fatal);
                Err(e)
            }
        }
    }

    /// Incremental refresh. Failures are logged and the current snapshot
    /// is preserved — never fatal after the first successful load.
    pub async fn refresh(&self) {
        self.set_state(CatalogManagerState::Refreshing);
        if let Err(e) = self.refresh_inner(false).await {
            warn!(error = %e, "catalog refresh failed, keeping previous snapshot");
            self.record_diagnostic(e.to_string()).await;
        }
        self.set_state(CatalogManagerState::Ready);
    }

    /// Spawns the periodic refresh ticker. Returns the join handle so the
    /// bootstrap can track this long-lived background task.
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }

    async fn refresh_inner(&self, is_initial: bool) -> Result<(), ManagerError> {
        let raw = self
            .client
            .load_api_configuration_file(TOP_LEVEL_DOCUMENT_PATH)
            .await?;
        let document: TopLevelDocument = serde_json::from_str(&raw)?;

        {
            let current_version = self.current_document_version.lock().await;
            if !is_initial && current_version.as_deref() == Some(document.version.as_str()) {
                info!(version = %document.version, "catalog version unchanged, skipping refresh");
                return Ok(());
            }
        }

        let rates = document.validation_settings.normalize_rates(self.is_transmitter);
        let mut entries: HashMap<(String, String), Vec<CatalogEntry>> = HashMap::new();

        for group in &document.validation_settings.api_group_settings {
            for api in &group.api_list {
                let endpoint_list = self.materialize_endpoint_list(group, api).await?;
                let catalog_entries: Vec<CatalogEntry> = endpoint_list
                    .iter()
                    .map(|raw_entry| CatalogEntry {
                        endpoint: raw_entry.endpoint.clone(),
                        endpoint_base: api.endpoint_base.clone(),
                        version: api.version.clone(),
                        throughput_class: raw_entry.throughput_class.unwrap_or(ThroughputClass::Medium),
                        header_schema: raw_entry.header_schema.clone(),
                        body_schema: raw_entry.body_schema.clone(),
                        api_group: group.group.clone(),
                        api_name: api.name.clone(),
                    })
                    .collect();

                entries.insert((group.group.clone(), api.name.clone()), catalog_entries);
            }
        }

        let snapshot = CatalogSnapshot {
            version: document.version.clone(),
            entries,
            validation_rate_by_class: rates,
        };

        self.store.swap(snapshot);
        *self.current_document_version.lock().await = Some(document.version.clone());
        info!(version = %document.version, "catalog snapshot updated");
        Ok(())
    }

    /// Fetches `<groupBase>/<apiBase>/<version>/response/endpoints.json`
    /// unless the api's version is unchanged from the previous refresh, in
    /// which case the cached list is reused.
    async fn materialize_endpoint_list(
        &self,
        group: &super::settings::ApiGroupSettingWire,
        api: &ApiSettingWire,
    ) -> Result<Vec<EndpointCatalogEntryWire>, ManagerError> {
        let key = (group.group.clone(), api.name.clone());

        {
            let cache = self.endpoint_cache.lock().await;
            if let Some((cached_version, list)) = cache.get(&key) {
                if cached_version == &api.version {
                    return Ok(list.clone());
                }
            }
        }

        let rel_path = endpoint_catalog_path(&group.base_path, &api.base_path, &api.version);
        let raw = self.client.load_api_configuration_file(&rel_path).await?;
        let list: Vec<EndpointCatalogEntryWire> = serde_json::from_str(&raw)?;

        self.endpoint_cache
            .lock()
            .await
            .insert(key, (api.version.clone(), list.clone()));

        Ok(list)
    }

    async fn record_diagnostic(&self, message: String) {
        let mut diagnostics = self.diagnostics.lock().await;
        diagnostics.push_back(DiagnosticEntry {
            at: Utc::now(),
            message,
        });
        while diagnostics.len() > DIAGNOSTIC_LOG_CAPACITY {
            diagnostics.pop_front();
        }
    }

    /// Acquires a cached (or freshly fetched) JWT and uploads the report.
    /// A failure is logged but never retried — the next reporting window
    /// produces a fresh report.
    pub async fn send_report(&self, report: Report) -> Result<(), ManagerError> {
        let access_token = self.access_token().await?;
        if let Err(e) = self.client.send_report(&access_token, &report).await {
            error!(error = %e, "report upload failed");
            return Err(e.into());
        }
        Ok(())
    }

    async fn access_token(&self) -> Result<String, ManagerError> {
        {
            let cached = self.token.lock().await;
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let response = self.client.fetch_token().await?;
        let expires_at = decode_expiry(&response.access_token)
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(response.expires_in as i64));

        let mut cached = self.token.lock().await;
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            expires_at,
        });

        Ok(response.access_token)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The version string of the catalog snapshot currently in effect,
    /// surfaced in report metrics as `Configuration.Version`.
    pub fn current_catalog_version(&self) -> String {
        self.store.snapshot().version.clone()
    }
}

fn endpoint_catalog_path(group_base: &str, api_base: &str, version: &str) -> String {
    let joined = format!("{group_base}/{api_base}/{version}/response/endpoints.json");
    joined
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decodes the `exp` claim out of an opaque access token without
/// verifying its signature — the central authority, not this probe, signs
/// tokens; we only need to know when to ask for a new one.
fn decode_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    let data = jsonwebtoken::decode::<TokenClaims>(access_token, &DecodingKey::from_secret(b""), &validation)
        .ok()?;

    DateTime::from_timestamp(data.claims.exp, 0)
}
