//! Result aggregator: folds validation outcomes into an in-memory,
//! per-server, per-endpoint, per-field rollup and flushes it as a
//! [`Report`] on a timer, on a send-on-count threshold, or both — sharing
//! one mutex-guarded window so exactly one report is sent per close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::manager::CatalogManager;
use crate::config::ReportConfig;
use crate::model::ValidationOutcome;
use crate::observability::MetricsSink;
use crate::report::{ErrorDetail, FieldDetail, Report, ServerSummary};

#[derive(Default)]
struct ServerBucket {
    total: u64,
    by_endpoint: HashMap<String, EndpointBucket>,
}

#[derive(Default)]
struct EndpointBucket {
    total: u64,
    invalid: u64,
    by_field: HashMap<String, HashMap<String, FieldErrorBucket>>,
}

#[derive(Default)]
struct FieldErrorBucket {
    count: u64,
    x_fapi_ids: Vec<String>,
}

struct AggregatorState {
    window_start: DateTime<Utc>,
    requests_since_send: u64,
    by_server: HashMap<Uuid, ServerBucket>,
}

impl AggregatorState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            requests_since_send: 0,
            by_server: HashMap::new(),
        }
    }

    fn record(&mut self, outcome: ValidationOutcome, max_xfapi_ids: usize) {
        self.requests_since_send += 1;

        let server = self.by_server.entry(outcome.server_org_id).or_default();
        server.total += 1;

        let endpoint = server.by_endpoint.entry(outcome.endpoint_name).or_default();
        endpoint.total += 1;

        if !outcome.errors.is_empty() {
            endpoint.invalid += 1;
            let x_fapi_id = outcome.x_fapi_interaction_id.to_string();
            for (field, kinds) in outcome.errors {
                let field_map = endpoint.by_field.entry(field).or_default();
                for kind in kinds {
                    let bucket = field_map.entry(kind).or_default();
                    bucket.count += 1;
                    // Drop-newest once the cap is reached; count keeps growing regardless.
                    if bucket.x_fapi_ids.len() < max_xfapi_ids {
                        bucket.x_fapi_ids.push(x_fapi_id.clone());
                    }
                }
            }
        }
    }

    /// Moves the window out and re-opens a fresh one, all under the same
    /// lock — the "swap" that guarantees no double-counting.
    fn take(&mut self, now: DateTime<Utc>) -> DrainedWindow {
        let drained = DrainedWindow {
            window_start: self.window_start,
            window_end: now,
            by_server: std::mem::take(&mut self.by_server),
        };
        self.window_start = now;
        self.requests_since_send = 0;
        drained
    }
}

struct DrainedWindow {
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    by_server: HashMap<Uuid, ServerBucket>,
}

pub struct Aggregator {
    state: Mutex<AggregatorState>,
    metrics: Arc<dyn MetricsSink>,
    catalog: Arc<CatalogManager>,
    client_id: String,
    environment: String,
    report_config: ReportConfig,
    max_xfapi_ids: usize,
}

impl Aggregator {
    pub fn new(
        metrics: Arc<dyn MetricsSink>,
        catalog: Arc<CatalogManager>,
        client_id: String,
        environment: String,
        report_config: ReportConfig,
        max_xfapi_ids: usize,
    ) -> Self {
        Self {
            state: Mutex::new(AggregatorState::new(Utc::now())),
            metrics,
            catalog,
            client_id,
            environment,
            report_config,
            max_xfapi_ids,
        }
    }

    /// Appends one outcome. Triggers an immediate window close when
    /// `ReportExecutionNumber` is configured and the threshold is crossed,
    /// under the same lock that guards the count, so a concurrent timer
    /// tick cannot double-send.
    pub async fn append(&self, outcome: ValidationOutcome) {
        let drained = {
            let mut state = self.state.lock().await;
            state.record(outcome, self.max_xfapi_ids);

            if self.report_config.execution_number > 0
                && state.requests_since_send >= self.report_config.execution_number
            {
                Some(state.take(Utc::now()))
            } else {
                None
            }
        };

        if let Some(drained) = drained {
            self.close_and_send(drained).await;
        }
    }

    /// Spawns the report-window ticker. Sends an initial liveness report
    /// before the first tick.
    pub fn spawn_timer(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.send_startup_report().await;

            let period = Duration::from_secs(self.report_config.execution_window_minutes.max(1) * 60);
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately

            loop {
                ticker.tick().await;
                let drained = {
                    let mut state = self.state.lock().await;
                    state.take(Utc::now())
                };
                self.close_and_send(drained).await;
            }
        })
    }

    async fn send_startup_report(&self) {
        let now = Utc::now();
        let empty = DrainedWindow {
            window_start: now,
            window_end: now,
            by_server: HashMap::new(),
        };
        self.close_and_send(empty).await;
    }

    async fn close_and_send(&self, drained: DrainedWindow) {
        let report = self.build_report(drained);
        info!(client_id = %self.client_id, "dispatching report to central authority");
        if let Err(e) = self.catalog.send_report(report).await {
            warn!(error = %e, "report upload failed, will retry next window");
        }
    }

    fn build_report(&self, drained: DrainedWindow) -> Report {
        let snapshot = self.metrics.drain();
        let generation_started = Utc::now();

        let total_requests: u64 = drained.by_server.values().map(|s| s.total).sum();

        let mut metrics = crate::report::MetricsBlock::default();
        metrics.push("ReportStartDate", drained.window_start.to_rfc3339());
        metrics.push("ReportEndDate", drained.window_end.to_rfc3339());
        metrics.push("BadRequestErrors", snapshot.bad_requests.to_string());
        metrics.push("TotalRequests", total_requests.to_string());
        metrics.push("MemoryUsageAvg", resident_memory_kb().to_string());
        metrics.push(
            "ResponseTimeAvg",
            snapshot.response_duration_avg_micros.to_string(),
        );
        metrics.push(
            "ReportGenerationTime",
            (Utc::now() - generation_started).num_milliseconds().to_string(),
        );
        metrics.push("Configuration.Version", self.catalog.current_catalog_version());
        metrics.push("Configuration.Environment", self.environment.clone());
        metrics.push(
            "Configuration.REPORT_EXECUTION_WINDOW",
            self.report_config.execution_window_minutes.to_string(),
        );

        let unsupported_endpoints = snapshot
            .bad_endpoints
            .into_iter()
            .map(|(endpoint_name, _version, _reason, count)| crate::report::UnsupportedEndpoint {
                endpoint_name,
                count,
            })
            .collect();

        let server_summary = drained
            .by_server
            .into_iter()
            .map(|(server_id, bucket)| ServerSummary {
                server_id: server_id.to_string(),
                total_requests: bucket.total,
                endpoint_summary: bucket
                    .by_endpoint
                    .into_iter()
                    .map(|(endpoint_name, endpoint)| crate::report::EndpointSummary {
                        endpoint_name,
                        total_requests: endpoint.total,
                        validation_errors: endpoint.invalid,
                        detail: endpoint
                            .by_field
                            .into_iter()
                            .map(|(field, kinds)| FieldDetail {
                                field,
                                details: kinds
                                    .into_iter()
                                    .map(|(error_type, bucket)| ErrorDetail {
                                        error_type,
                                        total_count: bucket.count,
                                        x_fapi_list: bucket.x_fapi_ids,
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Report {
            metrics,
            client_id: self.client_id.clone(),
            unsupported_endpoints,
            server_summary,
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_kb() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| statm.split_whitespace().nth(1).map(str::to_string))
        .and_then(|pages| pages.parse::<u64>().ok())
        .map(|pages| pages * (page_size_kb()))
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn page_size_kb() -> u64 {
    4
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kb() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(server: Uuid, endpoint: &str, valid: bool) -> ValidationOutcome {
        let mut errors = HashMap::new();
        if !valid {
            errors.insert("data.0".to_string(), vec!["id is required".to_string()]);
        }
        ValidationOutcome {
            endpoint_name: endpoint.to_string(),
            server_org_id: server,
            x_fapi_interaction_id: Uuid::nil(),
            http_method: "POST".to_string(),
            valid,
            errors,
        }
    }

    #[tokio::test]
    async fn record_increments_total_and_invalid_counts() {
        let mut state = AggregatorState::new(Utc::now());
        let server = Uuid::new_v4();
        state.record(outcome(server, "/accounts/v2/accounts", true), 1000);
        state.record(outcome(server, "/accounts/v2/accounts", false), 1000);

        let bucket = &state.by_server[&server].by_endpoint["/accounts/v2/accounts"];
        assert_eq!(bucket.total, 2);
        assert_eq!(bucket.invalid, 1);
        assert!(bucket.by_field.contains_key("data.0"));
        let _ = json!({});
    }

    #[tokio::test]
    async fn take_resets_window_and_counts() {
        let mut state = AggregatorState::new(Utc::now());
        state.record(outcome(Uuid::new_v4(), "/ep", true), 1000);
        assert_eq!(state.requests_since_send, 1);

        let drained = state.take(Utc::now());
        assert_eq!(drained.by_server.len(), 1);
        assert_eq!(state.requests_since_send, 0);
        assert!(state.by_server.is_empty());
    }

    #[tokio::test]
    async fn xfapi_ids_are_capped_with_drop_newest() {
        let mut state = AggregatorState::new(Utc::now());
        for _ in 0..5 {
            state.record(outcome(Uuid::nil(), "/ep", false), 2);
        }

        let bucket = &state.by_server[&Uuid::nil()].by_endpoint["/ep"].by_field["data.0"]["id is required"];
        assert_eq!(bucket.count, 5);
        assert_eq!(bucket.x_fapi_ids.len(), 2);
    }

    /// A schema violation on `data.0` surfaces in the built report with the
    /// exact field, error kind and x-fapi id that produced it.
    #[tokio::test]
    async fn build_report_reflects_schema_violation_scenario() {
        let store = Arc::new(crate::catalog::CatalogStore::empty());
        let client = crate::catalog::client::CentralAuthorityClient::new(
            "https://central.example.invalid".to_string(),
            "probe-1".to_string(),
            None,
            None,
            1,
            1,
        )
        .unwrap();
        let catalog = Arc::new(CatalogManager::new(store, client, "probe-1".to_string(), true));
        let metrics: Arc<dyn MetricsSink> = Arc::new(crate::observability::AtomicMetrics::new());
        let aggregator = Aggregator::new(
            metrics,
            catalog,
            "probe-client".to_string(),
            "PROD".to_string(),
            ReportConfig::default(),
            1000,
        );

        let server = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        let x_fapi = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        let mut errors = HashMap::new();
        errors.insert("data.0".to_string(), vec!["id is required".to_string()]);
        let outcome = ValidationOutcome {
            endpoint_name: "/accounts/v2/accounts".to_string(),
            server_org_id: server,
            x_fapi_interaction_id: x_fapi,
            http_method: "POST".to_string(),
            valid: false,
            errors,
        };

        {
            let mut state = aggregator.state.lock().await;
            state.record(outcome, aggregator.max_xfapi_ids);
        }

        let drained = {
            let mut state = aggregator.state.lock().await;
            state.take(Utc::now())
        };
        let report = aggregator.build_report(drained);

        assert_eq!(report.server_summary.len(), 1);
        let server_summary = &report.server_summary[0];
        assert_eq!(server_summary.server_id, server.to_string());
        assert_eq!(server_summary.total_requests, 1);

        let endpoint = &server_summary.endpoint_summary[0];
        assert_eq!(endpoint.endpoint_name, "/accounts/v2/accounts");
        assert_eq!(endpoint.total_requests, 1);
        assert_eq!(endpoint.validation_errors, 1);

        let field = &endpoint.detail[0];
        assert_eq!(field.field, "data.0");
        assert_eq!(field.details[0].error_type, "id is required");
        assert_eq!(field.details[0].total_count, 1);
        assert_eq!(field.details[0].x_fapi_list, vec![x_fapi.to_string()]);
    }
}
