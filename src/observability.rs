//! Process-wide counters, modeled as an injected [`MetricsSink`] so tests
//! can assert counter deltas rather than scraping `/metrics`. Prometheus/OTel
//! exposition itself is a pass-through collaborator handled elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters the report window needs "fetched and reset" at close.
pub trait MetricsSink: Send + Sync {
    fn request_received(&self);
    fn bad_request(&self);
    fn bad_endpoint(&self, endpoint: &str, version: &str, reason: &str);
    fn validation_result(&self, valid: bool);
    fn record_response_duration(&self, micros: u64);

    /// Snapshot the counters that feed `Report.Metrics` and reset them for
    /// the next window, matching the "fetched and reset" semantics.
    fn drain(&self) -> MetricsSnapshot;
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub requests_received: u64,
    pub bad_requests: u64,
    pub validation_errors: u64,
    pub response_duration_avg_micros: u64,
    /// (endpoint, version, reason) -> count, drained from *BadEndpoints*.
    pub bad_endpoints: Vec<(String, String, String, u64)>,
}

/// In-process atomic-counter implementation. `bad_endpoints` needs a mutex
/// because it is keyed, not a flat counter.
#[derive(Default)]
pub struct AtomicMetrics {
    requests_received: AtomicU64,
    bad_requests: AtomicU64,
    validations_valid: AtomicU64,
    validations_invalid: AtomicU64,
    response_duration_sum_micros: AtomicU64,
    response_duration_count: AtomicU64,
    bad_endpoints: Mutex<HashMap<(String, String, String), u64>>,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for AtomicMetrics {
    fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    fn bad_request(&self) {
        self.bad_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn bad_endpoint(&self, endpoint: &str, version: &str, reason: &str) {
        let key = (endpoint.to_string(), version.to_string(), reason.to_string());
        let mut guard = self.bad_endpoints.lock().unwrap();
        *guard.entry(key).or_insert(0) += 1;
    }

    fn validation_result(&self, valid: bool) {
        if valid {
            self.validations_valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.validations_invalid.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_response_duration(&self, micros: u64) {
        self.response_duration_sum_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.response_duration_count.fetch_add(1, Ordering::Relaxed);
    }

    fn drain(&self) -> MetricsSnapshot {
        let requests_received = self.requests_received.swap(0, Ordering::Relaxed);
        let bad_requests = self.bad_requests.swap(0, Ordering::Relaxed);
        let validation_errors = self.validations_invalid.swap(0, Ordering::Relaxed);
        self.validations_valid.swap(0, Ordering::Relaxed);
        let duration_sum = self.response_duration_sum_micros.swap(0, Ordering::Relaxed);
        let duration_count = self.response_duration_count.swap(0, Ordering::Relaxed);
        let response_duration_avg_micros = if duration_count > 0 {
            duration_sum / duration_count
        } else {
            0
        };

        let bad_endpoints = std::mem::take(&mut *self.bad_endpoints.lock().unwrap())
            .into_iter()
            .map(|((endpoint, version, reason), count)| (endpoint, version, reason, count))
            .collect();

        MetricsSnapshot {
            requests_received,
            bad_requests,
            validation_errors,
            response_duration_avg_micros,
            bad_endpoints,
        }
    }
}
