//! Core data model shared by the ingest plane, worker pool, aggregator and
//! catalog manager: [`IngestMessage`], [`CatalogEntry`], [`CatalogSnapshot`]
//! and [`ValidationOutcome`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted validation request, owned by the queue until a worker
/// claims it.
#[derive(Debug, Clone)]
pub struct IngestMessage {
    pub endpoint_name: String,
    pub api_version: Option<String>,
    pub server_org_id: Uuid,
    pub x_fapi_interaction_id: Uuid,
    pub http_method: String,
    /// JSON object of lowercased header names to string/array-of-string
    /// values, each HTML-entity-escaped.
    pub header_json: serde_json::Value,
    /// The raw request body, already parsed as JSON.
    pub body_json: serde_json::Value,
}

/// A coarse throughput bucket assigned to an endpoint by the central
/// catalog; drives the sampling rate applied at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ThroughputClass {
    ExtremelyHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ThroughputClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThroughputClass::ExtremelyHigh => "ExtremelyHigh",
            ThroughputClass::High => "High",
            ThroughputClass::Medium => "Medium",
            ThroughputClass::Low => "Low",
            ThroughputClass::VeryLow => "VeryLow",
        }
    }
}

/// One endpoint's validation configuration, owned exclusively by the
/// catalog store and swapped atomically.
///
/// `endpoint_base` and `endpoint` mirror the central authority's own
/// catalog document: the full route is `endpoint_base + endpoint` (e.g.
/// base `/accounts/v2/accounts` + endpoint `/{accountId}/transactions`).
/// Both are carried separately because lookup matches them in two stages.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub endpoint: String,
    pub endpoint_base: String,
    pub version: String,
    pub throughput_class: ThroughputClass,
    pub header_schema: String,
    pub body_schema: String,
    pub api_group: String,
    pub api_name: String,
}

impl CatalogEntry {
    /// The full endpoint path, as used in reports and logs.
    pub fn endpoint_path(&self) -> String {
        format!("{}{}", self.endpoint_base.trim(), self.endpoint.trim())
    }
}

/// Per-class sampling rate, 0..=100.
pub type ValidationRateByClass = HashMap<ThroughputClass, u8>;

/// Immutable, versioned view of all endpoint configuration currently in
/// effect. Readers take a clone of the `Arc` behind `CatalogStore` and
/// always observe either a pre- or post-swap snapshot in full.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub version: String,
    /// `(api_group, api_name)` -> endpoints for that API.
    pub entries: HashMap<(String, String), Vec<CatalogEntry>>,
    pub validation_rate_by_class: ValidationRateByClass,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        Self {
            version: String::new(),
            entries: HashMap::new(),
            validation_rate_by_class: HashMap::new(),
        }
    }

    /// Two-stage scan matching the central authority's own lookup: find an
    /// API whose `endpoint_base` is a case-insensitive substring of
    /// `endpoint_name`, then within that API find the endpoint whose
    /// `endpoint_base + endpoint` (trimmed, lowercased) equals
    /// `endpoint_name` exactly. Endpoints carry path templates, so a naive
    /// single exact-match lookup would miss legitimate routes.
    pub fn lookup(&self, endpoint_name: &str) -> Option<(&CatalogEntry, &str)> {
        let needle = endpoint_name.trim().to_lowercase();
        for entries in self.entries.values() {
            for entry in entries {
                let base = entry.endpoint_base.trim().to_lowercase();
                if base.is_empty() || !needle.contains(&base) {
                    continue;
                }
                if entry.endpoint_path().trim().to_lowercase() == needle {
                    return Some((entry, entry.version.as_str()));
                }
            }
        }
        None
    }

    pub fn sampling_rate(&self, class: ThroughputClass) -> u8 {
        self.validation_rate_by_class.get(&class).copied().unwrap_or(100)
    }
}

/// Result of validating one [`IngestMessage`] against its catalog entry.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub endpoint_name: String,
    pub server_org_id: Uuid,
    pub x_fapi_interaction_id: Uuid,
    pub http_method: String,
    pub valid: bool,
    /// field-path -> ordered, non-empty list of error descriptions.
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.valid && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(endpoint_base: &str, endpoint: &str) -> CatalogEntry {
        CatalogEntry {
            endpoint: endpoint.to_string(),
            endpoint_base: endpoint_base.to_string(),
            version: "2.2.0".to_string(),
            throughput_class: ThroughputClass::Medium,
            header_schema: "{}".to_string(),
            body_schema: "{}".to_string(),
            api_group: "accounts".to_string(),
            api_name: "accounts".to_string(),
        }
    }

    #[test]
    fn lookup_matches_case_insensitively() {
        let mut snapshot = CatalogSnapshot::empty();
        snapshot.entries.insert(
            ("accounts".into(), "accounts".into()),
            vec![entry("/accounts/v2/accounts", "")],
        );

        assert!(snapshot.lookup("/ACCOUNTS/v2/Accounts").is_some());
        assert!(snapshot.lookup("/unknown").is_none());
    }

    #[test]
    fn lookup_resolves_path_template_suffix() {
        let mut snapshot = CatalogSnapshot::empty();
        snapshot.entries.insert(
            ("accounts".into(), "accounts".into()),
            vec![entry("/accounts/v2/accounts", "/{accountId}/transactions")],
        );

        let (found, version) = snapshot
            .lookup("/accounts/v2/accounts/{accountId}/transactions")
            .expect("should match full templated path");
        assert_eq!(version, "2.2.0");
        assert_eq!(found.endpoint_base, "/accounts/v2/accounts");
    }

    #[test]
    fn sampling_rate_defaults_to_full_validation() {
        let snapshot = CatalogSnapshot::empty();
        assert_eq!(snapshot.sampling_rate(ThroughputClass::High), 100);
    }
}
