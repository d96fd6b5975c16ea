//! Report wire format uploaded to the central authority at window close.
//! Kept as typed serde structures so the aggregator and catalog manager
//! exchange a value, not a loose JSON blob.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "Metrics")]
    pub metrics: MetricsBlock,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    #[serde(rename = "UnsupportedEndpoints")]
    pub unsupported_endpoints: Vec<UnsupportedEndpoint>,
    #[serde(rename = "ServerSummary")]
    pub server_summary: Vec<ServerSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsBlock {
    #[serde(rename = "Values")]
    pub values: Vec<MetricValue>,
}

impl MetricsBlock {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.push(MetricValue {
            key: key.into(),
            value: value.into(),
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsupportedEndpoint {
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    #[serde(rename = "Count")]
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    #[serde(rename = "ServerId")]
    pub server_id: String,
    #[serde(rename = "TotalRequests")]
    pub total_requests: u64,
    #[serde(rename = "EndpointSummary")]
    pub endpoint_summary: Vec<EndpointSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSummary {
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    #[serde(rename = "TotalRequests")]
    pub total_requests: u64,
    #[serde(rename = "ValidationErrors")]
    pub validation_errors: u64,
    #[serde(rename = "Detail")]
    pub detail: Vec<FieldDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDetail {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Details")]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "ErrorType")]
    pub error_type: String,
    #[serde(rename = "TotalCount")]
    pub total_count: u64,
    #[serde(rename = "XFapiList")]
    pub x_fapi_list: Vec<String>,
}
