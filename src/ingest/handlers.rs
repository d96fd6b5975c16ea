//! `POST /ValidateResponse` admission pipeline and the `/metrics`
//! pass-through.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use super::error::IngestError;
use super::sampling::should_enqueue;
use super::state::AppState;
use crate::model::IngestMessage;

/// Pass-through metrics exposition. Prometheus/OTel registration is an
/// external collaborator; this route only proves the handler is reachable.
pub async fn metrics() -> &'static str {
    "metrics exposition is handled by the collector sidecar\n"
}

pub async fn validate_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<&'static str, IngestError> {
    let start = Instant::now();
    state.metrics.request_received();

    let result = admit(&state, &headers, &body).await;

    state
        .metrics
        .record_response_duration(start.elapsed().as_micros() as u64);

    result
}

async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<&'static str, IngestError> {
    // Gate 1: serverOrgId must parse as a UUID.
    let server_org_id = match header_str(headers, "serverOrgId").and_then(|v| Uuid::parse_str(v).ok()) {
        Some(id) => id,
        None => {
            state.metrics.bad_request();
            return Err(IngestError::BadRequest(
                "serverOrgId: Not found or bad format.".to_string(),
            ));
        }
    };

    // Gate 2: x-fapi-interaction-id must parse as a UUID.
    let x_fapi_interaction_id =
        match header_str(headers, "x-fapi-interaction-id").and_then(|v| Uuid::parse_str(v).ok()) {
            Some(id) => id,
            None => {
                state.metrics.bad_request();
                return Err(IngestError::BadRequest(
                    "x-fapi-interaction-id: Not found or bad format.".to_string(),
                ));
            }
        };

    // Gate 3: body must parse as JSON.
    let body_json: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            state.metrics.bad_request();
            return Err(IngestError::BadRequest(
                "body: Not found or bad format.".to_string(),
            ));
        }
    };

    // Gate 4: endpointName must resolve against the catalog.
    let endpoint_name = header_str(headers, "endpointName")
        .ok_or_else(|| {
            state.metrics.bad_request();
            IngestError::BadRequest("endpointName: Not found or bad format.".to_string())
        })?
        .to_string();

    let (entry, catalog_version) = match state.catalog.lookup(&endpoint_name) {
        Some(found) => found,
        None => {
            state
                .metrics
                .bad_endpoint(&endpoint_name, "N.A.", "Endpoint not supported");
            return Err(IngestError::BadRequest(
                "endpointName: Not found or bad format.".to_string(),
            ));
        }
    };

    // Gate 5: an explicit version header must match the catalog version.
    if let Some(requested_version) = header_str(headers, "version") {
        if requested_version != catalog_version {
            state
                .metrics
                .bad_endpoint(&endpoint_name, requested_version, "Version not supported");
            return Err(IngestError::BadRequest(format!(
                "version: not supported for as endpoint: {endpoint_name}"
            )));
        }
    }

    let header_json = capture_headers(headers);
    let message = IngestMessage {
        endpoint_name,
        api_version: header_str(headers, "version").map(str::to_string),
        server_org_id,
        x_fapi_interaction_id,
        http_method: "POST".to_string(),
        header_json,
        body_json,
    };

    // Sampling: drawn after admission, decides whether this accepted
    // request is actually enqueued for validation.
    if !should_enqueue(state.catalog.sampling_rate(entry.throughput_class)) {
        return Ok("Message sampled out, not enqueued for processing!");
    }

    match state.producer.try_enqueue(message) {
        Ok(()) => Ok("Message enqueued for processing!"),
        Err(crate::queue::EnqueueError::Full) => {
            Err(IngestError::QueueFull("queue is full, try again later".to_string()))
        }
        Err(crate::queue::EnqueueError::Closed) => {
            Err(IngestError::Internal("queue is closed".to_string()))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Lowercases every header name and HTML-entity-escapes every value,
/// preserving multi-valued headers as JSON arrays.
fn capture_headers(headers: &HeaderMap) -> Value {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers.iter() {
        let key = name.as_str().to_lowercase();
        let escaped = value
            .to_str()
            .map(|v| html_escape::encode_text(v).to_string())
            .unwrap_or_default();
        grouped.entry(key).or_default().push(escaped);
    }

    let object = grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                Value::String(values.pop().unwrap())
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (key, value)
        })
        .collect();

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn capture_headers_lowercases_keys_and_escapes_values() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Custom", HeaderValue::from_static("<script>"));

        let captured = capture_headers(&headers);
        let object = captured.as_object().unwrap();
        assert!(object.contains_key("x-custom"));
        let value = object["x-custom"].as_str().unwrap();
        assert!(!value.contains('<'));
        assert!(!value.contains('>'));
    }

    #[test]
    fn capture_headers_preserves_multivalue_as_array() {
        let mut headers = HeaderMap::new();
        headers.append("Accept", HeaderValue::from_static("text/html"));
        headers.append("Accept", HeaderValue::from_static("application/json"));

        let captured = capture_headers(&headers);
        let values = captured["accept"].as_array().unwrap();
        assert_eq!(values.len(), 2);
    }
}
