//! Router-level integration tests for the ingest plane, driven through
//! `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tower::ServiceExt;

use mqd_probe::catalog::client::CentralAuthorityClient;
use mqd_probe::catalog::manager::CatalogManager;
use mqd_probe::catalog::CatalogStore;
use mqd_probe::config::ServerConfig;
use mqd_probe::ingest::{router, AppState};
use mqd_probe::model::{CatalogEntry, CatalogSnapshot, ThroughputClass};
use mqd_probe::observability::{AtomicMetrics, MetricsSink};
use mqd_probe::queue;

const SERVER_ORG_ID: &str = "11111111-1111-1111-1111-111111111111";
const X_FAPI_ID: &str = "22222222-2222-2222-2222-222222222222";
const ENDPOINT: &str = "/accounts/v2/accounts";
const VERSION: &str = "2.2.0";

fn snapshot_with_rate(rate: u8, body_schema: &str) -> CatalogSnapshot {
    let mut entries = HashMap::new();
    entries.insert(
        ("accounts".to_string(), "accounts".to_string()),
        vec![CatalogEntry {
            endpoint: String::new(),
            endpoint_base: ENDPOINT.to_string(),
            version: VERSION.to_string(),
            throughput_class: ThroughputClass::Medium,
            header_schema: "{}".to_string(),
            body_schema: body_schema.to_string(),
            api_group: "accounts".to_string(),
            api_name: "accounts".to_string(),
        }],
    );

    let mut validation_rate_by_class = HashMap::new();
    validation_rate_by_class.insert(ThroughputClass::Medium, rate);

    CatalogSnapshot {
        version: "1.0.0".to_string(),
        entries,
        validation_rate_by_class,
    }
}

/// Builds a router plus a handle on the queue consumer (to observe whether a
/// message was actually enqueued) and the concrete metrics sink (to observe
/// counter deltas).
fn build_test_app(rate: u8, body_schema: &str) -> (axum::Router, queue::MessageConsumer, Arc<AtomicMetrics>) {
    let store = Arc::new(CatalogStore::new(snapshot_with_rate(rate, body_schema)));
    let client = CentralAuthorityClient::new(
        "https://central.example.invalid".to_string(),
        "probe-1".to_string(),
        None,
        None,
        1,
        1,
    )
    .unwrap();
    let catalog = Arc::new(CatalogManager::new(store, client, "probe-1".to_string(), true));

    let metrics_impl = Arc::new(AtomicMetrics::new());
    let metrics: Arc<dyn MetricsSink> = metrics_impl.clone();

    let (producer, consumer) = queue::channel(10);

    let state = AppState {
        catalog,
        producer,
        metrics,
    };

    let app = router(state, &ServerConfig::default());
    (app, consumer, metrics_impl)
}

async fn post(app: axum::Router, headers: &[(&str, &str)], body: Value) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/ValidateResponse")
        .header(header::CONTENT_TYPE, "application/json");

    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let request = request.body(Body::from(body.to_string())).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let parsed: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, parsed)
}

/// The happy path: the message is enqueued and the handler returns
/// 200 with the literal enqueue confirmation text.
#[tokio::test]
async fn happy_path_enqueues_and_returns_200() {
    let (app, mut consumer, metrics) = build_test_app(100, "{}");

    let (status, body) = post(
        app,
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
        ],
        serde_json::json!({"data": []}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_str().unwrap(), "Message enqueued for processing!");

    let message = consumer.recv().await.expect("message should be queued");
    assert_eq!(message.endpoint_name, ENDPOINT);

    let snapshot = metrics.drain();
    assert_eq!(snapshot.requests_received, 1);
    assert_eq!(snapshot.bad_requests, 0);
}

/// A malformed `serverOrgId` is rejected at gate 1 before any
/// other gate runs, and increments `BadRequests`.
#[tokio::test]
async fn bad_server_org_id_returns_400() {
    let (app, _consumer, metrics) = build_test_app(100, "{}");

    let (status, body) = post(
        app,
        &[
            ("serverOrgId", "not-a-uuid"),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
        ],
        serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["Message"].as_str().unwrap(),
        "serverOrgId: Not found or bad format."
    );
    assert_eq!(metrics.drain().bad_requests, 1);
}

/// An endpoint absent from the catalog is rejected at gate 4 and
/// recorded as an unsupported endpoint with reason "Endpoint not supported".
#[tokio::test]
async fn unknown_endpoint_returns_400_and_is_counted() {
    let (app, _consumer, metrics) = build_test_app(100, "{}");

    let (status, body) = post(
        app,
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", "/unknown"),
        ],
        serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["Message"].as_str().unwrap(),
        "endpointName: Not found or bad format."
    );

    let snapshot = metrics.drain();
    assert_eq!(snapshot.bad_endpoints.len(), 1);
    let (endpoint, version, reason, count) = &snapshot.bad_endpoints[0];
    assert_eq!(endpoint.as_str(), "/unknown");
    assert_eq!(version.as_str(), "N.A.");
    assert_eq!(reason.as_str(), "Endpoint not supported");
    assert_eq!(*count, 1);
}

/// A `version` header that disagrees with the catalog's version is
/// rejected at gate 5 with the documented message shape.
#[tokio::test]
async fn version_mismatch_returns_400_and_is_counted() {
    let (app, _consumer, metrics) = build_test_app(100, "{}");

    let (status, body) = post(
        app,
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
            ("version", "9.9.9"),
        ],
        serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["Message"].as_str().unwrap(),
        format!("version: not supported for as endpoint: {ENDPOINT}")
    );

    let snapshot = metrics.drain();
    assert_eq!(snapshot.bad_endpoints.len(), 1);
    assert_eq!(snapshot.bad_endpoints[0].2, "Version not supported");
}

/// Sampling: a zero-rate class is accepted (200) but never actually
/// enqueued.
#[tokio::test]
async fn zero_sampling_rate_accepts_but_does_not_enqueue() {
    let (app, mut consumer, _metrics) = build_test_app(0, "{}");

    let (status, body) = post(
        app,
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
        ],
        serde_json::json!({"data": []}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_str().unwrap(), "Message sampled out, not enqueued for processing!");

    let received = timeout(Duration::from_millis(50), consumer.recv()).await;
    assert!(received.is_err(), "sampled-out request must not reach the queue");
}

/// After a catalog swap renames the endpoint, old-path requests
/// return 400 and the new path returns 200 — no request ever observes a
/// partial mixture of old and new state.
#[tokio::test]
async fn catalog_swap_flips_admission_without_500s() {
    let store = Arc::new(CatalogStore::new(snapshot_with_rate(100, "{}")));
    let client = CentralAuthorityClient::new(
        "https://central.example.invalid".to_string(),
        "probe-1".to_string(),
        None,
        None,
        1,
        1,
    )
    .unwrap();
    let catalog = Arc::new(CatalogManager::new(
        Arc::clone(&store),
        client,
        "probe-1".to_string(),
        true,
    ));
    let metrics: Arc<dyn MetricsSink> = Arc::new(AtomicMetrics::new());
    let (producer, _consumer) = queue::channel(10);
    let state = AppState {
        catalog,
        producer,
        metrics,
    };

    let app = router(state, &ServerConfig::default());
    let (status, _) = post(
        app.clone(),
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
        ],
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut renamed = snapshot_with_rate(100, "{}");
    let mut entries = HashMap::new();
    entries.insert(
        ("accounts".to_string(), "accounts".to_string()),
        vec![CatalogEntry {
            endpoint: String::new(),
            endpoint_base: "/accounts/v3/accounts".to_string(),
            version: VERSION.to_string(),
            throughput_class: ThroughputClass::Medium,
            header_schema: "{}".to_string(),
            body_schema: "{}".to_string(),
            api_group: "accounts".to_string(),
            api_name: "accounts".to_string(),
        }],
    );
    renamed.entries = entries;
    store.swap(renamed);

    let (status_old, _) = post(
        app.clone(),
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", ENDPOINT),
        ],
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status_old, StatusCode::BAD_REQUEST);

    let (status_new, _) = post(
        app,
        &[
            ("serverOrgId", SERVER_ORG_ID),
            ("x-fapi-interaction-id", X_FAPI_ID),
            ("endpointName", "/accounts/v3/accounts"),
        ],
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status_new, StatusCode::OK);
}
