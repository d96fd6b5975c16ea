//! Validation worker pool: drains the ingest queue, resolves each message's
//! catalog entry, validates header and body against their schemas, and
//! hands the outcome to the aggregator.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::catalog::manager::CatalogManager;
use crate::model::ValidationOutcome;
use crate::observability::MetricsSink;
use crate::queue::MessageConsumer;
use crate::validator;

/// Spawns `pool_size` workers sharing one consumer behind a mutex. Only one
/// worker actually holds the lock at a time, but the `recv().await` inside
/// it yields immediately on an empty queue, so contention stays low even
/// with a small pool.
pub fn spawn_pool(
    pool_size: usize,
    consumer: MessageConsumer,
    catalog: Arc<CatalogManager>,
    metrics: Arc<dyn MetricsSink>,
    aggregator: Arc<Aggregator>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let consumer = Arc::new(Mutex::new(consumer));

    (0..pool_size.max(1))
        .map(|worker_id| {
            let consumer = Arc::clone(&consumer);
            let catalog = Arc::clone(&catalog);
            let metrics = Arc::clone(&metrics);
            let aggregator = Arc::clone(&aggregator);

            tokio::spawn(async move {
                loop {
                    let message = {
                        let mut guard = consumer.lock().await;
                        guard.recv().await
                    };

                    let Some(message) = message else {
                        debug!(worker_id, "queue closed, worker exiting");
                        break;
                    };

                    process(&message, &catalog, metrics.as_ref(), &aggregator).await;
                }
            })
        })
        .collect()
}

async fn process(
    message: &crate::model::IngestMessage,
    catalog: &CatalogManager,
    metrics: &dyn MetricsSink,
    aggregator: &Aggregator,
) {
    // A catalog entry can disappear between admission and processing if a
    // refresh landed in between; treat that as a silent drop rather than an
    // error.
    let Some((entry, _version)) = catalog.lookup(&message.endpoint_name) else {
        warn!(endpoint = %message.endpoint_name, "catalog entry vanished before validation, dropping message");
        return;
    };

    let mut errors = std::collections::HashMap::new();

    match validator::validate(&message.header_json, &entry.header_schema) {
        Ok(report) => merge_errors(&mut errors, report.errors),
        Err(e) => warn!(endpoint = %message.endpoint_name, error = %e, "header schema failed to compile"),
    }

    match validator::validate(&message.body_json, &entry.body_schema) {
        Ok(report) => merge_errors(&mut errors, report.errors),
        Err(e) => warn!(endpoint = %message.endpoint_name, error = %e, "body schema failed to compile"),
    }

    let valid = errors.is_empty();
    metrics.validation_result(valid);

    let outcome = ValidationOutcome {
        endpoint_name: message.endpoint_name.clone(),
        server_org_id: message.server_org_id,
        x_fapi_interaction_id: message.x_fapi_interaction_id,
        http_method: message.http_method.clone(),
        valid,
        errors,
    };

    aggregator.append(outcome).await;
}

/// Combines the header- and body-schema error maps into the single
/// `fieldPath -> [errorKind, ...]` map `ValidationOutcome` carries. Field
/// paths are the schema validator's own dotted paths, unprefixed.
fn merge_errors(
    into: &mut std::collections::HashMap<String, Vec<String>>,
    errors: std::collections::HashMap<String, Vec<String>>,
) {
    for (field, details) in errors {
        into.entry(field).or_default().extend(details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_errors_combines_without_prefix() {
        let mut into = std::collections::HashMap::new();
        let mut errors = std::collections::HashMap::new();
        errors.insert("data.0".to_string(), vec!["id is required".to_string()]);
        merge_errors(&mut into, errors);
        assert!(into.contains_key("data.0"));
    }

    #[test]
    fn merge_errors_extends_existing_field() {
        let mut into = std::collections::HashMap::new();
        into.insert("data.0".to_string(), vec!["first".to_string()]);
        let mut errors = std::collections::HashMap::new();
        errors.insert("data.0".to_string(), vec!["second".to_string()]);
        merge_errors(&mut into, errors);
        assert_eq!(into["data.0"], vec!["first".to_string(), "second".to_string()]);
    }
}
