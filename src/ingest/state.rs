use std::sync::Arc;

use crate::catalog::manager::CatalogManager;
use crate::observability::MetricsSink;
use crate::queue::MessageProducer;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogManager>,
    pub producer: MessageProducer,
    pub metrics: Arc<dyn MetricsSink>,
}
