//! The catalog store: a thread-safe, copy-on-write snapshot of endpoint
//! settings and JSON Schemas. The [`CatalogManager`] (see [`manager`]) is
//! the only writer; every other component only ever reads a snapshot.

pub mod client;
pub mod manager;
pub mod settings;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::model::CatalogSnapshot;

/// Copy-on-write pointer to the current [`CatalogSnapshot`]. Readers take
/// [`CatalogStore::snapshot`] for the duration of a lookup; the writer
/// (catalog manager) swaps the whole pointer atomically, so concurrent
/// lookups never observe a partial mixture of old and new state.
pub struct CatalogStore {
    current: ArcSwap<CatalogSnapshot>,
}

impl CatalogStore {
    pub fn new(initial: CatalogSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn empty() -> Self {
        Self::new(CatalogSnapshot::empty())
    }

    /// Returns a cheap `Arc` clone of the snapshot currently in effect.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    /// Atomically replaces the snapshot. Readers mid-lookup keep the
    /// `Arc` they already loaded; new lookups see the replacement.
    pub fn swap(&self, new: CatalogSnapshot) {
        self.current.store(Arc::new(new));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogEntry, ThroughputClass};
    use std::collections::HashMap;

    fn snapshot_with_version(version: &str) -> CatalogSnapshot {
        let mut entries = HashMap::new();
        entries.insert(
            ("accounts".to_string(), "accounts".to_string()),
            vec![CatalogEntry {
                endpoint: String::new(),
                endpoint_base: "/accounts/v2/accounts".to_string(),
                version: version.to_string(),
                throughput_class: ThroughputClass::Medium,
                header_schema: "{}".to_string(),
                body_schema: "{}".to_string(),
                api_group: "accounts".to_string(),
                api_name: "accounts".to_string(),
            }],
        );
        CatalogSnapshot {
            version: version.to_string(),
            entries,
            validation_rate_by_class: HashMap::new(),
        }
    }

    #[test]
    fn swap_replaces_snapshot_atomically() {
        let store = CatalogStore::new(snapshot_with_version("1.0.0"));
        assert_eq!(store.snapshot().version, "1.0.0");

        store.swap(snapshot_with_version("2.0.0"));
        assert_eq!(store.snapshot().version, "2.0.0");
    }

    #[test]
    fn readers_hold_old_snapshot_through_a_swap() {
        let store = CatalogStore::new(snapshot_with_version("1.0.0"));
        let held = store.snapshot();
        store.swap(snapshot_with_version("2.0.0"));

        assert_eq!(held.version, "1.0.0");
        assert_eq!(store.snapshot().version, "2.0.0");
    }
}
