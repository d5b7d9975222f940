//! In-process metrics registry — four counter families per loaded driver.
//!
//! Keyed on `(driver_kind_name, driver_id)` so reload can pre-register a
//! fresh zero-valued sample for every driver in the new snapshot without
//! clobbering counters for drivers that survive the reload under the same
//! id. No exporter lives here; wiring this to a text-format endpoint is an
//! external collaborator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::driver::DriverKind;

#[derive(Debug, Default)]
pub struct DriverCounters {
    pub requests_count: AtomicU64,
    pub requests_failed: AtomicU64,
    pub requests_finished: AtomicU64,
    pub requests_time_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverMetricKey {
    pub kind: DriverKind,
    pub driver_id: i32,
}

pub type MetricsRegistry = Arc<DashMap<DriverMetricKey, Arc<DriverCounters>>>;

/// Create an empty registry.
pub fn new_registry() -> MetricsRegistry {
    Arc::new(DashMap::new())
}

/// Pre-register a zero-valued sample for a driver. Idempotent: calling
/// again for the same key is a no-op, so reload can call this for every
/// driver in the new snapshot without resetting survivors.
pub fn register(registry: &MetricsRegistry, key: DriverMetricKey) {
    registry.entry(key).or_insert_with(|| Arc::new(DriverCounters::default()));
}

pub fn record_request(registry: &MetricsRegistry, key: DriverMetricKey) {
    if let Some(counters) = registry.get(&key) {
        counters.requests_count.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_failure(registry: &MetricsRegistry, key: DriverMetricKey) {
    if let Some(counters) = registry.get(&key) {
        counters.requests_failed.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_finished(registry: &MetricsRegistry, key: DriverMetricKey, elapsed_ms: u64) {
    if let Some(counters) = registry.get(&key) {
        counters.requests_finished.fetch_add(1, Ordering::Relaxed);
        counters.requests_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = new_registry();
        let key = DriverMetricKey { kind: DriverKind::Csv, driver_id: 7 };
        register(&registry, key);
        record_request(&registry, key);
        register(&registry, key);
        let counters = registry.get(&key).unwrap();
        assert_eq!(counters.requests_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn recording_against_unregistered_key_is_a_noop() {
        let registry = new_registry();
        let key = DriverMetricKey { kind: DriverKind::Sip, driver_id: 1 };
        record_request(&registry, key);
        assert!(registry.get(&key).is_none());
    }
}
