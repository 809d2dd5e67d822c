//! The metrics collaborator interface and its in-memory implementation.
//!
//! The pool does not know which metrics backend the embedding service uses;
//! it is handed a [`StatsScope`] and registers its instruments by name.
//! [`InMemoryScope`] is the default backend-free implementation, also used
//! by tests to assert on counter values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const ORDER_TYPE: Ordering = Ordering::Relaxed;

/// A monotonically increasing counter.
pub trait Counter: Send + Sync {
    /// Increments the counter by one.
    fn inc(&self);
}

/// A gauge that can move in both directions.
pub trait Gauge: Send + Sync {
    /// Increments the gauge by one.
    fn inc(&self);
    /// Decrements the gauge by one.
    fn dec(&self);
}

/// A named scope in which the pool registers its instruments.
///
/// Calling `new_counter`/`new_gauge` twice with the same name must yield
/// handles to the same underlying instrument.
pub trait StatsScope: Send + Sync {
    /// Returns the counter registered under `name`, creating it if needed.
    fn new_counter(&self, name: &str) -> Arc<dyn Counter>;
    /// Returns the gauge registered under `name`, creating it if needed.
    fn new_gauge(&self, name: &str) -> Arc<dyn Gauge>;
}

/// Counter backed by a relaxed atomic.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Returns the current counter value.
    pub fn value(&self) -> u64 {
        self.value.load(ORDER_TYPE)
    }
}

impl Counter for AtomicCounter {
    fn inc(&self) {
        self.value.fetch_add(1, ORDER_TYPE);
    }
}

/// Gauge backed by a relaxed atomic.
#[derive(Debug, Default)]
pub struct AtomicGauge {
    value: AtomicI64,
}

impl AtomicGauge {
    /// Returns the current gauge value.
    pub fn value(&self) -> i64 {
        self.value.load(ORDER_TYPE)
    }
}

impl Gauge for AtomicGauge {
    fn inc(&self) {
        self.value.fetch_add(1, ORDER_TYPE);
    }

    fn dec(&self) {
        self.value.fetch_sub(1, ORDER_TYPE);
    }
}

/// A [`StatsScope`] that keeps all instruments in process memory.
#[derive(Debug, Default)]
pub struct InMemoryScope {
    counters: Mutex<HashMap<String, Arc<AtomicCounter>>>,
    gauges: Mutex<HashMap<String, Arc<AtomicGauge>>>,
}

impl InMemoryScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        InMemoryScope::default()
    }

    /// Returns the value of the counter registered under `name`,
    /// or zero if it was never registered.
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .expect("metrics mutex poisoned")
            .get(name)
            .map(|c| c.value())
            .unwrap_or(0)
    }

    /// Returns the value of the gauge registered under `name`,
    /// or zero if it was never registered.
    pub fn gauge_value(&self, name: &str) -> i64 {
        self.gauges
            .lock()
            .expect("metrics mutex poisoned")
            .get(name)
            .map(|g| g.value())
            .unwrap_or(0)
    }
}

impl StatsScope for InMemoryScope {
    fn new_counter(&self, name: &str) -> Arc<dyn Counter> {
        let mut counters = self.counters.lock().expect("metrics mutex poisoned");
        let counter = Arc::clone(counters.entry(name.to_string()).or_default());
        counter
    }

    fn new_gauge(&self, name: &str) -> Arc<dyn Gauge> {
        let mut gauges = self.gauges.lock().expect("metrics mutex poisoned");
        let gauge = Arc::clone(gauges.entry(name.to_string()).or_default());
        gauge
    }
}
