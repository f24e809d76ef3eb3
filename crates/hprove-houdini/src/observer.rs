//! Observer fan-out for engine lifecycle events.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use hprove_smt::Outcome;

/// Receives engine lifecycle events. All methods default to no-ops; events
/// borrow the observer immutably, so observers cannot mutate engine state.
pub trait HoudiniObserver: Send + Sync {
    fn on_start(&self) {}
    fn on_iteration(&self) {}
    fn on_implementation(&self, _name: &str) {}
    fn on_assignment(&self, _assignment: &IndexMap<String, bool>) {}
    fn on_outcome(&self, _outcome: Outcome) {}
    fn on_enqueue(&self, _name: &str) {}
    fn on_dequeue(&self, _name: &str) {}
    fn on_constant(&self, _name: &str, _value: bool) {}
    fn on_end(&self) {}
    fn on_flush_start(&self) {}
    fn on_flush_finish(&self) {}
    fn on_exception(&self, _message: &str) {}
}

/// Broadcasts events to registered observers in insertion order.
#[derive(Default)]
pub struct ObserverHub {
    observers: Vec<Arc<dyn HoudiniObserver>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. Registering the same observer twice is a
    /// no-op; returns whether it was added.
    pub fn register(&mut self, observer: Arc<dyn HoudiniObserver>) -> bool {
        if self.observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Dispatches one event to every observer, in insertion order.
    pub fn notify(&self, event: impl Fn(&dyn HoudiniObserver)) {
        for observer in &self.observers {
            event(observer.as_ref());
        }
    }
}

/// An observer that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl HoudiniObserver for TracingObserver {
    fn on_start(&self) {
        info!("inference started");
    }

    fn on_implementation(&self, name: &str) {
        debug!("verifying {name}");
    }

    fn on_outcome(&self, outcome: Outcome) {
        debug!("outcome: {outcome:?}");
    }

    fn on_enqueue(&self, name: &str) {
        debug!("enqueued {name}");
    }

    fn on_dequeue(&self, name: &str) {
        debug!("dequeued {name}");
    }

    fn on_constant(&self, name: &str, value: bool) {
        info!("candidate {name} := {value}");
    }

    fn on_end(&self) {
        info!("inference finished");
    }

    fn on_flush_start(&self) {
        info!("flushing work list after a genuine error");
    }

    fn on_exception(&self, message: &str) {
        tracing::error!("inference aborted: {message}");
    }
}
