//! Queue and submission counters exposed to an external observer.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::observability::metrics;

/// Counters describing executor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Transactions that finished executing, whatever the outcome.
    pub total_transactions: u64,
    /// Transactions queued but not yet dispatched.
    pub transactions_in_queue: u64,
}

/// Receives counter updates from the executor.
pub trait DiagnosticsUpdater: Send + Sync {
    fn update_diagnostics(&self, update: &mut dyn FnMut(&mut Diagnostics));
}

/// In-memory diagnostics sink that also mirrors counters into metrics gauges.
#[derive(Debug, Clone, Default)]
pub struct SharedDiagnostics {
    inner: Arc<Mutex<Diagnostics>>,
}

impl SharedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Diagnostics {
        *self.inner.lock().expect("diagnostics mutex poisoned")
    }
}

impl DiagnosticsUpdater for SharedDiagnostics {
    fn update_diagnostics(&self, update: &mut dyn FnMut(&mut Diagnostics)) {
        let mut diagnostics = self.inner.lock().expect("diagnostics mutex poisoned");
        update(&mut diagnostics);
        metrics::record_queue_depth(diagnostics.transactions_in_queue);
        metrics::record_total_transactions(diagnostics.total_transactions);
    }
}
