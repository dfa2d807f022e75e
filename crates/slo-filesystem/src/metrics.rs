//! Reconciler self metrics.

use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Counters of processed objective files.
#[derive(Debug, Clone)]
pub struct ReconcileMetrics {
    registry: Arc<RwLock<Registry>>,
    reconciles: Counter,
    errors: Counter,
}

impl ReconcileMetrics {
    /// Creates the counters in a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // The text encoder appends `_total` to counter names.
        let reconciles = Counter::default();
        registry.register(
            "pyrra_filesystem_reconciles",
            "The amount of reconciles",
            reconciles.clone(),
        );

        let errors = Counter::default();
        registry.register(
            "pyrra_filesystem_reconciles_errors",
            "The amount of errors during reconciles",
            errors.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            reconciles,
            errors,
        }
    }

    /// Counts a file taken up for reconciliation.
    pub fn inc_reconciles(&self) {
        self.reconciles.inc();
    }

    /// Counts a failed reconciliation.
    pub fn inc_errors(&self) {
        self.errors.inc();
    }

    /// Files reconciled so far.
    #[must_use]
    pub fn reconciles(&self) -> u64 {
        self.reconciles.get()
    }

    /// Failed reconciliations so far.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Encodes all metrics in the Prometheus text format.
    #[must_use]
    pub fn encode(&self) -> String {
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("failed to encode reconcile metrics");
            return String::new();
        }
        buffer
    }
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = ReconcileMetrics::new();
        assert_eq!(metrics.reconciles(), 0);
        assert_eq!(metrics.errors(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = ReconcileMetrics::new();
        let clone = metrics.clone();
        clone.inc_reconciles();
        clone.inc_reconciles();
        clone.inc_errors();
        assert_eq!(metrics.reconciles(), 2);
        assert_eq!(metrics.errors(), 1);
    }

    #[test]
    fn encodes_counter_names() {
        let metrics = ReconcileMetrics::new();
        metrics.inc_reconciles();
        let output = metrics.encode();
        assert!(output.contains("pyrra_filesystem_reconciles_total 1"));
        assert!(output.contains("pyrra_filesystem_reconciles_errors_total 0"));
        assert!(output.contains("# TYPE pyrra_filesystem_reconciles counter"));
    }
}
