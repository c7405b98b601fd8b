//! Metrics collection for observability
//!
//! Prometheus metrics for the inventory core.
//!
//! # Metrics
//!
//! - `stock_mutations_total` - Committed stock mutations
//! - `stock_allocation_breaches_total` - Dispatches rejected by the guardrail
//! - `stock_negative_rejections_total` - Mutations rejected for negative stock
//! - `stock_ceiling_warnings_total` - Additions committed above the ceiling
//! - `stock_items_created_total` - Items created
//! - `stock_allocations_total` - Allocation requests recorded
//! - `stock_mutation_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Committed mutations
    pub mutations_total: IntCounter,

    /// Guardrail rejections
    pub allocation_breaches_total: IntCounter,

    /// Negative stock rejections
    pub negative_stock_rejections_total: IntCounter,

    /// Ceiling warnings
    pub ceiling_warnings_total: IntCounter,

    /// Items created
    pub items_created_total: IntCounter,

    /// Allocation requests
    pub allocations_total: IntCounter,

    /// Mutation duration histogram
    pub mutation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let mutations_total =
            IntCounter::new("stock_mutations_total", "Committed stock mutations")?;
        registry.register(Box::new(mutations_total.clone()))?;

        let allocation_breaches_total = IntCounter::new(
            "stock_allocation_breaches_total",
            "Dispatches rejected because they would consume allocated stock",
        )?;
        registry.register(Box::new(allocation_breaches_total.clone()))?;

        let negative_stock_rejections_total = IntCounter::new(
            "stock_negative_rejections_total",
            "Mutations rejected because stock would go negative",
        )?;
        registry.register(Box::new(negative_stock_rejections_total.clone()))?;

        let ceiling_warnings_total = IntCounter::new(
            "stock_ceiling_warnings_total",
            "Additions committed above the advisory ceiling",
        )?;
        registry.register(Box::new(ceiling_warnings_total.clone()))?;

        let items_created_total =
            IntCounter::new("stock_items_created_total", "Items created")?;
        registry.register(Box::new(items_created_total.clone()))?;

        let allocations_total =
            IntCounter::new("stock_allocations_total", "Allocation requests recorded")?;
        registry.register(Box::new(allocations_total.clone()))?;

        let mutation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "stock_mutation_duration_seconds",
                "Histogram of mutation commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(mutation_duration.clone()))?;

        Ok(Self {
            mutations_total,
            allocation_breaches_total,
            negative_stock_rejections_total,
            ceiling_warnings_total,
            items_created_total,
            allocations_total,
            mutation_duration,
            registry,
        })
    }

    /// Record committed mutation
    pub fn record_mutation(&self, duration_seconds: f64, ceiling_warning: bool) {
        self.mutations_total.inc();
        self.mutation_duration.observe(duration_seconds);
        if ceiling_warning {
            self.ceiling_warnings_total.inc();
        }
    }

    /// Record a rejected mutation; infrastructure failures are not counted
    pub fn record_rejection(&self, error: &crate::Error) {
        match error {
            crate::Error::AllocationBreach(_) => self.allocation_breaches_total.inc(),
            crate::Error::NegativeStockResult { .. } => {
                self.negative_stock_rejections_total.inc()
            }
            _ => {}
        }
    }

    /// Record item creation
    pub fn record_item_created(&self) {
        self.items_created_total.inc();
    }

    /// Record allocation request
    pub fn record_allocation(&self) {
        self.allocations_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::AllocationBreach;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.mutations_total.get(), 0);
        assert_eq!(metrics.items_created_total.get(), 0);
        // Independent registries never collide
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_mutation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_mutation(0.002, false);
        metrics.record_mutation(0.003, true);
        assert_eq!(metrics.mutations_total.get(), 2);
        assert_eq!(metrics.ceiling_warnings_total.get(), 1);
        assert_eq!(metrics.mutation_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection(&crate::Error::AllocationBreach(AllocationBreach {
            current_stock: 10,
            allocated_stock: 5,
            available_for_use: 5,
            requested_change: 6,
        }));
        metrics.record_rejection(&crate::Error::NegativeStockResult {
            current_stock: 0,
            quantity_change: -1,
        });
        metrics.record_rejection(&crate::Error::Storage("disk".to_string()));
        assert_eq!(metrics.allocation_breaches_total.get(), 1);
        assert_eq!(metrics.negative_stock_rejections_total.get(), 1);
    }

    #[test]
    fn test_registry_gathers() {
        let metrics = Metrics::new().unwrap();
        metrics.record_item_created();
        let names: Vec<String> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"stock_items_created_total".to_string()));
    }
}
