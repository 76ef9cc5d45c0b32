use std::time::Instant;

use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};

use crate::Error;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "sns_operator_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds"
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &[],
        )
        .expect("static histogram options are valid");
        let failures = IntCounterVec::new(
            opts!(
                "sns_operator_reconciliation_errors_total",
                "reconciliation errors"
            ),
            &["instance", "error"],
        )
        .expect("static counter options are valid");
        let reconciliations =
            IntCounter::new("sns_operator_reconciliations_total", "reconciliations")
                .expect("static counter options are valid");
        Metrics {
            reconciliations,
            failures,
            reconcile_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure<K: ResourceExt>(&self, obj: &K, e: &Error) {
        self.failures
            .with_label_values(&[obj.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.with_label_values(&[]).observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Topic;

    #[test]
    fn counts_reconciles_and_failures() {
        let registry = Registry::new();
        let metrics = Metrics::default().register(&registry).unwrap();

        drop(metrics.count_and_measure());
        metrics.reconcile_failure(
            &Topic::new("orders", Default::default()),
            &Error::InvalidPolicy("eof".into()),
        );

        assert_eq!(metrics.reconciliations.get(), 1);
        assert_eq!(
            metrics
                .failures
                .with_label_values(&["orders", "invalid_policy"])
                .get(),
            1
        );
        assert_eq!(
            metrics.reconcile_duration.with_label_values(&[]).get_sample_count(),
            1
        );
        assert_eq!(registry.gather().len(), 3);
    }
}
