use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::time::Duration;

/// Fixed latency buckets, 5ms through 5s.
pub const LATENCY_BUCKETS: [f64; 9] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

/// Process-scoped metrics, constructed once at startup and threaded
/// explicitly through the interceptor chain. Counters and histograms are
/// the only mutable state shared across concurrent calls; prometheus
/// gives them atomic increment semantics.
pub struct Metrics {
    registry: Registry,

    pub calls_total: IntCounterVec,
    pub call_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let calls_total = IntCounterVec::new(
            prometheus::Opts::new("costsource_calls_total", "Total calls by method and outcome"),
            &["method", "outcome"],
        )
        .expect("metric creation failed");
        let call_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "costsource_call_duration_seconds",
                "Call duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method"],
        )
        .expect("metric creation failed");

        registry.register(Box::new(calls_total.clone())).unwrap();
        registry.register(Box::new(call_duration.clone())).unwrap();

        Self {
            registry,
            calls_total,
            call_duration,
        }
    }

    pub fn record_call(&self, method: &str, outcome: &str, duration: Duration) {
        self.calls_total.with_label_values(&[method, outcome]).inc();
        self.call_duration
            .with_label_values(&[method])
            .observe(duration.as_secs_f64());
    }

    /// Counter value for one method/outcome pair. The conformance
    /// concurrency checks assert exactness against this.
    pub fn call_count(&self, method: &str, outcome: &str) -> u64 {
        self.calls_total.with_label_values(&[method, outcome]).get()
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_method_and_outcome() {
        let metrics = Metrics::new();
        metrics.record_call("Name", "ok", Duration::from_millis(2));
        metrics.record_call("Name", "ok", Duration::from_millis(3));
        metrics.record_call("Name", "internal", Duration::from_millis(1));

        assert_eq!(metrics.call_count("Name", "ok"), 2);
        assert_eq!(metrics.call_count("Name", "internal"), 1);
        assert_eq!(metrics.call_count("GetBudgets", "ok"), 0);
    }

    #[test]
    fn histogram_uses_fixed_buckets() {
        let metrics = Metrics::new();
        metrics.record_call("GetCustomCosts", "ok", Duration::from_millis(30));

        let families = metrics.gather();
        let histogram = families
            .iter()
            .find(|f| f.get_name() == "costsource_call_duration_seconds")
            .expect("histogram family");
        let buckets = histogram.get_metric()[0].get_histogram().get_bucket();
        assert_eq!(buckets.len(), LATENCY_BUCKETS.len());
        assert_eq!(buckets[0].get_upper_bound(), 0.005);
        assert_eq!(buckets[8].get_upper_bound(), 5.0);
    }
}
