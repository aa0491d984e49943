//! Prometheus metrics for monitoring the gateway.
//!
//! [`GatewayMetrics`] owns its own [`Registry`] instead of using the process
//! default registry, so several gateways (for example one per test) can live
//! in the same process.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Container for all gateway metrics.
pub struct GatewayMetrics {
    registry: Registry,

    /// Requests by method, route, status and tenant
    pub requests_total: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Requests currently inside the pipeline
    pub active_requests: IntGauge,

    /// Requests rejected by admission control, by route
    pub rate_limited_total: IntCounterVec,

    /// Requests rejected by an open circuit, by backend service
    pub circuit_rejections_total: IntCounterVec,

    /// Failed backend calls by service and failure kind
    pub upstream_errors_total: IntCounterVec,
}

impl GatewayMetrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "gateway_requests_total",
                "Total number of requests processed by the gateway",
            ),
            &["method", "route", "status", "tenant_id"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["method", "route", "tenant_id"],
        )?;

        let active_requests = IntGauge::new(
            "gateway_active_requests",
            "Number of requests currently being processed",
        )?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new(
                "gateway_rate_limited_total",
                "Requests rejected by admission control",
            ),
            &["route"],
        )?;

        let circuit_rejections_total = IntCounterVec::new(
            Opts::new(
                "gateway_circuit_rejections_total",
                "Requests rejected because the backend circuit is open",
            ),
            &["service"],
        )?;

        let upstream_errors_total = IntCounterVec::new(
            Opts::new(
                "gateway_upstream_errors_total",
                "Failed backend calls by failure kind",
            ),
            &["service", "kind"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(circuit_rejections_total.clone()))?;
        registry.register(Box::new(upstream_errors_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            active_requests,
            rate_limited_total,
            circuit_rejections_total,
            upstream_errors_total,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_independent_per_instance() {
        let first = GatewayMetrics::new().unwrap();
        let second = GatewayMetrics::new().unwrap();

        first
            .requests_total
            .with_label_values(&["GET", "finance", "200", "acme"])
            .inc();

        assert_eq!(
            first
                .requests_total
                .with_label_values(&["GET", "finance", "200", "acme"])
                .get(),
            1
        );
        assert_eq!(
            second
                .requests_total
                .with_label_values(&["GET", "finance", "200", "acme"])
                .get(),
            0
        );
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.rate_limited_total.with_label_values(&["auth"]).inc();
        metrics
            .upstream_errors_total
            .with_label_values(&["finance-service", "timeout"])
            .inc();

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_rate_limited_total"));
        assert!(rendered.contains("gateway_upstream_errors_total"));
        assert!(rendered.contains("finance-service"));
    }

    #[test]
    fn test_active_requests_gauge() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.active_requests.inc();
        metrics.active_requests.inc();
        metrics.active_requests.dec();
        assert_eq!(metrics.active_requests.get(), 1);
    }
}
