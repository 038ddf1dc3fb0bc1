//! # Prometheus Metrics
//!
//! Operation counters, rejection counters, the active-grant gauge and a
//! latency histogram, scraped at `/metrics` on the metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] under the
//! `grantvault` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use grantvault_contracts::ErrorKind;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Committed operations, by operation name.
    pub operations_total: IntCounterVec,
    /// Rejected operations, by operation name and error kind.
    pub operations_rejected_total: IntCounterVec,
    /// Grants currently escrowed by the vault.
    pub active_grants: IntGauge,
    /// Time spent executing an operation, by operation name.
    pub operation_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("grantvault".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Total number of committed operations"),
            &["op"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operations_rejected_total = IntCounterVec::new(
            Opts::new(
                "operations_rejected_total",
                "Total number of rejected operations",
            ),
            &["op", "kind"],
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        let active_grants = IntGauge::new("active_grants", "Number of grants held by the vault")?;
        registry.register(Box::new(active_grants.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Operation execution latency in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
            &["op"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operations_rejected_total,
            active_grants,
            operation_latency_seconds,
        })
    }

    /// Records the outcome of one operation.
    pub fn observe(&self, op: &str, outcome: Result<(), ErrorKind>, elapsed: Duration) {
        self.operation_latency_seconds
            .with_label_values(&[op])
            .observe(elapsed.as_secs_f64());
        match outcome {
            Ok(()) => self.operations_total.with_label_values(&[op]).inc(),
            Err(kind) => self
                .operations_rejected_total
                .with_label_values(&[op, kind.as_str()])
                .inc(),
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_splits_commits_and_rejections() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.observe("transfer", Ok(()), Duration::from_micros(20));
        metrics.observe(
            "transfer",
            Err(ErrorKind::InsufficientBalance),
            Duration::from_micros(5),
        );

        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["transfer"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .operations_rejected_total
                .with_label_values(&["transfer", "InsufficientBalance"])
                .get(),
            1
        );

        let text = metrics.encode().unwrap();
        assert!(text.contains("grantvault_operations_total"));
        assert!(text.contains("grantvault_operation_latency_seconds"));
    }
}
