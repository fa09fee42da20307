//! # Prometheus Metrics
//!
//! Operational metrics for the relay node, scraped by Prometheus at
//! `/metrics` on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `cashier` prefix so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use cashier_contracts::{FeeSplit, Operation};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s inside) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Instructions applied, by operation.
    pub instructions_accepted_total: IntCounterVec,
    /// Instructions refused, by operation and error kind.
    pub instructions_rejected_total: IntCounterVec,
    /// Fee units credited, by recipient (`treasury` or `relay`). Stored as
    /// floats, so very large totals lose their last digits.
    pub fees_collected_units: CounterVec,
    /// Credential tokens minted through this node.
    pub tokens_minted_total: IntCounter,
    /// Times the relay had to solve a fresh work nonce.
    pub work_solutions_total: IntCounter,
    /// Sequence number of the newest journal entry.
    pub journal_head: IntGauge,
    /// Time from request decode to committed (or refused) instruction.
    pub instruction_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("cashier".into()), None)
            .expect("failed to create prometheus registry");

        let instructions_accepted_total = IntCounterVec::new(
            Opts::new(
                "instructions_accepted_total",
                "Signed instructions applied to the ledger",
            ),
            &["operation"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(instructions_accepted_total.clone()))
            .expect("metric registration");

        let instructions_rejected_total = IntCounterVec::new(
            Opts::new(
                "instructions_rejected_total",
                "Signed instructions refused by the ledger",
            ),
            &["operation", "reason"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(instructions_rejected_total.clone()))
            .expect("metric registration");

        let fees_collected_units = CounterVec::new(
            Opts::new(
                "fees_collected_units",
                "Fee units credited inside the ledger, by recipient",
            ),
            &["recipient"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(fees_collected_units.clone()))
            .expect("metric registration");

        let tokens_minted_total =
            IntCounter::new("tokens_minted_total", "Credential tokens minted")
                .expect("metric creation");
        registry
            .register(Box::new(tokens_minted_total.clone()))
            .expect("metric registration");

        let work_solutions_total = IntCounter::new(
            "work_solutions_total",
            "Relay proof-of-work nonces solved by this node",
        )
        .expect("metric creation");
        registry
            .register(Box::new(work_solutions_total.clone()))
            .expect("metric registration");

        let journal_head = IntGauge::new("journal_head", "Sequence of the newest journal entry")
            .expect("metric creation");
        registry
            .register(Box::new(journal_head.clone()))
            .expect("metric registration");

        let instruction_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "instruction_latency_seconds",
                "Instruction handling latency in seconds, including persistence",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["operation"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(instruction_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            instructions_accepted_total,
            instructions_rejected_total,
            fees_collected_units,
            tokens_minted_total,
            work_solutions_total,
            journal_head,
            instruction_latency_seconds,
        }
    }

    pub fn record_accepted(&self, operation: Operation) {
        self.instructions_accepted_total
            .with_label_values(&[operation.as_str()])
            .inc();
    }

    pub fn record_rejected(&self, operation: Operation, reason: &str) {
        self.instructions_rejected_total
            .with_label_values(&[operation.as_str(), reason])
            .inc();
    }

    pub fn record_fees(&self, split: &FeeSplit) {
        self.fees_collected_units
            .with_label_values(&["treasury"])
            .inc_by(split.cashier_fee as f64);
        self.fees_collected_units
            .with_label_values(&["relay"])
            .inc_by(split.engine_fee as f64);
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

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
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
