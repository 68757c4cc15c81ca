//! # Prometheus Metrics
//!
//! Gateway counters and gauges, scraped at `/metrics` on the metrics port.
//! Everything lives in a dedicated registry with the `conduit` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use conduit_protocol::bridge::{BridgeGateway, ErrorCategory};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful dispatches.
    pub dispatches_total: IntCounter,
    /// Successful redemptions.
    pub redemptions_total: IntCounter,
    /// Rejected dispatch/redeem calls, labelled by error category.
    pub rejections_total: IntCounterVec,
    pub signers: IntGauge,
    pub handlers: IntGauge,
    /// Size of the nonce ledger. Only ever grows.
    pub consumed_nonces: IntGauge,
    /// Wall time of a redeem call, including verification and the handler.
    pub redeem_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("conduit".into()), None)
            .expect("failed to create prometheus registry");

        let dispatches_total = IntCounter::new("dispatches_total", "Total successful dispatches")
            .expect("metric creation");
        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("metric registration");

        let redemptions_total =
            IntCounter::new("redemptions_total", "Total successful redemptions")
                .expect("metric creation");
        registry
            .register(Box::new(redemptions_total.clone()))
            .expect("metric registration");

        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Rejected operations by error category"),
            &["category"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("metric registration");

        let signers = IntGauge::new("signers", "Number of trusted signers").expect("metric creation");
        registry
            .register(Box::new(signers.clone()))
            .expect("metric registration");

        let handlers =
            IntGauge::new("handlers", "Number of registered asset handlers").expect("metric creation");
        registry
            .register(Box::new(handlers.clone()))
            .expect("metric registration");

        let consumed_nonces = IntGauge::new("consumed_nonces", "Number of consumed operation digests")
            .expect("metric creation");
        registry
            .register(Box::new(consumed_nonces.clone()))
            .expect("metric registration");

        let redeem_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("redeem_latency_seconds", "Redeem call latency in seconds")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(redeem_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            dispatches_total,
            redemptions_total,
            rejections_total,
            signers,
            handlers,
            consumed_nonces,
            redeem_latency_seconds,
        }
    }

    pub fn record_rejection(&self, category: ErrorCategory) {
        let label = match category {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Replay => "replay",
            ErrorCategory::Execution => "execution",
        };
        self.rejections_total.with_label_values(&[label]).inc();
    }

    /// Refreshes the gauges from current gateway state.
    pub fn observe_gateway(&self, gateway: &BridgeGateway) {
        self.signers.set(gateway.signers().len() as i64);
        self.handlers.set(gateway.handlers().len() as i64);
        self.consumed_nonces.set(gateway.nonces().len() as i64);
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`
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
