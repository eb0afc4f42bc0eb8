//! Prometheus metrics.
//!
//! All metrics follow the naming convention: `courier_<area>_<metric>_<unit>`.
//! Each [`PrometheusMetrics`] owns its own [`Registry`] so independent
//! servers (and tests) never collide on registration.

use std::time::Duration;

use courier_shared::metrics::{CryptoOp, MetricsSink};
use courier_shared::ConnectionState;
use prometheus::{
    exponential_buckets, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct PrometheusMetrics {
    registry: Registry,
    query_duration: HistogramVec,
    crypto_ops: IntCounterVec,
    row_count: IntGaugeVec,
    messages_stored: IntCounter,
    messages_broadcast: IntCounter,
    messages_received: IntCounter,
    active_connections: IntGauge,
    connection_state: Gauge,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let query_duration = HistogramVec::new(
            HistogramOpts::new(
                "courier_db_query_duration_seconds",
                "Time spent in storage operations",
            )
            .buckets(exponential_buckets(0.0001, 2.0, 14)?),
            &["operation"],
        )?;
        let crypto_ops = IntCounterVec::new(
            Opts::new(
                "courier_encryption_operations_total",
                "Message body encrypt/decrypt operations",
            ),
            &["op"],
        )?;
        let row_count = IntGaugeVec::new(
            Opts::new("courier_db_row_count", "Rows per table at last count"),
            &["table"],
        )?;
        let messages_stored = IntCounter::new(
            "courier_messages_stored_total",
            "Messages written to the database",
        )?;
        let messages_broadcast = IntCounter::new(
            "courier_messages_broadcast_total",
            "new_message events pushed to connected clients",
        )?;
        let messages_received = IntCounter::new(
            "courier_messages_received_total",
            "new_message events received from the server",
        )?;
        let active_connections = IntGauge::new(
            "courier_ws_active_connections",
            "Open WebSocket connections",
        )?;
        let connection_state = Gauge::new(
            "courier_ws_connection_state",
            "Client connection state (1 connected, 0.5 reconnecting, 0 offline)",
        )?;

        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(crypto_ops.clone()))?;
        registry.register(Box::new(row_count.clone()))?;
        registry.register(Box::new(messages_stored.clone()))?;
        registry.register(Box::new(messages_broadcast.clone()))?;
        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(connection_state.clone()))?;

        Ok(Self {
            registry,
            query_duration,
            crypto_ops,
            row_count,
            messages_stored,
            messages_broadcast,
            messages_received,
            active_connections,
            connection_state,
        })
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_query(&self, operation: &'static str, elapsed: Duration) {
        self.query_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    fn record_crypto_op(&self, op: CryptoOp) {
        self.crypto_ops.with_label_values(&[op.as_str()]).inc();
    }

    fn set_row_count(&self, table: &'static str, rows: u64) {
        self.row_count
            .with_label_values(&[table])
            .set(i64::try_from(rows).unwrap_or(i64::MAX));
    }

    fn message_stored(&self) {
        self.messages_stored.inc();
    }

    fn message_broadcast(&self) {
        self.messages_broadcast.inc();
    }

    fn message_received(&self) {
        self.messages_received.inc();
    }

    fn set_active_connections(&self, count: usize) {
        self.active_connections
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.set(state.gauge_value());
    }
}
