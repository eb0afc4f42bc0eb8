//! Instrumentation hooks.
//!
//! Core code reports through [`MetricsSink`]; the server plugs in a
//! Prometheus-backed implementation, everything else gets [`NoopMetrics`].

use std::time::{Duration, Instant};

use crate::types::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoOp {
    Encrypt,
    Decrypt,
}

impl CryptoOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn observe_query(&self, _operation: &'static str, _elapsed: Duration) {}
    fn record_crypto_op(&self, _op: CryptoOp) {}
    fn set_row_count(&self, _table: &'static str, _rows: u64) {}
    fn message_stored(&self) {}
    fn message_broadcast(&self) {}
    fn message_received(&self) {}
    fn set_active_connections(&self, _count: usize) {}
    fn set_connection_state(&self, _state: ConnectionState) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Reports the elapsed time to `observe_query` when dropped.
pub struct QueryTimer<'a> {
    sink: &'a dyn MetricsSink,
    operation: &'static str,
    started: Instant,
}

impl<'a> QueryTimer<'a> {
    pub fn start(sink: &'a dyn MetricsSink, operation: &'static str) -> Self {
        Self {
            sink,
            operation,
            started: Instant::now(),
        }
    }
}

impl Drop for QueryTimer<'_> {
    fn drop(&mut self) {
        self.sink.observe_query(self.operation, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        queries: Mutex<Vec<&'static str>>,
    }

    impl MetricsSink for Recorder {
        fn observe_query(&self, operation: &'static str, _elapsed: Duration) {
            self.queries.lock().unwrap().push(operation);
        }
    }

    #[test]
    fn test_timer_reports_on_drop() {
        let recorder = Recorder::default();
        {
            let _timer = QueryTimer::start(&recorder, "list_chats");
        }
        assert_eq!(*recorder.queries.lock().unwrap(), vec!["list_chats"]);
    }
}
