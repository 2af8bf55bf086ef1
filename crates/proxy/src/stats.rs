//! Connection accounting shared by the L1 and L2 proxies.

use metrics::counter;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Which chain a proxy talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    L1,
    L2,
}

impl Layer {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
        }
    }

    const fn failure_metric(&self) -> &'static str {
        match self {
            Self::L1 => "faultproof_withdrawals_l1_node_connection_failures_total",
            Self::L2 => "faultproof_withdrawals_l2_node_connection_failures_total",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
        })
    }
}

/// Number of requests sent and failed by one proxy.
///
/// Every request also increments the labelled Prometheus counters, the atomics
/// keep a local copy for state logging.
#[derive(Debug)]
pub struct ConnectionStats {
    layer: Layer,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl ConnectionStats {
    pub const fn new(layer: Layer) -> Self {
        Self {
            layer,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub const fn layer(&self) -> Layer {
        self.layer
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Count one request against `endpoint` and pass its result through.
    pub fn record<T, E>(
        &self,
        operation: &'static str,
        endpoint: &str,
        result: Result<T, E>,
    ) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        counter!(
            "faultproof_withdrawals_node_connections_total",
            "layer" => self.layer.as_str(),
            "operation" => operation
        )
        .increment(1);

        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            match self.layer {
                Layer::L1 => counter!(self.layer.failure_metric(), "operation" => operation)
                    .increment(1),
                Layer::L2 => counter!(
                    self.layer.failure_metric(),
                    "operation" => operation,
                    "endpoint" => endpoint.to_string()
                )
                .increment(1),
            }
        }

        result
    }
}
