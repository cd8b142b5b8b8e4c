//! RPC metric families.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

/// Per-RPC metric families, registered once at startup and shared by the
/// metrics interceptor.
pub struct RpcMetrics {
    /// Calls started, by service, method and call kind.
    pub started_total: IntCounterVec,
    /// Calls finished, by service, method, call kind and final code.
    pub handled_total: IntCounterVec,
    /// Wall-clock handling time in seconds.
    pub handling_seconds: HistogramVec,
    /// Calls currently in flight.
    pub inflight: IntGauge,
}

impl RpcMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let started_total = IntCounterVec::new(
            Opts::new("grpc_server_started_total", "RPCs started on the server"),
            &["grpc_service", "grpc_method", "grpc_type"],
        )?;
        let handled_total = IntCounterVec::new(
            Opts::new(
                "grpc_server_handled_total",
                "RPCs completed on the server, by status code",
            ),
            &["grpc_service", "grpc_method", "grpc_type", "grpc_code"],
        )?;
        let handling_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_server_handling_seconds",
                "RPC handling duration in seconds",
            ),
            &["grpc_service", "grpc_method"],
        )?;
        let inflight = IntGauge::new(
            "grpc_server_inflight_requests",
            "RPCs currently being handled",
        )?;

        registry.register(Box::new(started_total.clone()))?;
        registry.register(Box::new(handled_total.clone()))?;
        registry.register(Box::new(handling_seconds.clone()))?;
        registry.register(Box::new(inflight.clone()))?;

        Ok(Self {
            started_total,
            handled_total,
            handling_seconds,
            inflight,
        })
    }
}
