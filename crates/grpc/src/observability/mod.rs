//! Observability subsystem: RPC metrics, the metrics and diagnostics HTTP
//! endpoints, and the span export pipeline.

pub mod http;
pub mod metrics;
pub mod trace;

pub use http::{diagnostics_router, metrics_router};
pub use metrics::RpcMetrics;
pub use trace::{build_tracer_provider, install_global, shutdown_tracing, ObservabilityError};
