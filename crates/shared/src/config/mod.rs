//! Configuration module for the MatchFunction plugin server
//!
//! All configuration is environment-sourced and resolved exactly once at
//! startup into an immutable [`AppConfig`] that is passed to components via
//! dependency injection.
//!
//! Resolution is pure and total: an absent or unparsable variable yields the
//! documented default, never an error. Operator mistakes in values that have
//! no usable default (for example the trace collector endpoint) surface
//! later, when the component consuming them is constructed.
//!
//! # Environment Variables
//!
//! - `PLUGIN_GRPC_SERVER_AUTH_ENABLED`: enable the auth interceptor (default: false)
//! - `REFRESH_INTERVAL`: token validation material refresh cadence, seconds (default: 600)
//! - `OTEL_SERVICE_NAME`: `service.name` span resource attribute (default: empty)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: span collector endpoint (no default)
//! - `PLUGIN_GRPC_SERVER_PORT`: primary gRPC listener port (default: 6565)

mod resolve;

pub use resolve::{env_flag, env_str, env_u16, env_u64};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default port for the primary gRPC listener.
pub const DEFAULT_GRPC_PORT: u16 = 6565;
/// Fixed port for the Prometheus exposition endpoint.
pub const METRICS_PORT: u16 = 8080;
/// Fixed port for the runtime diagnostics endpoint.
pub const DIAGNOSTICS_PORT: u16 = 6060;
/// Default refresh cadence for cached token validation material.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

/// Immutable server configuration, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gates construction of the auth interceptor provider.
    pub auth_enabled: bool,

    /// Refresh cadence for cached token validation material.
    pub token_refresh: Duration,

    /// `service.name` resource attribute attached to every span.
    pub service_name: String,

    /// Target endpoint for batch span export.
    pub trace_collector_endpoint: String,

    /// Primary gRPC listener port.
    pub grpc_port: u16,

    /// Prometheus exposition endpoint port (fixed in production, rebound
    /// to an ephemeral port by tests).
    pub metrics_port: u16,

    /// Runtime diagnostics endpoint port.
    pub diagnostics_port: u16,
}

impl AppConfig {
    /// Resolves the configuration from the process environment.
    ///
    /// Total: every option falls back to its documented default.
    pub fn from_env() -> Self {
        Self {
            auth_enabled: env_flag("PLUGIN_GRPC_SERVER_AUTH_ENABLED", false),
            token_refresh: Duration::from_secs(env_u64(
                "REFRESH_INTERVAL",
                DEFAULT_REFRESH_INTERVAL_SECS,
            )),
            service_name: env_str("OTEL_SERVICE_NAME", ""),
            trace_collector_endpoint: env_str("OTEL_EXPORTER_OTLP_ENDPOINT", ""),
            grpc_port: env_u16("PLUGIN_GRPC_SERVER_PORT", DEFAULT_GRPC_PORT),
            metrics_port: METRICS_PORT,
            diagnostics_port: DIAGNOSTICS_PORT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            token_refresh: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            service_name: String::new(),
            trace_collector_endpoint: String::new(),
            grpc_port: DEFAULT_GRPC_PORT,
            metrics_port: METRICS_PORT,
            diagnostics_port: DIAGNOSTICS_PORT,
        }
    }
}
