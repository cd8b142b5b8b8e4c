//! Server lifecycle machinery for the MatchFunction gRPC plugin.
//!
//! This crate is the bootstrap layer around the matchmaking decision logic:
//! it composes the interceptor chain (tracing, metrics, optional auth),
//! exposes the metrics and diagnostics HTTP endpoints, registers the service
//! contract together with health and reflection responders, and drives
//! startup and graceful shutdown.
//!
//! The matchmaking algorithm itself is an external collaborator behind the
//! [`matchmaker::Matchmaker`] trait.

pub mod auth;
pub mod interceptors;
pub mod matchmaker;
pub mod observability;
pub mod server;
pub mod services;

// Re-export proto types for convenience
pub use matchfn_proto as proto;
