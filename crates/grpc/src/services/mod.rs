//! gRPC service implementations.

mod match_function;

pub use match_function::MatchFunctionService;

use crate::interceptors::CallKind;

/// Streaming methods registered on the server, health and reflection
/// responders included, so the chain labels every call by its real shape.
/// Anything not listed here is dispatched as unary.
pub const STREAMING_METHODS: &[(&str, CallKind)] = &[
    (
        "/matchfunction.MatchFunction/MakeMatches",
        CallKind::BidiStreaming,
    ),
    ("/grpc.health.v1.Health/Watch", CallKind::ServerStreaming),
    (
        "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
        CallKind::BidiStreaming,
    ),
];
