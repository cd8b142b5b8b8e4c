//! Generated Protocol Buffer types for the MatchFunction plugin contract.
//!
//! This crate is the transport-type layer only: it re-exports the generated
//! message types and the gRPC service traits. The service implementation
//! lives in `matchfn-grpc`.

mod matchfunction {
    tonic::include_proto!("matchfunction");
}

pub use matchfunction::*;

/// File descriptor set for gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/matchfunction_descriptor.bin"));
