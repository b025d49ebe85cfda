//! syncspace-rpc - gRPC transport for the command dispatcher
//!
//! The service mirrors the embedded entry points: a generic
//! `Command(name, bytes) → bytes` plus streaming Subscribe. The core stays
//! transport-agnostic; this crate only marshals and maps errors onto gRPC
//! status codes.

pub mod proto {
    tonic::include_proto!("transport.v1");
}

mod server;
mod service;

pub use server::{RpcServer, RpcServerError};
pub use service::TransportServiceImpl;
