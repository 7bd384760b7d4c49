//! Client side of the replicated key-value store: configuration
//! descriptor parsing, the quorum policy, the configuration-discovery
//! traversal engine, and the reconfiguration driver built on top of
//! them. [`Client`] ties all four together into the operations a
//! caller actually invokes (`read`, `write`, `list`, `reconf`).

mod client;
mod config;
mod quorum;
mod reconfigure;
mod traversal;
mod transport;

pub use client::Client;
pub use config::Configuration;
pub use transport::{GrpcTransport, ReplicaTransport, TransportError};

/// The closed error taxonomy a caller of this crate can act on.
///
/// `StaleWrite` is deliberately absent: a write that loses to a newer
/// timestamp is a successful, well-defined outcome (`new: false`), not
/// a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    #[error("quorum not reached before the deadline")]
    QuorumUnreached,

    #[error("reconfiguration superseded by a newer started meta-config")]
    Superseded,
}
