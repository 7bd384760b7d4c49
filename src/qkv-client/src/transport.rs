//! Connects the client to a single replica's RPC surface.
//!
//! Mirrors the shape of `mz-service`'s `GenericClient<C, R>`-bounded
//! `GrpcClient<G>` (`src/service/src/grpc.rs` in the teacher repo): a
//! small async trait abstracting "send one of these, get one of those
//! back" so the quorum and traversal layers above never depend on the
//! concrete transport. [`GrpcTransport`] is the real implementation,
//! backed by a cached `tonic` channel per address; tests substitute an
//! in-process fake instead of binding real sockets.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tonic::transport::Channel;

use qkv_proto::storage_client::StorageClient;
use qkv_proto::{ListRequest, ListResponse, MetaConfig, ReadRequest, ReadResponse, WriteRequest, WriteResponse};

/// A transport-level failure: the RPC never produced a usable reply.
/// Distinct from an application-level `ok: false` or `new: false`,
/// which are normal replies and not errors at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("rpc to {addr} failed: {message}")]
    Rpc { addr: String, message: String },

    #[error("rpc to {addr} timed out")]
    Timeout { addr: String },
}

/// One replica's RPC surface, reached by address.
///
/// Every call is unary and carries no session state, so a single
/// implementor can serve every address passed to it; the address
/// identifies where to dial, not which connection to reuse.
#[async_trait::async_trait]
pub trait ReplicaTransport: Send + Sync {
    async fn read(&self, addr: &str, request: ReadRequest) -> Result<ReadResponse, TransportError>;
    async fn write(&self, addr: &str, request: WriteRequest) -> Result<WriteResponse, TransportError>;
    async fn list_keys(&self, addr: &str, request: ListRequest) -> Result<ListResponse, TransportError>;
    async fn write_meta_config(&self, addr: &str, request: MetaConfig) -> Result<WriteResponse, TransportError>;
}

/// Talks to replicas over gRPC, caching one channel per address so
/// repeated calls to the same replica reuse its connection.
#[derive(Default)]
pub struct GrpcTransport {
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, addr: &str) -> Result<Channel, TransportError> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(addr) {
            return Ok(channel.clone());
        }
        let endpoint = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))
            .map_err(|e| TransportError::Rpc {
                addr: addr.to_string(),
                message: e.to_string(),
            })?;
        let channel = endpoint.connect().await.map_err(|e| TransportError::Rpc {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;
        channels.insert(addr.to_string(), channel.clone());
        Ok(channel)
    }
}

fn status_to_error(addr: &str, status: tonic::Status) -> TransportError {
    TransportError::Rpc {
        addr: addr.to_string(),
        message: status.message().to_string(),
    }
}

#[async_trait::async_trait]
impl ReplicaTransport for GrpcTransport {
    async fn read(&self, addr: &str, request: ReadRequest) -> Result<ReadResponse, TransportError> {
        let channel = self.channel(addr).await?;
        StorageClient::new(channel)
            .read(request)
            .await
            .map(|r| r.into_inner())
            .map_err(|status| status_to_error(addr, status))
    }

    async fn write(&self, addr: &str, request: WriteRequest) -> Result<WriteResponse, TransportError> {
        let channel = self.channel(addr).await?;
        StorageClient::new(channel)
            .write(request)
            .await
            .map(|r| r.into_inner())
            .map_err(|status| status_to_error(addr, status))
    }

    async fn list_keys(&self, addr: &str, request: ListRequest) -> Result<ListResponse, TransportError> {
        let channel = self.channel(addr).await?;
        StorageClient::new(channel)
            .list_keys(request)
            .await
            .map(|r| r.into_inner())
            .map_err(|status| status_to_error(addr, status))
    }

    async fn write_meta_config(&self, addr: &str, request: MetaConfig) -> Result<WriteResponse, TransportError> {
        let channel = self.channel(addr).await?;
        StorageClient::new(channel)
            .write_meta_config(request)
            .await
            .map(|r| r.into_inner())
            .map_err(|status| status_to_error(addr, status))
    }
}
