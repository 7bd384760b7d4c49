use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::info;

use qkv_proto::storage_server::Storage;
use qkv_proto::{
    ListRequest, ListResponse, MetaConfig, ReadRequest, ReadResponse, WriteRequest, WriteResponse,
};

use crate::state::ReplicaState;

/// A single replica: the state machine plus the RPC surface described
/// in spec.md §4.6.
///
/// A single `RwLock` guards all mutable state. Reads take the shared
/// lock and may run concurrently with each other; `Write` and
/// `WriteMetaConfig` take the exclusive lock. No handler ever awaits
/// remote I/O while holding it.
pub struct StorageService {
    state: RwLock<ReplicaState>,
}

impl Default for StorageService {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageService {
    pub fn new() -> Self {
        StorageService {
            state: RwLock::new(ReplicaState::new()),
        }
    }
}

#[tonic::async_trait]
impl Storage for StorageService {
    async fn read(&self, request: Request<ReadRequest>) -> Result<Response<ReadResponse>, Status> {
        let key = request.into_inner().key;
        info!(%key, "read");
        let state = self.state.read().await;
        let (ok, value, time) = state.read(&key);
        Ok(Response::new(ReadResponse {
            ok,
            value,
            time: Some(time),
            mconfigs: state.mconfigs(),
        }))
    }

    async fn write(
        &self,
        request: Request<WriteRequest>,
    ) -> Result<Response<WriteResponse>, Status> {
        let req = request.into_inner();
        info!(key = %req.key, value = %req.value, "write");
        let time = req.time.ok_or_else(|| Status::invalid_argument("missing time"))?;
        let mut state = self.state.write().await;
        let new = state.write(&req.key, &req.value, time);
        Ok(Response::new(WriteResponse {
            new,
            mconfigs: state.mconfigs(),
        }))
    }

    async fn list_keys(
        &self,
        _request: Request<ListRequest>,
    ) -> Result<Response<ListResponse>, Status> {
        info!("list_keys");
        let state = self.state.read().await;
        Ok(Response::new(ListResponse {
            keys: state.list_keys(),
            mconfigs: state.mconfigs(),
        }))
    }

    async fn write_meta_config(
        &self,
        request: Request<MetaConfig>,
    ) -> Result<Response<WriteResponse>, Status> {
        let mc = request.into_inner();
        info!(adds = %mc.adds, started = mc.started, "write_meta_config");
        let mut state = self.state.write().await;
        let new = state.write_meta_config(mc);
        Ok(Response::new(WriteResponse {
            new,
            mconfigs: state.mconfigs(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkv_proto::Timestamp;

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_rpc_surface() {
        let service = StorageService::new();

        let write = service
            .write(Request::new(WriteRequest {
                key: "foo".into(),
                value: "bar".into(),
                time: Some(Timestamp { seconds: 1, nanos: 0 }),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(write.new);

        let read = service
            .read(Request::new(ReadRequest { key: "foo".into() }))
            .await
            .unwrap()
            .into_inner();
        assert!(read.ok);
        assert_eq!(read.value, "bar");
    }

    #[tokio::test]
    async fn missing_time_is_rejected() {
        let service = StorageService::new();
        let err = service
            .write(Request::new(WriteRequest {
                key: "foo".into(),
                value: "bar".into(),
                time: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn list_keys_reflects_prior_writes() {
        let service = StorageService::new();
        service
            .write(Request::new(WriteRequest {
                key: "a".into(),
                value: "1".into(),
                time: Some(Timestamp { seconds: 1, nanos: 0 }),
            }))
            .await
            .unwrap();
        service
            .write(Request::new(WriteRequest {
                key: "b".into(),
                value: "2".into(),
                time: Some(Timestamp { seconds: 1, nanos: 0 }),
            }))
            .await
            .unwrap();

        let mut keys = service
            .list_keys(Request::new(ListRequest {}))
            .await
            .unwrap()
            .into_inner()
            .keys;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn write_meta_config_attaches_the_updated_list_to_the_response() {
        let service = StorageService::new();
        let resp = service
            .write_meta_config(Request::new(MetaConfig {
                adds: "0:3".into(),
                started: false,
                time: Some(Timestamp { seconds: 1, nanos: 0 }),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.new);
        assert_eq!(resp.mconfigs.len(), 1);
    }
}
