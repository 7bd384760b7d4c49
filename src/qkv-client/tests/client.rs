//! Integration tests for the client's public operations, run against
//! an in-memory replica fake rather than real sockets.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use qkv_client::{Client, ReplicaTransport, TransportError};
use qkv_proto::{ListRequest, ListResponse, MetaConfig, ReadRequest, ReadResponse, Timestamp, WriteRequest, WriteResponse};

#[derive(Default)]
struct FakeReplica {
    values: HashMap<String, (String, Timestamp)>,
    mconfigs: Vec<MetaConfig>,
}

/// A full fake replica set: every address maps to its own state, so
/// quorum and traversal behavior can be exercised without sockets.
#[derive(Default)]
struct FakeTransport {
    replicas: Mutex<HashMap<String, FakeReplica>>,
    /// Addresses that should answer every call with a transport error,
    /// to exercise partial-failure and deadline paths.
    unreachable: Mutex<Vec<String>>,
}

impl FakeTransport {
    async fn with_nodes(n: usize) -> (Arc<Self>, Vec<String>) {
        let nodes: Vec<String> = (0..n).map(|i| format!("node-{i}")).collect();
        let transport = Arc::new(FakeTransport::default());
        let bootstrap = MetaConfig {
            adds: format!("0:{n}"),
            started: true,
            time: Some(Timestamp::MIN),
        };
        let mut replicas = transport.replicas.lock().await;
        for addr in &nodes {
            replicas.insert(
                addr.clone(),
                FakeReplica {
                    values: HashMap::new(),
                    mconfigs: vec![bootstrap.clone()],
                },
            );
        }
        drop(replicas);
        (transport, nodes)
    }

    async fn cut_off(&self, addr: &str) {
        self.unreachable.lock().await.push(addr.to_string());
    }

    async fn is_unreachable(&self, addr: &str) -> bool {
        self.unreachable.lock().await.iter().any(|a| a == addr)
    }
}

#[async_trait::async_trait]
impl ReplicaTransport for FakeTransport {
    async fn read(&self, addr: &str, request: ReadRequest) -> Result<ReadResponse, TransportError> {
        if self.is_unreachable(addr).await {
            return Err(TransportError::Rpc {
                addr: addr.to_string(),
                message: "unreachable".to_string(),
            });
        }
        let replicas = self.replicas.lock().await;
        let replica = replicas.get(addr).expect("unknown address");
        match replica.values.get(&request.key) {
            Some((value, time)) => Ok(ReadResponse {
                ok: true,
                value: value.clone(),
                time: Some(*time),
                mconfigs: replica.mconfigs.clone(),
            }),
            None => Ok(ReadResponse {
                ok: false,
                value: String::new(),
                time: Some(Timestamp::MIN),
                mconfigs: replica.mconfigs.clone(),
            }),
        }
    }

    async fn write(&self, addr: &str, request: WriteRequest) -> Result<WriteResponse, TransportError> {
        if self.is_unreachable(addr).await {
            return Err(TransportError::Rpc {
                addr: addr.to_string(),
                message: "unreachable".to_string(),
            });
        }
        let mut replicas = self.replicas.lock().await;
        let replica = replicas.get_mut(addr).expect("unknown address");
        let time = request.time.unwrap();
        let new = match replica.values.get(&request.key) {
            Some((_, existing)) => *existing < time,
            None => true,
        };
        if new {
            replica.values.insert(request.key, (request.value, time));
        }
        Ok(WriteResponse {
            new,
            mconfigs: replica.mconfigs.clone(),
        })
    }

    async fn list_keys(&self, addr: &str, _request: ListRequest) -> Result<ListResponse, TransportError> {
        if self.is_unreachable(addr).await {
            return Err(TransportError::Rpc {
                addr: addr.to_string(),
                message: "unreachable".to_string(),
            });
        }
        let replicas = self.replicas.lock().await;
        let replica = replicas.get(addr).expect("unknown address");
        Ok(ListResponse {
            keys: replica.values.keys().cloned().collect(),
            mconfigs: replica.mconfigs.clone(),
        })
    }

    async fn write_meta_config(&self, addr: &str, request: MetaConfig) -> Result<WriteResponse, TransportError> {
        if self.is_unreachable(addr).await {
            return Err(TransportError::Rpc {
                addr: addr.to_string(),
                message: "unreachable".to_string(),
            });
        }
        let mut replicas = self.replicas.lock().await;
        let replica = replicas.get_mut(addr).expect("unknown address");
        let latest_started = replica
            .mconfigs
            .iter()
            .filter(|mc| mc.started)
            .map(|mc| mc.time.unwrap_or(Timestamp::MIN))
            .max();
        let request_time = request.time.unwrap_or(Timestamp::MIN);
        if let Some(latest) = latest_started {
            if latest > request_time {
                return Ok(WriteResponse {
                    new: false,
                    mconfigs: replica.mconfigs.clone(),
                });
            }
        }
        if request.started {
            let (not_newer, newer): (Vec<_>, Vec<_>) = replica
                .mconfigs
                .drain(..)
                .partition(|mc| mc.time.unwrap_or(Timestamp::MIN) <= request_time);
            replica.mconfigs = not_newer;
            replica.mconfigs.push(request);
            replica.mconfigs.extend(newer);
        } else {
            replica.mconfigs.push(request);
        }
        Ok(WriteResponse {
            new: true,
            mconfigs: replica.mconfigs.clone(),
        })
    }
}

#[tokio::test]
async fn basic_write_then_read_reaches_quorum() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client = Client::new(nodes, transport);

    let write = client.write("hello", "world").await.unwrap();
    assert!(write.new);

    let read = client.read("hello").await.unwrap();
    assert!(read.ok);
    assert_eq!(read.value, "world");
}

#[tokio::test]
async fn stale_write_is_reported_as_not_new() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client = Client::new(nodes.clone(), transport.clone());

    client.write("k", "first").await.unwrap();

    // A write with an older timestamp than what's already stored, sent
    // directly to the replicas to avoid the client's own clock always
    // producing a newer `Timestamp::now()`.
    for addr in &nodes {
        transport
            .replicas
            .lock()
            .await
            .get_mut(addr)
            .unwrap()
            .values
            .insert("k".to_string(), ("first".to_string(), Timestamp { seconds: 100, nanos: 0 }));
    }
    let stale = qkv_client::TransportError::Rpc {
        addr: String::new(),
        message: String::new(),
    };
    let _ = stale;

    let request = WriteRequest {
        key: "k".to_string(),
        value: "stale".to_string(),
        time: Some(Timestamp { seconds: 50, nanos: 0 }),
    };
    for addr in &nodes {
        let resp = transport.write(addr, request.clone()).await.unwrap();
        assert!(!resp.new);
    }

    let read = client.read("k").await.unwrap();
    assert_eq!(read.value, "first");
}

#[tokio::test]
async fn write_survives_a_minority_of_unreachable_replicas() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    transport.cut_off(&nodes[2]).await;
    let client = Client::new(nodes, transport);

    let write = client.write("k", "v").await.unwrap();
    assert!(write.new);
}

#[tokio::test]
async fn write_fails_without_a_majority() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    transport.cut_off(&nodes[1]).await;
    transport.cut_off(&nodes[2]).await;
    let client = Client::new(nodes, transport);

    let err = client.write("k", "v").await.unwrap_err();
    assert!(matches!(err, qkv_client::Error::QuorumUnreached));
}

#[tokio::test]
async fn traversal_discovers_a_chain_of_unstarted_meta_configs() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client = Client::new(nodes.clone(), transport.clone());

    // Announce two unstarted meta-configs directly (skipping the full
    // reconfiguration driver) so a read has to walk through both
    // before landing back on the still-active bootstrap.
    let first = MetaConfig {
        adds: "0:2".to_string(),
        started: false,
        time: Some(Timestamp { seconds: 10, nanos: 0 }),
    };
    let second = MetaConfig {
        adds: "1:3".to_string(),
        started: false,
        time: Some(Timestamp { seconds: 20, nanos: 0 }),
    };
    for addr in &nodes {
        transport.write_meta_config(addr, first.clone()).await.unwrap();
        transport.write_meta_config(addr, second.clone()).await.unwrap();
    }

    client.write("k", "v").await.unwrap();
    let read = client.read("k").await.unwrap();
    assert!(read.ok);
    assert_eq!(read.value, "v");
}

#[tokio::test]
async fn reconfigure_to_overlapping_set_keeps_data_reachable() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client = Client::new(nodes, transport);

    client.write("a", "1").await.unwrap();
    client.reconf("1:3").await.unwrap();

    let read = client.read("a").await.unwrap();
    assert!(read.ok);
    assert_eq!(read.value, "1");
}

#[tokio::test]
async fn a_second_clients_working_set_is_cleared_by_another_clients_reconfigure() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client_a = Client::new(nodes.clone(), transport.clone());
    let client_b = Client::new(nodes.clone(), transport.clone());

    // Announce an unstarted meta-config client B will have pending in
    // its working set by the time it starts its own traversal, even
    // though it never initiated this reconfiguration itself.
    let pending = MetaConfig {
        adds: "1:3".to_string(),
        started: false,
        time: Some(Timestamp { seconds: 5, nanos: 0 }),
    };
    client_a.write_meta_config(pending).await.unwrap();

    client_a.write("a", "1").await.unwrap();

    // Client A drives a full reconfiguration to a started meta-config
    // that client B played no part in creating.
    client_a.reconf("0,2").await.unwrap();
    let goal = client_a.pcfg().await;
    assert!(goal.started);

    // Client B is still sitting on the bootstrap meta-config. Its
    // first quorum call must surface the started meta-config, discard
    // the pending unstarted one from its working set entirely (rather
    // than visiting it afterwards), and jump straight to the goal —
    // the `working.clear()` branch in `traversal::traverse`.
    let read = client_b.read("a").await.unwrap();
    assert!(read.ok);
    assert_eq!(read.value, "1");

    let b_pcfg = client_b.pcfg().await;
    assert!(b_pcfg.started);
    assert_eq!(b_pcfg.time, goal.time);
    assert_eq!(b_pcfg.adds, goal.adds);
}

#[tokio::test]
async fn second_reconfigure_started_earlier_is_superseded() {
    let (transport, nodes) = FakeTransport::with_nodes(3).await;
    let client = Client::new(nodes, transport);

    client.reconf("0:2").await.unwrap();

    // A goal meta-config with an earlier timestamp than the one
    // already installed and started can never win the announce step.
    let stale_goal = MetaConfig {
        adds: "1:3".to_string(),
        started: false,
        time: Some(Timestamp::MIN),
    };
    let result = client.write_meta_config(stale_goal).await.unwrap();
    assert!(!result.new);
}
