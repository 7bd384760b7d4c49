//! The client's public surface: `read`, `write`, `list`, and `reconf`,
//! each driving the traversal engine over the quorum policy, plus the
//! unicast/multicast escape hatches the shell's `rpc`/`mcast`
//! commands use to bypass both.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use qkv_proto::{ListResponse, MetaConfig, ReadResponse, Timestamp, WriteResponse};

use crate::config::{self, Configuration};
use crate::quorum;
use crate::traversal::{self, Outcome};
use crate::transport::ReplicaTransport;
use crate::Error;

/// The client side of the replicated key-value store.
///
/// Carries the bootstrap node list, the transport used to reach them,
/// and the two pieces of state that evolve across calls: `pcfg`, the
/// newest started meta-config the client has observed, and `cfg`, the
/// default configuration unicast/multicast shell commands target.
/// Both start out spanning every bootstrap node.
pub struct Client {
    nodes: Vec<String>,
    transport: Arc<dyn ReplicaTransport>,
    pcfg: Mutex<MetaConfig>,
    cfg: Mutex<Configuration>,
}

impl Client {
    pub fn new(nodes: Vec<String>, transport: Arc<dyn ReplicaTransport>) -> Self {
        let bootstrap = MetaConfig {
            adds: format!("0:{}", nodes.len()),
            started: true,
            time: Some(Timestamp::MIN),
        };
        let cfg = config::parse_descriptor(&bootstrap.adds, &nodes)
            .expect("bootstrap descriptor spans every known node");
        Client {
            nodes,
            transport,
            pcfg: Mutex::new(bootstrap),
            cfg: Mutex::new(cfg),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub(crate) fn transport(&self) -> &Arc<dyn ReplicaTransport> {
        &self.transport
    }

    pub async fn pcfg(&self) -> MetaConfig {
        self.pcfg.lock().await.clone()
    }

    pub async fn default_config(&self) -> Configuration {
        self.cfg.lock().await.clone()
    }

    /// Resolves `descriptor` against the bootstrap node list without
    /// touching the client's default configuration.
    pub fn parse_descriptor(&self, descriptor: &str) -> Result<Configuration, Error> {
        config::parse_descriptor(descriptor, &self.nodes)
    }

    pub async fn set_default_config(&self, descriptor: &str) -> Result<(), Error> {
        let parsed = self.parse_descriptor(descriptor)?;
        *self.cfg.lock().await = parsed;
        Ok(())
    }

    pub(crate) async fn set_pcfg(&self, mc: MetaConfig) {
        *self.pcfg.lock().await = mc;
    }

    async fn adopt_if_newer(&self, candidate: &MetaConfig) {
        let mut pcfg = self.pcfg.lock().await;
        let candidate_time = candidate.time.unwrap_or(Timestamp::MIN);
        let current_time = pcfg.time.unwrap_or(Timestamp::MIN);
        if candidate_time > current_time {
            *pcfg = candidate.clone();
        }
    }

    pub async fn read(&self, key: &str) -> Result<ReadResponse, Error> {
        let start = self.pcfg().await;
        let nodes = self.nodes.clone();
        let transport = self.transport.clone();
        let key = key.to_string();
        let outcome: Outcome<ReadResponse> = traversal::traverse(start, |_| false, move |mc| {
            let nodes = nodes.clone();
            let transport = transport.clone();
            let key = key.clone();
            async move {
                let cfg = config::parse_descriptor(&mc.adds, &nodes)?;
                quorum::quorum_read(transport.as_ref(), &cfg.addrs, &key).await
            }
        })
        .await?;
        self.adopt_if_newer(&outcome.final_pcfg).await;
        fold_read(outcome)
    }

    pub async fn write(&self, key: &str, value: &str) -> Result<WriteResponse, Error> {
        let start = self.pcfg().await;
        let nodes = self.nodes.clone();
        let transport = self.transport.clone();
        let key = key.to_string();
        let value = value.to_string();
        let time = Timestamp::now();
        let outcome: Outcome<WriteResponse> = traversal::traverse(start, |_| false, move |mc| {
            let nodes = nodes.clone();
            let transport = transport.clone();
            let key = key.clone();
            let value = value.clone();
            async move {
                let cfg = config::parse_descriptor(&mc.adds, &nodes)?;
                quorum::quorum_write(transport.as_ref(), &cfg.addrs, &key, &value, time).await
            }
        })
        .await?;
        self.adopt_if_newer(&outcome.final_pcfg).await;
        fold_write(outcome)
    }

    pub async fn list(&self) -> Result<ListResponse, Error> {
        let start = self.pcfg().await;
        let nodes = self.nodes.clone();
        let transport = self.transport.clone();
        let outcome: Outcome<ListResponse> = traversal::traverse(start, |_| false, move |mc| {
            let nodes = nodes.clone();
            let transport = transport.clone();
            async move {
                let cfg = config::parse_descriptor(&mc.adds, &nodes)?;
                quorum::quorum_list(transport.as_ref(), &cfg.addrs).await
            }
        })
        .await?;
        self.adopt_if_newer(&outcome.final_pcfg).await;
        fold_list(outcome)
    }

    /// Drives `WriteMetaConfig` through the traversal engine, aborting
    /// with `new: false` the moment a pending meta-config proves
    /// `target` is already stale, without ever writing it anywhere.
    pub async fn write_meta_config(&self, target: MetaConfig) -> Result<WriteResponse, Error> {
        let start = self.pcfg().await;
        let nodes = self.nodes.clone();
        let transport = self.transport.clone();
        let target_time = target.time.unwrap_or(Timestamp::MIN);
        let target_for_call = target.clone();
        let outcome: Outcome<WriteResponse> = traversal::traverse(
            start,
            move |cur| target_time < cur.time.unwrap_or(Timestamp::MIN),
            move |mc| {
                let nodes = nodes.clone();
                let transport = transport.clone();
                let target = target_for_call.clone();
                async move {
                    let cfg = config::parse_descriptor(&mc.adds, &nodes)?;
                    quorum::quorum_write_meta_config(transport.as_ref(), &cfg.addrs, target).await
                }
            },
        )
        .await?;
        self.adopt_if_newer(&outcome.final_pcfg).await;
        if outcome.aborted {
            return Ok(WriteResponse {
                new: false,
                mconfigs: Vec::new(),
            });
        }
        fold_write(outcome)
    }

    /// Drives the reconfiguration protocol end to end: announce,
    /// state transfer, activation, and local commit (spec.md §4.5).
    pub async fn reconf(&self, descriptor: &str) -> Result<(), Error> {
        crate::reconfigure::reconfigure(self, descriptor).await
    }

    /// Sends a `Read` straight to one node, bypassing quorum and
    /// traversal — backs the shell's `rpc <idx> read` command.
    pub async fn unicast_read(&self, index: usize, key: &str) -> Result<ReadResponse, Error> {
        let addr = self.node_at(index)?;
        Ok(self
            .transport
            .read(&addr, qkv_proto::ReadRequest { key: key.to_string() })
            .await?)
    }

    pub async fn unicast_write(&self, index: usize, key: &str, value: &str) -> Result<WriteResponse, Error> {
        let addr = self.node_at(index)?;
        let request = qkv_proto::WriteRequest {
            key: key.to_string(),
            value: value.to_string(),
            time: Some(Timestamp::now()),
        };
        Ok(self.transport.write(&addr, request).await?)
    }

    pub async fn unicast_list(&self, index: usize) -> Result<ListResponse, Error> {
        let addr = self.node_at(index)?;
        Ok(self.transport.list_keys(&addr, qkv_proto::ListRequest {}).await?)
    }

    /// Broadcasts a write to every node in the default configuration
    /// without waiting for or aggregating replies — backs the shell's
    /// `mcast` command. Individual failures are dropped silently,
    /// matching the fire-and-forget semantics spec.md describes for
    /// this operation.
    pub async fn multicast_write(&self, key: &str, value: &str) {
        let cfg = self.default_config().await;
        let time = Timestamp::now();
        let sends = cfg.addrs.into_iter().map(|addr| {
            let transport = self.transport.clone();
            let request = qkv_proto::WriteRequest {
                key: key.to_string(),
                value: value.to_string(),
                time: Some(time),
            };
            async move {
                let _ = transport.write(&addr, request).await;
            }
        });
        futures::future::join_all(sends).await;
    }

    fn node_at(&self, index: usize) -> Result<String, Error> {
        self.nodes
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidDescriptor(index.to_string()))
    }
}

/// Folds a `Read` traversal: the reply with the greatest timestamp
/// wins, and meta-configs observed across every visited configuration
/// are unioned for informational purposes.
fn fold_read(outcome: Outcome<ReadResponse>) -> Result<ReadResponse, Error> {
    let mut mconfig_lists = Vec::with_capacity(outcome.steps.len());
    let mut best: Option<ReadResponse> = None;
    for step in outcome.steps {
        mconfig_lists.push(step.reply.mconfigs.clone());
        let replace = match &best {
            None => true,
            Some(b) => step.reply.time.unwrap_or(Timestamp::MIN) > b.time.unwrap_or(Timestamp::MIN),
        };
        if replace {
            best = Some(step.reply);
        }
    }
    let mut best = best.expect("traversal visits at least one configuration");
    best.mconfigs = quorum::union_mconfigs(mconfig_lists);
    Ok(best)
}

/// Folds a `Write`/`WriteMetaConfig` traversal: the write only counts
/// as accepted if it was accepted everywhere it was sent.
fn fold_write(outcome: Outcome<WriteResponse>) -> Result<WriteResponse, Error> {
    let mut new = true;
    let mut mconfig_lists = Vec::with_capacity(outcome.steps.len());
    for step in outcome.steps {
        new = new && step.reply.new;
        mconfig_lists.push(step.reply.mconfigs);
    }
    Ok(WriteResponse {
        new,
        mconfigs: quorum::union_mconfigs(mconfig_lists),
    })
}

/// Folds a `ListKeys` traversal: the union of keys seen anywhere in
/// the chain, since a key may have already been transferred to a
/// newer configuration while a read is still in flight.
fn fold_list(outcome: Outcome<ListResponse>) -> Result<ListResponse, Error> {
    let mut keys = HashSet::new();
    let mut mconfig_lists = Vec::with_capacity(outcome.steps.len());
    for step in outcome.steps {
        keys.extend(step.reply.keys);
        mconfig_lists.push(step.reply.mconfigs);
    }
    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    Ok(ListResponse {
        keys,
        mconfigs: quorum::union_mconfigs(mconfig_lists),
    })
}
