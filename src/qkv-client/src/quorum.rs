//! The quorum policy: how replies from a single configuration's
//! replica set are combined into one answer, per spec.md §4.2.
//!
//! Every RPC gets its own second-long deadline (applied here, not in
//! the transport, so a test transport can exercise the deadline path
//! without a real clock-dependent socket). A majority is
//! `floor(n/2) + 1` replicas. Operations never retry; a configuration
//! that can't reach quorum within its replies' deadlines fails the
//! whole call with `Error::QuorumUnreached`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use qkv_proto::{ListResponse, MetaConfig, ReadResponse, Timestamp, WriteResponse};
use tracing::warn;

use crate::transport::{ReplicaTransport, TransportError};
use crate::Error;

const RPC_DEADLINE: Duration = Duration::from_secs(1);

pub fn majority(n: usize) -> usize {
    n / 2 + 1
}

async fn call_with_deadline<Fut, R>(addr: &str, fut: Fut) -> Result<R, TransportError>
where
    Fut: Future<Output = Result<R, TransportError>>,
{
    match tokio::time::timeout(RPC_DEADLINE, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            addr: addr.to_string(),
        }),
    }
}

/// Per spec.md §7: "Transport errors from individual replicas are
/// logged and swallowed by the quorum aggregator." Keeps only the
/// replies that actually arrived; every failure is logged here, once,
/// before being dropped — nothing downstream ever sees it again.
fn log_and_drop_failures<R>(results: Vec<Result<R, TransportError>>) -> Vec<R> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(reply) => Some(reply),
            Err(err) => {
                warn!(error = %err, "replica call failed, dropping from quorum");
                None
            }
        })
        .collect()
}

/// Unions meta-config lists, deduplicating by `(seconds, nanos)`.
///
/// The Go reference's `combineMConfs` allocates its result with
/// `make([]*proto.Config, len(configlists))` and then `append`s on
/// top, leaving that many leading nil entries (spec.md §9). Building
/// the result with `Vec::new()` plus `extend` instead does not
/// reproduce that bug.
pub fn union_mconfigs(lists: impl IntoIterator<Item = Vec<MetaConfig>>) -> Vec<MetaConfig> {
    let mut by_time: HashMap<(i64, i32), MetaConfig> = HashMap::new();
    for list in lists {
        for mc in list {
            let t = mc.time.unwrap_or(Timestamp::MIN);
            by_time.insert((t.seconds, t.nanos), mc);
        }
    }
    let mut mconfigs: Vec<MetaConfig> = by_time.into_values().collect();
    mconfigs.sort_by_key(|mc| {
        let t = mc.time.unwrap_or(Timestamp::MIN);
        (t.seconds, t.nanos)
    });
    mconfigs
}

pub async fn quorum_read(
    transport: &dyn ReplicaTransport,
    addrs: &[String],
    key: &str,
) -> Result<ReadResponse, Error> {
    let quorum = majority(addrs.len());
    let calls = addrs.iter().map(|addr| {
        let request = qkv_proto::ReadRequest { key: key.to_string() };
        call_with_deadline(addr, transport.read(addr, request))
    });
    let oks = log_and_drop_failures(futures::future::join_all(calls).await);

    if oks.len() < quorum {
        return Err(Error::QuorumUnreached);
    }

    let mut best = oks[0].clone();
    for reply in &oks[1..] {
        let reply_time = reply.time.unwrap_or(Timestamp::MIN);
        let best_time = best.time.unwrap_or(Timestamp::MIN);
        if reply_time > best_time {
            best = reply.clone();
        }
    }
    best.mconfigs = union_mconfigs(oks.into_iter().map(|r| r.mconfigs));
    Ok(best)
}

pub async fn quorum_write(
    transport: &dyn ReplicaTransport,
    addrs: &[String],
    key: &str,
    value: &str,
    time: Timestamp,
) -> Result<WriteResponse, Error> {
    let calls = addrs.iter().map(|addr| {
        let request = qkv_proto::WriteRequest {
            key: key.to_string(),
            value: value.to_string(),
            time: Some(time),
        };
        call_with_deadline(addr, transport.write(addr, request))
    });
    let results = futures::future::join_all(calls).await;
    aggregate_write_replies(addrs.len(), results)
}

pub async fn quorum_write_meta_config(
    transport: &dyn ReplicaTransport,
    addrs: &[String],
    mc: MetaConfig,
) -> Result<WriteResponse, Error> {
    let calls = addrs
        .iter()
        .map(|addr| call_with_deadline(addr, transport.write_meta_config(addr, mc.clone())));
    let results = futures::future::join_all(calls).await;
    aggregate_write_replies(addrs.len(), results)
}

/// Shared by `Write` and `WriteMetaConfig`: quorum is reached once a
/// majority of replies carry `new: true`. If instead every replica
/// has answered and a majority did not, the write has lost to a
/// concurrent newer one — a normal, non-error `new: false` outcome.
/// Anything else (some replicas unreachable, no majority either way)
/// is `QuorumUnreached`.
fn aggregate_write_replies(
    n: usize,
    results: Vec<Result<WriteResponse, TransportError>>,
) -> Result<WriteResponse, Error> {
    let quorum = majority(n);
    let oks = log_and_drop_failures(results);
    let new_count = oks.iter().filter(|r| r.new).count();
    let mconfigs = union_mconfigs(oks.iter().map(|r| r.mconfigs.clone()));

    if new_count >= quorum {
        Ok(WriteResponse { new: true, mconfigs })
    } else if oks.len() == n {
        Ok(WriteResponse { new: false, mconfigs })
    } else {
        Err(Error::QuorumUnreached)
    }
}

pub async fn quorum_list(transport: &dyn ReplicaTransport, addrs: &[String]) -> Result<ListResponse, Error> {
    let quorum = majority(addrs.len());
    let calls = addrs
        .iter()
        .map(|addr| call_with_deadline(addr, transport.list_keys(addr, qkv_proto::ListRequest {})));
    let oks = log_and_drop_failures(futures::future::join_all(calls).await);

    if oks.len() < quorum {
        return Err(Error::QuorumUnreached);
    }

    let mut keys: HashSet<String> = HashSet::new();
    let mut mconfig_lists = Vec::with_capacity(oks.len());
    for reply in oks {
        keys.extend(reply.keys);
        mconfig_lists.push(reply.mconfigs);
    }
    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    Ok(ListResponse {
        keys,
        mconfigs: union_mconfigs(mconfig_lists),
    })
}
