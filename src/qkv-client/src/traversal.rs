//! The client-side configuration-discovery traversal engine, per
//! spec.md §4.4.
//!
//! Every read, write, and list starts from the client's currently
//! known meta-config and walks forward through whatever meta-configs
//! the replicas themselves report back, rather than trusting the
//! client's own view of the world to be current. The working set `W`
//! holds every meta-config still pending a visit; each step visits
//! the *oldest* one (by timestamp), because an older unstarted
//! meta-config can still be superseded by one the client hasn't seen
//! yet, and visiting it first is what surfaces that.
//!
//! The Go reference's `getMin` picks the *largest* timestamp in `W`,
//! not the smallest — inverted from its own doc comment (spec.md §9).
//! This engine visits oldest-first as intended.

use std::collections::HashMap;
use std::future::Future;

use qkv_proto::{MetaConfig, Timestamp};

use crate::Error;

fn key_of(t: &Timestamp) -> (i64, i32) {
    (t.seconds, t.nanos)
}

/// One configuration visited during a traversal, paired with the
/// quorum reply it produced.
pub struct Step<R> {
    pub mconfig: MetaConfig,
    pub reply: R,
}

pub struct Outcome<R> {
    pub steps: Vec<Step<R>>,
    /// The newest *started* meta-config the traversal discovered, or
    /// the one it started from if none superseded it.
    pub final_pcfg: MetaConfig,
    /// Set when `abort_if` stopped the walk early (used by
    /// `WriteMetaConfig`, whose own timestamp can be beaten by a
    /// pending meta-config before it is ever visited).
    pub aborted: bool,
}

pub trait HasMConfigs {
    fn mconfigs(&self) -> &[MetaConfig];
}

impl HasMConfigs for qkv_proto::ReadResponse {
    fn mconfigs(&self) -> &[MetaConfig] {
        &self.mconfigs
    }
}

impl HasMConfigs for qkv_proto::WriteResponse {
    fn mconfigs(&self) -> &[MetaConfig] {
        &self.mconfigs
    }
}

impl HasMConfigs for qkv_proto::ListResponse {
    fn mconfigs(&self) -> &[MetaConfig] {
        &self.mconfigs
    }
}

/// Walks the working set starting from `start_pcfg`, calling `call`
/// once per visited meta-config (after resolving its descriptor into
/// a `Configuration` is the caller's job, done inside `call`) and
/// folding every newly-discovered meta-config back into the working
/// set via `mergeNewMCs`'s rule:
///
/// - a meta-config strictly newer than the one just visited and
///   *started* replaces the entire working set and becomes the new
///   `final_pcfg` — we've found a fresher committed configuration and
///   everything else in flight is moot;
/// - one that is merely newer and *unstarted* is added to the set to
///   be visited later.
///
/// `abort_if` is consulted before visiting each candidate; returning
/// `true` stops the walk without visiting it (used by
/// `WriteMetaConfig` to detect it has already lost the race).
pub async fn traverse<R, Call, Fut>(
    start_pcfg: MetaConfig,
    mut abort_if: impl FnMut(&MetaConfig) -> bool,
    mut call: Call,
) -> Result<Outcome<R>, Error>
where
    Call: FnMut(MetaConfig) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
    R: HasMConfigs,
{
    let mut working: HashMap<(i64, i32), MetaConfig> = HashMap::new();
    working.insert(key_of(&start_pcfg.time.unwrap_or(Timestamp::MIN)), start_pcfg.clone());
    let mut pcfg = start_pcfg;
    let mut steps = Vec::new();

    while !working.is_empty() {
        let min_key = *working
            .keys()
            .min_by_key(|k| **k)
            .expect("working set is non-empty");
        let cur = working.remove(&min_key).expect("key just read from the map");

        if abort_if(&cur) {
            return Ok(Outcome {
                steps,
                final_pcfg: pcfg,
                aborted: true,
            });
        }

        let reply = call(cur.clone()).await?;
        let cur_time = cur.time.unwrap_or(Timestamp::MIN);

        for nm in reply.mconfigs() {
            let nm_time = nm.time.unwrap_or(Timestamp::MIN);
            if nm_time > cur_time {
                if nm.started {
                    working.clear();
                    working.insert(key_of(&nm_time), nm.clone());
                    pcfg = nm.clone();
                } else {
                    working.entry(key_of(&nm_time)).or_insert_with(|| nm.clone());
                }
            }
        }

        steps.push(Step { mconfig: cur, reply });
    }

    Ok(Outcome {
        steps,
        final_pcfg: pcfg,
        aborted: false,
    })
}
