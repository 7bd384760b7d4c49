//! The replica's in-memory state machine: a value map plus the ordered
//! list of meta-configs this replica has ever been told about.
//!
//! This is pure, synchronous logic with no I/O so that it can be
//! exercised directly in unit tests; [`crate::service::StorageService`]
//! is the thin async/RPC wrapper around it.

use std::collections::HashMap;

use qkv_proto::{MetaConfig, Timestamp};

#[derive(Debug, Clone)]
struct ValueRecord {
    value: String,
    time: Timestamp,
}

/// Per-replica state: the value map and the known meta-config list.
///
/// Mutations (`write`, `write_meta_config`) take `&mut self`; the
/// async wrapper in `service.rs` is responsible for taking the
/// exclusive lock around them. Reads (`read`, `list_keys`) take
/// `&self` and may run concurrently with each other.
#[derive(Debug, Default)]
pub struct ReplicaState {
    values: HashMap<String, ValueRecord>,
    mconfigs: Vec<MetaConfig>,
}

impl ReplicaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mconfigs(&self) -> Vec<MetaConfig> {
        self.mconfigs.clone()
    }

    /// Returns `(ok, value, time)`. `ok = false` means the key has
    /// never been written.
    pub fn read(&self, key: &str) -> (bool, String, Timestamp) {
        match self.values.get(key) {
            Some(record) => (true, record.value.clone(), record.time),
            None => (false, String::new(), Timestamp::MIN),
        }
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Overwrites `key` if `time` is strictly newer than the stored
    /// timestamp (or the key is absent). Returns whether the write
    /// took effect.
    pub fn write(&mut self, key: &str, value: &str, time: Timestamp) -> bool {
        let should_write = match self.values.get(key) {
            Some(existing) => existing.time < time,
            None => true,
        };
        if should_write {
            self.values.insert(
                key.to_string(),
                ValueRecord {
                    value: value.to_string(),
                    time,
                },
            );
        }
        should_write
    }

    /// Applies an incoming meta-config, per spec.md §4.1:
    ///
    /// - If a started meta-config with a larger timestamp than `mc` is
    ///   already installed, `mc` is stale and rejected.
    /// - If `mc.started`, it is inserted so that every meta-config
    ///   strictly newer than it still follows it in the list; its
    ///   position is what marks it as the new boundary. Nothing is
    ///   ever deleted.
    /// - Otherwise (an announcement), it is simply appended.
    ///
    /// Returns whether the meta-config was accepted.
    ///
    /// The original Go reference builds the replacement list as
    /// `make([]*proto.Config, len(s.configs))` and then *appends* to
    /// it, which leaves `len(s.configs)` leading nil entries ahead of
    /// the real ones — a documented bug (spec.md §9) that this
    /// implementation does not reproduce.
    pub fn write_meta_config(&mut self, mc: MetaConfig) -> bool {
        let latest_started = self
            .mconfigs
            .iter()
            .filter(|c| c.started)
            .map(|c| c.time.unwrap_or(Timestamp::MIN))
            .max();
        if let Some(latest) = latest_started {
            let mc_time = mc.time.unwrap_or(Timestamp::MIN);
            if latest > mc_time {
                return false;
            }
        }

        if mc.started {
            let mc_time = mc.time.unwrap_or(Timestamp::MIN);
            let (not_newer, newer): (Vec<_>, Vec<_>) = self
                .mconfigs
                .drain(..)
                .partition(|c| c.time.unwrap_or(Timestamp::MIN) <= mc_time);
            self.mconfigs = not_newer;
            self.mconfigs.push(mc);
            self.mconfigs.extend(newer);
        } else {
            self.mconfigs.push(mc);
        }
        true
    }
}
