//! Wire types for the replicated key-value store, generated from
//! `proto/storage.proto` at build time.
//!
//! Application code works directly with these generated types rather
//! than a parallel hand-written domain model: unlike Materialize's
//! `RustType`/`ProtoType` split (needed there to keep wire types
//! decoupled from in-memory representations like `Antichain`), there is
//! no such pressure here, and the original reference implementation
//! operates on its generated types directly too.

tonic::include_proto!("qkv.storage");

use std::cmp::Ordering;

impl Timestamp {
    pub const MIN: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    pub fn now() -> Timestamp {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before the unix epoch");
        Timestamp {
            seconds: now.as_secs() as i64,
            nanos: now.subsec_nanos() as i32,
        }
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Lexicographic on (seconds, nanos). Equal pairs are genuinely equal
// values, so there is no further tiebreak to apply.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl std::hash::Hash for Timestamp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.seconds.hash(state);
        self.nanos.hash(state);
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}
