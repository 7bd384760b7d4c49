//! The replica side of the replicated key-value store: the per-replica
//! state machine (`state`) and the tonic service that exposes it over
//! the network (`service`).

mod service;
mod state;

pub use service::StorageService;
pub use state::ReplicaState;
