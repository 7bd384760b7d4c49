//! Parses a meta-config's `adds` descriptor into the concrete list of
//! replica addresses it denotes, per spec.md §4.3.
//!
//! Two grammars are accepted against the bootstrap node list:
//!
//! - `"A:B"` — a half-open range, nodes `[A, B)`.
//! - `"i1,i2,..."` — an explicit, order-preserving index list.
//!
//! A descriptor that doesn't parse cleanly, or resolves to an empty or
//! out-of-bounds set, is rejected rather than silently clamped.

use crate::Error;

/// A resolved set of replica addresses: what a meta-config's `adds`
/// descriptor actually points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub addrs: Vec<String>,
}

pub fn parse_descriptor(descriptor: &str, nodes: &[String]) -> Result<Configuration, Error> {
    let invalid = || Error::InvalidDescriptor(descriptor.to_string());

    if let Some(colon) = descriptor.find(':') {
        let (start_str, rest) = descriptor.split_at(colon);
        let stop_str = &rest[1..];

        let start: usize = if start_str.is_empty() {
            0
        } else {
            start_str.parse().map_err(|_| invalid())?
        };
        let stop: usize = if stop_str.is_empty() {
            nodes.len()
        } else {
            stop_str.parse().map_err(|_| invalid())?
        };

        if start >= stop || stop > nodes.len() {
            return Err(invalid());
        }
        Ok(Configuration {
            addrs: nodes[start..stop].to_vec(),
        })
    } else {
        let mut addrs = Vec::new();
        for part in descriptor.split(',') {
            let idx: usize = part.trim().parse().map_err(|_| invalid())?;
            if idx >= nodes.len() {
                return Err(invalid());
            }
            addrs.push(nodes[idx].clone());
        }
        if addrs.is_empty() {
            return Err(invalid());
        }
        Ok(Configuration { addrs })
    }
}
