//! The authentic neighbors memory.
//!
//! For every neighbor which ever passed authentication the speaker remembers
//! the last accepted TS/PC pair, keyed by the neighbor's link-local address
//! and the interface the packet arrived on. Inbound packets must beat the
//! remembered pair to be considered at all, which is the replay gate.
//!
//! The memory is volatile by design. Records for neighbors which have gone
//! quiet are dropped after a configurable timeout, so a rebooting neighbor
//! with a restarting packet counter locks itself out only temporarily.

use std::net::Ipv6Addr;

use serde::Serialize;
use tracing::debug;

use crate::tspc::TsPc;

/// A single record in the memory: the last accepted TS/PC pair for one
/// (address, interface) identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    address: Ipv6Addr,
    interface: String,
    last: TsPc,
    last_recv: u64,
}

impl NeighborEntry {
    /// The link-local address of the neighbor.
    pub fn address(&self) -> Ipv6Addr {
        self.address
    }

    /// The name of the interface the neighbor is reached over.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// The last accepted TS/PC pair.
    pub fn last(&self) -> TsPc {
        self.last
    }

    /// When the last authentic packet was accepted, in UNIX seconds.
    pub fn last_recv(&self) -> u64 {
        self.last_recv
    }
}

/// A row of the operator-facing memory dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborInfo {
    /// The link-local address of the neighbor.
    pub address: Ipv6Addr,
    /// The interface the neighbor is reached over.
    pub interface: String,
    /// The timestamp part of the last accepted pair.
    pub ts: u32,
    /// The packet counter part of the last accepted pair.
    pub pc: u16,
    /// Seconds since the last authentic packet.
    pub age: u64,
}

/// The set of per-neighbor replay protection records.
///
/// Identities are unique: an update for a known (address, interface) pair
/// modifies the existing record in place. The number of records is bounded
/// by the number of directly reachable neighbors, so a flat list suffices.
#[derive(Default, Clone)]
pub struct NeighborMemory {
    entries: Vec<NeighborEntry>,
}

impl NeighborMemory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for the given identity, if present.
    pub fn lookup(&self, address: Ipv6Addr, interface: &str) -> Option<&NeighborEntry> {
        self.entries
            .iter()
            .find(|entry| entry.address == address && entry.interface == interface)
    }

    /// Record an accepted TS/PC pair for the given identity, creating the
    /// record if needed.
    ///
    /// A record never moves backwards: a pair not greater than the stored
    /// one leaves the pair untouched (the receive time still refreshes).
    pub fn update(&mut self, address: Ipv6Addr, interface: &str, tspc: TsPc, now: u64) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.address == address && entry.interface == interface)
        {
            Some(entry) => {
                if tspc > entry.last {
                    entry.last = tspc;
                }
                entry.last_recv = now;
            }
            None => {
                debug!("adding memory record for {address} on {interface}");
                self.entries.push(NeighborEntry {
                    address,
                    interface: interface.to_string(),
                    last: tspc,
                    last_recv: now,
                });
            }
        }
    }

    /// Drop every record whose last accepted packet is older than `timeout`
    /// seconds. Returns the number of records dropped.
    pub fn housekeep(&mut self, now: u64, timeout: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let expired = entry.last_recv + u64::from(timeout) < now;
            if expired {
                debug!(
                    "memory record for {} on {} has expired",
                    entry.address, entry.interface
                );
            }
            !expired
        });
        before - self.entries.len()
    }

    /// Forget all records.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the memory holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all records.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter()
    }

    /// The operator-facing dump of the memory, with ages relative to `now`.
    pub fn entries(&self, now: u64) -> Vec<NeighborInfo> {
        self.entries
            .iter()
            .map(|entry| NeighborInfo {
                address: entry.address,
                interface: entry.interface.clone(),
                ts: entry.last.ts(),
                pc: entry.last.pc(),
                age: now.saturating_sub(entry.last_recv),
            })
            .collect()
    }
}
