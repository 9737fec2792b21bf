//! Authentication statistics.
//!
//! Counters are monotonic and kept in two tiers: one set for the whole
//! speaker and one per interface, incremented together. Operators may clear
//! either tier independently.

use core::fmt;

use serde::Serialize;

/// The authentication counters of one tier.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthStats {
    /// Packets received on interfaces with no security associations.
    pub plain_recv: u64,
    /// Packets sent on interfaces with no security associations.
    pub plain_sent: u64,
    /// Packets authenticated and sent.
    pub auth_sent: u64,
    /// Send attempts with no valid key available.
    pub auth_sent_ng_nokeys: u64,
    /// Packets received and successfully authenticated.
    pub auth_recv_ok: u64,
    /// Receive attempts with no valid key available.
    pub auth_recv_ng_nokeys: u64,
    /// Received packets with no TS/PC TLV.
    pub auth_recv_ng_no_tspc: u64,
    /// Received packets whose TS/PC did not beat the remembered pair.
    pub auth_recv_ng_tspc: u64,
    /// Received packets with no matching HMAC digest.
    pub auth_recv_ng_hmac: u64,
    /// Internal errors: hash backend failures, missing source addresses.
    pub internal_err: u64,
}

impl AuthStats {
    /// Reset all counters to zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for AuthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in [
            ("Plain Rx", self.plain_recv),
            ("Plain Tx", self.plain_sent),
            ("Authenticated Tx OK", self.auth_sent),
            ("Authenticated Tx out of keys", self.auth_sent_ng_nokeys),
            ("Authenticated Rx OK", self.auth_recv_ok),
            ("Authenticated Rx out of keys", self.auth_recv_ng_nokeys),
            ("Authenticated Rx missing TS/PC", self.auth_recv_ng_no_tspc),
            ("Authenticated Rx bad TS/PC", self.auth_recv_ng_tspc),
            ("Authenticated Rx bad HMAC", self.auth_recv_ng_hmac),
            ("Internal errors", self.internal_err),
        ] {
            writeln!(f, "{label:<32}: {value}")?;
        }
        Ok(())
    }
}
