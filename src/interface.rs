//! Per-interface authentication state.
//!
//! Everything the authentication core keeps per interface lives here: the
//! configured security associations in operator order, the rx enforcement
//! flag, the link-local source address packets are signed against, the last
//! emitted TS/PC pair and the interface tier of the statistics.

use core::fmt;
use std::error::Error;
use std::net::Ipv6Addr;

use tracing::debug;

use crate::security_association::Csa;
use crate::stats::AuthStats;
use crate::tspc::{TsBase, TsPc};

/// An error returned when setting a signing source address outside
/// `fe80::/10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotLinkLocal;

impl fmt::Display for NotLinkLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the signing source address must be link-local")
    }
}

impl Error for NotLinkLocal {}

/// Whether an address is a unicast link-local IPv6 address (`fe80::/10`).
fn is_unicast_link_local(address: Ipv6Addr) -> bool {
    address.segments()[0] & 0xffc0 == 0xfe80
}

/// The authentication state of one interface.
pub struct AuthInterface {
    name: String,
    csas: Vec<Csa>,
    rx_auth_required: bool,
    source_address: Option<Ipv6Addr>,
    tspc: TsPc,
    pub(crate) stats: AuthStats,
}

impl AuthInterface {
    /// Create the state for a named interface, with no security
    /// associations and authentication enforcement on.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            csas: Vec::new(),
            rx_auth_required: true,
            source_address: None,
            tspc: TsPc::default(),
            stats: AuthStats::default(),
        }
    }

    /// The name of the interface.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured security associations, in operator order.
    pub fn csas(&self) -> &[Csa] {
        &self.csas
    }

    /// Append a security association. Re-adding an identical association is
    /// a no-op; the configured position of the original is kept.
    pub fn add_csa(&mut self, csa: Csa) {
        if self.csas.contains(&csa) {
            debug!(
                "{}: association {} key-chain '{}' already configured",
                self.name, csa.hash_algo, csa.keychain
            );
            return;
        }
        self.csas.push(csa);
    }

    /// Remove a previously configured association. Returns whether it was
    /// present.
    pub fn remove_csa(&mut self, csa: &Csa) -> bool {
        match self.csas.iter().position(|existing| existing == csa) {
            Some(position) => {
                self.csas.remove(position);
                true
            }
            None => false,
        }
    }

    /// Remove every configured association, returning the interface to
    /// plain mode.
    pub fn clear_csas(&mut self) {
        self.csas.clear();
    }

    /// Whether packets failing authentication are dropped.
    pub fn rx_auth_required(&self) -> bool {
        self.rx_auth_required
    }

    /// Control whether packets failing authentication are dropped. Turning
    /// this off is a migration aid: verdicts still show up in the counters,
    /// but every packet is let through.
    pub fn set_rx_auth_required(&mut self, required: bool) {
        self.rx_auth_required = required;
    }

    /// The link-local address outbound packets are signed against.
    pub fn source_address(&self) -> Option<Ipv6Addr> {
        self.source_address
    }

    /// Set the link-local address outbound packets are signed against.
    ///
    /// This must be the exact source address the kernel will use for
    /// outgoing datagrams on this interface; a digest computed over any
    /// other address can never verify at the receiver.
    pub fn set_source_address(&mut self, address: Ipv6Addr) -> Result<(), NotLinkLocal> {
        if !is_unicast_link_local(address) {
            return Err(NotLinkLocal);
        }
        self.source_address = Some(address);
        Ok(())
    }

    /// Forget the signing source address, e.g. when the interface loses it.
    pub fn clear_source_address(&mut self) {
        self.source_address = None;
    }

    /// The last emitted TS/PC pair.
    pub fn last_tspc(&self) -> TsPc {
        self.tspc
    }

    /// Advance and return the TS/PC pair for the next outbound packet.
    pub(crate) fn bump_tspc(&mut self, base: TsBase, now: u64) -> TsPc {
        self.tspc = self.tspc.advance(base, now);
        self.tspc
    }

    /// The interface tier of the authentication counters.
    pub fn stats(&self) -> &AuthStats {
        &self.stats
    }

    /// Reset the interface tier of the authentication counters.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }
}
