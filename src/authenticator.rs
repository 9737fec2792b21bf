//! The packet authentication entry points.
//!
//! Outbound packets get a TS/PC TLV and up to [`MAX_DIGESTS_OUT`] HMAC TLVs
//! appended; inbound packets must carry a TS/PC pair beating the remembered
//! pair for their sender and at least one HMAC digest matching a currently
//! valid key. The digest is computed over a padded form of the packet in
//! which every HMAC TLV's digest field holds the sender's link-local address
//! followed by zeros, which binds the digest to the packet source.

use core::fmt;
use std::error::Error;
use std::net::Ipv6Addr;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, error, warn};

use crate::hash::{hmac_digest, HmacError, DIGEST_SIZE_MAX};
use crate::interface::AuthInterface;
use crate::keychain::{KeyDirection, KeychainStore};
use crate::neighbor_memory::{NeighborEntry, NeighborInfo, NeighborMemory};
use crate::packet::{
    MalformedPacket, TlvIter, BABEL_MAGIC, BABEL_VERSION, HEADER_WIRE_SIZE, TLV_TYPE_HMAC,
    TLV_TYPE_TSPC,
};
use crate::security_association::{derive_esas, Esa};
use crate::stats::AuthStats;
use crate::tspc::{TsBase, TsPc, TSPC_WIRE_SIZE};

/// The maximum number of HMAC digests computed while verifying one received
/// packet. Bounds the work a flood of cheap candidate TLVs can force.
pub const MAX_DIGESTS_IN: usize = 4;
/// The maximum number of HMAC TLVs appended to one sent packet.
pub const MAX_DIGESTS_OUT: usize = 4;

/// The wire space authentication can add to a packet: one TS/PC TLV and
/// [`MAX_DIGESTS_OUT`] HMAC TLVs of the largest digest size. Senders must
/// leave this much room in their packet buffers.
pub const MAX_AUTH_SPACE: usize =
    2 + TSPC_WIRE_SIZE + MAX_DIGESTS_OUT * (2 + 2 + DIGEST_SIZE_MAX);

/// The default timeout for authentic neighbor records, in seconds. Kept low
/// so that naive neighbors with a zero timestamp base can reboot without
/// being locked out for long.
pub const DEFAULT_ANM_TIMEOUT: u32 = 300;
/// The smallest accepted neighbor record timeout, in seconds.
pub const MIN_ANM_TIMEOUT: u32 = 5;

/// An error returned when configuring a neighbor memory timeout below
/// [`MIN_ANM_TIMEOUT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnmTimeoutRange;

impl fmt::Display for AnmTimeoutRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "neighbor memory timeout must be at least {MIN_ANM_TIMEOUT} seconds"
        )
    }
}

impl Error for AnmTimeoutRange {}

/// Process wide authentication configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    ts_base: TsBase,
    anm_timeout: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ts_base: TsBase::default(),
            anm_timeout: DEFAULT_ANM_TIMEOUT,
        }
    }
}

impl AuthConfig {
    /// The timestamp base used when advancing per-interface TS/PC pairs.
    pub fn ts_base(&self) -> TsBase {
        self.ts_base
    }

    /// Set the timestamp base.
    pub fn set_ts_base(&mut self, base: TsBase) {
        self.ts_base = base;
    }

    /// The timeout for authentic neighbor records, in seconds.
    pub fn anm_timeout(&self) -> u32 {
        self.anm_timeout
    }

    /// Set the neighbor record timeout. Values below [`MIN_ANM_TIMEOUT`]
    /// are rejected.
    pub fn set_anm_timeout(&mut self, seconds: u32) -> Result<(), AnmTimeoutRange> {
        if seconds < MIN_ANM_TIMEOUT {
            return Err(AnmTimeoutRange);
        }
        self.anm_timeout = seconds;
        Ok(())
    }

    /// The configuration lines differing from the defaults, for a
    /// configuration writer to embed.
    pub fn config_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.anm_timeout != DEFAULT_ANM_TIMEOUT {
            lines.push(format!(" anm-timeout {}", self.anm_timeout));
        }
        if self.ts_base != TsBase::default() {
            lines.push(format!(" ts-base {}", self.ts_base));
        }
        lines
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24}= {}", "MaxDigestsIn", MAX_DIGESTS_IN)?;
        writeln!(f, "{:<24}= {}", "MaxDigestsOut", MAX_DIGESTS_OUT)?;
        writeln!(f, "{:<24}= {}", "Timestamp base", self.ts_base.description())?;
        writeln!(f, "{:<24}= {}", "Memory timeout", self.anm_timeout)
    }
}

/// The authentication state of one speaker: configuration, the authentic
/// neighbors memory and the process tier of the statistics.
///
/// Per-interface state lives in [`AuthInterface`] values owned by the
/// caller, and key chains are resolved through a [`KeychainStore`] on every
/// packet. All entry points run to completion; the caller drives them, and
/// periodic [`housekeep`](Self::housekeep) invocations, from one thread.
#[derive(Default)]
pub struct Authenticator {
    config: AuthConfig,
    neighbors: NeighborMemory,
    stats: AuthStats,
}

impl Authenticator {
    /// Create an authenticator with the given configuration.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            neighbors: NeighborMemory::new(),
            stats: AuthStats::default(),
        }
    }

    /// The process wide configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Mutable access to the process wide configuration.
    pub fn config_mut(&mut self) -> &mut AuthConfig {
        &mut self.config
    }

    /// The process tier of the authentication counters.
    pub fn stats(&self) -> &AuthStats {
        &self.stats
    }

    /// Reset the process tier of the authentication counters.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// The authentic neighbors memory.
    pub fn neighbors(&self) -> &NeighborMemory {
        &self.neighbors
    }

    /// Forget every authentic neighbor record.
    pub fn clear_neighbors(&mut self) {
        self.neighbors.clear();
    }

    /// The operator-facing dump of the neighbors memory.
    pub fn neighbor_entries(&self, now: u64) -> Vec<NeighborInfo> {
        self.neighbors.entries(now)
    }

    /// Drop expired neighbor records. The caller schedules this
    /// periodically. Returns the number of records dropped.
    pub fn housekeep(&mut self, now: u64) -> usize {
        self.neighbors.housekeep(now, self.config.anm_timeout)
    }

    /// Check a received packet for authenticity.
    ///
    /// `packet` is the complete datagram including the babel header, `from`
    /// the source address of the datagram it arrived in. Returns whether
    /// the packet may be processed; `false` means the caller must discard
    /// it. On an interface without security associations every packet
    /// passes, and on one where authentication is not required the verdict
    /// is recorded in the counters but the packet passes regardless.
    pub fn check_packet<S: KeychainStore>(
        &mut self,
        store: &S,
        ifp: &mut AuthInterface,
        from: Ipv6Addr,
        packet: &[u8],
        now: u64,
    ) -> bool {
        if ifp.csas().is_empty() {
            self.stats.plain_recv += 1;
            ifp.stats.plain_recv += 1;
            return true;
        }
        debug!("{}: packet of {}B from {from}", ifp.name(), packet.len());
        // Check the TS/PC against the remembered pair before doing anything
        // expensive. A neighbor we have no record of compares against the
        // zero pair.
        let stored = self
            .neighbors
            .lookup(from, ifp.name())
            .map(NeighborEntry::last)
            .unwrap_or_default();
        let Some(tspc_offset) = Self::check_tspc(&mut self.stats, &mut ifp.stats, packet, stored)
        else {
            return !ifp.rx_auth_required();
        };
        let accepted = match pad_packet(packet, from) {
            Ok(padded) => {
                let esas = derive_esas(ifp.csas(), store, KeyDirection::Accept, now);
                debug!("{}: {} ESAs available", ifp.name(), esas.len());
                if esas.is_empty() {
                    self.stats.auth_recv_ng_nokeys += 1;
                    ifp.stats.auth_recv_ng_nokeys += 1;
                    warn!("interface {} has no valid keys", ifp.name());
                }
                let mut digests_done = 0;
                let mut accepted = false;
                for esa in &esas {
                    match esa_digest_matches(packet, &padded, esa, &mut digests_done) {
                        Ok(true) => {
                            accepted = true;
                            break;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            error!("{}: {e}", ifp.name());
                            self.stats.internal_err += 1;
                            ifp.stats.internal_err += 1;
                        }
                    }
                }
                accepted
            }
            Err(e) => {
                debug!("{}: cannot pad packet: {e}", ifp.name());
                false
            }
        };
        if accepted {
            let tspc = TsPc::from_bytes(&packet[tspc_offset..tspc_offset + TSPC_WIRE_SIZE]);
            self.neighbors.update(from, ifp.name(), tspc, now);
            self.stats.auth_recv_ok += 1;
            ifp.stats.auth_recv_ok += 1;
            debug!("{}: updated neighbor TS/PC to {tspc}", ifp.name());
        } else {
            self.stats.auth_recv_ng_hmac += 1;
            ifp.stats.auth_recv_ng_hmac += 1;
            debug!("{}: authentication failed", ifp.name());
        }
        accepted || !ifp.rx_auth_required()
    }

    /// Authenticate an outbound packet body.
    ///
    /// `body` holds the TLVs to send, without the babel header; a freshly
    /// advanced TS/PC TLV and one HMAC TLV per effective association (up to
    /// [`MAX_DIGESTS_OUT`]) are appended in place. Returns the new body
    /// length. Failures are absorbed: the body comes back unchanged and the
    /// caller may still send it unauthenticated, or drop it by policy.
    pub fn make_packet<S: KeychainStore>(
        &mut self,
        store: &S,
        ifp: &mut AuthInterface,
        body: &mut BytesMut,
        now: u64,
    ) -> usize {
        let body_len = body.len();
        if ifp.csas().is_empty() {
            self.stats.plain_sent += 1;
            ifp.stats.plain_sent += 1;
            return body_len;
        }
        let Some(source) = ifp.source_address() else {
            error!("no link-local address present on interface {}", ifp.name());
            self.stats.internal_err += 1;
            ifp.stats.internal_err += 1;
            return body_len;
        };
        let esas = derive_esas(ifp.csas(), store, KeyDirection::Send, now);
        debug!("{}: {} ESAs available", ifp.name(), esas.len());
        if esas.is_empty() {
            self.stats.auth_sent_ng_nokeys += 1;
            ifp.stats.auth_sent_ng_nokeys += 1;
            warn!("interface {} has no valid keys", ifp.name());
        }
        // Header, original body, then the authentication TLVs.
        let mut packet = BytesMut::with_capacity(HEADER_WIRE_SIZE + body_len + MAX_AUTH_SPACE);
        packet.put_u8(BABEL_MAGIC);
        packet.put_u8(BABEL_VERSION);
        packet.put_u16(0); // body length, filled in once the TLVs are in
        packet.put_slice(&body[..]);
        let tspc = ifp.bump_tspc(self.config.ts_base, now);
        packet.put_u8(TLV_TYPE_TSPC);
        packet.put_u8(TSPC_WIRE_SIZE as u8);
        tspc.write_bytes(&mut packet);
        debug!("{}: appended TS/PC TLV ({tspc})", ifp.name());
        // One placeholder HMAC TLV per association, each digest field
        // already in padded form, so the finished buffer doubles as its own
        // padded copy.
        let mut digest_offsets = Vec::with_capacity(MAX_DIGESTS_OUT);
        for esa in esas.iter().take(MAX_DIGESTS_OUT) {
            let digest_length = esa.hash_algo().digest_length();
            packet.put_u8(TLV_TYPE_HMAC);
            packet.put_u8((2 + digest_length) as u8);
            packet.put_u16(esa.key_id());
            digest_offsets.push(packet.len());
            packet.put_slice(&source.octets());
            packet.put_bytes(0, digest_length - 16);
        }
        let new_body_len = packet.len() - HEADER_WIRE_SIZE;
        packet[2..4].copy_from_slice(&(new_body_len as u16).to_be_bytes());
        let padded = packet.to_vec();
        for (esa, &offset) in esas.iter().zip(digest_offsets.iter()) {
            match hmac_digest(esa.hash_algo(), &padded, esa.secret()) {
                Ok(digest) => packet[offset..offset + digest.len()].copy_from_slice(&digest),
                Err(e) => {
                    error!("{}: {e}", ifp.name());
                    self.stats.internal_err += 1;
                    ifp.stats.internal_err += 1;
                    return body_len;
                }
            }
        }
        body.extend_from_slice(&packet[HEADER_WIRE_SIZE + body_len..]);
        self.stats.auth_sent += 1;
        ifp.stats.auth_sent += 1;
        debug!("{}: authenticated body length is {}B", ifp.name(), body.len());
        body.len()
    }

    /// Locate the first TS/PC TLV and check it against the remembered pair.
    /// Returns the offset of the TLV value on success. Subsequent TS/PC
    /// TLVs are never consulted, and an undersized first one counts as
    /// missing.
    fn check_tspc(
        stats: &mut AuthStats,
        if_stats: &mut AuthStats,
        packet: &[u8],
        stored: TsPc,
    ) -> Option<usize> {
        for tlv in TlvIter::new(packet) {
            let Ok(tlv) = tlv else { break };
            if tlv.tlv_type != TLV_TYPE_TSPC {
                continue;
            }
            if tlv.length != TSPC_WIRE_SIZE {
                break;
            }
            let received = TsPc::from_bytes(&packet[tlv.offset..tlv.offset + TSPC_WIRE_SIZE]);
            if received > stored {
                debug!("received TS/PC is ({received}), stored is ({stored}), check OK");
                return Some(tlv.offset);
            }
            stats.auth_recv_ng_tspc += 1;
            if_stats.auth_recv_ng_tspc += 1;
            debug!("received TS/PC is ({received}), stored is ({stored}), check failed");
            return None;
        }
        stats.auth_recv_ng_no_tspc += 1;
        if_stats.auth_recv_ng_no_tspc += 1;
        debug!("no TS/PC TLV in the packet, check failed");
        None
    }
}

/// Produce the padded form of a packet: a copy in which every HMAC TLV's
/// digest field is replaced by the given address followed by zeros. All
/// other bytes, including the HMAC TLVs' key id fields, are preserved.
fn pad_packet(packet: &[u8], source: Ipv6Addr) -> Result<Vec<u8>, MalformedPacket> {
    let mut padded = packet.to_vec();
    for tlv in TlvIter::new(packet) {
        let tlv = tlv?;
        if tlv.tlv_type != TLV_TYPE_HMAC {
            continue;
        }
        // An HMAC TLV must at least hold its key id and the address.
        if tlv.length < 2 + 16 {
            return Err(MalformedPacket);
        }
        let digest = &mut padded[tlv.offset + 2..tlv.offset + tlv.length];
        digest[..16].copy_from_slice(&source.octets());
        digest[16..].fill(0);
    }
    Ok(padded)
}

/// Whether any HMAC TLV in the packet matches the given association: same
/// key id, the right digest size for the algorithm, and a digest equal to
/// the locally computed HMAC of the padded packet.
///
/// The local digest is computed lazily, at most once per association, and
/// only while the shared budget permits; `digests_done` counts computations
/// across all associations tried for one packet.
fn esa_digest_matches(
    packet: &[u8],
    padded: &[u8],
    esa: &Esa,
    digests_done: &mut usize,
) -> Result<bool, HmacError> {
    if *digests_done == MAX_DIGESTS_IN {
        return Ok(false);
    }
    let digest_length = esa.hash_algo().digest_length();
    let mut local_digest = None;
    for tlv in TlvIter::new(packet) {
        let Ok(tlv) = tlv else { break };
        if tlv.tlv_type != TLV_TYPE_HMAC || tlv.length != 2 + digest_length {
            continue;
        }
        let mut value = &packet[tlv.offset..];
        if value.get_u16() != esa.key_id() {
            continue;
        }
        if local_digest.is_none() {
            let digest = hmac_digest(esa.hash_algo(), padded, esa.secret())?;
            *digests_done += 1;
            let done = *digests_done;
            debug!(
                "local {} digest #{done} for key id {}",
                esa.hash_algo(),
                esa.key_id()
            );
            local_digest = Some(digest);
        }
        let local = local_digest
            .as_deref()
            .expect("local digest was computed above; qed");
        if packet[tlv.offset + 2..tlv.offset + 2 + digest_length] == *local {
            debug!("TLV digest matches");
            return Ok(true);
        }
        debug!("TLV digest differs");
    }
    Ok(false)
}
