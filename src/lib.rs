//! HMAC packet authentication for a babel routing speaker.
//!
//! Babel packets exchanged on an authenticated interface carry a timestamp /
//! packet counter TLV for replay protection and one or more HMAC TLVs
//! binding the packet, including its source address, to a shared key. This
//! crate implements both directions of that exchange: checking received
//! packets and extending outbound packets, together with the supporting
//! state. It deliberately knows nothing about the rest of the protocol, and
//! nothing about sockets; the I/O layer hands in raw packets, source
//! addresses and the current time.
//!
//! The entry points live on [`Authenticator`]. Per-interface configuration
//! and state is an [`AuthInterface`] owned by the caller, and keys are
//! resolved through a [`KeychainStore`] at packet time. Everything runs to
//! completion on the calling thread.

pub use authenticator::{
    AnmTimeoutRange, AuthConfig, Authenticator, DEFAULT_ANM_TIMEOUT, MAX_AUTH_SPACE,
    MAX_DIGESTS_IN, MAX_DIGESTS_OUT, MIN_ANM_TIMEOUT,
};
pub use hash::{HashAlgorithm, HmacError, UnknownAlgorithm, DIGEST_SIZE_MAX};
pub use interface::{AuthInterface, NotLinkLocal};
pub use keychain::{Key, KeyDirection, Keychain, KeychainStore, Keychains, Lifetime};
pub use neighbor_memory::{NeighborEntry, NeighborInfo, NeighborMemory};
pub use packet::MalformedPacket;
pub use security_association::{derive_esas, Csa, Esa};
pub use stats::AuthStats;
pub use tspc::{TsBase, TsPc, UnknownTsBase};

mod authenticator;
mod hash;
mod interface;
mod keychain;
mod neighbor_memory;
mod packet;
mod security_association;
mod stats;
mod tspc;
