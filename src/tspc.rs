//! Dedicated logic for the TS/PC pair carried in every authenticated packet.
//!
//! The timestamp / packet counter pair is a 48 bit value which must be
//! strictly increasing, in lexicographic order, over all packets a speaker
//! emits on an interface. Receivers remember the last accepted pair per
//! neighbor and reject anything not strictly greater, which is what provides
//! replay protection.

use core::fmt;
use std::error::Error;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Wire size of a TS/PC TLV value.
pub(crate) const TSPC_WIRE_SIZE: usize = 6;

/// The timestamp base used when advancing the TS/PC pair of an interface.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsBase {
    /// The timestamp is a bare wrap counter for the packet counter, starting
    /// at zero. Survives without a clock, but a reboot makes the speaker
    /// emit pairs its neighbors have already seen until the memory of the
    /// old pairs expires.
    Zero,
    /// The timestamp follows the UNIX clock, with the packet counter
    /// distinguishing packets sent within one second. Reliable as long as
    /// the clock is non-decreasing.
    #[default]
    Unix,
}

/// An error returned when parsing an unrecognized timestamp base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownTsBase;

impl fmt::Display for UnknownTsBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized timestamp base name")
    }
}

impl Error for UnknownTsBase {}

impl TsBase {
    /// A short description of the timestamp base, for operator output.
    pub fn description(&self) -> &'static str {
        match self {
            TsBase::Zero => "NVRAM-less PC wrap counter",
            TsBase::Unix => "UNIX time w/PC wrap counter",
        }
    }

    /// The configuration token identifying this timestamp base.
    pub fn token(&self) -> &'static str {
        match self {
            TsBase::Zero => "zero",
            TsBase::Unix => "unixtime",
        }
    }
}

impl fmt::Display for TsBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for TsBase {
    type Err = UnknownTsBase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zero" => Ok(TsBase::Zero),
            "unixtime" => Ok(TsBase::Unix),
            _ => Err(UnknownTsBase),
        }
    }
}

/// A timestamp / packet counter pair.
///
/// The derived ordering compares the timestamp first and the packet counter
/// second, which is exactly the lexicographic order the protocol requires.
/// On the wire the fields appear in the opposite order: the packet counter
/// is serialized before the timestamp.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TsPc {
    ts: u32,
    pc: u16,
}

impl TsPc {
    /// Create a new pair from its parts.
    pub fn new(ts: u32, pc: u16) -> Self {
        Self { ts, pc }
    }

    /// The timestamp part of the pair.
    pub fn ts(&self) -> u32 {
        self.ts
    }

    /// The packet counter part of the pair.
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// The pair to emit in the next packet, strictly greater than `self`.
    ///
    /// With the [`TsBase::Unix`] base the timestamp snaps to the clock and
    /// the counter restarts whenever the clock has moved past the recorded
    /// second. When it has not (a stalled or stepped-back clock), and always
    /// with the [`TsBase::Zero`] base, the counter increments instead and
    /// carries into the timestamp on wrap.
    #[must_use]
    pub fn advance(self, base: TsBase, now: u64) -> Self {
        if base == TsBase::Unix && now as u32 > self.ts {
            return TsPc {
                ts: now as u32,
                pc: 0,
            };
        }
        let (pc, wrapped) = self.pc.overflowing_add(1);
        TsPc {
            ts: if wrapped {
                self.ts.wrapping_add(1)
            } else {
                self.ts
            },
            pc,
        }
    }

    /// Construct a `TsPc` from the value bytes of a TS/PC TLV.
    ///
    /// # Panics
    ///
    /// This function will panic if there are insufficient bytes present in
    /// the provided buffer to decode a complete pair.
    pub(crate) fn from_bytes(mut src: &[u8]) -> Self {
        let pc = src.get_u16();
        let ts = src.get_u32();

        Self { ts, pc }
    }

    /// Encode this `TsPc` as the value of a TS/PC TLV.
    pub(crate) fn write_bytes<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16(self.pc);
        dst.put_u32(self.ts);
    }
}

impl fmt::Display for TsPc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}/{}", self.ts, self.pc))
    }
}
