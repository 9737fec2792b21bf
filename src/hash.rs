//! The keyed hash backends used to authenticate packets.
//!
//! Every HMAC TLV carries a digest produced by one of a fixed set of hash
//! algorithms. The algorithm is not carried on the wire, it is part of the
//! security association between the speakers, so both sides must agree on it
//! out of band.

use core::fmt;
use std::error::Error;
use std::str::FromStr;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use whirlpool::Whirlpool;

/// The largest digest size of any supported [`HashAlgorithm`], in bytes.
pub const DIGEST_SIZE_MAX: usize = 64;

/// A hash algorithm usable in an HMAC TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Ripemd160,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Whirlpool,
}

/// An error returned when parsing an unrecognized hash algorithm token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownAlgorithm;

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized hash algorithm name")
    }
}

impl Error for UnknownAlgorithm {}

/// Opaque type indicating the hash backend failed to produce a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HmacError;

impl fmt::Display for HmacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("hash backend failed to compute an HMAC digest")
    }
}

impl Error for HmacError {}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Ripemd160,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Whirlpool,
    ];

    /// The size of a digest produced by this algorithm, in bytes.
    pub fn digest_length(&self) -> usize {
        match self {
            HashAlgorithm::Ripemd160 => 20,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Whirlpool => 64,
        }
    }

    /// The configuration token identifying this algorithm.
    pub fn token(&self) -> &'static str {
        match self {
            HashAlgorithm::Ripemd160 => "ripemd160",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Whirlpool => "whirlpool",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ripemd160" => Ok(HashAlgorithm::Ripemd160),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "whirlpool" => Ok(HashAlgorithm::Whirlpool),
            _ => Err(UnknownAlgorithm),
        }
    }
}

/// Compute the HMAC digest of `message` under `key` with the given algorithm.
///
/// The returned digest is exactly [`digest_length`](HashAlgorithm::digest_length)
/// bytes. Keys of any length are accepted, as HMAC defines its own key
/// normalization.
pub fn hmac_digest(
    algo: HashAlgorithm,
    message: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, HmacError> {
    match algo {
        HashAlgorithm::Ripemd160 => keyed_digest::<Hmac<Ripemd160>>(message, key),
        HashAlgorithm::Sha1 => keyed_digest::<Hmac<Sha1>>(message, key),
        HashAlgorithm::Sha256 => keyed_digest::<Hmac<Sha256>>(message, key),
        HashAlgorithm::Sha384 => keyed_digest::<Hmac<Sha384>>(message, key),
        HashAlgorithm::Sha512 => keyed_digest::<Hmac<Sha512>>(message, key),
        HashAlgorithm::Whirlpool => keyed_digest::<Hmac<Whirlpool>>(message, key),
    }
}

fn keyed_digest<M>(message: &[u8], key: &[u8]) -> Result<Vec<u8>, HmacError>
where
    M: Mac + KeyInit,
{
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| HmacError)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}
