//! Named chains of authentication keys with validity lifetimes.
//!
//! Security associations reference a key chain by name. A chain holds keys
//! identified by a unique index, each with independent lifetimes for sending
//! and for accepting, so operators can roll keys over without a flag day:
//! a new key typically becomes acceptable before it becomes used for
//! sending, and the old one stays acceptable for a while after.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The direction a key is to be used in, selecting which of its lifetimes
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    /// Signing outbound packets.
    Send,
    /// Verifying inbound packets.
    Accept,
}

/// A validity period in UNIX seconds. Either bound may be absent, in which
/// case the period extends indefinitely in that direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Lifetime {
    /// A lifetime which is always valid.
    pub const ALWAYS: Lifetime = Lifetime {
        start: None,
        end: None,
    };

    /// Whether `now` falls within this lifetime. Both bounds are inclusive.
    pub fn contains(&self, now: u64) -> bool {
        self.start.map_or(true, |start| now >= start) && self.end.map_or(true, |end| now <= end)
    }
}

/// A single authentication key in a chain.
///
/// This type intentionally does not implement or derive [`Debug`] to avoid
/// accidentally leaking secrets in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    index: u32,
    secret: Vec<u8>,
    send: Lifetime,
    accept: Lifetime,
}

impl Key {
    /// Create a new key valid indefinitely in both directions.
    pub fn new(index: u32, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            secret: secret.into(),
            send: Lifetime::ALWAYS,
            accept: Lifetime::ALWAYS,
        }
    }

    /// Restrict the period in which this key signs outbound packets.
    pub fn with_send_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.send = lifetime;
        self
    }

    /// Restrict the period in which this key verifies inbound packets.
    pub fn with_accept_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.accept = lifetime;
        self
    }

    /// The unique index of this key within its chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The secret bytes of this key.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Whether this key may be used in the given direction at time `now`.
    pub fn valid_for(&self, direction: KeyDirection, now: u64) -> bool {
        match direction {
            KeyDirection::Send => self.send.contains(now),
            KeyDirection::Accept => self.accept.contains(now),
        }
    }
}

/// A named, ordered collection of [`Key`]s.
///
/// Key indexes are unique within a chain and keys are kept sorted by index,
/// which fixes the order in which they are considered when deriving
/// security associations.
#[derive(Clone)]
pub struct Keychain {
    name: String,
    keys: Vec<Key>,
}

impl Keychain {
    /// Create a new, empty chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    /// The name of this chain.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a key, replacing any existing key with the same index.
    pub fn insert(&mut self, key: Key) {
        match self.keys.binary_search_by_key(&key.index, |k| k.index) {
            Ok(position) => self.keys[position] = key,
            Err(position) => self.keys.insert(position, key),
        }
    }

    /// Remove the key with the given index, if present.
    pub fn remove(&mut self, index: u32) -> Option<Key> {
        self.keys
            .binary_search_by_key(&index, |k| k.index)
            .ok()
            .map(|position| self.keys.remove(position))
    }

    /// The keys of this chain, in index order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The keys valid for the given direction at time `now`, in index order.
    pub fn keys_valid_for(
        &self,
        direction: KeyDirection,
        now: u64,
    ) -> impl Iterator<Item = &Key> {
        self.keys
            .iter()
            .filter(move |key| key.valid_for(direction, now))
    }

    /// The number of keys in this chain.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether this chain holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A store resolving key chain names to chains.
///
/// Security associations are configured by chain name and resolved on every
/// packet, so a chain may be created after associations referencing it.
pub trait KeychainStore {
    /// Look up a chain by name.
    fn lookup(&self, name: &str) -> Option<&Keychain>;
}

/// The obvious in-memory [`KeychainStore`].
#[derive(Default, Clone)]
pub struct Keychains {
    chains: HashMap<String, Keychain>,
}

impl Keychains {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chain, replacing any existing chain with the same name.
    pub fn insert(&mut self, chain: Keychain) {
        self.chains.insert(chain.name().to_string(), chain);
    }

    /// Remove a chain by name.
    pub fn remove(&mut self, name: &str) -> Option<Keychain> {
        self.chains.remove(name)
    }

    /// Mutable access to a chain by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Keychain> {
        self.chains.get_mut(name)
    }
}

impl KeychainStore for Keychains {
    fn lookup(&self, name: &str) -> Option<&Keychain> {
        self.chains.get(name)
    }
}
