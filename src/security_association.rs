//! Configured and effective security associations.
//!
//! Operators configure an interface with a list of [`Csa`]s, each naming a
//! hash algorithm and a key chain. At packet time that list is flattened
//! into an ordered list of [`Esa`]s, one per usable key, which is what the
//! signing and verification code actually consumes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hash::HashAlgorithm;
use crate::keychain::{KeyDirection, KeychainStore};

/// A configured security association: a hash algorithm paired with the name
/// of the key chain providing the keys for it.
///
/// The configured order of associations on an interface matters: it decides
/// which keys make the cut when more qualify than fit in a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Csa {
    pub hash_algo: HashAlgorithm,
    pub keychain: String,
}

impl Csa {
    /// Create a new association.
    pub fn new(hash_algo: HashAlgorithm, keychain: impl Into<String>) -> Self {
        Self {
            hash_algo,
            keychain: keychain.into(),
        }
    }
}

/// An effective security association: one concrete key to sign or verify
/// with. Derived from the configured associations for a single packet and
/// discarded afterwards.
///
/// This type intentionally does not implement or derive [`Debug`] to avoid
/// accidentally leaking secrets in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Esa {
    hash_algo: HashAlgorithm,
    key_id: u16,
    secret: Vec<u8>,
}

impl Esa {
    /// The hash algorithm of this association.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// The key identifier carried in the HMAC TLV.
    pub fn key_id(&self) -> u16 {
        self.key_id
    }

    /// The secret to key the HMAC with.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

/// Flatten the configured associations of an interface into an ordered list
/// of effective associations, using the keys valid for `direction` at time
/// `now`.
///
/// The result interleaves the associations: first the first usable key of
/// every CSA in configured order, then every second key, and so on. This
/// guarantees that when a cap on the number of digests is hit, every CSA
/// has contributed its best key before any CSA contributes a second one.
///
/// A full duplicate (same algorithm, key id and secret) of an earlier entry
/// is suppressed. An association naming a chain the store does not know is
/// skipped; the chain may well appear later.
pub fn derive_esas<S: KeychainStore>(
    csas: &[Csa],
    store: &S,
    direction: KeyDirection,
    now: u64,
) -> Vec<Esa> {
    let mut tagged: Vec<(usize, usize, Esa)> = Vec::new();
    for (csa_index, csa) in csas.iter().enumerate() {
        let Some(chain) = store.lookup(&csa.keychain) else {
            debug!(
                "key chain '{}' configured for {} does not exist",
                csa.keychain, csa.hash_algo
            );
            continue;
        };
        let mut key_position = 0;
        for key in chain.keys_valid_for(direction, now) {
            // The key id is the chain-unique key index modulo 2^16.
            let key_id = key.index() as u16;
            if tagged.iter().any(|(_, _, esa)| {
                esa.hash_algo == csa.hash_algo
                    && esa.key_id == key_id
                    && esa.secret == key.secret()
            }) {
                debug!("key id {key_id} is a full duplicate of another key");
                continue;
            }
            tagged.push((
                key_position,
                csa_index,
                Esa {
                    hash_algo: csa.hash_algo,
                    key_id,
                    secret: key.secret().to_vec(),
                },
            ));
            key_position += 1;
        }
    }
    tagged.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    tagged.into_iter().map(|(_, _, esa)| esa).collect()
}

#[cfg(test)]
mod tests {
    use super::{derive_esas, Csa};
    use crate::hash::HashAlgorithm;
    use crate::keychain::{Key, KeyDirection, Keychain, Keychains, Lifetime};

    fn store_with(chains: Vec<Keychain>) -> Keychains {
        let mut store = Keychains::new();
        for chain in chains {
            store.insert(chain);
        }
        store
    }

    #[test]
    fn interleaves_csas() {
        let mut first = Keychain::new("first");
        first.insert(Key::new(10, b"first-10".as_slice()));
        first.insert(Key::new(11, b"first-11".as_slice()));
        let mut second = Keychain::new("second");
        second.insert(Key::new(20, b"second-20".as_slice()));
        second.insert(Key::new(21, b"second-21".as_slice()));
        let store = store_with(vec![first, second]);

        let csas = [
            Csa::new(HashAlgorithm::Sha256, "first"),
            Csa::new(HashAlgorithm::Sha1, "second"),
        ];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);

        let ids: Vec<u16> = esas.iter().map(|esa| esa.key_id()).collect();
        assert_eq!(ids, [10, 20, 11, 21]);
    }

    #[test]
    fn first_keys_of_all_csas_come_first() {
        // With a cap of four outgoing digests and four CSAs, each CSA must
        // contribute its first valid key before any contributes a second.
        let mut chains = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let mut chain = Keychain::new(name);
            chain.insert(Key::new(1, format!("{name}-1").into_bytes()));
            chain.insert(Key::new(2, format!("{name}-2").into_bytes()));
            chains.push(chain);
        }
        let store = store_with(chains);

        let csas = [
            Csa::new(HashAlgorithm::Sha256, "a"),
            Csa::new(HashAlgorithm::Sha256, "b"),
            Csa::new(HashAlgorithm::Sha256, "c"),
            Csa::new(HashAlgorithm::Sha256, "d"),
        ];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);

        let first_four: Vec<Vec<u8>> = esas[..4].iter().map(|esa| esa.secret().to_vec()).collect();
        assert_eq!(
            first_four,
            [b"a-1".to_vec(), b"b-1".to_vec(), b"c-1".to_vec(), b"d-1".to_vec()]
        );
    }

    #[test]
    fn suppresses_full_duplicates() {
        let mut chain = Keychain::new("shared");
        chain.insert(Key::new(1, b"common".as_slice()));
        let store = store_with(vec![chain]);

        // The same chain under the same algorithm twice: one ESA results.
        let csas = [
            Csa::new(HashAlgorithm::Sha256, "shared"),
            Csa::new(HashAlgorithm::Sha256, "shared"),
        ];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);
        assert_eq!(esas.len(), 1);

        // A different algorithm is not a full duplicate.
        let csas = [
            Csa::new(HashAlgorithm::Sha256, "shared"),
            Csa::new(HashAlgorithm::Sha512, "shared"),
        ];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);
        assert_eq!(esas.len(), 2);
    }

    #[test]
    fn key_id_is_index_modulo_2_16() {
        let mut chain = Keychain::new("wide");
        chain.insert(Key::new(65_537, b"wrapped".as_slice()));
        let store = store_with(vec![chain]);

        let csas = [Csa::new(HashAlgorithm::Sha256, "wide")];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);
        assert_eq!(esas[0].key_id(), 1);
    }

    #[test]
    fn missing_chain_is_skipped() {
        let mut chain = Keychain::new("present");
        chain.insert(Key::new(1, b"here".as_slice()));
        let store = store_with(vec![chain]);

        let csas = [
            Csa::new(HashAlgorithm::Sha256, "absent"),
            Csa::new(HashAlgorithm::Sha256, "present"),
        ];
        let esas = derive_esas(&csas, &store, KeyDirection::Send, 0);
        assert_eq!(esas.len(), 1);
        assert_eq!(esas[0].secret(), b"here");
    }

    #[test]
    fn lifetime_filter_applies() {
        let mut chain = Keychain::new("rolling");
        chain.insert(Key::new(1, b"old".as_slice()).with_accept_lifetime(Lifetime {
            start: None,
            end: Some(1_000),
        }));
        chain.insert(Key::new(2, b"new".as_slice()).with_accept_lifetime(Lifetime {
            start: Some(900),
            end: None,
        }));
        let store = store_with(vec![chain]);
        let csas = [Csa::new(HashAlgorithm::Sha256, "rolling")];

        let esas = derive_esas(&csas, &store, KeyDirection::Accept, 950);
        assert_eq!(esas.len(), 2);

        let esas = derive_esas(&csas, &store, KeyDirection::Accept, 2_000);
        assert_eq!(esas.len(), 1);
        assert_eq!(esas[0].key_id(), 2);

        let esas = derive_esas(&csas, &store, KeyDirection::Accept, 500);
        assert_eq!(esas.len(), 1);
        assert_eq!(esas[0].key_id(), 1);
    }

    #[test]
    fn empty_when_nothing_qualifies() {
        let store = Keychains::new();
        let csas = [Csa::new(HashAlgorithm::Sha256, "nowhere")];
        assert!(derive_esas(&csas, &store, KeyDirection::Send, 0).is_empty());
        assert!(derive_esas(&[], &store, KeyDirection::Send, 0).is_empty());
    }
}
