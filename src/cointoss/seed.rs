//! Toss seeds and the private vault that holds them until reveal.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use rand::Rng;

use crate::canonical::content_hash;
use crate::types::EntryHash;

/// Type tag seeds are committed under.
pub const SEED_TAG: &str = "seed";

/// Error parsing a revealed seed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed seed: {0:?}")]
pub struct SeedError(pub String);

/// A participant's secret: random salt plus one decimal digit.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed {
    salt: String,
    digit: u8,
}

impl Seed {
    /// Draw a fresh seed.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        Self {
            salt: format!("{:032x}", rng.gen::<u128>()),
            digit: rng.gen_range(0..10),
        }
    }

    /// Parse the `salt-digit` form.
    ///
    /// The salt may itself contain `-`; the digit is what follows the last one.
    pub fn parse(s: &str) -> Result<Self, SeedError> {
        let err = || SeedError(s.to_string());
        let (salt, digit) = s.rsplit_once('-').ok_or_else(err)?;
        let digit: u8 = match digit.as_bytes() {
            [d @ b'0'..=b'9'] => d - b'0',
            _ => return Err(err()),
        };
        if salt.is_empty() {
            return Err(err());
        }
        Ok(Self {
            salt: salt.to_string(),
            digit,
        })
    }

    /// The secret digit, in `0..=9`.
    pub fn digit(&self) -> u8 {
        self.digit
    }

    /// Commitment published in place of the seed.
    pub fn commitment(&self) -> EntryHash {
        commitment_of(&self.to_string())
    }
}

/// Commitment of a seed's plaintext form.
pub fn commitment_of(plaintext: &str) -> EntryHash {
    content_hash(SEED_TAG, plaintext.as_bytes())
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.salt, self.digit)
    }
}

// Keep the plaintext out of logs.
impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("commitment", &self.commitment()).finish()
    }
}

/// Seeds held by one agent, keyed by commitment. Never replicated.
#[derive(Debug, Default)]
pub struct SeedVault {
    seeds: RwLock<BTreeMap<EntryHash, Seed>>,
}

impl SeedVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `seed` and return its commitment.
    pub fn insert(&self, seed: Seed) -> EntryHash {
        let hash = seed.commitment();
        self.seeds.write().insert(hash.clone(), seed);
        hash
    }

    /// Draw a seed, keep it and return its commitment.
    pub fn generate(&self) -> EntryHash {
        let seed = Seed::generate(&mut rand::thread_rng());
        self.insert(seed)
    }

    /// The seed behind `commitment`, if this vault holds it.
    pub fn get(&self, commitment: &EntryHash) -> Option<Seed> {
        self.seeds.read().get(commitment).cloned()
    }

    /// Number of seeds held.
    pub fn len(&self) -> usize {
        self.seeds.read().len()
    }

    /// Whether the vault is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let seed = Seed::generate(&mut rng);
            assert!(seed.digit() <= 9);
            let parsed = Seed::parse(&seed.to_string()).unwrap();
            assert_eq!(parsed, seed);
            assert_eq!(parsed.commitment(), seed.commitment());
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "abc", "abc-", "abc-12", "-4", "abc-x", "abc-٣"] {
            assert!(Seed::parse(bad).is_err(), "{bad:?} should not parse");
        }
        assert_eq!(Seed::parse("0.1-0.2-7").unwrap().digit(), 7);
    }

    #[test]
    fn test_commitment_is_well_formed_and_salted() {
        let a = Seed::parse("aaa-4").unwrap();
        let b = Seed::parse("bbb-4").unwrap();
        assert!(a.commitment().is_well_formed());
        assert_ne!(a.commitment(), b.commitment());
        assert_eq!(a.commitment(), commitment_of("aaa-4"));
    }

    #[test]
    fn test_vault_keyed_by_commitment() {
        let vault = SeedVault::new();
        let h = vault.generate();
        assert_eq!(vault.get(&h).map(|s| s.commitment()), Some(h));
        assert!(vault.get(&commitment_of("nope-1")).is_none());
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn test_debug_hides_plaintext() {
        let seed = Seed::parse("secretsalt-3").unwrap();
        assert!(!format!("{seed:?}").contains("secretsalt"));
    }
}
