use crate::helpers::{array_from_hex, decode_hex_array, from_hex, to_hex};
use blake2::{Blake2b, Blake2b512};
use curve25519_dalek::Scalar;
use digest::consts::U32;
use digest::Digest;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// The hash function used for leaves, tree nodes, hashlocks and transfer message digests.
pub type Blake2b256 = Blake2b<U32>;

pub const HASH_SIZE: usize = 32;

/// A 256-bit Blake2b digest.
///
/// Ordering is lexicographic over the raw bytes, which is what the commitment tree uses to pair siblings.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256(#[serde(serialize_with = "to_hex", deserialize_with = "array_from_hex")] [u8; HASH_SIZE]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; HASH_SIZE]);

    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash256(bytes)
    }

    pub fn digest<B: AsRef<[u8]>>(data: B) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data.as_ref());
        Hash256(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        decode_hex_array(hex).map(Hash256)
    }

    /// The first four bytes in hex. Handy for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash256(bytes)
    }
}

impl Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash256({})", self.as_hex())
    }
}

impl Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// Hashes a sequence of parts into a single digest. Each part is length-prefixed so that part boundaries are
/// unambiguous.
pub fn hash_parts(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Hash256(hasher.finalize().into())
}

/// Domain-separated wide hash onto the Ed25519 scalar field.
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Blake2b512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(hasher.finalize().as_slice());
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// The preimage of a hashlock. Whoever knows it can claim the lock before the lock expires.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Secret(#[serde(serialize_with = "to_hex", deserialize_with = "from_hex")] Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Secret(bytes.into())
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = vec![0u8; 32];
        rng.fill_bytes(&mut bytes);
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `H(secret)`
    pub fn hashlock(&self) -> Hash256 {
        Hash256::digest(&self.0)
    }

    pub fn unlocks(&self, hashlock: &Hash256) -> bool {
        self.hashlock() == *hashlock
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value.as_bytes())
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(hashlock={})", self.hashlock().short())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hashlock_is_hash_of_secret() {
        let secret = Secret::from("secret");
        assert_eq!(secret.hashlock(), Hash256::digest(b"secret"));
        assert!(secret.unlocks(&Hash256::digest("secret")));
        assert!(!Secret::from("guess").unlocks(&secret.hashlock()));
    }

    #[test]
    fn hash_parts_is_unambiguous() {
        let a = hash_parts(&[b"ab", b"c"]);
        let b = hash_parts(&[b"a", b"bc"]);
        assert_ne!(a, b);
        assert_ne!(a, Hash256::digest(b"abc"));
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash256::digest(b"netting");
        assert_eq!(Hash256::from_hex(&h.as_hex()).unwrap(), h);
        assert_eq!(Hash256::from_hex(&format!("0x{}", h.as_hex())).unwrap(), h);
        assert!(Hash256::from_hex("00").is_err());
    }

    #[test]
    fn random_secrets_differ() {
        let mut rng = rand::rng();
        let a = Secret::random(&mut rng);
        let b = Secret::random(&mut rng);
        assert_ne!(a, b);
        assert_eq!(a.as_bytes().len(), 32);
    }
}
