use crate::crypto::hashes::{hash_to_scalar, Hash256};
use crate::crypto::signature::{Signature, Signer};
use crate::helpers::{array_from_hex, decode_hex_array, to_hex};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::{EdwardsPoint, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display};
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

pub const ADDRESS_SIZE: usize = 20;

#[derive(Debug, Clone, Error)]
pub enum KeyError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("The bytes do not represent a canonical scalar")]
    NonCanonicalScalar,
    #[error("The bytes do not represent a valid public key")]
    InvalidPoint,
}

//------------------------------------------   Address   ------------------------------------------------------------

/// A participant identifier: the last 20 bytes of `H(compressed public key)`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(
    #[serde(serialize_with = "to_hex", deserialize_with = "array_from_hex")] [u8; ADDRESS_SIZE],
);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    /// Takes the trailing 20 bytes of a digest.
    pub fn from_hash(hash: &Hash256) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&hash.as_bytes()[32 - ADDRESS_SIZE..]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Address(decode_hex_array(s)?))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.as_hex())
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{})", self.as_hex())
    }
}

//------------------------------------------   Public key   ---------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    point: EdwardsPoint,
    compressed: CompressedEdwardsY,
}

impl PublicKey {
    pub fn from_secret(secret: &SecretKey) -> Self {
        let point = secret.as_scalar() * ED25519_BASEPOINT_TABLE;
        PublicKey { point, compressed: point.compress() }
    }

    /// Decompresses and validates a public key. Small-order points are rejected.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let compressed = CompressedEdwardsY(*bytes);
        let point = compressed.decompress().ok_or(KeyError::InvalidPoint)?;
        if point.is_small_order() {
            return Err(KeyError::InvalidPoint);
        }
        Ok(PublicKey { point, compressed })
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = decode_hex_array::<32>(hex)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_point(&self) -> &EdwardsPoint {
        &self.point
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed.to_bytes()
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.compressed.as_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_hash(&Hash256::digest(self.compressed.as_bytes()))
    }

    pub fn verify<B: AsRef<[u8]>>(&self, msg: B, signature: &Signature) -> bool {
        signature.verify(self, msg)
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.as_hex())
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_hex(self.compressed.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = array_from_hex::<D, 32>(deserializer)?;
        PublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

//------------------------------------------   Secret key   ---------------------------------------------------------

#[derive(Clone)]
pub struct SecretKey(Zeroizing<Scalar>);

impl SecretKey {
    /// Derives a secret key from arbitrary seed material. Intended for tests and simulations.
    pub fn from_seed(seed: &[u8]) -> Self {
        SecretKey(Zeroizing::new(hash_to_scalar(b"netting-secret-key", &[seed])))
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut wide = Zeroizing::new([0u8; 64]);
        rng.fill_bytes(&mut wide[..]);
        SecretKey(Zeroizing::new(Scalar::from_bytes_mod_order_wide(&wide)))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or(KeyError::NonCanonicalScalar)?;
        Ok(SecretKey(Zeroizing::new(scalar)))
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(****)")
    }
}

//------------------------------------------   Key pair   -----------------------------------------------------------

/// A participant's signing identity.
#[derive(Clone, Debug)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
    address: Address,
}

impl KeyPair {
    pub fn new(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret(&secret);
        let address = public.address();
        KeyPair { secret, public, address }
    }

    pub fn from_seed(seed: &[u8]) -> Self {
        Self::new(SecretKey::from_seed(seed))
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(SecretKey::random(rng))
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl Signer for KeyPair {
    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature::sign(&self.secret, &self.public, message)
    }
}
