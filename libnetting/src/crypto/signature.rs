use crate::crypto::hashes::hash_to_scalar;
use crate::crypto::keys::{Address, PublicKey, SecretKey};
use crate::helpers::{array_from_hex, to_hex};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::{EdwardsPoint, Scalar};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Debug;
use zeroize::Zeroize;

/// The signing capability a node needs. Key management lives behind this trait.
pub trait Signer {
    fn address(&self) -> Address;
    fn public_key(&self) -> &PublicKey;
    fn sign(&self, message: &[u8]) -> Signature;
}

/// A Schnorr signature over Ed25519, `(R, s)` with `s = r + e·x` and `e = H(R ‖ P ‖ msg)`.
///
/// `R` is kept in compressed form so that a signature read off the wire can be carried around without being
/// validated first. Verification rejects it if it does not decompress.
#[derive(Clone, Copy, PartialEq, Eq)]
#[allow(non_snake_case)]
pub struct Signature {
    R: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    pub const SIZE: usize = 64;

    #[allow(non_snake_case)]
    fn challenge<B: AsRef<[u8]>>(R: &[u8; 32], pubkey: &[u8; 32], msg: B) -> Scalar {
        hash_to_scalar(b"NettingSignature-challenge", &[b"R", R, b"P", pubkey, b"MSG", msg.as_ref()])
    }

    /// Signs `msg`. The nonce is derived from the secret key and the message, so signing the same message twice
    /// yields the same signature.
    #[allow(non_snake_case)]
    pub fn sign<B: AsRef<[u8]>>(secret: &SecretKey, public: &PublicKey, msg: B) -> Self {
        let msg = msg.as_ref();
        let mut nonce = hash_to_scalar(b"NettingSignature-nonce", &[secret.as_scalar().as_bytes(), msg]);
        let R = (&nonce * ED25519_BASEPOINT_TABLE).compress().to_bytes();
        let e = Self::challenge(&R, &public.to_bytes(), msg);
        let s = nonce + e * secret.as_scalar();
        nonce.zeroize();
        Signature { R, s: s.to_bytes() }
    }

    #[allow(non_snake_case)]
    pub fn verify<B: AsRef<[u8]>>(&self, public_key: &PublicKey, msg: B) -> bool {
        let Some(R) = CompressedEdwardsY(self.R).decompress() else {
            return false;
        };
        let Some(s) = Option::<Scalar>::from(Scalar::from_canonical_bytes(self.s)) else {
            return false;
        };
        let e = Self::challenge(&self.R, &public_key.to_bytes(), msg);
        let sG: EdwardsPoint = &s * ED25519_BASEPOINT_TABLE;
        let rhs = R + e * public_key.as_point();
        sG == rhs
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..32].copy_from_slice(&self.R);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    #[allow(non_snake_case)]
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut R = [0u8; 32];
        let mut s = [0u8; 32];
        R.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Signature { R, s }
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.to_bytes()[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = array_from_hex::<D, 64>(deserializer)?;
        Ok(Signature::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn sign_and_verify() {
        let keys = KeyPair::random(&mut rand::rng());
        let msg = b"transfer #1";
        let sig = keys.sign(msg);
        assert!(keys.public_key().verify(msg, &sig));
        assert!(!keys.public_key().verify(b"transfer #2", &sig));
    }

    #[test]
    fn wrong_key_rejected() {
        let alice = KeyPair::from_seed(b"alice");
        let bob = KeyPair::from_seed(b"bob");
        let sig = alice.sign(b"hello");
        assert!(!bob.public_key().verify(b"hello", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let alice = KeyPair::from_seed(b"alice");
        assert_eq!(alice.sign(b"hello"), alice.sign(b"hello"));
        assert_ne!(alice.sign(b"hello"), alice.sign(b"hello!"));
    }

    #[test]
    fn tampered_signature_rejected() {
        let alice = KeyPair::from_seed(b"alice");
        let sig = alice.sign(b"hello");
        let mut bytes = sig.to_bytes();
        bytes[40] ^= 0x01;
        let tampered = Signature::from_bytes(&bytes);
        assert!(!alice.public_key().verify(b"hello", &tampered));
        // Non-canonical s
        bytes[32..].copy_from_slice(&[0xff; 32]);
        assert!(!alice.public_key().verify(b"hello", &Signature::from_bytes(&bytes)));
    }

    #[test]
    fn signature_serde() {
        let alice = KeyPair::from_seed(b"alice");
        let sig = alice.sign(b"hello");
        let s = ron::to_string(&sig).unwrap();
        let back: Signature = ron::from_str(&s).unwrap();
        assert_eq!(back, sig);
    }
}
