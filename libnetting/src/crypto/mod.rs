pub mod hashes;
pub mod keys;
pub mod signature;

pub use hashes::{hash_parts, Hash256, Secret};
pub use keys::{Address, KeyError, KeyPair, PublicKey, SecretKey};
pub use signature::{Signature, Signer};
