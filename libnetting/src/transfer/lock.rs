use crate::amount::TokenAmount;
use crate::crypto::Hash256;
use crate::error::ReadError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub type BlockHeight = u64;

/// A hash-time-locked conditional payment.
///
/// The amount becomes claimable by the recipient once they know the preimage of `hashlock`, but only strictly before
/// block `expiration`. After that the value reverts to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    pub amount: TokenAmount,
    pub hashlock: Hash256,
    pub expiration: BlockHeight,
}

impl Lock {
    pub const SIZE: usize = 48;

    pub fn new(amount: u64, hashlock: Hash256, expiration: BlockHeight) -> Self {
        Lock { amount: TokenAmount::new(amount), hashlock, expiration }
    }

    /// `amount (u64 BE) ‖ expiration (u64 BE) ‖ hashlock`
    pub fn as_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.amount.value().to_be_bytes());
        bytes[8..16].copy_from_slice(&self.expiration.to_be_bytes());
        bytes[16..48].copy_from_slice(self.hashlock.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        if bytes.len() != Self::SIZE {
            return Err(ReadError::new("lock", format!("expected {} bytes, got {}", Self::SIZE, bytes.len())));
        }
        let mut amount = [0u8; 8];
        let mut expiration = [0u8; 8];
        let mut hashlock = [0u8; 32];
        amount.copy_from_slice(&bytes[0..8]);
        expiration.copy_from_slice(&bytes[8..16]);
        hashlock.copy_from_slice(&bytes[16..48]);
        Ok(Lock {
            amount: TokenAmount::new(u64::from_be_bytes(amount)),
            hashlock: Hash256::new(hashlock),
            expiration: u64::from_be_bytes(expiration),
        })
    }

    /// The commitment-tree leaf for this lock, `H(as_bytes())`.
    pub fn leaf_hash(&self) -> Hash256 {
        Hash256::digest(self.as_bytes())
    }

    /// A lock can no longer be claimed once the chain reaches its expiration block.
    pub fn is_expired(&self, current_block: BlockHeight) -> bool {
        current_block >= self.expiration
    }
}

impl Display for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lock({} @ {} until #{})", self.amount, self.hashlock.short(), self.expiration)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Secret;

    #[test]
    fn lock_layout() {
        let hashlock = Secret::from("secret").hashlock();
        let lock = Lock::new(10, hashlock, 0x0102);
        let bytes = lock.as_bytes();
        assert_eq!(&bytes[0..8], &[0, 0, 0, 0, 0, 0, 0, 10]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&bytes[16..], hashlock.as_bytes());
        assert_eq!(Lock::from_bytes(&bytes).unwrap(), lock);
        assert_eq!(lock.leaf_hash(), Hash256::digest(bytes));
        assert!(Lock::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn expiry_is_inclusive_of_expiration_block() {
        let lock = Lock::new(1, Hash256::ZERO, 10);
        assert!(!lock.is_expired(9));
        assert!(lock.is_expired(10));
        assert!(lock.is_expired(11));
    }
}
