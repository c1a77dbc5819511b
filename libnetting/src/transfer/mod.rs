mod lock;
pub mod wire;

pub use lock::{BlockHeight, Lock};
pub use wire::{Readable, Writable};

use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256, PublicKey, Signature, Signer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// An unconditional balance update. `transferred_amount` is cumulative over the life of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectTransfer {
    pub nonce: u64,
    pub asset: Address,
    /// The channel this balance proof belongs to. Binds the signature to one channel.
    pub channel: Address,
    pub recipient: Address,
    pub transferred_amount: TokenAmount,
    pub locksroot: Hash256,
}

/// A balance update that adds `lock` to the sender's commitment tree.
///
/// `transferred_amount` covers only the value that has already been settled off-chain. The locked amount stays in
/// escrow until the secret is revealed or the lock expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedTransfer {
    pub nonce: u64,
    pub asset: Address,
    pub channel: Address,
    pub recipient: Address,
    pub transferred_amount: TokenAmount,
    pub locksroot: Hash256,
    pub lock: Lock,
    /// The final payee of a mediated route. Equal to `recipient` on a single hop.
    pub target: Address,
    pub initiator: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transfer {
    Direct(DirectTransfer),
    Locked(LockedTransfer),
}

impl Transfer {
    pub fn nonce(&self) -> u64 {
        match self {
            Transfer::Direct(t) => t.nonce,
            Transfer::Locked(t) => t.nonce,
        }
    }

    pub fn asset(&self) -> Address {
        match self {
            Transfer::Direct(t) => t.asset,
            Transfer::Locked(t) => t.asset,
        }
    }

    pub fn channel(&self) -> Address {
        match self {
            Transfer::Direct(t) => t.channel,
            Transfer::Locked(t) => t.channel,
        }
    }

    pub fn recipient(&self) -> Address {
        match self {
            Transfer::Direct(t) => t.recipient,
            Transfer::Locked(t) => t.recipient,
        }
    }

    pub fn transferred_amount(&self) -> TokenAmount {
        match self {
            Transfer::Direct(t) => t.transferred_amount,
            Transfer::Locked(t) => t.transferred_amount,
        }
    }

    pub fn locksroot(&self) -> Hash256 {
        match self {
            Transfer::Direct(t) => t.locksroot,
            Transfer::Locked(t) => t.locksroot,
        }
    }

    pub fn lock(&self) -> Option<&Lock> {
        match self {
            Transfer::Direct(_) => None,
            Transfer::Locked(t) => Some(&t.lock),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Transfer::Locked(_))
    }

    /// `H(canonical bytes)`. This is what gets signed.
    pub fn message_hash(&self) -> Hash256 {
        Hash256::digest(self.to_bytes())
    }

    pub fn sign<S: Signer + ?Sized>(self, signer: &S) -> SignedTransfer {
        let signature = signer.sign(self.message_hash().as_bytes());
        SignedTransfer { transfer: self, signature }
    }
}

impl From<DirectTransfer> for Transfer {
    fn from(t: DirectTransfer) -> Self {
        Transfer::Direct(t)
    }
}

impl From<LockedTransfer> for Transfer {
    fn from(t: LockedTransfer) -> Self {
        Transfer::Locked(t)
    }
}

impl Display for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transfer::Direct(t) => {
                write!(f, "Direct(#{} to {}, transferred {})", t.nonce, t.recipient, t.transferred_amount)
            }
            Transfer::Locked(t) => write!(
                f,
                "Locked(#{} to {}, transferred {}, {})",
                t.nonce, t.recipient, t.transferred_amount, t.lock
            ),
        }
    }
}

/// A transfer together with its sender's signature. This is the balance proof handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransfer {
    pub transfer: Transfer,
    pub signature: Signature,
}

impl SignedTransfer {
    pub fn verify(&self, signer: &PublicKey) -> bool {
        signer.verify(self.transfer.message_hash().as_bytes(), &self.signature)
    }

    pub fn nonce(&self) -> u64 {
        self.transfer.nonce()
    }

    pub fn recipient(&self) -> Address {
        self.transfer.recipient()
    }

    pub fn transferred_amount(&self) -> TokenAmount {
        self.transfer.transferred_amount()
    }

    pub fn locksroot(&self) -> Hash256 {
        self.transfer.locksroot()
    }
}
