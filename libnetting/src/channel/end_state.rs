use crate::amount::TokenAmount;
use crate::channel::error::ChannelError;
use crate::crypto::{Address, Hash256, PublicKey, Secret};
use crate::merkle::CommitmentTree;
use crate::transfer::{BlockHeight, Lock, SignedTransfer, Transfer};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One participant's side of a channel, as seen by the node that owns the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndState {
    address: Address,
    public_key: PublicKey,
    deposit: TokenAmount,
    transferred_amount: TokenAmount,
    nonce: u64,
    /// The locks this participant has sent and that are still in flight.
    locked: CommitmentTree,
    /// Known secrets for locks in `locked`.
    secrets: BTreeMap<Hash256, Secret>,
    latest_transfer: Option<SignedTransfer>,
}

/// The sender's lock set and base transferred amount once released and expired locks have been settled off-chain.
#[derive(Debug, Clone)]
pub(crate) struct Reconciled {
    pub tree: CommitmentTree,
    pub base_transferred: TokenAmount,
    pub released: Vec<Hash256>,
}

impl ChannelEndState {
    pub fn new(public_key: PublicKey, deposit: TokenAmount) -> Self {
        ChannelEndState {
            address: public_key.address(),
            public_key,
            deposit,
            transferred_amount: TokenAmount::ZERO,
            nonce: 0,
            locked: CommitmentTree::new(),
            secrets: BTreeMap::new(),
            latest_transfer: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn deposit(&self) -> TokenAmount {
        self.deposit
    }

    pub fn transferred_amount(&self) -> TokenAmount {
        self.transferred_amount
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn locked(&self) -> &CommitmentTree {
        &self.locked
    }

    pub fn locked_amount(&self) -> TokenAmount {
        self.locked.total_amount()
    }

    pub fn pending_locks(&self) -> impl Iterator<Item = &Lock> {
        self.locked.locks()
    }

    pub fn latest_transfer(&self) -> Option<&SignedTransfer> {
        self.latest_transfer.as_ref()
    }

    pub fn secret_for(&self, hashlock: &Hash256) -> Option<&Secret> {
        self.secrets.get(hashlock)
    }

    /// Pending locks whose secret is known, paired with that secret.
    pub fn unlockable(&self) -> impl Iterator<Item = (&Lock, &Secret)> {
        self.locked.locks().filter_map(|lock| self.secrets.get(&lock.hashlock).map(|s| (lock, s)))
    }

    /// `deposit − own transferred + partner transferred`
    pub fn balance(&self, partner: &ChannelEndState) -> TokenAmount {
        (self.deposit + partner.transferred_amount).saturating_sub(self.transferred_amount)
    }

    /// What this participant can still commit to new transfers: its balance less what it has locked.
    pub fn distributable(&self, partner: &ChannelEndState) -> TokenAmount {
        self.balance(partner).saturating_sub(self.locked_amount())
    }

    /// Records `secret` if it opens one of this participant's pending locks.
    pub fn register_secret(&mut self, secret: &Secret) -> bool {
        let hashlock = secret.hashlock();
        if self.locked.get_by_hashlock(&hashlock).is_none() {
            return false;
        }
        self.secrets.insert(hashlock, secret.clone());
        true
    }

    /// Works out the state the next transfer from this participant must build on.
    ///
    /// Locks with a known secret are released: they leave the tree and their amount becomes part of the transferred
    /// amount. Locks that have expired without their secret being known leave the tree and their value stays with
    /// this participant.
    pub(crate) fn reconcile(&self, current_block: BlockHeight) -> Result<Reconciled, ChannelError> {
        let mut tree = self.locked.clone();
        let mut base_transferred = self.transferred_amount;
        let mut released = Vec::new();
        for lock in self.locked.locks() {
            if self.secrets.contains_key(&lock.hashlock) {
                tree.remove(lock)?;
                base_transferred = base_transferred.checked_add(lock.amount).ok_or(
                    ChannelError::InvalidTransferredAmount { expected: base_transferred, got: lock.amount },
                )?;
                released.push(lock.hashlock);
            } else if lock.is_expired(current_block) {
                trace!("Pruning expired lock {lock} from {}", self.address);
                tree.remove(lock)?;
            }
        }
        Ok(Reconciled { tree, base_transferred, released })
    }

    /// Checks `transfer` against this participant's state and returns the state it moves to. Nothing is changed.
    pub(crate) fn validate_transfer(
        &self,
        transfer: &Transfer,
        partner: &ChannelEndState,
        current_block: BlockHeight,
    ) -> Result<Reconciled, ChannelError> {
        let mut next = self.reconcile(current_block)?;
        let claimed = transfer.transferred_amount();
        let delta = claimed.checked_sub(next.base_transferred).ok_or(ChannelError::InvalidTransferredAmount {
            expected: next.base_transferred,
            got: claimed,
        })?;
        let available = (self.deposit + partner.transferred_amount)
            .saturating_sub(next.base_transferred)
            .saturating_sub(next.tree.total_amount());
        match transfer {
            Transfer::Direct(_) => {
                if delta > available {
                    return Err(ChannelError::InsufficientBalance { available, requested: delta });
                }
            }
            Transfer::Locked(t) => {
                if !delta.is_zero() {
                    return Err(ChannelError::InvalidTransferredAmount {
                        expected: next.base_transferred,
                        got: claimed,
                    });
                }
                if t.lock.is_expired(current_block) {
                    return Err(ChannelError::LockExpired { expiration: t.lock.expiration, current_block });
                }
                if next.tree.get_by_hashlock(&t.lock.hashlock).is_some() {
                    return Err(ChannelError::DuplicateLock(t.lock.hashlock));
                }
                if t.lock.amount > available {
                    return Err(ChannelError::InsufficientBalance { available, requested: t.lock.amount });
                }
                next.tree.insert(t.lock.clone())?;
            }
        }
        let root = next.tree.root();
        if root != transfer.locksroot() {
            return Err(ChannelError::LocksrootMismatch { expected: root, got: transfer.locksroot() });
        }
        next.base_transferred = claimed;
        Ok(next)
    }

    /// Commits a validated transfer.
    pub(crate) fn apply(&mut self, next: Reconciled, signed: SignedTransfer) {
        for hashlock in &next.released {
            self.secrets.remove(hashlock);
        }
        self.locked = next.tree;
        self.transferred_amount = next.base_transferred;
        self.nonce = signed.nonce();
        self.latest_transfer = Some(signed);
    }
}
