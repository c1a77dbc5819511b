//! The on-chain side of a netting channel.
//!
//! [`Ledger`] is the capability a node needs from a chain: open, close, update, unlock and settle channels, and
//! observe blocks and events. [`NettingContract`] holds the settlement rules for a single channel, and
//! [`InMemoryLedger`] is a deterministic ledger built on it for simulations and tests.

mod contract;
pub mod error;
mod events;
mod in_memory;

pub use contract::{NettingContract, ParticipantRecord, SettlementState};
pub use error::LedgerError;
pub use events::{LedgerEvent, LedgerEventKind};
pub use in_memory::InMemoryLedger;

use crate::amount::TokenAmount;
use crate::crypto::{Address, PublicKey, Secret};
use crate::merkle::MerkleProof;
use crate::transfer::{BlockHeight, Lock, SignedTransfer};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Evidence that a lock may be paid out: the lock, its inclusion proof and the secret that opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockProof {
    pub proof: MerkleProof,
    pub lock: Lock,
    pub secret: Secret,
}

pub trait Ledger: Send + Sync {
    /// Registers a new channel between two participants with their deposits and returns its address.
    fn open_channel(
        &self,
        asset: Address,
        participants: [(PublicKey, TokenAmount); 2],
        settle_timeout: u64,
    ) -> impl Future<Output = Result<Address, LedgerError>> + Send;

    /// Closes an open channel, starting the challenge period.
    fn close(
        &self,
        asset: Address,
        channel: Address,
        closer: Address,
        latest_transfer: Option<SignedTransfer>,
        unlocked: Vec<UnlockProof>,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Submits a newer balance proof during the challenge period.
    fn update_transfer(
        &self,
        asset: Address,
        channel: Address,
        participant: Address,
        transfer: SignedTransfer,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    fn unlock(
        &self,
        asset: Address,
        channel: Address,
        participant: Address,
        unlocked: Vec<UnlockProof>,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    fn settle(&self, asset: Address, channel: Address) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Advances the chain by one block and returns the new height.
    fn next_block(&self) -> impl Future<Output = BlockHeight> + Send;

    fn current_block(&self) -> impl Future<Output = BlockHeight> + Send;

    fn channel_record(
        &self,
        asset: Address,
        channel: Address,
    ) -> impl Future<Output = Result<NettingContract, LedgerError>> + Send;

    /// Every event emitted at or after `block`, oldest first.
    fn events_since(&self, block: BlockHeight) -> impl Future<Output = Vec<LedgerEvent>> + Send;
}
