use crate::amount::TokenAmount;
use crate::crypto::{hash_parts, Address, PublicKey};
use crate::ledger::{Ledger, LedgerError, LedgerEvent, LedgerEventKind, NettingContract, SettlementState, UnlockProof};
use crate::transfer::{BlockHeight, SignedTransfer};
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    block: BlockHeight,
    channels: HashMap<(Address, Address), NettingContract>,
    events: Vec<LedgerEvent>,
    opened: u64,
}

impl LedgerState {
    fn contract_mut(&mut self, asset: Address, channel: Address) -> Result<&mut NettingContract, LedgerError> {
        self.channels.get_mut(&(asset, channel)).ok_or(LedgerError::UnknownChannel { asset, channel })
    }

    fn emit(&mut self, asset: Address, channel: Address, kinds: Vec<LedgerEventKind>) {
        let block = self.block;
        for kind in kinds {
            let event = LedgerEvent { block, asset, channel, kind };
            debug!("Ledger event: {event}");
            self.events.push(event);
        }
    }

    /// Runs `op` against one channel and records the events it emits. The whole ledger is held for the duration,
    /// so calls are linearised.
    fn apply<F>(&mut self, asset: Address, channel: Address, op: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut NettingContract, BlockHeight) -> Result<Vec<LedgerEventKind>, LedgerError>,
    {
        let block = self.block;
        let contract = self.contract_mut(asset, channel)?;
        let events = op(contract, block)?;
        self.emit(asset, channel, events);
        Ok(())
    }
}

/// A deterministic, single-process ledger. Blocks only advance when [`Ledger::next_block`] is called.
///
/// Cloning gives another handle onto the same chain, so several nodes can share it.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the chain by `blocks` blocks.
    pub async fn mine(&self, blocks: u64) -> BlockHeight {
        let mut state = self.inner.write().await;
        state.block += blocks;
        state.block
    }
}

impl Ledger for InMemoryLedger {
    async fn open_channel(
        &self,
        asset: Address,
        participants: [(PublicKey, TokenAmount); 2],
        settle_timeout: u64,
    ) -> Result<Address, LedgerError> {
        let mut state = self.inner.write().await;
        let a = participants[0].0.address();
        let b = participants[1].0.address();
        let existing = state.channels.values().find(|c| {
            c.asset() == asset
                && c.state() != SettlementState::Settled
                && c.is_participant(&a)
                && c.is_participant(&b)
        });
        if let Some(c) = existing {
            return Err(LedgerError::ChannelExists(c.channel_address()));
        }
        let counter = (state.opened + 1).to_be_bytes();
        let channel = Address::from_hash(&hash_parts(&[asset.as_bytes(), a.as_bytes(), b.as_bytes(), &counter]));
        let block = state.block;
        let contract = NettingContract::open(asset, channel, settle_timeout, participants, block)?;
        state.opened += 1;
        state.channels.insert((asset, channel), contract);
        let deposits = [participants[0].1, participants[1].1];
        state.emit(asset, channel, vec![LedgerEventKind::ChannelOpened {
            participants: [a, b],
            deposits,
            settle_timeout,
        }]);
        info!("Opened channel {channel} for asset {asset} between {a} and {b} at block {block}");
        Ok(channel)
    }

    async fn close(
        &self,
        asset: Address,
        channel: Address,
        closer: Address,
        latest_transfer: Option<SignedTransfer>,
        unlocked: Vec<UnlockProof>,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.write().await;
        state.apply(asset, channel, |c, block| c.close(closer, latest_transfer.as_ref(), &unlocked, block))
    }

    async fn update_transfer(
        &self,
        asset: Address,
        channel: Address,
        participant: Address,
        transfer: SignedTransfer,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.write().await;
        state.apply(asset, channel, |c, block| c.update_transfer(participant, &transfer, block))
    }

    async fn unlock(
        &self,
        asset: Address,
        channel: Address,
        participant: Address,
        unlocked: Vec<UnlockProof>,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.write().await;
        state.apply(asset, channel, |c, block| c.unlock(participant, &unlocked, block))
    }

    async fn settle(&self, asset: Address, channel: Address) -> Result<(), LedgerError> {
        let mut state = self.inner.write().await;
        state.apply(asset, channel, |c, block| c.settle(block))
    }

    async fn next_block(&self) -> BlockHeight {
        self.mine(1).await
    }

    async fn current_block(&self) -> BlockHeight {
        self.inner.read().await.block
    }

    async fn channel_record(&self, asset: Address, channel: Address) -> Result<NettingContract, LedgerError> {
        let state = self.inner.read().await;
        state.channels.get(&(asset, channel)).cloned().ok_or(LedgerError::UnknownChannel { asset, channel })
    }

    async fn events_since(&self, block: BlockHeight) -> Vec<LedgerEvent> {
        let state = self.inner.read().await;
        state.events.iter().filter(|e| e.block >= block).cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyPair, Signer};

    const ASSET: Address = Address::new([1; 20]);

    fn parties() -> (KeyPair, KeyPair) {
        (KeyPair::from_seed(b"alice"), KeyPair::from_seed(b"bob"))
    }

    #[tokio::test]
    async fn blocks_advance_only_on_request() {
        env_logger::try_init().ok();
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.current_block().await, 0);
        assert_eq!(ledger.next_block().await, 1);
        assert_eq!(ledger.mine(4).await, 5);
        let other_handle = ledger.clone();
        assert_eq!(other_handle.current_block().await, 5);
    }

    #[tokio::test]
    async fn one_live_channel_per_pair() {
        env_logger::try_init().ok();
        let ledger = InMemoryLedger::new();
        let (alice, bob) = parties();
        let deposits = [(*alice.public_key(), TokenAmount::new(10)), (*bob.public_key(), TokenAmount::new(10))];
        let channel = ledger.open_channel(ASSET, deposits, 5).await.unwrap();
        let reversed = [deposits[1], deposits[0]];
        assert_eq!(ledger.open_channel(ASSET, reversed, 5).await, Err(LedgerError::ChannelExists(channel)));
        // A different asset is a different channel
        let other = ledger.open_channel(Address::new([2; 20]), deposits, 5).await.unwrap();
        assert_ne!(other, channel);

        let record = ledger.channel_record(ASSET, channel).await.unwrap();
        assert_eq!(record.state(), SettlementState::Open);
        assert_eq!(record.total_deposit(), TokenAmount::new(20));

        // Once settled, the pair may open again
        ledger.close(ASSET, channel, alice.address(), None, vec![]).await.unwrap();
        ledger.mine(5).await;
        ledger.settle(ASSET, channel).await.unwrap();
        let again = ledger.open_channel(ASSET, deposits, 5).await.unwrap();
        assert_ne!(again, channel);
    }

    #[tokio::test]
    async fn deposits_must_fit_in_one_amount() {
        let ledger = InMemoryLedger::new();
        let (alice, bob) = parties();
        let max = TokenAmount::new(u64::MAX);
        let deposits = [(*alice.public_key(), max), (*bob.public_key(), TokenAmount::new(1))];
        let err = ledger.open_channel(ASSET, deposits, 5).await.unwrap_err();
        assert_eq!(err, LedgerError::DepositOverflow(max, TokenAmount::new(1)));
        assert!(ledger.events_since(0).await.is_empty());

        // The pair can still open a channel that fits
        let deposits = [(*alice.public_key(), max), (*bob.public_key(), TokenAmount::ZERO)];
        let channel = ledger.open_channel(ASSET, deposits, 5).await.unwrap();
        let record = ledger.channel_record(ASSET, channel).await.unwrap();
        assert_eq!(record.total_deposit(), max);
    }

    #[tokio::test]
    async fn unknown_channels_are_reported() {
        let ledger = InMemoryLedger::new();
        let missing = Address::new([9; 20]);
        let err = ledger.settle(ASSET, missing).await.unwrap_err();
        assert_eq!(err, LedgerError::UnknownChannel { asset: ASSET, channel: missing });
        assert!(ledger.channel_record(ASSET, missing).await.is_err());
    }

    #[tokio::test]
    async fn events_are_recorded_in_order() {
        env_logger::try_init().ok();
        let ledger = InMemoryLedger::new();
        let (alice, bob) = parties();
        let deposits = [(*alice.public_key(), TokenAmount::new(10)), (*bob.public_key(), TokenAmount::new(10))];
        let channel = ledger.open_channel(ASSET, deposits, 2).await.unwrap();
        ledger.next_block().await;
        ledger.close(ASSET, channel, bob.address(), None, vec![]).await.unwrap();
        ledger.mine(2).await;
        ledger.settle(ASSET, channel).await.unwrap();
        // Settling twice fails and emits nothing
        assert!(matches!(ledger.settle(ASSET, channel).await, Err(LedgerError::InvalidState { .. })));

        let events = ledger.events_since(0).await;
        let kinds = events.iter().map(|e| e.kind.to_string()).collect::<Vec<_>>();
        assert_eq!(kinds[0], "ChannelOpened");
        assert!(kinds[1].starts_with("ChannelClosed"));
        assert_eq!(kinds[2], "ChannelSettled");
        assert_eq!(kinds.len(), 3);
        assert_eq!(ledger.events_since(1).await.len(), 2);
        assert_eq!(events[2].block, 3);
        match &events[2].kind {
            LedgerEventKind::ChannelSettled { balances } => {
                assert_eq!(balances[0], (alice.address(), TokenAmount::new(10)));
                assert_eq!(balances[1], (bob.address(), TokenAmount::new(10)));
            }
            other => panic!("unexpected event {other}"),
        }
    }
}
