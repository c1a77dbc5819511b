//! A participant in the netting network.
//!
//! [`NettingNode`] owns a key pair and a [`ChannelRegistry`], and talks to the chain through a [`Ledger`]. It turns
//! the user-level actions (pay, forward, close, settle) into channel updates and ledger calls.

use crate::amount::TokenAmount;
use crate::channel::{Channel, ChannelEndState, ChannelError};
use crate::config::{ConfigError, NettingConfig};
use crate::crypto::{Address, Hash256, KeyPair, PublicKey, Secret, Signer};
use crate::ledger::{Ledger, LedgerError, LedgerEventKind, SettlementState};
use crate::registry::{ChannelRegistry, RegistryError};
use crate::storage::{ChannelStore, FileStore};
use crate::transfer::{BlockHeight, SignedTransfer, Transfer};
use log::*;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("This node is not a participant of channel {0}")]
    NotParticipant(Address),
    #[error("The transfer carries no lock")]
    NotLocked,
    #[error("No pending lock with hashlock {0} from the upstream partner")]
    UnknownLock(Hash256),
    #[error("Could not persist channels: {0}")]
    Store(String),
}

pub struct NettingNode<L: Ledger> {
    keys: KeyPair,
    ledger: Arc<L>,
    channels: ChannelRegistry,
    config: NettingConfig,
}

impl<L: Ledger> NettingNode<L> {
    pub fn new(keys: KeyPair, ledger: Arc<L>, config: NettingConfig) -> Result<Self, NodeError> {
        config.validate()?;
        Ok(NettingNode { keys, ledger, channels: ChannelRegistry::new(), config })
    }

    /// Creates a node whose channels are read back from `config.channel_dir`. Without a channel directory this is
    /// the same as [`NettingNode::new`].
    pub fn restore(keys: KeyPair, ledger: Arc<L>, config: NettingConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let channels = match &config.channel_dir {
            Some(dir) => {
                let store = FileStore::new(dir.clone()).map_err(|e| NodeError::Store(e.to_string()))?;
                ChannelRegistry::load(&store)?
            }
            None => ChannelRegistry::new(),
        };
        Ok(NettingNode { keys, ledger, channels, config })
    }

    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public_key()
    }

    pub fn config(&self) -> &NettingConfig {
        &self.config
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Writes all channels to `config.channel_dir`, if one is set.
    pub async fn save_channels(&self) -> Result<(), NodeError> {
        let Some(dir) = &self.config.channel_dir else {
            trace!("No channel directory configured. Not saving channels.");
            return Ok(());
        };
        let mut store = FileStore::new(dir.clone()).map_err(|e| NodeError::Store(e.to_string()))?;
        self.channels.save(&mut store).await?;
        debug!("Saved channels to {}", dir.display());
        Ok(())
    }

    /// Opens a channel on the ledger with `partner` and starts tracking it. Returns the channel address.
    ///
    /// The partner starts tracking its side with [`NettingNode::join_channel`].
    pub async fn open_channel(
        &self,
        asset: Address,
        partner: PublicKey,
        our_deposit: TokenAmount,
        partner_deposit: TokenAmount,
    ) -> Result<Address, NodeError> {
        let partner_address = partner.address();
        if self.channels.exists(&asset, &partner_address).await {
            return Err(RegistryError::ChannelExists { asset, partner: partner_address }.into());
        }
        let participants = [(*self.public_key(), our_deposit), (partner, partner_deposit)];
        let channel_address = self.ledger.open_channel(asset, participants, self.config.settle_timeout).await?;
        let channel = Channel::new(
            asset,
            channel_address,
            self.config.settle_timeout,
            self.config.reveal_timeout,
            ChannelEndState::new(*self.public_key(), our_deposit),
            ChannelEndState::new(partner, partner_deposit),
        );
        self.channels.add(channel).await?;
        info!("{}: opened channel {channel_address} with {partner_address}", self.address());
        Ok(channel_address)
    }

    /// Starts tracking a channel that the partner opened, using the ledger's record of it.
    pub async fn join_channel(&self, asset: Address, channel_address: Address) -> Result<(), NodeError> {
        let record = self.ledger.channel_record(asset, channel_address).await?;
        let me = self.address();
        let ours = record.participant(&me).ok_or(NodeError::NotParticipant(channel_address))?;
        let theirs = record
            .participants()
            .iter()
            .find(|p| p.address != me)
            .ok_or(NodeError::NotParticipant(channel_address))?;
        let channel = Channel::new(
            asset,
            channel_address,
            record.settle_timeout(),
            self.config.reveal_timeout,
            ChannelEndState::new(ours.public_key, ours.deposit),
            ChannelEndState::new(theirs.public_key, theirs.deposit),
        );
        self.channels.add(channel).await?;
        info!("{me}: joined channel {channel_address} with {}", theirs.address);
        Ok(())
    }

    fn sign_and_register(
        &self,
        channel: &mut Channel,
        transfer: Transfer,
        block: BlockHeight,
    ) -> Result<SignedTransfer, NodeError> {
        let signed = transfer.sign(&self.keys);
        channel.register_transfer(&signed, block)?;
        Ok(signed)
    }

    /// Pays `amount` to `partner` directly. The returned transfer must be delivered to the partner.
    pub async fn send_direct(
        &self,
        asset: Address,
        partner: Address,
        amount: TokenAmount,
    ) -> Result<SignedTransfer, NodeError> {
        let block = self.ledger.current_block().await;
        let mut channel = self.channels.checkout(&asset, &partner).await?;
        let transfer = channel.create_direct_transfer(amount, block)?;
        self.sign_and_register(&mut channel, transfer, block)
    }

    /// Locks `amount` towards `partner` under `hashlock`. Without an explicit expiration, the lock expires
    /// `default_lock_expiration` blocks from now.
    pub async fn send_locked(
        &self,
        asset: Address,
        partner: Address,
        amount: TokenAmount,
        hashlock: Hash256,
        expiration: Option<BlockHeight>,
    ) -> Result<SignedTransfer, NodeError> {
        let block = self.ledger.current_block().await;
        let expiration = expiration.unwrap_or_else(|| block.saturating_add(self.config.default_lock_expiration));
        let mut channel = self.channels.checkout(&asset, &partner).await?;
        let transfer = channel.create_locked_transfer(amount, expiration, hashlock, block)?;
        self.sign_and_register(&mut channel, transfer, block)
    }

    /// Accepts a transfer signed by `from`.
    pub async fn receive(&self, from: Address, signed: &SignedTransfer) -> Result<(), NodeError> {
        let block = self.ledger.current_block().await;
        let asset = signed.transfer.asset();
        let mut channel = self.channels.checkout(&asset, &from).await?;
        channel.register_transfer(signed, block)?;
        trace!("{}: received {} from {from}", self.address(), signed.transfer);
        Ok(())
    }

    /// Forwards a locked transfer received from `upstream_partner` to `downstream_partner`.
    ///
    /// The upstream transfer must already have been received. The downstream lock expires at
    /// `downstream_expiration`, which must leave this node `reveal_timeout` blocks to claim the upstream lock.
    pub async fn mediate(
        &self,
        upstream_partner: Address,
        upstream: &SignedTransfer,
        downstream_partner: Address,
        downstream_expiration: BlockHeight,
    ) -> Result<SignedTransfer, NodeError> {
        let Transfer::Locked(locked) = &upstream.transfer else {
            return Err(NodeError::NotLocked);
        };
        let asset = locked.asset;
        {
            let upstream_channel = self.channels.peek(&asset, &upstream_partner).await?;
            if !upstream_channel.partner_state().locked().contains(&locked.lock) {
                return Err(NodeError::UnknownLock(locked.lock.hashlock));
            }
        }
        let block = self.ledger.current_block().await;
        let mut channel = self.channels.checkout(&asset, &downstream_partner).await?;
        let transfer = channel.create_mediated_transfer(
            &locked.lock,
            downstream_expiration,
            locked.target,
            locked.initiator,
            block,
        )?;
        self.sign_and_register(&mut channel, transfer, block)
    }

    /// Records a secret against every channel holding a matching lock. Returns the `(asset, partner)` pairs that
    /// were affected.
    pub async fn register_secret(&self, secret: &Secret) -> Vec<(Address, Address)> {
        let mut affected = Vec::new();
        for (asset, partner) in self.channels.list_channels().await {
            let Ok(mut channel) = self.channels.checkout(&asset, &partner).await else {
                continue;
            };
            if !channel.register_secret(secret).is_empty() {
                affected.push((asset, partner));
            }
        }
        affected
    }

    /// Scans the ledger for secrets revealed at or after `since` and registers them. Returns the hashlocks of
    /// secrets that matched a lock in one of our channels.
    pub async fn poll_secrets(&self, since: BlockHeight) -> Vec<Hash256> {
        let mut learned = Vec::new();
        for event in self.ledger.events_since(since).await {
            if let LedgerEventKind::SecretRevealed { hashlock, secret } = event.kind {
                if !self.register_secret(&secret).await.is_empty() {
                    debug!("{}: learned secret for {} from block {}", self.address(), hashlock.short(), event.block);
                    learned.push(hashlock);
                }
            }
        }
        learned
    }

    /// Closes the channel with `partner`, submitting the partner's latest balance proof and every partner lock we
    /// can unlock.
    pub async fn close(&self, asset: Address, partner: Address) -> Result<(), NodeError> {
        let channel = self.channels.peek(&asset, &partner).await?;
        let latest = channel.partner_state().latest_transfer().cloned();
        let unlocked = channel.unlock_proofs();
        info!(
            "{}: closing {} with {} unlock(s)",
            self.address(),
            channel.name(),
            unlocked.len()
        );
        self.ledger.close(asset, channel.channel_address(), self.address(), latest, unlocked).await?;
        Ok(())
    }

    /// Submits the partner's latest balance proof to a closed channel.
    pub async fn update_transfer(&self, asset: Address, partner: Address) -> Result<(), NodeError> {
        let channel = self.channels.peek(&asset, &partner).await?;
        let Some(latest) = channel.partner_state().latest_transfer().cloned() else {
            debug!("{}: nothing received on {}. No balance proof to submit.", self.address(), channel.name());
            return Ok(());
        };
        self.ledger.update_transfer(asset, channel.channel_address(), self.address(), latest).await?;
        Ok(())
    }

    /// Submits unlock evidence for every partner lock whose secret we know. Returns how many were submitted.
    pub async fn unlock(&self, asset: Address, partner: Address) -> Result<usize, NodeError> {
        let channel = self.channels.peek(&asset, &partner).await?;
        let unlocked = channel.unlock_proofs();
        if unlocked.is_empty() {
            return Ok(0);
        }
        let count = unlocked.len();
        self.ledger.unlock(asset, channel.channel_address(), self.address(), unlocked).await?;
        Ok(count)
    }

    /// Settles the channel with `partner` if nobody has yet, then stops tracking it and removes it from
    /// `config.channel_dir`. Returns our final balance.
    pub async fn settle(&self, asset: Address, partner: Address) -> Result<TokenAmount, NodeError> {
        let (channel_address, id) = {
            let channel = self.channels.peek(&asset, &partner).await?;
            (channel.channel_address(), channel.id())
        };
        let record = self.ledger.channel_record(asset, channel_address).await?;
        if record.state() != SettlementState::Settled {
            self.ledger.settle(asset, channel_address).await?;
        }
        let record = self.ledger.channel_record(asset, channel_address).await?;
        let netted = record.netted(&self.address()).unwrap_or(TokenAmount::ZERO);
        self.channels.remove(&asset, &partner).await?;
        if let Some(dir) = &self.config.channel_dir {
            let mut store = FileStore::new(dir.clone()).map_err(|e| NodeError::Store(e.to_string()))?;
            store.delete_channel(&id).map_err(|e| NodeError::Store(e.to_string()))?;
            debug!("Removed settled channel {id} from {}", dir.display());
        }
        info!("{}: channel {channel_address} settled. Final balance {netted}", self.address());
        Ok(netted)
    }

    pub async fn balance(&self, asset: Address, partner: Address) -> Result<TokenAmount, NodeError> {
        let channel = self.channels.peek(&asset, &partner).await?;
        Ok(channel.balance())
    }
}
