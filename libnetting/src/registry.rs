use crate::channel::Channel;
use crate::crypto::Address;
use crate::storage::ChannelStore;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("A channel with {partner} for asset {asset} is already registered")]
    ChannelExists { asset: Address, partner: Address },
    #[error("There are no channels for asset {0}")]
    UnknownAsset(Address),
    #[error("There is no channel with {partner} for asset {asset}")]
    ChannelNotFound { asset: Address, partner: Address },
    #[error("Channel storage error: {0}")]
    Store(String),
}

type ChannelMap = HashMap<Address, HashMap<Address, Arc<RwLock<Channel>>>>;

/// The channels a node holds, indexed by asset and then by partner.
///
/// There is at most one channel per `(asset, partner)` pair. Each channel sits behind its own lock, so transfers on
/// different channels can be registered in parallel while transfers on the same channel are serialised.
pub struct ChannelRegistry {
    channels: Arc<RwLock<ChannelMap>>,
}

impl Clone for ChannelRegistry {
    fn clone(&self) -> Self {
        ChannelRegistry { channels: Arc::clone(&self.channels) }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry { channels: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Reads every channel in `store` into a new registry. Two stored channels with the same partner for the same
    /// asset are refused, since only one of them can be live.
    pub fn load<S: ChannelStore>(store: &S) -> Result<Self, RegistryError> {
        let names = store.list_channels().map_err(|e| RegistryError::Store(e.to_string()))?;
        let mut channels = ChannelMap::new();
        for name in names {
            match store.load_channel(&name) {
                Ok(channel) => {
                    let asset = channel.asset();
                    let partner = channel.partner_address();
                    let by_partner = channels.entry(asset).or_default();
                    if by_partner.contains_key(&partner) {
                        warn!("Channel store holds more than one channel with {partner} for asset {asset}");
                        return Err(RegistryError::ChannelExists { asset, partner });
                    }
                    by_partner.insert(partner, Arc::new(RwLock::new(channel)));
                }
                Err(e) => {
                    info!("Non- or invalid channel {name} found in the channel store: {e}");
                }
            }
        }
        Ok(Self { channels: Arc::new(RwLock::new(channels)) })
    }

    /// Writes every channel to `store`, overwriting what was there.
    pub async fn save<S: ChannelStore>(&self, store: &mut S) -> Result<(), RegistryError> {
        let lock = self.channels.read().await;
        for channel in lock.values().flat_map(|m| m.values()) {
            let readable = channel.read().await;
            store.write_channel(&readable).map_err(|e| RegistryError::Store(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn exists(&self, asset: &Address, partner: &Address) -> bool {
        let lock = self.channels.read().await;
        lock.get(asset).is_some_and(|m| m.contains_key(partner))
    }

    /// Adds a new channel. A second channel with the same partner for the same asset is refused.
    pub async fn add(&self, channel: Channel) -> Result<(), RegistryError> {
        let asset = channel.asset();
        let partner = channel.partner_address();
        let mut lock = self.channels.write().await;
        let by_partner = lock.entry(asset).or_default();
        if by_partner.contains_key(&partner) {
            return Err(RegistryError::ChannelExists { asset, partner });
        }
        trace!("Adding channel {}", channel.name());
        by_partner.insert(partner, Arc::new(RwLock::new(channel)));
        Ok(())
    }

    pub async fn remove(&self, asset: &Address, partner: &Address) -> Result<(), RegistryError> {
        let mut lock = self.channels.write().await;
        let by_partner = lock.get_mut(asset).ok_or(RegistryError::UnknownAsset(*asset))?;
        by_partner
            .remove(partner)
            .ok_or(RegistryError::ChannelNotFound { asset: *asset, partner: *partner })?;
        if by_partner.is_empty() {
            lock.remove(asset);
        }
        Ok(())
    }

    async fn get(&self, asset: &Address, partner: &Address) -> Result<Arc<RwLock<Channel>>, RegistryError> {
        let lock = self.channels.read().await;
        let by_partner = lock.get(asset).ok_or(RegistryError::UnknownAsset(*asset))?;
        by_partner.get(partner).cloned().ok_or(RegistryError::ChannelNotFound { asset: *asset, partner: *partner })
    }

    /// Checks the channel out for writing. If it is already checked out, this waits until it is released.
    pub async fn checkout(
        &self,
        asset: &Address,
        partner: &Address,
    ) -> Result<OwnedRwLockWriteGuard<Channel>, RegistryError> {
        trace!("Trying to check out channel with {partner}");
        let channel = self.get(asset, partner).await?;
        Ok(channel.write_owned().await)
    }

    pub async fn peek(
        &self,
        asset: &Address,
        partner: &Address,
    ) -> Result<OwnedRwLockReadGuard<Channel>, RegistryError> {
        let channel = self.get(asset, partner).await?;
        Ok(channel.read_owned().await)
    }

    pub async fn assets(&self) -> Vec<Address> {
        let lock = self.channels.read().await;
        lock.keys().copied().collect()
    }

    pub async fn partners(&self, asset: &Address) -> Result<Vec<Address>, RegistryError> {
        let lock = self.channels.read().await;
        let by_partner = lock.get(asset).ok_or(RegistryError::UnknownAsset(*asset))?;
        Ok(by_partner.keys().copied().collect())
    }

    /// Every `(asset, partner)` pair with a registered channel.
    pub async fn list_channels(&self) -> Vec<(Address, Address)> {
        let lock = self.channels.read().await;
        lock.iter().flat_map(|(asset, m)| m.keys().map(move |partner| (*asset, *partner))).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::channel::ChannelEndState;
    use crate::crypto::{KeyPair, Signer};
    use crate::storage::FileStore;
    use std::time::Duration;

    const ASSET: Address = Address::new([1; 20]);

    fn channel_with(me: &KeyPair, partner: &KeyPair, asset: Address, address: u8) -> Channel {
        let deposit = TokenAmount::new(50);
        Channel::new(
            asset,
            Address::new([address; 20]),
            20,
            3,
            ChannelEndState::new(*me.public_key(), deposit),
            ChannelEndState::new(*partner.public_key(), deposit),
        )
    }

    #[tokio::test]
    async fn one_channel_per_asset_and_partner() {
        env_logger::try_init().ok();
        let me = KeyPair::from_seed(b"me");
        let bob = KeyPair::from_seed(b"bob");
        let carol = KeyPair::from_seed(b"carol");
        let registry = ChannelRegistry::new();
        registry.add(channel_with(&me, &bob, ASSET, 1)).await.unwrap();
        let err = registry.add(channel_with(&me, &bob, ASSET, 2)).await.unwrap_err();
        assert_eq!(err, RegistryError::ChannelExists { asset: ASSET, partner: bob.address() });
        registry.add(channel_with(&me, &carol, ASSET, 3)).await.unwrap();
        let other_asset = Address::new([2; 20]);
        registry.add(channel_with(&me, &bob, other_asset, 4)).await.unwrap();

        assert!(registry.exists(&ASSET, &bob.address()).await);
        let mut partners = registry.partners(&ASSET).await.unwrap();
        partners.sort();
        let mut expected = vec![bob.address(), carol.address()];
        expected.sort();
        assert_eq!(partners, expected);
        assert_eq!(registry.assets().await.len(), 2);
        assert_eq!(registry.list_channels().await.len(), 3);

        let channel = registry.peek(&ASSET, &bob.address()).await.unwrap();
        assert_eq!(channel.channel_address(), Address::new([1; 20]));
    }

    #[tokio::test]
    async fn missing_keys_are_errors() {
        let me = KeyPair::from_seed(b"me");
        let bob = KeyPair::from_seed(b"bob");
        let registry = ChannelRegistry::new();
        let missing = Address::new([9; 20]);
        assert_eq!(registry.checkout(&ASSET, &bob.address()).await.err(), Some(RegistryError::UnknownAsset(ASSET)));
        registry.add(channel_with(&me, &bob, ASSET, 1)).await.unwrap();
        assert_eq!(
            registry.peek(&ASSET, &missing).await.err(),
            Some(RegistryError::ChannelNotFound { asset: ASSET, partner: missing })
        );
        registry.remove(&ASSET, &bob.address()).await.unwrap();
        assert!(!registry.exists(&ASSET, &bob.address()).await);
        assert_eq!(registry.partners(&ASSET).await.err(), Some(RegistryError::UnknownAsset(ASSET)));
    }

    #[tokio::test]
    async fn checkout_is_exclusive() {
        let me = KeyPair::from_seed(b"me");
        let bob = KeyPair::from_seed(b"bob");
        let registry = ChannelRegistry::new();
        registry.add(channel_with(&me, &bob, ASSET, 1)).await.unwrap();
        let guard = registry.checkout(&ASSET, &bob.address()).await.unwrap();
        let other = registry.clone();
        let partner = bob.address();
        let waiter = tokio::spawn(async move { other.checkout(&ASSET, &partner).await.map(|c| c.balance()) });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        let balance = waiter.await.unwrap().unwrap();
        assert_eq!(balance, TokenAmount::new(50));
    }

    #[tokio::test]
    async fn save_and_load() {
        env_logger::try_init().ok();
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let me = KeyPair::from_seed(b"me");
        let bob = KeyPair::from_seed(b"bob");
        let carol = KeyPair::from_seed(b"carol");
        let registry = ChannelRegistry::new();
        registry.add(channel_with(&me, &bob, ASSET, 1)).await.unwrap();
        registry.add(channel_with(&me, &carol, ASSET, 2)).await.unwrap();
        registry.save(&mut store).await.unwrap();

        let loaded = ChannelRegistry::load(&store).unwrap();
        assert_eq!(loaded.list_channels().await.len(), 2);
        let original = registry.peek(&ASSET, &carol.address()).await.unwrap();
        let reloaded = loaded.peek(&ASSET, &carol.address()).await.unwrap();
        assert_eq!(*reloaded, *original);
    }

    #[tokio::test]
    async fn load_refuses_two_channels_with_one_partner() {
        env_logger::try_init().ok();
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let me = KeyPair::from_seed(b"me");
        let bob = KeyPair::from_seed(b"bob");
        store.write_channel(&channel_with(&me, &bob, ASSET, 1)).unwrap();
        store.write_channel(&channel_with(&me, &bob, ASSET, 2)).unwrap();
        let err = ChannelRegistry::load(&store).err();
        assert_eq!(err, Some(RegistryError::ChannelExists { asset: ASSET, partner: bob.address() }));

        store.delete_channel(&channel_with(&me, &bob, ASSET, 1).id()).unwrap();
        let loaded = ChannelRegistry::load(&store).unwrap();
        let channel = loaded.peek(&ASSET, &bob.address()).await.unwrap();
        assert_eq!(channel.channel_address(), Address::new([2; 20]));
    }
}
