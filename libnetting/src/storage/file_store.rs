use crate::channel::Channel;
use crate::storage::traits::ChannelStore;
use log::*;
use ron::ser::PrettyConfig;
use std::fs;
use std::path::PathBuf;

/// A file-based store for channel state.
///
/// Each channel is saved in its own file named after [`Channel::id`], e.g. `<asset hex>-<channel hex>.ron`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a new file store with the given path, creating the directory if needed.
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ChannelStore for FileStore {
    fn write_channel(&mut self, channel: &Channel) -> Result<(), anyhow::Error> {
        let file_path = self.path.join(format!("{}.ron", channel.id()));
        let config = PrettyConfig::new().compact_arrays(true).compact_maps(true);
        let val = ron::ser::to_string_pretty(channel, config)?;
        fs::write(&file_path, &val)?;
        trace!("Saved channel {} to {}", channel.name(), file_path.display());
        Ok(())
    }

    fn load_channel(&self, name: &str) -> Result<Channel, anyhow::Error> {
        let file_path = self.path.join(format!("{name}.ron"));
        let val = fs::read_to_string(&file_path)?;
        let channel: Channel = ron::de::from_str(&val)?;
        Ok(channel)
    }

    fn delete_channel(&mut self, name: &str) -> Result<(), anyhow::Error> {
        let file_path = self.path.join(format!("{name}.ron"));
        match fs::remove_file(&file_path) {
            Ok(()) => {
                trace!("Deleted channel file {}", file_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_channels(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            } else {
                debug!("Ignoring non-channel file {}", path.display());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::channel::ChannelEndState;
    use crate::crypto::{Address, KeyPair, Secret, Signer};

    /// Saves and loads a channel with pending locks and known secrets. The reloaded channel carries on as if nothing
    /// happened.
    #[test]
    fn channel_survives_a_round_trip() {
        env_logger::try_init().ok();
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = FileStore::new(dir.path().join("channels")).expect("directory to exist");
        let alice = KeyPair::from_seed(b"alice");
        let bob = KeyPair::from_seed(b"bob");
        let deposit = TokenAmount::new(100);
        let mut channel = Channel::new(
            Address::new([1; 20]),
            Address::new([2; 20]),
            50,
            5,
            ChannelEndState::new(*alice.public_key(), deposit),
            ChannelEndState::new(*bob.public_key(), deposit),
        );
        let secret = Secret::from("persisted");
        let t = channel.create_locked_transfer(TokenAmount::new(10), 30, secret.hashlock(), 1).unwrap();
        channel.register_transfer(&t.sign(&alice), 1).unwrap();
        channel.register_secret(&secret);

        store.write_channel(&channel).expect("Failed to write channel");
        assert_eq!(store.list_channels().unwrap(), vec![channel.id()]);
        let mut loaded = store.load_channel(&channel.id()).expect("Failed to load channel");
        assert_eq!(loaded, channel);
        assert_eq!(loaded.our_state().locked().root(), channel.our_state().locked().root());

        let next = loaded.create_direct_transfer(TokenAmount::new(1), 2).unwrap();
        assert_eq!(next.transferred_amount(), TokenAmount::new(11));
        loaded.register_transfer(&next.sign(&alice), 2).unwrap();
        assert_eq!(loaded.balance(), TokenAmount::new(89));

        store.delete_channel(&channel.id()).expect("Failed to delete channel");
        assert!(store.list_channels().unwrap().is_empty());
        assert!(store.load_channel(&channel.id()).is_err());
        store.delete_channel(&channel.id()).expect("Deleting twice is fine");
    }

    #[test]
    fn missing_channel_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load_channel("nope").is_err());
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert!(store.list_channels().unwrap().is_empty());
    }
}
