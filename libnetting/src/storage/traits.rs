use crate::channel::Channel;

/// Persistence for the channels a node holds.
pub trait ChannelStore {
    fn write_channel(&mut self, channel: &Channel) -> Result<(), anyhow::Error>;
    fn load_channel(&self, name: &str) -> Result<Channel, anyhow::Error>;
    /// Forgets a channel. Deleting a channel that was never stored is not an error.
    fn delete_channel(&mut self, name: &str) -> Result<(), anyhow::Error>;
    /// The names of every stored channel, in no particular order.
    fn list_channels(&self) -> Result<Vec<String>, anyhow::Error>;
}
