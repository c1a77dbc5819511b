mod file_store;
mod traits;

pub use file_store::FileStore;
pub use traits::ChannelStore;
