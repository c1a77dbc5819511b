use crate::transfer::BlockHeight;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_SETTLE_TIMEOUT: u64 = 50;
pub const DEFAULT_REVEAL_TIMEOUT: u64 = 5;
pub const DEFAULT_LOCK_EXPIRATION: BlockHeight = 30;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("reveal_timeout must be at least one block")]
    ZeroRevealTimeout,
    #[error("settle_timeout ({settle_timeout}) must be longer than reveal_timeout ({reveal_timeout})")]
    SettleTimeoutTooShort { settle_timeout: u64, reveal_timeout: u64 },
    #[error("default_lock_expiration ({expiration}) must be longer than reveal_timeout ({reveal_timeout})")]
    LockExpirationTooShort { expiration: BlockHeight, reveal_timeout: u64 },
}

/// Node-wide settings for new channels and transfers.
///
/// All timeouts are in blocks. `default_lock_expiration` is relative to the block a locked transfer is created in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NettingConfig {
    pub settle_timeout: u64,
    pub reveal_timeout: u64,
    pub default_lock_expiration: BlockHeight,
    /// Where channel state is persisted. Nothing is persisted if this is unset.
    pub channel_dir: Option<PathBuf>,
}

impl Default for NettingConfig {
    fn default() -> Self {
        NettingConfig {
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            reveal_timeout: DEFAULT_REVEAL_TIMEOUT,
            default_lock_expiration: DEFAULT_LOCK_EXPIRATION,
            channel_dir: None,
        }
    }
}

impl NettingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reveal_timeout == 0 {
            return Err(ConfigError::ZeroRevealTimeout);
        }
        if self.settle_timeout <= self.reveal_timeout {
            return Err(ConfigError::SettleTimeoutTooShort {
                settle_timeout: self.settle_timeout,
                reveal_timeout: self.reveal_timeout,
            });
        }
        if self.default_lock_expiration <= self.reveal_timeout {
            return Err(ConfigError::LockExpirationTooShort {
                expiration: self.default_lock_expiration,
                reveal_timeout: self.reveal_timeout,
            });
        }
        Ok(())
    }
}
