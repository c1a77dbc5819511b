use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256, Secret};
use crate::transfer::BlockHeight;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Something the ledger did, as seen by anyone watching the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub block: BlockHeight,
    pub asset: Address,
    pub channel: Address,
    pub kind: LedgerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventKind {
    ChannelOpened { participants: [Address; 2], deposits: [TokenAmount; 2], settle_timeout: u64 },
    ChannelClosed { closer: Address },
    TransferUpdated { participant: Address, nonce: u64 },
    /// A secret was published on-chain. Mediators watch for these to claim the matching upstream lock.
    SecretRevealed { hashlock: Hash256, secret: Secret },
    ChannelSettled { balances: [(Address, TokenAmount); 2] },
}

impl Display for LedgerEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEventKind::ChannelOpened { .. } => write!(f, "ChannelOpened"),
            LedgerEventKind::ChannelClosed { closer } => write!(f, "ChannelClosed(by {closer})"),
            LedgerEventKind::TransferUpdated { participant, nonce } => {
                write!(f, "TransferUpdated({participant}, nonce {nonce})")
            }
            LedgerEventKind::SecretRevealed { hashlock, .. } => write!(f, "SecretRevealed({})", hashlock.short()),
            LedgerEventKind::ChannelSettled { .. } => write!(f, "ChannelSettled"),
        }
    }
}

impl Display for LedgerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} on {}", self.block, self.kind, self.channel)
    }
}
