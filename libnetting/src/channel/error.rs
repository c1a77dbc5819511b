use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256};
use crate::merkle::TreeError;
use crate::transfer::BlockHeight;
use thiserror::Error;

/// Reasons a transfer is refused. A refused transfer leaves the channel untouched.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Stale or replayed transfer. The nonce must exceed {current}, got {got}")]
    InvalidNonce { current: u64, got: u64 },
    #[error("The transfer is not signed by {0}")]
    InvalidSignature(Address),
    #[error("{0} is not a participant in this channel")]
    UnknownParticipant(Address),
    #[error("The transfer is for asset {got}, but the channel holds {expected}")]
    AssetMismatch { expected: Address, got: Address },
    #[error("The transfer was signed for channel {got}, not {expected}")]
    ChannelMismatch { expected: Address, got: Address },
    #[error("The lock expires at block {expiration}, which is not after the current block {current_block}")]
    LockExpired { expiration: BlockHeight, current_block: BlockHeight },
    #[error(
        "Downstream lock expiring at {downstream} is not at least {reveal_timeout} blocks before the upstream lock \
         expiring at {upstream}"
    )]
    UnsafeExpiration { upstream: BlockHeight, downstream: BlockHeight, reveal_timeout: u64 },
    #[error("There are not enough funds in the channel. Requested {requested}, but only {available} is available")]
    InsufficientBalance { available: TokenAmount, requested: TokenAmount },
    #[error("The transferred amount is incorrect. Expected {expected}, got {got}")]
    InvalidTransferredAmount { expected: TokenAmount, got: TokenAmount },
    #[error("The locksroot does not match the sender's pending locks. Expected {expected}, got {got}")]
    LocksrootMismatch { expected: Hash256, got: Hash256 },
    #[error("A lock with hashlock {0} is already pending")]
    DuplicateLock(Hash256),
    #[error("Commitment tree error: {0}")]
    Tree(#[from] TreeError),
}
