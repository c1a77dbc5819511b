use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256};
use crate::ledger::SettlementState;
use crate::transfer::BlockHeight;
use thiserror::Error;

/// Reasons the ledger refuses a call. A refused call leaves the channel record untouched.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("No channel {channel} for asset {asset}")]
    UnknownChannel { asset: Address, channel: Address },
    #[error("An unsettled channel {0} already exists between these participants")]
    ChannelExists(Address),
    #[error("The deposits {0} and {1} add up to more than a channel can hold")]
    DepositOverflow(TokenAmount, TokenAmount),
    #[error("The channel is {actual}, which does not allow {operation}")]
    InvalidState { operation: &'static str, actual: SettlementState },
    #[error("{0} is not a participant in this channel")]
    NotParticipant(Address),
    #[error("The balance proof is not signed by a participant of this channel")]
    InvalidSignature,
    #[error("Invalid balance proof: {0}")]
    InvalidTransfer(String),
    #[error("The balance proof is not newer than the recorded one. Recorded nonce {recorded}, got {got}")]
    InvalidNonce { recorded: u64, got: u64 },
    #[error("The challenge period ended at block {deadline}. Current block is {current_block}")]
    ChallengePeriodExpired { deadline: BlockHeight, current_block: BlockHeight },
    #[error("The challenge period only ends at block {deadline}. Current block is {current_block}")]
    SettleTooEarly { deadline: BlockHeight, current_block: BlockHeight },
    #[error("The lock with leaf {0} has already been unlocked")]
    DuplicateUnlock(Hash256),
}

impl LedgerError {
    pub fn invalid_state(operation: &'static str, actual: SettlementState) -> Self {
        LedgerError::InvalidState { operation, actual }
    }
}
