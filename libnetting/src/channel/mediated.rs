use crate::channel::{Channel, ChannelError};
use crate::crypto::Address;
use crate::transfer::{BlockHeight, Lock, Transfer};
use log::*;

/// A mediator must be able to learn the secret on the downstream leg and still claim the upstream lock. That needs
/// the downstream lock to expire at least `reveal_timeout` blocks before the upstream one.
pub fn check_expiration_margin(
    upstream: BlockHeight,
    downstream: BlockHeight,
    reveal_timeout: u64,
) -> Result<(), ChannelError> {
    let unsafe_expiration = ChannelError::UnsafeExpiration { upstream, downstream, reveal_timeout };
    if reveal_timeout == 0 {
        return Err(unsafe_expiration);
    }
    match downstream.checked_add(reveal_timeout) {
        Some(latest) if latest <= upstream => Ok(()),
        _ => Err(unsafe_expiration),
    }
}

impl Channel {
    /// Builds the downstream leg of a mediated transfer, forwarding `upstream_lock` with an earlier expiration.
    ///
    /// Refuses with [`ChannelError::UnsafeExpiration`] before anything is built if the mediator would not have
    /// `reveal_timeout` blocks to claim the upstream lock after the secret surfaces downstream.
    pub fn create_mediated_transfer(
        &self,
        upstream_lock: &Lock,
        downstream_expiration: BlockHeight,
        target: Address,
        initiator: Address,
        current_block: BlockHeight,
    ) -> Result<Transfer, ChannelError> {
        check_expiration_margin(upstream_lock.expiration, downstream_expiration, self.reveal_timeout())?;
        let lock =
            Lock { amount: upstream_lock.amount, hashlock: upstream_lock.hashlock, expiration: downstream_expiration };
        debug!(
            "{}: mediating {} for {initiator} -> {target}, downstream expiry #{downstream_expiration}",
            self.name(),
            upstream_lock
        );
        self.build_locked_transfer(lock, target, initiator, current_block)
    }
}
