mod end_state;
pub mod error;
mod mediated;

pub use end_state::ChannelEndState;
pub use error::ChannelError;
pub use mediated::check_expiration_margin;

use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256, Secret};
use crate::ledger::UnlockProof;
use crate::transfer::{BlockHeight, DirectTransfer, Lock, LockedTransfer, SignedTransfer, Transfer};
use log::*;
use serde::{Deserialize, Serialize};

/// Which side of the channel an end state belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Ours,
    Partner,
}

/// A bilateral netting channel, as held by one of its two participants.
///
/// The channel validates every transfer that either side signs before it is accepted, and keeps both commitment
/// trees in step with the locksroots the participants have signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    asset: Address,
    channel_address: Address,
    settle_timeout: u64,
    reveal_timeout: u64,
    our_state: ChannelEndState,
    partner_state: ChannelEndState,
}

impl Channel {
    pub fn new(
        asset: Address,
        channel_address: Address,
        settle_timeout: u64,
        reveal_timeout: u64,
        our_state: ChannelEndState,
        partner_state: ChannelEndState,
    ) -> Self {
        Channel { asset, channel_address, settle_timeout, reveal_timeout, our_state, partner_state }
    }

    pub fn asset(&self) -> Address {
        self.asset
    }

    pub fn channel_address(&self) -> Address {
        self.channel_address
    }

    pub fn settle_timeout(&self) -> u64 {
        self.settle_timeout
    }

    pub fn reveal_timeout(&self) -> u64 {
        self.reveal_timeout
    }

    pub fn our_state(&self) -> &ChannelEndState {
        &self.our_state
    }

    pub fn partner_state(&self) -> &ChannelEndState {
        &self.partner_state
    }

    pub fn our_address(&self) -> Address {
        self.our_state.address()
    }

    pub fn partner_address(&self) -> Address {
        self.partner_state.address()
    }

    /// A short label for log lines.
    pub fn name(&self) -> String {
        format!("{}:{}", &self.asset.as_hex()[..8], &self.channel_address.as_hex()[..8])
    }

    /// The full `asset-channel` identifier, used as the storage key.
    pub fn id(&self) -> String {
        format!("{}-{}", self.asset.as_hex(), self.channel_address.as_hex())
    }

    /// Our balance: `deposit − sent + received`. Locked amounts are not subtracted.
    pub fn balance(&self) -> TokenAmount {
        self.our_state.balance(&self.partner_state)
    }

    pub fn partner_balance(&self) -> TokenAmount {
        self.partner_state.balance(&self.our_state)
    }

    /// What we can still send.
    pub fn distributable(&self) -> TokenAmount {
        self.our_state.distributable(&self.partner_state)
    }

    pub fn partner_distributable(&self) -> TokenAmount {
        self.partner_state.distributable(&self.our_state)
    }

    /// The value we have locked towards the partner.
    pub fn locked_amount(&self) -> TokenAmount {
        self.our_state.locked_amount()
    }

    /// The value the partner has locked towards us, which becomes ours once the secrets are revealed.
    pub fn outstanding(&self) -> TokenAmount {
        self.partner_state.locked_amount()
    }

    fn end_states_for(&mut self, recipient: Address) -> Result<(&mut ChannelEndState, &ChannelEndState), ChannelError> {
        if recipient == self.partner_state.address() {
            Ok((&mut self.our_state, &self.partner_state))
        } else if recipient == self.our_state.address() {
            Ok((&mut self.partner_state, &self.our_state))
        } else {
            Err(ChannelError::UnknownParticipant(recipient))
        }
    }

    /// Validates a transfer signed by either participant and records it against its sender.
    ///
    /// The sender is the participant that is not the recipient. On error the channel is unchanged.
    pub fn register_transfer(
        &mut self,
        signed: &SignedTransfer,
        current_block: BlockHeight,
    ) -> Result<(), ChannelError> {
        let asset = self.asset;
        let channel_address = self.channel_address;
        let name = self.name();
        let (sender, receiver) = self.end_states_for(signed.recipient())?;
        if signed.transfer.asset() != asset {
            return Err(ChannelError::AssetMismatch { expected: asset, got: signed.transfer.asset() });
        }
        if signed.transfer.channel() != channel_address {
            return Err(ChannelError::ChannelMismatch { expected: channel_address, got: signed.transfer.channel() });
        }
        if !signed.verify(sender.public_key()) {
            return Err(ChannelError::InvalidSignature(sender.address()));
        }
        if signed.nonce() <= sender.nonce() {
            return Err(ChannelError::InvalidNonce { current: sender.nonce(), got: signed.nonce() });
        }
        let next = sender.validate_transfer(&signed.transfer, receiver, current_block)?;
        debug!("{name}: registering {} from {}", signed.transfer, sender.address());
        sender.apply(next, signed.clone());
        Ok(())
    }

    /// Builds our next direct transfer, paying `amount` on top of everything already sent. Nothing is changed until
    /// the signed transfer is passed to [`Channel::register_transfer`].
    pub fn create_direct_transfer(
        &self,
        amount: TokenAmount,
        current_block: BlockHeight,
    ) -> Result<Transfer, ChannelError> {
        let next = self.our_state.reconcile(current_block)?;
        let available = self.available_after(&next);
        if amount > available {
            return Err(ChannelError::InsufficientBalance { available, requested: amount });
        }
        let transferred_amount = next.base_transferred.checked_add(amount).ok_or(
            ChannelError::InsufficientBalance { available, requested: amount },
        )?;
        Ok(Transfer::Direct(DirectTransfer {
            nonce: self.our_state.nonce() + 1,
            asset: self.asset,
            channel: self.channel_address,
            recipient: self.partner_address(),
            transferred_amount,
            locksroot: next.tree.root(),
        }))
    }

    /// Builds our next locked transfer for a single hop, with us as initiator and the partner as target.
    pub fn create_locked_transfer(
        &self,
        amount: TokenAmount,
        expiration: BlockHeight,
        hashlock: Hash256,
        current_block: BlockHeight,
    ) -> Result<Transfer, ChannelError> {
        let lock = Lock { amount, hashlock, expiration };
        self.build_locked_transfer(lock, self.partner_address(), self.our_address(), current_block)
    }

    pub(crate) fn build_locked_transfer(
        &self,
        lock: Lock,
        target: Address,
        initiator: Address,
        current_block: BlockHeight,
    ) -> Result<Transfer, ChannelError> {
        if lock.is_expired(current_block) {
            return Err(ChannelError::LockExpired { expiration: lock.expiration, current_block });
        }
        let mut next = self.our_state.reconcile(current_block)?;
        if next.tree.get_by_hashlock(&lock.hashlock).is_some() {
            return Err(ChannelError::DuplicateLock(lock.hashlock));
        }
        let available = self.available_after(&next);
        if lock.amount > available {
            return Err(ChannelError::InsufficientBalance { available, requested: lock.amount });
        }
        next.tree.insert(lock.clone())?;
        Ok(Transfer::Locked(LockedTransfer {
            nonce: self.our_state.nonce() + 1,
            asset: self.asset,
            channel: self.channel_address,
            recipient: self.partner_address(),
            transferred_amount: next.base_transferred,
            locksroot: next.tree.root(),
            lock,
            target,
            initiator,
        }))
    }

    fn available_after(&self, next: &end_state::Reconciled) -> TokenAmount {
        (self.our_state.deposit() + self.partner_state.transferred_amount())
            .saturating_sub(next.base_transferred)
            .saturating_sub(next.tree.total_amount())
    }

    /// Records a learned secret against whichever side holds the matching lock. Returns the sides that did.
    pub fn register_secret(&mut self, secret: &Secret) -> Vec<Side> {
        let mut sides = Vec::new();
        if self.our_state.register_secret(secret) {
            sides.push(Side::Ours);
        }
        if self.partner_state.register_secret(secret) {
            sides.push(Side::Partner);
        }
        if !sides.is_empty() {
            info!("{}: secret for {} registered", self.name(), secret.hashlock().short());
        }
        sides
    }

    /// Unlock evidence for every partner lock whose secret we know, proven against the partner's latest locksroot.
    pub fn unlock_proofs(&self) -> Vec<UnlockProof> {
        Self::proofs_for(&self.partner_state)
    }

    /// Unlock evidence for our own locks whose secret is known. Handing these to the ledger pays the partner.
    pub fn own_unlock_proofs(&self) -> Vec<UnlockProof> {
        Self::proofs_for(&self.our_state)
    }

    fn proofs_for(state: &ChannelEndState) -> Vec<UnlockProof> {
        state
            .unlockable()
            .filter_map(|(lock, secret)| {
                let proof = state.locked().proof_for(lock).ok()?;
                Some(UnlockProof { proof, lock: lock.clone(), secret: secret.clone() })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyPair, Signer};
    use crate::merkle::check_proof;

    const ASSET: Address = Address::new([0xa5; 20]);

    fn channel_pair(deposit: u64) -> (KeyPair, Channel, KeyPair, Channel) {
        let alice = KeyPair::from_seed(b"alice");
        let bob = KeyPair::from_seed(b"bob");
        let address = Address::new([0xcc; 20]);
        let deposit = TokenAmount::new(deposit);
        let a_end = ChannelEndState::new(*alice.public_key(), deposit);
        let b_end = ChannelEndState::new(*bob.public_key(), deposit);
        let ours = Channel::new(ASSET, address, 50, 5, a_end.clone(), b_end.clone());
        let theirs = Channel::new(ASSET, address, 50, 5, b_end, a_end);
        (alice, ours, bob, theirs)
    }

    fn send(signer: &KeyPair, from: &mut Channel, to: &mut Channel, transfer: Transfer, block: u64) -> SignedTransfer {
        let signed = transfer.sign(signer);
        from.register_transfer(&signed, block).unwrap();
        to.register_transfer(&signed, block).unwrap();
        signed
    }

    #[test]
    fn direct_transfers_move_balance() {
        let (alice, mut a, bob, mut b) = channel_pair(100);
        let t = a.create_direct_transfer(TokenAmount::new(30), 1).unwrap();
        send(&alice, &mut a, &mut b, t, 1);
        assert_eq!(a.balance(), TokenAmount::new(70));
        assert_eq!(b.balance(), TokenAmount::new(130));
        let t = b.create_direct_transfer(TokenAmount::new(130), 2).unwrap();
        send(&bob, &mut b, &mut a, t, 2);
        assert_eq!(a.balance(), TokenAmount::new(200));
        assert_eq!(b.balance(), TokenAmount::ZERO);
        assert_eq!(a.partner_state().nonce(), 1);
        assert!(matches!(
            b.create_direct_transfer(TokenAmount::new(1), 3),
            Err(ChannelError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn nonce_must_increase() {
        let (alice, mut a, _bob, mut b) = channel_pair(100);
        let t = a.create_direct_transfer(TokenAmount::new(10), 1).unwrap();
        let first = send(&alice, &mut a, &mut b, t, 1);
        let before = b.clone();
        let err = b.register_transfer(&first, 1).unwrap_err();
        assert_eq!(err, ChannelError::InvalidNonce { current: 1, got: 1 });
        assert_eq!(b, before);
    }

    #[test]
    fn forged_and_foreign_transfers_rejected() {
        let (alice, a, bob, mut b) = channel_pair(100);
        let t = a.create_direct_transfer(TokenAmount::new(10), 1).unwrap();
        // Signed by the wrong key
        let forged = t.clone().sign(&bob);
        assert_eq!(b.register_transfer(&forged, 1), Err(ChannelError::InvalidSignature(alice.address())));
        // Recipient not in the channel
        let mut stray = t.clone();
        if let Transfer::Direct(d) = &mut stray {
            d.recipient = Address::new([9; 20]);
        }
        let stray = stray.sign(&alice);
        assert_eq!(b.register_transfer(&stray, 1), Err(ChannelError::UnknownParticipant(Address::new([9; 20]))));
        // Wrong asset
        let mut wrong_asset = t.clone();
        if let Transfer::Direct(d) = &mut wrong_asset {
            d.asset = Address::new([1; 20]);
        }
        let wrong_asset = wrong_asset.sign(&alice);
        assert!(matches!(b.register_transfer(&wrong_asset, 1), Err(ChannelError::AssetMismatch { .. })));
        // Signed for another channel between the same pair
        let mut other_channel = t;
        if let Transfer::Direct(d) = &mut other_channel {
            d.channel = Address::new([0xdd; 20]);
        }
        let other_channel = other_channel.sign(&alice);
        assert_eq!(
            b.register_transfer(&other_channel, 1),
            Err(ChannelError::ChannelMismatch { expected: b.channel_address(), got: Address::new([0xdd; 20]) })
        );
        assert_eq!(b.partner_state().nonce(), 0);
    }

    #[test]
    fn overspending_rejected_by_receiver() {
        let (alice, _a, _bob, mut b) = channel_pair(100);
        let t = Transfer::Direct(DirectTransfer {
            nonce: 1,
            asset: ASSET,
            channel: b.channel_address(),
            recipient: b.our_address(),
            transferred_amount: TokenAmount::new(101),
            locksroot: Hash256::ZERO,
        });
        let err = b.register_transfer(&t.sign(&alice), 1).unwrap_err();
        assert_eq!(
            err,
            ChannelError::InsufficientBalance { available: TokenAmount::new(100), requested: TokenAmount::new(101) }
        );
    }

    #[test]
    fn locked_transfer_lifecycle() {
        let (alice, mut a, _bob, mut b) = channel_pair(100);
        let secret = Secret::from("secret");
        let t = a.create_locked_transfer(TokenAmount::new(10), 10, secret.hashlock(), 0).unwrap();
        send(&alice, &mut a, &mut b, t, 0);
        assert_eq!(a.locked_amount(), TokenAmount::new(10));
        assert_eq!(a.distributable(), TokenAmount::new(90));
        assert_eq!(b.outstanding(), TokenAmount::new(10));
        assert_eq!(b.balance(), TokenAmount::new(100));

        // Same hashlock again is refused
        let dup = a.create_locked_transfer(TokenAmount::new(5), 12, secret.hashlock(), 1);
        assert_eq!(dup, Err(ChannelError::DuplicateLock(secret.hashlock())));

        // Bob learns the secret, and can prove the lock under Alice's signed root
        assert_eq!(b.register_secret(&secret), vec![Side::Partner]);
        let proofs = b.unlock_proofs();
        assert_eq!(proofs.len(), 1);
        let root = b.partner_state().latest_transfer().unwrap().locksroot();
        assert!(check_proof(&proofs[0].proof, &root, &proofs[0].lock.leaf_hash()));

        // Alice learns it too and releases the lock in her next transfer
        assert_eq!(a.register_secret(&secret), vec![Side::Ours]);
        assert_eq!(a.own_unlock_proofs(), proofs);
        let t = a.create_direct_transfer(TokenAmount::new(5), 2).unwrap();
        assert_eq!(t.transferred_amount(), TokenAmount::new(15));
        assert_eq!(t.locksroot(), Hash256::ZERO);
        send(&alice, &mut a, &mut b, t, 2);
        assert_eq!(b.balance(), TokenAmount::new(115));
        assert!(b.unlock_proofs().is_empty());
        assert_eq!(b.outstanding(), TokenAmount::ZERO);
    }

    #[test]
    fn released_lock_must_be_reflected() {
        let (alice, mut a, _bob, mut b) = channel_pair(100);
        let secret = Secret::from("s");
        let t = a.create_locked_transfer(TokenAmount::new(10), 10, secret.hashlock(), 0).unwrap();
        let first = send(&alice, &mut a, &mut b, t, 0);
        b.register_secret(&secret);
        // Alice pretends the lock is still pending and only adds 5
        let cheat = Transfer::Direct(DirectTransfer {
            nonce: 2,
            asset: ASSET,
            channel: b.channel_address(),
            recipient: b.our_address(),
            transferred_amount: TokenAmount::new(5),
            locksroot: first.locksroot(),
        });
        let err = b.register_transfer(&cheat.sign(&alice), 1).unwrap_err();
        assert_eq!(
            err,
            ChannelError::InvalidTransferredAmount { expected: TokenAmount::new(10), got: TokenAmount::new(5) }
        );
    }

    #[test]
    fn expired_locks_are_pruned_and_refused() {
        let (alice, mut a, _bob, mut b) = channel_pair(100);
        let secret = Secret::from("late");
        assert_eq!(
            a.create_locked_transfer(TokenAmount::new(10), 5, secret.hashlock(), 5),
            Err(ChannelError::LockExpired { expiration: 5, current_block: 5 })
        );
        let t = a.create_locked_transfer(TokenAmount::new(10), 5, secret.hashlock(), 1).unwrap();
        send(&alice, &mut a, &mut b, t, 1);
        // After expiry the lock drops out of the next transfer and the value stays with Alice
        let t = a.create_direct_transfer(TokenAmount::new(1), 6).unwrap();
        assert_eq!(t.locksroot(), Hash256::ZERO);
        assert_eq!(t.transferred_amount(), TokenAmount::new(1));
        send(&alice, &mut a, &mut b, t, 6);
        assert_eq!(a.balance(), TokenAmount::new(99));
        assert_eq!(a.locked_amount(), TokenAmount::ZERO);
    }

    #[test]
    fn locksroot_must_match() {
        let (alice, a, _bob, mut b) = channel_pair(100);
        let secret = Secret::from("s");
        let mut t = a.create_locked_transfer(TokenAmount::new(10), 10, secret.hashlock(), 0).unwrap();
        if let Transfer::Locked(l) = &mut t {
            l.locksroot = Hash256::digest(b"bogus");
        }
        let err = b.register_transfer(&t.sign(&alice), 0).unwrap_err();
        assert!(matches!(err, ChannelError::LocksrootMismatch { .. }));
        assert_eq!(b.partner_state().locked_amount(), TokenAmount::ZERO);
    }

    #[test]
    fn conservation_over_many_transfers() {
        let (alice, mut a, bob, mut b) = channel_pair(100);
        let total = TokenAmount::new(200);
        for i in 0..40u64 {
            let amount = TokenAmount::new((i * 7) % 13);
            if i % 3 == 0 {
                if let Ok(t) = b.create_direct_transfer(amount, i) {
                    send(&bob, &mut b, &mut a, t, i);
                }
            } else if let Ok(t) = a.create_direct_transfer(amount, i) {
                send(&alice, &mut a, &mut b, t, i);
            }
            if i % 5 == 0 {
                let secret = Secret::from(format!("lock-{i}").as_str());
                if let Ok(t) = a.create_locked_transfer(TokenAmount::new(3), i + 100, secret.hashlock(), i) {
                    send(&alice, &mut a, &mut b, t, i);
                }
            }
            for view in [&a, &b] {
                let sum = view.distributable()
                    + view.locked_amount()
                    + view.partner_distributable()
                    + view.outstanding();
                assert_eq!(sum, total);
                assert_eq!(view.balance() + view.partner_balance(), total);
            }
        }
    }
}
