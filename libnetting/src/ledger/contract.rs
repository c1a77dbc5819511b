use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256, PublicKey};
use crate::ledger::error::LedgerError;
use crate::ledger::events::LedgerEventKind;
use crate::ledger::UnlockProof;
use crate::merkle::check_proof;
use crate::transfer::{BlockHeight, Lock, SignedTransfer};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementState {
    Open,
    Closed,
    Settled,
}

impl Display for SettlementState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementState::Open => write!(f, "Open"),
            SettlementState::Closed => write!(f, "Closed"),
            SettlementState::Settled => write!(f, "Settled"),
        }
    }
}

/// What the ledger knows about one participant of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub address: Address,
    pub public_key: PublicKey,
    pub deposit: TokenAmount,
    /// The latest balance proof *signed by* this participant.
    pub balance_proof: Option<SignedTransfer>,
    pub transferred_amount: TokenAmount,
    pub nonce: u64,
    pub locksroot: Hash256,
    /// Locks from this participant's tree that have been unlocked in favour of the counterparty, keyed by leaf.
    pub unlocked: BTreeMap<Hash256, Lock>,
    pub netted: Option<TokenAmount>,
}

impl ParticipantRecord {
    fn new(public_key: PublicKey, deposit: TokenAmount) -> Self {
        ParticipantRecord {
            address: public_key.address(),
            public_key,
            deposit,
            balance_proof: None,
            transferred_amount: TokenAmount::ZERO,
            nonce: 0,
            locksroot: Hash256::ZERO,
            unlocked: BTreeMap::new(),
            netted: None,
        }
    }

    pub fn unlocked_amount(&self) -> TokenAmount {
        self.unlocked.values().map(|l| l.amount).sum()
    }

    fn record_proof(&mut self, proof: &SignedTransfer) {
        self.transferred_amount = proof.transferred_amount();
        self.nonce = proof.nonce();
        self.locksroot = proof.locksroot();
        self.balance_proof = Some(proof.clone());
    }
}

/// The settlement state machine for one channel: `Open → Closed → Settled`.
///
/// Every operation either succeeds completely or leaves the record as it was. Operations take the current block
/// from the caller; the ledger that owns the record provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NettingContract {
    asset: Address,
    channel_address: Address,
    settle_timeout: u64,
    state: SettlementState,
    opened_at: BlockHeight,
    closer: Option<Address>,
    closed_at: Option<BlockHeight>,
    participants: [ParticipantRecord; 2],
}

impl NettingContract {
    pub fn open(
        asset: Address,
        channel_address: Address,
        settle_timeout: u64,
        participants: [(PublicKey, TokenAmount); 2],
        current_block: BlockHeight,
    ) -> Result<Self, LedgerError> {
        let [(pk_a, dep_a), (pk_b, dep_b)] = participants;
        // Every later sum over the deposits relies on this
        if dep_a.checked_add(dep_b).is_none() {
            return Err(LedgerError::DepositOverflow(dep_a, dep_b));
        }
        Ok(NettingContract {
            asset,
            channel_address,
            settle_timeout,
            state: SettlementState::Open,
            opened_at: current_block,
            closer: None,
            closed_at: None,
            participants: [ParticipantRecord::new(pk_a, dep_a), ParticipantRecord::new(pk_b, dep_b)],
        })
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

    pub fn state(&self) -> SettlementState {
        self.state
    }

    pub fn opened_at(&self) -> BlockHeight {
        self.opened_at
    }

    pub fn closer(&self) -> Option<Address> {
        self.closer
    }

    pub fn closed_at(&self) -> Option<BlockHeight> {
        self.closed_at
    }

    pub fn participants(&self) -> &[ParticipantRecord; 2] {
        &self.participants
    }

    pub fn participant(&self, address: &Address) -> Option<&ParticipantRecord> {
        self.participants.iter().find(|p| p.address == *address)
    }

    pub fn is_participant(&self, address: &Address) -> bool {
        self.participant(address).is_some()
    }

    /// The final balance of `address`, once settled.
    pub fn netted(&self, address: &Address) -> Option<TokenAmount> {
        self.participant(address).and_then(|p| p.netted)
    }

    pub fn total_deposit(&self) -> TokenAmount {
        self.participants.iter().map(|p| p.deposit).sum()
    }

    /// The first block at which the channel can be settled.
    pub fn settle_block(&self) -> Option<BlockHeight> {
        self.closed_at.map(|c| c.saturating_add(self.settle_timeout))
    }

    fn index_of(&self, address: &Address) -> Result<usize, LedgerError> {
        self.participants.iter().position(|p| p.address == *address).ok_or(LedgerError::NotParticipant(*address))
    }

    /// Checks a balance proof handed in by `submitter` and returns the index of the participant that signed it.
    ///
    /// Only the counterparty of the signer may submit a balance proof. A participant's own proof can only ever lower
    /// what it owes.
    fn check_balance_proof(&self, submitter: usize, proof: &SignedTransfer) -> Result<usize, LedgerError> {
        if proof.transfer.asset() != self.asset {
            return Err(LedgerError::InvalidTransfer(format!(
                "asset {} does not match the channel asset {}",
                proof.transfer.asset(),
                self.asset
            )));
        }
        if proof.transfer.channel() != self.channel_address {
            return Err(LedgerError::InvalidTransfer(format!(
                "signed for channel {}, not {}",
                proof.transfer.channel(),
                self.channel_address
            )));
        }
        let recipient = proof.recipient();
        let receiver = self.participants.iter().position(|p| p.address == recipient).ok_or_else(|| {
            LedgerError::InvalidTransfer(format!("recipient {recipient} is not a participant of the channel"))
        })?;
        let signer = 1 - receiver;
        if !proof.verify(&self.participants[signer].public_key) {
            return Err(LedgerError::InvalidSignature);
        }
        if signer == submitter {
            return Err(LedgerError::InvalidTransfer(format!(
                "{} cannot submit its own balance proof",
                self.participants[signer].address
            )));
        }
        Ok(signer)
    }

    fn check_challenge_window(&self, current_block: BlockHeight) -> Result<(), LedgerError> {
        match (self.state, self.settle_block()) {
            (SettlementState::Closed, Some(deadline)) if current_block < deadline => Ok(()),
            (SettlementState::Open, _) => Err(LedgerError::invalid_state("unlocking", self.state)),
            (_, deadline) => Err(LedgerError::ChallengePeriodExpired {
                deadline: deadline.unwrap_or(current_block),
                current_block,
            }),
        }
    }

    /// Secrets in `unlocked` that open their own hashlock, whether or not the rest of the entry is valid.
    fn revealed_secrets(unlocked: &[UnlockProof]) -> Vec<LedgerEventKind> {
        let mut seen = HashSet::new();
        unlocked
            .iter()
            .filter(|u| u.secret.unlocks(&u.lock.hashlock) && seen.insert(u.lock.hashlock))
            .map(|u| LedgerEventKind::SecretRevealed { hashlock: u.lock.hashlock, secret: u.secret.clone() })
            .collect()
    }

    /// Nets the valid entries of `unlocked`. An entry is valid when its secret opens the hashlock, the lock has not
    /// expired, and its proof verifies under a recorded locksroot. It is netted against every locksroot it verifies
    /// under, since both participants may have committed the same lock. Invalid entries are skipped. A lock that was
    /// already netted everywhere it verifies is an error only when `strict` is set.
    fn net_unlocks(
        &mut self,
        unlocked: &[UnlockProof],
        current_block: BlockHeight,
        strict: bool,
    ) -> Result<(), LedgerError> {
        for entry in unlocked {
            let lock = &entry.lock;
            if !entry.secret.unlocks(&lock.hashlock) {
                debug!("Skipping unlock of {lock}: the secret does not match");
                continue;
            }
            if lock.is_expired(current_block) {
                debug!("Skipping unlock of {lock}: expired at block {current_block}");
                continue;
            }
            let leaf = lock.leaf_hash();
            let mut committed = false;
            let mut netted = false;
            for record in self.participants.iter_mut() {
                if record.locksroot.is_zero() || !check_proof(&entry.proof, &record.locksroot, &leaf) {
                    continue;
                }
                committed = true;
                if !record.unlocked.contains_key(&leaf) {
                    trace!("Unlocked {lock} from {}", record.address);
                    record.unlocked.insert(leaf, lock.clone());
                    netted = true;
                }
            }
            if !committed {
                debug!("Skipping unlock of {lock}: not committed under a recorded locksroot");
                continue;
            }
            if !netted && strict {
                return Err(LedgerError::DuplicateUnlock(leaf));
            }
        }
        Ok(())
    }

    /// Moves an Open channel to Closed, recording the partner's `latest_transfer` and netting any valid unlock
    /// entries.
    pub fn close(
        &mut self,
        closer: Address,
        latest_transfer: Option<&SignedTransfer>,
        unlocked: &[UnlockProof],
        current_block: BlockHeight,
    ) -> Result<Vec<LedgerEventKind>, LedgerError> {
        if self.state != SettlementState::Open {
            return Err(LedgerError::invalid_state("closing", self.state));
        }
        let submitter = self.index_of(&closer)?;
        let mut next = self.clone();
        if let Some(proof) = latest_transfer {
            let signer = next.check_balance_proof(submitter, proof)?;
            next.participants[signer].record_proof(proof);
        }
        next.net_unlocks(unlocked, current_block, false)?;
        next.state = SettlementState::Closed;
        next.closer = Some(closer);
        next.closed_at = Some(current_block);
        *self = next;
        info!("Channel {} closed by {closer} at block {current_block}", self.channel_address);
        let mut events = vec![LedgerEventKind::ChannelClosed { closer }];
        events.extend(Self::revealed_secrets(unlocked));
        Ok(events)
    }

    /// Replaces the balance proof of `participant`'s counterparty with a newer one it signed.
    ///
    /// Unlocks netted against the previous locksroot are dropped and must be proven again under the new one. This
    /// keeps a lock that was already folded into the transferred amount from being counted a second time.
    pub fn update_transfer(
        &mut self,
        participant: Address,
        transfer: &SignedTransfer,
        current_block: BlockHeight,
    ) -> Result<Vec<LedgerEventKind>, LedgerError> {
        if self.state == SettlementState::Open {
            return Err(LedgerError::invalid_state("updating a balance proof", self.state));
        }
        self.check_challenge_window(current_block)?;
        let submitter = self.index_of(&participant)?;
        let signer = self.check_balance_proof(submitter, transfer)?;
        let record = &self.participants[signer];
        if transfer.nonce() <= record.nonce {
            return Err(LedgerError::InvalidNonce { recorded: record.nonce, got: transfer.nonce() });
        }
        let mut next = self.clone();
        let record = &mut next.participants[signer];
        if !record.unlocked.is_empty() {
            debug!(
                "Dropping {} unlocks netted under the superseded locksroot of {}",
                record.unlocked.len(),
                record.address
            );
            record.unlocked.clear();
        }
        record.record_proof(transfer);
        let event = LedgerEventKind::TransferUpdated { participant: record.address, nonce: transfer.nonce() };
        *self = next;
        Ok(vec![event])
    }

    /// Nets further unlock entries during the challenge period.
    pub fn unlock(
        &mut self,
        participant: Address,
        unlocked: &[UnlockProof],
        current_block: BlockHeight,
    ) -> Result<Vec<LedgerEventKind>, LedgerError> {
        self.check_challenge_window(current_block)?;
        self.index_of(&participant)?;
        let mut seen = HashSet::new();
        if let Some(dup) = unlocked.iter().map(|u| u.lock.leaf_hash()).find(|leaf| !seen.insert(*leaf)) {
            return Err(LedgerError::DuplicateUnlock(dup));
        }
        let mut next = self.clone();
        next.net_unlocks(unlocked, current_block, true)?;
        *self = next;
        Ok(Self::revealed_secrets(unlocked))
    }

    /// Moves a Closed channel to Settled once the challenge period is over and fixes the final balances.
    ///
    /// `netted[p] = deposit[p] + transferred[q] + unlocked(q → p) − transferred[p] − unlocked(p → q)`. Locks that
    /// were never unlocked stay with their sender.
    pub fn settle(&mut self, current_block: BlockHeight) -> Result<Vec<LedgerEventKind>, LedgerError> {
        if self.state != SettlementState::Closed {
            return Err(LedgerError::invalid_state("settling", self.state));
        }
        let deadline = self.settle_block().unwrap_or(current_block);
        if current_block < deadline {
            return Err(LedgerError::SettleTooEarly { deadline, current_block });
        }
        let total = self.total_deposit().value() as i128;
        let outgoing =
            |p: &ParticipantRecord| p.transferred_amount.value() as i128 + p.unlocked_amount().value() as i128;
        let [a, b] = &self.participants;
        let net_a = a.deposit.value() as i128 + outgoing(b) - outgoing(a);
        let net_a = if net_a < 0 {
            warn!("Balance of {} nets to {net_a}; clamping to zero", a.address);
            0
        } else if net_a > total {
            warn!("Balance of {} nets to {}; clamping to zero", b.address, total - net_a);
            total
        } else {
            net_a
        };
        let net_a = TokenAmount::new(net_a as u64);
        let net_b = TokenAmount::new(total as u64) - net_a;
        let balances = [(a.address, net_a), (b.address, net_b)];
        self.participants[0].netted = Some(net_a);
        self.participants[1].netted = Some(net_b);
        self.state = SettlementState::Settled;
        info!(
            "Channel {} settled at block {current_block}: {} -> {net_a}, {} -> {net_b}",
            self.channel_address, balances[0].0, balances[1].0
        );
        Ok(vec![LedgerEventKind::ChannelSettled { balances }])
    }
}
