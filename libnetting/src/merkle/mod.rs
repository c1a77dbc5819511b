//! Commitment tree over the set of locks a participant currently has in flight.
//!
//! Leaves are `H(lock bytes)`, sorted ascending. Each level pairs neighbours `(2i, 2i+1)`; an unpaired last node is
//! promoted to the next level unchanged. A parent is `H(min(a, b) ‖ max(a, b))`, so a proof is just the list of
//! siblings from the leaf upwards and carries no left/right flags. The root of the empty tree is 32 zero bytes and
//! the root of a single-leaf tree is the leaf itself.

use crate::amount::TokenAmount;
use crate::crypto::hashes::Blake2b256;
use crate::crypto::Hash256;
use crate::transfer::Lock;
use digest::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("The lock with leaf {0} is already committed")]
    DuplicateLock(Hash256),
    #[error("The lock with leaf {0} is not in the tree")]
    NotFound(Hash256),
}

/// Hashes two sibling nodes, smallest first.
pub fn hash_pair(a: &Hash256, b: &Hash256) -> Hash256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Blake2b256::new();
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    Hash256::new(hasher.finalize().into())
}

/// The sibling hashes needed to recompute a root from a leaf, ordered from the leaf upwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleProof(Vec<Hash256>);

impl MerkleProof {
    pub fn new(siblings: Vec<Hash256>) -> Self {
        MerkleProof(siblings)
    }

    pub fn siblings(&self) -> &[Hash256] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Returns true if `leaf` is committed under `root` by way of `proof`.
pub fn check_proof(proof: &MerkleProof, root: &Hash256, leaf: &Hash256) -> bool {
    let computed = proof.siblings().iter().fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *root
}

/// The tree of locks one participant has sent and not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Lock>", try_from = "Vec<Lock>")]
pub struct CommitmentTree {
    locks: BTreeMap<Hash256, Lock>,
    layers: Vec<Vec<Hash256>>,
}

impl CommitmentTree {
    pub fn new() -> Self {
        CommitmentTree { locks: BTreeMap::new(), layers: vec![Vec::new()] }
    }

    pub fn from_locks<I: IntoIterator<Item = Lock>>(locks: I) -> Result<Self, TreeError> {
        let mut map = BTreeMap::new();
        for lock in locks {
            let leaf = lock.leaf_hash();
            if map.insert(leaf, lock).is_some() {
                return Err(TreeError::DuplicateLock(leaf));
            }
        }
        let mut tree = CommitmentTree { locks: map, layers: Vec::new() };
        tree.rebuild();
        Ok(tree)
    }

    /// Commits a new lock and returns the new root.
    pub fn insert(&mut self, lock: Lock) -> Result<Hash256, TreeError> {
        let leaf = lock.leaf_hash();
        if self.locks.contains_key(&leaf) {
            return Err(TreeError::DuplicateLock(leaf));
        }
        self.locks.insert(leaf, lock);
        self.rebuild();
        Ok(self.root())
    }

    /// Evicts a lock and returns the new root.
    pub fn remove(&mut self, lock: &Lock) -> Result<Hash256, TreeError> {
        let leaf = lock.leaf_hash();
        if self.locks.remove(&leaf).is_none() {
            return Err(TreeError::NotFound(leaf));
        }
        self.rebuild();
        Ok(self.root())
    }

    pub fn root(&self) -> Hash256 {
        match self.layers.last() {
            Some(top) if top.len() == 1 => top[0],
            _ => Hash256::ZERO,
        }
    }

    pub fn proof_for(&self, lock: &Lock) -> Result<MerkleProof, TreeError> {
        let leaf = lock.leaf_hash();
        let mut index = self.layers[0].binary_search(&leaf).map_err(|_| TreeError::NotFound(leaf))?;
        let mut siblings = Vec::with_capacity(self.layers.len());
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if sibling < layer.len() {
                siblings.push(layer[sibling]);
            }
            index /= 2;
        }
        Ok(MerkleProof(siblings))
    }

    pub fn contains(&self, lock: &Lock) -> bool {
        self.locks.contains_key(&lock.leaf_hash())
    }

    pub fn get_by_hashlock(&self, hashlock: &Hash256) -> Option<&Lock> {
        self.locks.values().find(|l| l.hashlock == *hashlock)
    }

    /// The committed locks, in leaf order.
    pub fn locks(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn total_amount(&self) -> TokenAmount {
        self.locks.values().map(|l| l.amount).sum()
    }

    fn rebuild(&mut self) {
        let mut layers = vec![self.locks.keys().copied().collect::<Vec<_>>()];
        while let Some(layer) = layers.last().filter(|l| l.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(a, b),
                    [a] => *a,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect::<Vec<_>>();
            layers.push(next);
        }
        self.layers = layers;
    }
}

impl Default for CommitmentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl From<CommitmentTree> for Vec<Lock> {
    fn from(tree: CommitmentTree) -> Self {
        tree.locks.into_values().collect()
    }
}

impl TryFrom<Vec<Lock>> for CommitmentTree {
    type Error = TreeError;

    fn try_from(locks: Vec<Lock>) -> Result<Self, Self::Error> {
        CommitmentTree::from_locks(locks)
    }
}
