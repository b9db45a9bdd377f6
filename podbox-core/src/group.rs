// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-depth incremental Merkle tree holding the identity commitments of a Semaphore group.
//!
//! Members are appended to the next free leaf. Removing a member overwrites its leaf with the
//! zero value instead of shifting other members, which keeps every member's index (and with
//! that any previously created membership proof path) stable. The "members" of a group are the
//! non-zero leaves only.
//!
//! Nodes are hashed with BLAKE3 over the concatenation of the left and right child. Empty
//! subtrees are represented by a precomputed chain of "zero" hashes so the root can be
//! calculated without materializing all `2^depth` leaves.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Hash;

/// Depth of all Semaphore group trees, allowing up to 65536 members.
pub const TREE_DEPTH: usize = 16;

/// Incremental Merkle tree of identity commitments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: Hash,
    depth: usize,
    members: Vec<Hash>,
}

impl Group {
    /// Returns a new, empty group with the default tree depth.
    pub fn new(id: Hash) -> Self {
        Self::with_depth(id, TREE_DEPTH)
    }

    /// Returns a new, empty group with a custom tree depth.
    pub fn with_depth(id: Hash, depth: usize) -> Self {
        Self {
            id,
            depth,
            members: Vec::new(),
        }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of leaves this tree can hold.
    pub fn capacity(&self) -> usize {
        1 << self.depth
    }

    /// All leaves, including zero values of removed members.
    pub fn leaves(&self) -> &[Hash] {
        &self.members
    }

    /// Current members of the group (all non-zero leaves).
    pub fn members(&self) -> impl Iterator<Item = &Hash> {
        self.members.iter().filter(|leaf| !leaf.is_zero())
    }

    /// Current members of the group as a set.
    pub fn member_set(&self) -> HashSet<Hash> {
        self.members().copied().collect()
    }

    /// Returns the leaf index of a member or `None` if it is not part of the group.
    pub fn index_of(&self, commitment: &Hash) -> Option<usize> {
        if commitment.is_zero() {
            return None;
        }
        self.members.iter().position(|leaf| leaf == commitment)
    }

    /// Appends a member to the next free leaf and returns its index.
    pub fn add_member(&mut self, commitment: Hash) -> Result<usize, GroupError> {
        if commitment.is_zero() {
            return Err(GroupError::ZeroCommitment);
        }

        if self.members.len() >= self.capacity() {
            return Err(GroupError::Full(self.capacity()));
        }

        self.members.push(commitment);
        Ok(self.members.len() - 1)
    }

    /// Removes the member at the given leaf index by overwriting it with the zero value.
    pub fn remove_member(&mut self, index: usize) -> Result<(), GroupError> {
        match self.members.get_mut(index) {
            Some(leaf) if !leaf.is_zero() => {
                *leaf = Hash::ZERO;
                Ok(())
            }
            Some(_) => Err(GroupError::AlreadyRemoved(index)),
            None => Err(GroupError::IndexOutOfBounds(index)),
        }
    }

    /// Calculates the root hash of the tree.
    pub fn root(&self) -> Hash {
        let zeros = zero_hashes(self.depth);
        if self.members.is_empty() {
            return zeros[self.depth];
        }

        let mut level: Vec<Hash> = self.members.clone();
        for zero in zeros.iter().take(self.depth) {
            level = level
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = pair.get(1).copied().unwrap_or(*zero);
                    hash_pair(&left, &right)
                })
                .collect();
        }

        level.first().copied().unwrap_or(zeros[self.depth])
    }

    /// Serializes the group into its JSON representation.
    pub fn export(&self) -> Result<String, GroupError> {
        serde_json::to_string(self).map_err(|err| GroupError::Serialization(err.to_string()))
    }

    /// Deserializes a group from its JSON representation.
    pub fn import(value: &str) -> Result<Self, GroupError> {
        let group: Self =
            serde_json::from_str(value).map_err(|err| GroupError::Serialization(err.to_string()))?;

        if group.depth != TREE_DEPTH {
            return Err(GroupError::InvalidDepth(group.depth));
        }

        if group.members.len() > group.capacity() {
            return Err(GroupError::Full(group.capacity()));
        }

        Ok(group)
    }
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Hash::new(buf)
}

/// Roots of empty subtrees for every level, from the leaves (index 0) up to the root.
fn zero_hashes(depth: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(Hash::ZERO);
    for level in 0..depth {
        let zero = zeros[level];
        zeros.push(hash_pair(&zero, &zero));
    }
    zeros
}

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group is full, it can hold at most {0} members")]
    Full(usize),

    #[error("zero value can not be used as a member commitment")]
    ZeroCommitment,

    #[error("no member at leaf index {0}")]
    IndexOutOfBounds(usize),

    #[error("member at leaf index {0} was already removed")]
    AlreadyRemoved(usize),

    #[error("group has tree depth {0}, expected {expected}", expected = TREE_DEPTH)]
    InvalidDepth(usize),

    #[error("could not (de-)serialize group: {0}")]
    Serialization(String),
}
