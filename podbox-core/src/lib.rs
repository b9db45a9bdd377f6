// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data-types of Podbox.
//!
//! - [`Hash`]: 32-byte BLAKE3 digests, used for identifiers, Merkle nodes and identity
//!   commitments
//! - [`PrivateKey`], [`PublicKey`], [`Signature`]: Ed25519 signing of tickets, messages and
//!   identity claims
//! - [`SignedPayload`], [`SerializedPcd`]: signed tickets and messages handed out by pipelines
//! - [`Credential`]: what end-users present to prove their email and identity commitment
//! - [`Group`]: fixed-depth incremental Merkle tree of identity commitments (Semaphore group)
pub mod cbor;
pub mod credential;
pub mod group;
pub mod hash;
pub mod identity;
pub mod pcd;
mod serde;
pub mod timestamp;

pub use credential::{Credential, EmailClaim};
pub use group::{Group, GroupError, TREE_DEPTH};
pub use hash::{Hash, HashError};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use pcd::{MessageData, PcdError, PcdType, SerializedPcd, SignedPayload, TicketData};
pub use timestamp::{Timestamp, now};

/// Identity commitment of a Semaphore identity.
pub type Commitment = Hash;
