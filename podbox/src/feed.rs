// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requests and responses of feed issuance.
use podbox_core::{Credential, SerializedPcd};
use podbox_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::CredentialError;
use crate::semaphore::SemaphoreError;
use crate::signing::SigningError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRequest {
    #[serde(default)]
    pub credential: Option<Credential>,
}

impl FeedRequest {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }
}

/// Instruction for the client on how to update its credential folders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PcdAction {
    DeleteFolder { folder: String, recursive: bool },
    ReplaceInFolder { folder: String, pcds: Vec<SerializedPcd> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub actions: Vec<PcdAction>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed requires a credential")]
    MissingCredential,

    #[error("pipeline does not issue credentials")]
    Unsupported,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Semaphore(#[from] SemaphoreError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}
