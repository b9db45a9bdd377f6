// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verification of end-user credentials.
//!
//! Verification results are memoized per serialized credential. Concurrent requests with the same
//! credential share one in-flight verification, failed verifications are not cached.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use podbox_core::{Commitment, Credential, PublicKey};
use podbox_store::UserStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::DEFAULT_VERIFICATION_CACHE_CAPACITY;
use crate::lru::LruCache;

/// Identity proven by a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCredential {
    pub email: Option<String>,
    pub commitment: Commitment,
    /// Key which signed the email claim.
    pub signer: Option<PublicKey>,
    /// `true` when the credential was a pre-shared auth key.
    pub auth_key: bool,
}

/// Verifies proofs of credentials. Auth-key credentials never reach the verifier.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(&self, credential: &Credential) -> Result<VerifiedCredential, CredentialError>;
}

/// Checks the Ed25519 signature of email claims.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureVerifier;

#[async_trait]
impl ProofVerifier for SignatureVerifier {
    async fn verify(&self, credential: &Credential) -> Result<VerifiedCredential, CredentialError> {
        match credential {
            Credential::Email(signed) => {
                signed
                    .verify()
                    .map_err(|_| CredentialError::InvalidSignature)?;
                Ok(VerifiedCredential {
                    email: Some(signed.payload.email.to_lowercase()),
                    commitment: signed.payload.commitment,
                    signer: Some(signed.signer),
                    auth_key: false,
                })
            }
            Credential::AuthKey { .. } => Err(CredentialError::Unsupported),
        }
    }
}

type CachedVerification = Arc<OnceCell<Result<VerifiedCredential, CredentialError>>>;

pub struct CredentialSubservice<S> {
    store: S,
    verifier: Arc<dyn ProofVerifier>,
    trusted_issuer: Option<PublicKey>,
    cache: Mutex<LruCache<String, CachedVerification>>,
}

impl<S> CredentialSubservice<S>
where
    S: UserStore,
{
    pub fn new(store: S, verifier: Arc<dyn ProofVerifier>, trusted_issuer: Option<PublicKey>) -> Self {
        Self::with_capacity(
            store,
            verifier,
            trusted_issuer,
            DEFAULT_VERIFICATION_CACHE_CAPACITY,
        )
    }

    pub fn with_capacity(
        store: S,
        verifier: Arc<dyn ProofVerifier>,
        trusted_issuer: Option<PublicKey>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            verifier,
            trusted_issuer,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Verifies the credential, re-using earlier or in-flight results for the same credential.
    pub async fn verify(&self, credential: &Credential) -> Result<VerifiedCredential, CredentialError> {
        let key = credential
            .to_cache_key()
            .map_err(|err| CredentialError::Encoding(err.to_string()))?;

        let cell = {
            let mut cache = self.cache.lock().expect("acquire lock on verification cache");
            match cache.get(key.as_str()) {
                Some(cell) => cell.clone(),
                None => {
                    let cell = CachedVerification::default();
                    cache.insert(key.clone(), cell.clone());
                    cell
                }
            }
        };

        let result = cell
            .get_or_init(|| self.verify_uncached(credential))
            .await
            .clone();

        if result.is_err() {
            let mut cache = self.cache.lock().expect("acquire lock on verification cache");
            // Only evict our own entry, a later retry might have replaced it already.
            if cache
                .get(key.as_str())
                .is_some_and(|cached| Arc::ptr_eq(cached, &cell))
            {
                cache.remove(key.as_str());
            }
        }

        result
    }

    /// Verifies the credential and requires it to carry an email claim signed by the trusted
    /// issuer, or to be an auth key of a registered user.
    pub async fn verify_and_expect_email(
        &self,
        credential: &Credential,
    ) -> Result<VerifiedEmail, CredentialError> {
        let verified = self.verify(credential).await?;

        if !verified.auth_key {
            let trusted = match (self.trusted_issuer, verified.signer) {
                (Some(issuer), Some(signer)) => issuer == signer,
                _ => false,
            };
            if !trusted {
                return Err(CredentialError::UntrustedIssuer);
            }
        }

        let email = verified.email.ok_or(CredentialError::MissingEmail)?;
        Ok(VerifiedEmail {
            email,
            commitment: verified.commitment,
        })
    }

    async fn verify_uncached(
        &self,
        credential: &Credential,
    ) -> Result<VerifiedCredential, CredentialError> {
        match credential {
            Credential::AuthKey { auth_key } => {
                let user = self
                    .store
                    .user_by_auth_key(auth_key)
                    .await
                    .map_err(|err| CredentialError::Store(err.to_string()))?
                    .ok_or(CredentialError::UnknownAuthKey)?;
                debug!(email = %user.email, "authenticated with auth key");
                Ok(VerifiedCredential {
                    email: Some(user.email),
                    commitment: user.commitment,
                    signer: None,
                    auth_key: true,
                })
            }
            _ => self.verifier.verify(credential).await.inspect_err(|err| {
                warn!(%err, "credential verification failed");
            }),
        }
    }
}

/// Email and identity commitment of an authenticated end-user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedEmail {
    /// Lower-cased email.
    pub email: String,
    pub commitment: Commitment,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential signature is invalid")]
    InvalidSignature,

    #[error("credential was not signed by the trusted issuer")]
    UntrustedIssuer,

    #[error("credential does not carry an email")]
    MissingEmail,

    #[error("auth key is not registered")]
    UnknownAuthKey,

    #[error("credential kind is not supported by the verifier")]
    Unsupported,

    #[error("could not serialize credential: {0}")]
    Encoding(String),

    #[error("store error during verification: {0}")]
    Store(String),
}
