// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credentials end-users present to prove who they are.
//!
//! The common case is an email claim signed by a trusted issuer which binds an email address to
//! the holder's Semaphore identity commitment. Headless clients (service accounts, scanners) can
//! alternatively present a pre-shared auth key.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cbor::EncodeError;
use crate::hash::Hash;
use crate::identity::PrivateKey;
use crate::pcd::SignedPayload;
use crate::timestamp::Timestamp;

/// Claim that the holder of `commitment` controls `email`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailClaim {
    pub email: String,
    pub commitment: Hash,
    pub issued_at: Timestamp,
}

impl EmailClaim {
    /// Creates an email claim signed by the given issuer key.
    pub fn sign(
        email: &str,
        commitment: Hash,
        issued_at: Timestamp,
        issuer: &PrivateKey,
    ) -> Result<SignedPayload<EmailClaim>, EncodeError> {
        SignedPayload::sign(
            EmailClaim {
                email: email.to_string(),
                commitment,
                issued_at,
            },
            issuer,
        )
    }
}

/// Credential attached to feed or check-in requests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Pre-shared key of a headless account, resolved against the user table.
    AuthKey { auth_key: String },

    /// Email claim signed by an issuer.
    Email(SignedPayload<EmailClaim>),
}

impl Credential {
    /// Stable serialized form, used as cache key for verification results.
    pub fn to_cache_key(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Auth keys are secrets.
            Credential::AuthKey { .. } => f.debug_struct("AuthKey").finish_non_exhaustive(),
            Credential::Email(signed) => f
                .debug_struct("Email")
                .field("email", &signed.payload.email)
                .field("signer", &signed.signer)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Hash, PrivateKey};

    use super::{Credential, EmailClaim};

    #[test]
    fn serialized_form_is_stable() {
        let issuer = PrivateKey::from_bytes(&[9; 32]);
        let claim = EmailClaim::sign("ada@example.org", Hash::new(b"ada"), 5, &issuer).unwrap();
        let credential = Credential::Email(claim);

        let key_1 = credential.to_cache_key().unwrap();
        let key_2 = credential.clone().to_cache_key().unwrap();
        assert_eq!(key_1, key_2);

        let credential_again: Credential = serde_json::from_str(&key_1).unwrap();
        assert_eq!(credential, credential_again);
    }

    #[test]
    fn auth_key_is_not_printed() {
        let credential = Credential::AuthKey {
            auth_key: "very-secret".into(),
        };
        assert!(!format!("{credential:?}").contains("very-secret"));
    }
}
