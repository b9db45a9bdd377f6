// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Commitment;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Registered user. Users with an auth key can authenticate without a signed email claim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Lower-cased email.
    pub email: String,
    pub commitment: Commitment,
    pub auth_key: Option<String>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("email", &self.email)
            .field("commitment", &self.commitment)
            .field("auth_key", &self.auth_key.as_ref().map(|_| "***"))
            .finish()
    }
}

pub trait UserStore {
    /// Inserts or overwrites the user with the same email.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when another user already has the auth key.
    fn save_user(&self, user: UserRecord) -> impl Future<Output = Result<(), StoreError>>;

    fn user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>>;

    fn user_by_auth_key(
        &self,
        auth_key: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>>;
}
