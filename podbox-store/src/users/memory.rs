// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::users::{UserRecord, UserStore};

impl UserStore for MemoryStore {
    async fn save_user(&self, mut user: UserRecord) -> Result<(), StoreError> {
        user.email = user.email.to_lowercase();
        let mut store = self.write_store();

        if let Some(auth_key) = &user.auth_key {
            if let Some(owner) = store.auth_keys.get(auth_key) {
                if owner != &user.email {
                    return Err(StoreError::UniqueViolation(
                        "auth key belongs to another user".to_string(),
                    ));
                }
            }
        }

        if let Some(previous) = store.users.get(&user.email).and_then(|u| u.auth_key.clone()) {
            store.auth_keys.remove(&previous);
        }
        if let Some(auth_key) = &user.auth_key {
            store.auth_keys.insert(auth_key.clone(), user.email.clone());
        }
        store.users.insert(user.email.clone(), user);
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.read_store().users.get(&email.to_lowercase()).cloned())
    }

    async fn user_by_auth_key(&self, auth_key: &str) -> Result<Option<UserRecord>, StoreError> {
        let store = self.read_store();
        Ok(store
            .auth_keys
            .get(auth_key)
            .and_then(|email| store.users.get(email))
            .cloned())
    }
}
