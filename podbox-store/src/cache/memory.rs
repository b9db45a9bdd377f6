// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Timestamp;

use crate::cache::CacheStore;
use crate::error::StoreError;
use crate::memory::MemoryStore;

impl CacheStore for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read_store()
            .cache
            .get(key)
            .map(|(value, _, _)| value.clone()))
    }

    async fn set_value(&self, key: &str, value: &str, now: Timestamp) -> Result<(), StoreError> {
        let mut store = self.write_store();
        let time_created = store
            .cache
            .get(key)
            .map(|(_, time_created, _)| *time_created)
            .unwrap_or(now);
        store
            .cache
            .insert(key.to_string(), (value.to_string(), time_created, now));
        Ok(())
    }
}
