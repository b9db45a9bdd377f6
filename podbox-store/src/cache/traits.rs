// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Timestamp;

use crate::error::StoreError;

/// Persistent key-value cache, used for signed credentials.
pub trait CacheStore {
    fn get_value(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>>;

    /// Inserts or overwrites a value. The creation time of an existing key is kept.
    fn set_value(
        &self,
        key: &str,
        value: &str,
        now: Timestamp,
    ) -> impl Future<Output = Result<(), StoreError>>;
}
