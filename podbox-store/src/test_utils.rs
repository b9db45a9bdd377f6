// SPDX-License-Identifier: MIT OR Apache-2.0

/// Macro to run the same test logic against all store backend implementations.
///
/// This macro takes a closure that will be executed against each store type:
/// - In-memory store (`MemoryStore`)
/// - SQLite store (`SqliteStore`)
///
/// The body is responsible for wrapping writes into transactions, for example with
/// [`write`](crate::write). Reads inside the body only see committed state.
///
/// ## Example
///
/// ```rust,ignore
/// # use podbox_store::{assert_all_stores, write, CacheStore};
/// # async fn run() {
/// assert_all_stores!(|store| async {
///     write(&store, async |store| store.set_value("key", "value", 1).await)
///         .await
///         .unwrap();
///     assert_eq!(
///         store.get_value("key").await.unwrap(),
///         Some("value".to_string())
///     );
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_all_stores {
    (|$store:ident| $test_body:expr) => {
        // Test with MemoryStore.
        {
            let $store = $crate::memory::MemoryStore::default();
            $test_body.await;
        }

        // Test with SqliteStore.
        {
            let $store = $crate::sqlite::SqliteStore::temporary().await;
            $test_body.await;
        }
    };
}
