// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for Podbox pipelines.
//!
//! Every concern has its own trait (`AtomStore`, `ConsumerStore`, `SemaphoreHistoryStore`, ..)
//! which is implemented for the in-memory `MemoryStore` and the SQLite-backed `SqliteStore`.
//! Writes happen inside a transaction acquired with [`Transaction::begin`], reads go directly
//! against committed state.
pub mod atoms;
pub mod cache;
pub mod checkins;
pub mod consumers;
mod error;
pub mod manual_tickets;
#[cfg(feature = "memory")]
pub mod memory;
pub mod semaphore_history;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;
pub mod users;

pub use atoms::{Atom, AtomStore};
pub use cache::CacheStore;
pub use checkins::{CheckinRecord, CheckinStore};
pub use consumers::{Consumer, ConsumerStore};
pub use error::{DecodeError, StoreError};
pub use manual_tickets::{ManualTicket, ManualTicketStore};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use semaphore_history::{HistoryEntry, SemaphoreHistoryStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreBuilder};
pub use traits::{Transaction, TransactionPermit};
pub use users::{UserRecord, UserStore};

/// All stores a pipeline needs, combined into one bound.
pub trait PodboxStore:
    Transaction<Error = StoreError, Permit = TransactionPermit>
    + AtomStore
    + ConsumerStore
    + SemaphoreHistoryStore
    + CheckinStore
    + ManualTicketStore
    + CacheStore
    + UserStore
    + Clone
    + 'static
{
}

impl<T> PodboxStore for T where
    T: Transaction<Error = StoreError, Permit = TransactionPermit>
        + AtomStore
        + ConsumerStore
        + SemaphoreHistoryStore
        + CheckinStore
        + ManualTicketStore
        + CacheStore
        + UserStore
        + Clone
        + 'static
{
}

/// Runs the given writes inside a transaction.
///
/// The transaction is committed when the closure returns `Ok` and rolled back otherwise. The
/// closure must not read through the store's pool or wait for other locks while it runs, the
/// permit is held until it returns.
pub async fn write<S, F, R>(store: &S, f: F) -> Result<R, StoreError>
where
    S: Transaction<Error = StoreError, Permit = TransactionPermit>,
    F: AsyncFnOnce(&S) -> Result<R, StoreError>,
{
    let permit = store.begin().await?;
    match f(store).await {
        Ok(result) => {
            store.commit(permit).await?;
            Ok(result)
        }
        Err(err) => {
            store.rollback(permit).await?;
            Err(err)
        }
    }
}
