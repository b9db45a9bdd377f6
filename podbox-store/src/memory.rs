// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend for all Podbox stores.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::checkins::CheckinRecord;
use crate::consumers::Consumer;
use crate::error::StoreError;
use crate::manual_tickets::ManualTicket;
use crate::semaphore_history::HistoryEntry;
use crate::traits::{Transaction, TransactionPermit};
use crate::users::UserRecord;

/// Atom as kept by the memory store: lower-cased email and CBOR-encoded value.
pub(crate) type StoredAtom = (Option<String>, Vec<u8>);

#[derive(Debug, Default)]
pub(crate) struct InnerMemoryStore {
    pub(crate) atoms: HashMap<Uuid, BTreeMap<Uuid, StoredAtom>>,
    pub(crate) loaded: HashSet<Uuid>,
    pub(crate) consumers: HashMap<(Uuid, String), Consumer>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) history_sequence: u64,
    pub(crate) checkins: HashMap<(Uuid, Uuid), CheckinRecord>,
    pub(crate) manual_tickets: HashMap<Uuid, BTreeMap<Uuid, ManualTicket>>,
    pub(crate) cache: HashMap<String, (String, u64, u64)>,
    pub(crate) users: HashMap<String, UserRecord>,
    pub(crate) auth_keys: HashMap<String, String>,
}

/// In-memory store.
///
/// This does not persist data permamently, all changes are lost when the process ends. Use this
/// only in development or test contexts.
///
/// Writes take effect immediately. Transactions only serialize writers, a rollback does not undo
/// anything.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
    semaphore: Arc<Semaphore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Obtain a read-lock on the store.
    pub(crate) fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    pub(crate) fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction for MemoryStore {
    type Error = StoreError;

    type Permit = TransactionPermit;

    async fn begin(&self) -> Result<TransactionPermit, StoreError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore lives as long as the store");
        Ok(TransactionPermit(permit))
    }

    async fn rollback(&self, permit: TransactionPermit) -> Result<(), StoreError> {
        drop(permit);
        Ok(())
    }

    async fn commit(&self, permit: TransactionPermit) -> Result<(), StoreError> {
        drop(permit);
        Ok(())
    }
}

// Trait implementations are in the regarding modules, see for example `atoms` or `consumers`.
