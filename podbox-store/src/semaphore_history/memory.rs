// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;

use podbox_core::{Hash, Timestamp};
use uuid::Uuid;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::semaphore_history::{HistoryEntry, SemaphoreHistoryStore};

impl SemaphoreHistoryStore for MemoryStore {
    async fn add_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: Hash,
        serialized_group: &str,
        now: Timestamp,
    ) -> Result<HistoryEntry, StoreError> {
        let mut store = self.write_store();
        store.history_sequence += 1;
        let entry = HistoryEntry {
            pipeline_id,
            group_id,
            sequence: store.history_sequence,
            root_hash,
            serialized_group: serialized_group.to_string(),
            time_created: now,
        };
        store.history.push(entry.clone());
        Ok(entry)
    }

    async fn latest_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self
            .read_store()
            .history
            .iter()
            .rev()
            .find(|entry| entry.pipeline_id == pipeline_id && entry.group_id == group_id)
            .cloned())
    }

    async fn history_entry_by_root(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: &Hash,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self
            .read_store()
            .history
            .iter()
            .rev()
            .find(|entry| {
                entry.pipeline_id == pipeline_id
                    && entry.group_id == group_id
                    && &entry.root_hash == root_hash
            })
            .cloned())
    }

    async fn history_group_ids(&self, pipeline_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let group_ids: BTreeSet<Uuid> = self
            .read_store()
            .history
            .iter()
            .filter(|entry| entry.pipeline_id == pipeline_id)
            .map(|entry| entry.group_id)
            .collect();
        Ok(group_ids.into_iter().collect())
    }

    async fn delete_history(&self, pipeline_id: Uuid, group_id: Uuid) -> Result<bool, StoreError> {
        let mut store = self.write_store();
        let before = store.history.len();
        store
            .history
            .retain(|entry| !(entry.pipeline_id == pipeline_id && entry.group_id == group_id));
        Ok(store.history.len() != before)
    }
}
