// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::{Hash, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Immutable snapshot of a Semaphore group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub pipeline_id: Uuid,
    pub group_id: Uuid,
    /// Strictly increasing across all entries of a store. The highest sequence of a group is its
    /// current state.
    pub sequence: u64,
    pub root_hash: Hash,
    pub serialized_group: String,
    pub time_created: Timestamp,
}

/// Append-only log of Semaphore group snapshots.
pub trait SemaphoreHistoryStore {
    /// Appends a snapshot and returns it with its assigned sequence number.
    fn add_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: Hash,
        serialized_group: &str,
        now: Timestamp,
    ) -> impl Future<Output = Result<HistoryEntry, StoreError>>;

    /// Snapshot with the highest sequence number of a group.
    fn latest_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
    ) -> impl Future<Output = Result<Option<HistoryEntry>, StoreError>>;

    /// Most recent snapshot of a group which had the given root.
    fn history_entry_by_root(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: &Hash,
    ) -> impl Future<Output = Result<Option<HistoryEntry>, StoreError>>;

    /// Ids of all groups with at least one snapshot.
    fn history_group_ids(
        &self,
        pipeline_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Uuid>, StoreError>>;

    /// Deletes all snapshots of a group, returns `true` if there were any.
    fn delete_history(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>>;
}
