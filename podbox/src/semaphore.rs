// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semaphore groups derived from ticket ownership.
//!
//! Every configured group is a depth-16 Merkle tree of identity commitments. Updates resolve the
//! current ticket holders to commitments of known consumers, diff them against the tree and append
//! a snapshot to the history store only when membership changed.
//!
//! Updates are serialized through one FIFO lock per provider: fetching the membership, diffing and
//! persisting run as one step and in submission order.
use std::collections::{BTreeSet, HashMap, HashSet};

use podbox_core::{Commitment, Group, GroupError, Hash, now};
use podbox_store::{PodboxStore, StoreError, write};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SemaphoreGroupConfig;

/// One ticket held by an email, input to membership computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub event_id: Uuid,
    pub product_id: Uuid,
    pub email: String,
}

/// Group listed by [`SemaphoreGroupProvider::supported_groups`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: Uuid,
    pub name: String,
}

/// Identifier of the tree of a group.
pub fn tree_id(group_id: Uuid) -> Hash {
    Hash::new(group_id.as_bytes())
}

pub struct SemaphoreGroupProvider<S> {
    pipeline_id: Uuid,
    groups: Vec<SemaphoreGroupConfig>,
    store: S,
    trees: Mutex<HashMap<Uuid, Group>>,
}

impl<S> SemaphoreGroupProvider<S>
where
    S: PodboxStore,
{
    pub fn new(pipeline_id: Uuid, groups: Vec<SemaphoreGroupConfig>, store: S) -> Self {
        Self {
            pipeline_id,
            groups,
            store,
            trees: Mutex::new(HashMap::new()),
        }
    }

    /// Restores every configured group from its latest snapshot, or starts it empty. History of
    /// groups which are not configured anymore is deleted.
    pub async fn start(&self) -> Result<(), SemaphoreError> {
        let mut trees = self.trees.lock().await;

        for config in &self.groups {
            let group = match self
                .store
                .latest_history_entry(self.pipeline_id, config.group_id)
                .await?
            {
                Some(entry) => Group::import(&entry.serialized_group)?,
                None => Group::new(tree_id(config.group_id)),
            };
            debug!(
                pipeline_id = %self.pipeline_id,
                group_id = %config.group_id,
                members = group.members().count(),
                "restored semaphore group"
            );
            trees.insert(config.group_id, group);
        }

        let configured: HashSet<Uuid> = self.groups.iter().map(|group| group.group_id).collect();
        let stale: Vec<Uuid> = self
            .store
            .history_group_ids(self.pipeline_id)
            .await?
            .into_iter()
            .filter(|group_id| !configured.contains(group_id))
            .collect();

        if !stale.is_empty() {
            write(&self.store, async |store| {
                for group_id in &stale {
                    store.delete_history(self.pipeline_id, *group_id).await?;
                }
                Ok(())
            })
            .await?;
            info!(
                pipeline_id = %self.pipeline_id,
                groups = ?stale,
                "deleted history of removed groups"
            );
        }

        Ok(())
    }

    /// Brings all groups in line with the ticket holders returned by `fetch`.
    ///
    /// The lock is taken before `fetch` runs, so concurrent updates observe each other's results.
    /// Returns the ids of groups which changed.
    pub async fn update<F>(&self, fetch: F) -> Result<Vec<Uuid>, SemaphoreError>
    where
        F: AsyncFnOnce() -> Result<Vec<MemberInfo>, SemaphoreError>,
    {
        let mut trees = self.trees.lock().await;
        let infos = fetch().await?;

        let emails: Vec<String> = infos
            .iter()
            .map(|info| info.email.to_lowercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let commitments: HashMap<String, Commitment> = self
            .store
            .load_consumers_by_emails(self.pipeline_id, &emails)
            .await?
            .into_iter()
            .map(|consumer| (consumer.email, consumer.commitment))
            .collect();

        let mut changed: Vec<(Uuid, Group)> = Vec::new();
        for config in &self.groups {
            let Some(current) = trees.get(&config.group_id) else {
                return Err(SemaphoreError::NotStarted);
            };

            let present: BTreeSet<Commitment> = infos
                .iter()
                .filter(|info| config.admits(info.event_id, info.product_id))
                .filter_map(|info| commitments.get(&info.email.to_lowercase()).copied())
                .collect();
            let in_tree: BTreeSet<Commitment> = current.members().copied().collect();

            let additions: Vec<&Commitment> = present.difference(&in_tree).collect();
            let removals: Vec<&Commitment> = in_tree.difference(&present).collect();
            if additions.is_empty() && removals.is_empty() {
                continue;
            }

            let mut group = current.clone();
            for commitment in &removals {
                if let Some(index) = group.index_of(commitment) {
                    group.remove_member(index)?;
                }
            }
            for commitment in additions.iter().copied() {
                group.add_member(*commitment)?;
            }

            debug!(
                pipeline_id = %self.pipeline_id,
                group_id = %config.group_id,
                added = additions.len(),
                removed = removals.len(),
                "semaphore group changed"
            );
            changed.push((config.group_id, group));
        }

        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::with_capacity(changed.len());
        for (group_id, group) in &changed {
            snapshots.push((*group_id, group.root(), group.export()?));
        }

        let timestamp = now();
        write(&self.store, async |store| {
            for (group_id, root, serialized) in &snapshots {
                store
                    .add_history_entry(self.pipeline_id, *group_id, *root, serialized, timestamp)
                    .await?;
            }
            Ok(())
        })
        .await?;

        let group_ids = changed.iter().map(|(group_id, _)| *group_id).collect();
        trees.extend(changed);
        Ok(group_ids)
    }

    /// Configured groups.
    pub fn supported_groups(&self) -> Vec<GroupInfo> {
        self.groups
            .iter()
            .map(|group| GroupInfo {
                group_id: group.group_id,
                name: group.name.clone(),
            })
            .collect()
    }

    pub async fn latest_group_root(&self, group_id: Uuid) -> Result<Option<Hash>, SemaphoreError> {
        Ok(self
            .store
            .latest_history_entry(self.pipeline_id, group_id)
            .await?
            .map(|entry| entry.root_hash))
    }

    pub async fn serialized_latest_group(
        &self,
        group_id: Uuid,
    ) -> Result<Option<String>, SemaphoreError> {
        Ok(self
            .store
            .latest_history_entry(self.pipeline_id, group_id)
            .await?
            .map(|entry| entry.serialized_group))
    }

    pub async fn serialized_historical_group(
        &self,
        group_id: Uuid,
        root_hash: &Hash,
    ) -> Result<Option<String>, SemaphoreError> {
        Ok(self
            .store
            .history_entry_by_root(self.pipeline_id, group_id, root_hash)
            .await?
            .map(|entry| entry.serialized_group))
    }
}

#[derive(Debug, Error)]
pub enum SemaphoreError {
    #[error("semaphore groups were not restored yet")]
    NotStarted,

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not fetch group members: {0}")]
    Fetch(String),
}
