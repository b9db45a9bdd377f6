// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::hash_map::Entry;

use uuid::Uuid;

use crate::checkins::{CheckinRecord, CheckinStore};
use crate::error::StoreError;
use crate::memory::MemoryStore;

impl CheckinStore for MemoryStore {
    async fn add_checkin(&self, record: CheckinRecord) -> Result<(), StoreError> {
        let mut store = self.write_store();
        match store.checkins.entry((record.pipeline_id, record.ticket_id)) {
            Entry::Occupied(_) => Err(StoreError::UniqueViolation(format!(
                "ticket {} already checked in",
                record.ticket_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn checkin(
        &self,
        pipeline_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        Ok(self
            .read_store()
            .checkins
            .get(&(pipeline_id, ticket_id))
            .cloned())
    }

    async fn checkins(&self, pipeline_id: Uuid) -> Result<Vec<CheckinRecord>, StoreError> {
        let mut records: Vec<CheckinRecord> = self
            .read_store()
            .checkins
            .values()
            .filter(|record| record.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.ticket_id);
        Ok(records)
    }

    async fn delete_checkin(&self, pipeline_id: Uuid, ticket_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .write_store()
            .checkins
            .remove(&(pipeline_id, ticket_id))
            .is_some())
    }
}
