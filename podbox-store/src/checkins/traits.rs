// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Persisted check-in of a ticket which has no backend of its own to record it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub pipeline_id: Uuid,
    pub ticket_id: Uuid,
    pub checker_email: String,
    pub timestamp: Timestamp,
}

pub trait CheckinStore {
    /// Records a check-in.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when the ticket was already checked in.
    fn add_checkin(&self, record: CheckinRecord) -> impl Future<Output = Result<(), StoreError>>;

    fn checkin(
        &self,
        pipeline_id: Uuid,
        ticket_id: Uuid,
    ) -> impl Future<Output = Result<Option<CheckinRecord>, StoreError>>;

    /// All check-ins of a pipeline, ordered by ticket id.
    fn checkins(
        &self,
        pipeline_id: Uuid,
    ) -> impl Future<Output = Result<Vec<CheckinRecord>, StoreError>>;

    /// Removes a check-in, returns `true` if one existed.
    fn delete_checkin(
        &self,
        pipeline_id: Uuid,
        ticket_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>>;
}
