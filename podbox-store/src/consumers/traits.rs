// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::{Commitment, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// End-user identity which authenticated against the feed of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub pipeline_id: Uuid,
    /// Lower-cased email.
    pub email: String,
    pub commitment: Commitment,
    pub time_created: Timestamp,
    /// Last time the commitment changed.
    pub time_updated: Timestamp,
}

pub trait ConsumerStore {
    /// Inserts or updates the consumer with the given email.
    ///
    /// Returns `true` when the consumer was created or its commitment changed. Saving the same
    /// commitment again leaves the row untouched, including `time_updated`.
    fn save_consumer(
        &self,
        pipeline_id: Uuid,
        email: &str,
        commitment: Commitment,
        now: Timestamp,
    ) -> impl Future<Output = Result<bool, StoreError>>;

    /// Consumers with one of the given emails, compared case-insensitively.
    fn load_consumers_by_emails(
        &self,
        pipeline_id: Uuid,
        emails: &[String],
    ) -> impl Future<Output = Result<Vec<Consumer>, StoreError>>;

    /// All consumers of a pipeline, ordered by email.
    fn load_consumers(
        &self,
        pipeline_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Consumer>, StoreError>>;
}
