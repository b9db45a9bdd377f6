// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Ticket which is not backed by an atom. Either configured by the operator or granted through
/// auto-issuance rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTicket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub product_id: Uuid,
    pub attendee_email: String,
    pub attendee_name: String,
    #[serde(default)]
    pub time_created: Timestamp,
}

pub trait ManualTicketStore {
    /// Inserts or overwrites tickets.
    fn save_manual_tickets(
        &self,
        pipeline_id: Uuid,
        tickets: &[ManualTicket],
    ) -> impl Future<Output = Result<(), StoreError>>;

    /// All stored manual tickets of a pipeline, ordered by id.
    fn load_manual_tickets(
        &self,
        pipeline_id: Uuid,
    ) -> impl Future<Output = Result<Vec<ManualTicket>, StoreError>>;

    /// Manual tickets of one attendee, email compared case-insensitively.
    fn load_manual_tickets_by_email(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> impl Future<Output = Result<Vec<ManualTicket>, StoreError>>;
}
