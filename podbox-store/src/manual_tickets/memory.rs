// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::error::StoreError;
use crate::manual_tickets::{ManualTicket, ManualTicketStore};
use crate::memory::MemoryStore;

impl ManualTicketStore for MemoryStore {
    async fn save_manual_tickets(
        &self,
        pipeline_id: Uuid,
        tickets: &[ManualTicket],
    ) -> Result<(), StoreError> {
        self.write_store()
            .manual_tickets
            .entry(pipeline_id)
            .or_default()
            .extend(tickets.iter().map(|ticket| (ticket.id, ticket.clone())));
        Ok(())
    }

    async fn load_manual_tickets(&self, pipeline_id: Uuid) -> Result<Vec<ManualTicket>, StoreError> {
        Ok(self
            .read_store()
            .manual_tickets
            .get(&pipeline_id)
            .map(|tickets| tickets.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_manual_tickets_by_email(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> Result<Vec<ManualTicket>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .read_store()
            .manual_tickets
            .get(&pipeline_id)
            .map(|tickets| {
                tickets
                    .values()
                    .filter(|ticket| ticket.attendee_email.to_lowercase() == email)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
