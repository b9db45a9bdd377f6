// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use podbox_core::{Commitment, Timestamp};
use uuid::Uuid;

use crate::consumers::{Consumer, ConsumerStore};
use crate::error::StoreError;
use crate::memory::MemoryStore;

impl ConsumerStore for MemoryStore {
    async fn save_consumer(
        &self,
        pipeline_id: Uuid,
        email: &str,
        commitment: Commitment,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let email = email.to_lowercase();
        let mut store = self.write_store();
        match store.consumers.get_mut(&(pipeline_id, email.clone())) {
            Some(consumer) if consumer.commitment == commitment => Ok(false),
            Some(consumer) => {
                consumer.commitment = commitment;
                consumer.time_updated = now;
                Ok(true)
            }
            None => {
                store.consumers.insert(
                    (pipeline_id, email.clone()),
                    Consumer {
                        pipeline_id,
                        email,
                        commitment,
                        time_created: now,
                        time_updated: now,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn load_consumers_by_emails(
        &self,
        pipeline_id: Uuid,
        emails: &[String],
    ) -> Result<Vec<Consumer>, StoreError> {
        let emails: HashSet<String> = emails.iter().map(|email| email.to_lowercase()).collect();
        let mut consumers: Vec<Consumer> = self
            .read_store()
            .consumers
            .values()
            .filter(|consumer| {
                consumer.pipeline_id == pipeline_id && emails.contains(&consumer.email)
            })
            .cloned()
            .collect();
        consumers.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(consumers)
    }

    async fn load_consumers(&self, pipeline_id: Uuid) -> Result<Vec<Consumer>, StoreError> {
        let mut consumers: Vec<Consumer> = self
            .read_store()
            .consumers
            .values()
            .filter(|consumer| consumer.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        consumers.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(consumers)
    }
}
