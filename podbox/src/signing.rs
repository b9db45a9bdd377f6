// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signing of tickets and messages with a persistent cache.
//!
//! Signing the same payload again returns the cached credential, as long as nothing but
//! `timestamp_signed` changed. The cache key is the BLAKE3 hash over the canonical JSON encoding of
//! the payload without its signing time, the signing key, the pipeline id and the PCD type.
use podbox_core::{
    Hash, MessageData, PcdError, PcdType, PrivateKey, SerializedPcd, SignedPayload, TicketData,
    now,
};
use podbox_store::{CacheStore, StoreError, Transaction, TransactionPermit, write};
use serde::Serialize;
use thiserror::Error;
use tracing::{trace, warn};
use uuid::Uuid;

/// Field excluded from the cache key.
const TIMESTAMP_SIGNED: &str = "timestamp_signed";

pub struct PcdIssuer<S> {
    pipeline_id: Uuid,
    private_key: PrivateKey,
    store: S,
}

impl<S> PcdIssuer<S>
where
    S: CacheStore + Transaction<Error = StoreError, Permit = TransactionPermit>,
{
    pub fn new(pipeline_id: Uuid, private_key: PrivateKey, store: S) -> Self {
        Self {
            pipeline_id,
            private_key,
            store,
        }
    }

    pub async fn sign_ticket(&self, ticket: TicketData) -> Result<SerializedPcd, SigningError> {
        self.sign(PcdType::EddsaTicket, ticket).await
    }

    pub async fn sign_message(&self, message: MessageData) -> Result<SerializedPcd, SigningError> {
        self.sign(PcdType::EddsaMessage, message).await
    }

    async fn sign<T: Serialize>(
        &self,
        pcd_type: PcdType,
        payload: T,
    ) -> Result<SerializedPcd, SigningError> {
        let key = self.cache_key(pcd_type, &payload)?;

        if let Some(cached) = self.store.get_value(&key).await? {
            match serde_json::from_str::<SerializedPcd>(&cached) {
                Ok(pcd) => {
                    trace!(%key, "signed payload served from cache");
                    return Ok(pcd);
                }
                Err(err) => warn!(%key, %err, "discarding corrupted cache entry"),
            }
        }

        let signed = SignedPayload::sign(payload, &self.private_key)
            .map_err(|err| SigningError::Encode(err.to_string()))?;
        let pcd = SerializedPcd::new(pcd_type, &signed)?;
        let value =
            serde_json::to_string(&pcd).map_err(|err| SigningError::Encode(err.to_string()))?;

        write(&self.store, async |store| {
            store.set_value(&key, &value, now()).await
        })
        .await?;

        Ok(pcd)
    }

    fn cache_key<T: Serialize>(
        &self,
        pcd_type: PcdType,
        payload: &T,
    ) -> Result<String, SigningError> {
        let mut value =
            serde_json::to_value(payload).map_err(|err| SigningError::Encode(err.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object.remove(TIMESTAMP_SIGNED);
        }
        // Object keys are sorted, which makes the encoding canonical.
        let canonical =
            serde_json::to_vec(&value).map_err(|err| SigningError::Encode(err.to_string()))?;

        let hash = Hash::from_parts([
            &canonical[..],
            &self.private_key.as_bytes()[..],
            &self.pipeline_id.as_bytes()[..],
            pcd_type.as_str().as_bytes(),
        ]);
        Ok(hash.to_hex())
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("could not encode payload: {0}")]
    Encode(String),

    #[error(transparent)]
    Pcd(#[from] PcdError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use podbox_core::{MessageData, PcdType, PrivateKey};
    use podbox_store::MemoryStore;
    use uuid::Uuid;

    use super::PcdIssuer;

    fn message(timestamp_signed: u64) -> MessageData {
        MessageData {
            title: "Hello".into(),
            markdown: "**Hello** world".into(),
            fields: BTreeMap::from([("title".to_string(), "Hello".to_string())]),
            timestamp_signed,
        }
    }

    #[tokio::test]
    async fn signing_time_does_not_bust_cache() {
        let issuer = PcdIssuer::new(Uuid::new_v4(), PrivateKey::new(), MemoryStore::default());

        let first = issuer.sign_message(message(1)).await.unwrap();
        let second = issuer.sign_message(message(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.pcd_type, PcdType::EddsaMessage);

        let signed = first.decode::<MessageData>().unwrap();
        assert_eq!(signed.payload.timestamp_signed, 1);

        // Different content is signed anew.
        let mut changed = message(3);
        changed.title = "Bye".into();
        let third = issuer.sign_message(changed).await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn cache_is_scoped_to_pipeline_and_key() {
        let store = MemoryStore::default();
        let private_key = PrivateKey::new();
        let pipeline_1 = PcdIssuer::new(Uuid::new_v4(), private_key.clone(), store.clone());
        let pipeline_2 = PcdIssuer::new(Uuid::new_v4(), private_key, store.clone());
        let other_key = PcdIssuer::new(Uuid::new_v4(), PrivateKey::new(), store);

        let a = pipeline_1.sign_message(message(1)).await.unwrap();
        let b = pipeline_2.sign_message(message(2)).await.unwrap();
        let c = other_key.sign_message(message(3)).await.unwrap();

        assert_eq!(a.decode::<MessageData>().unwrap().payload.timestamp_signed, 1);
        assert_eq!(b.decode::<MessageData>().unwrap().payload.timestamp_signed, 2);
        assert_ne!(
            a.decode::<MessageData>().unwrap().signer,
            c.decode::<MessageData>().unwrap().signer
        );
    }
}
