// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed payloads ("PCDs") handed out to feed subscribers.
//!
//! A `SignedPayload` is any serializable value together with the Ed25519 signature of its CBOR
//! encoding. Tickets and spreadsheet messages are the two payload kinds issued by pipelines.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cbor::{EncodeError, encode_cbor};
use crate::hash::Hash;
use crate::identity::{PrivateKey, PublicKey, Signature};
use crate::timestamp::Timestamp;

/// Kinds of signed payloads a pipeline can issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcdType {
    #[serde(rename = "eddsa-ticket-pcd")]
    EddsaTicket,
    #[serde(rename = "eddsa-message-pcd")]
    EddsaMessage,
}

impl PcdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PcdType::EddsaTicket => "eddsa-ticket-pcd",
            PcdType::EddsaMessage => "eddsa-message-pcd",
        }
    }
}

/// Payload with a signature over its CBOR encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayload<T> {
    pub payload: T,
    pub signer: PublicKey,
    pub signature: Signature,
}

impl<T> SignedPayload<T>
where
    T: Serialize,
{
    /// Signs the payload with the given private key.
    pub fn sign(payload: T, private_key: &PrivateKey) -> Result<Self, EncodeError> {
        let bytes = encode_cbor(&payload)?;
        let signature = private_key.sign(&bytes);
        Ok(Self {
            payload,
            signer: private_key.public_key(),
            signature,
        })
    }

    /// Checks that the signature was created by `signer` over this payload.
    pub fn verify(&self) -> Result<(), PcdError> {
        let bytes = encode_cbor(&self.payload).map_err(|err| PcdError::Encode(err.to_string()))?;
        if !self.signer.verify(&bytes, &self.signature) {
            return Err(PcdError::InvalidSignature);
        }
        Ok(())
    }
}

/// Transport representation of a signed payload: its type tag and its JSON encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPcd {
    #[serde(rename = "type")]
    pub pcd_type: PcdType,
    pub pcd: String,
}

impl SerializedPcd {
    pub fn new<T: Serialize>(
        pcd_type: PcdType,
        signed: &SignedPayload<T>,
    ) -> Result<Self, PcdError> {
        Ok(Self {
            pcd_type,
            pcd: serde_json::to_string(signed).map_err(|err| PcdError::Encode(err.to_string()))?,
        })
    }

    /// Decodes and verifies the contained signed payload.
    pub fn decode<T>(&self) -> Result<SignedPayload<T>, PcdError>
    where
        T: Serialize + DeserializeOwned,
    {
        let signed: SignedPayload<T> =
            serde_json::from_str(&self.pcd).map_err(|err| PcdError::Decode(err.to_string()))?;
        signed.verify()?;
        Ok(signed)
    }
}

/// Ticket payload signed into an `EddsaTicket` PCD.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketData {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub event_name: String,
    pub product_id: Uuid,
    pub ticket_name: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_commitment: Option<Hash>,
    pub is_consumed: bool,
    pub is_revoked: bool,
    pub timestamp_consumed: Option<Timestamp>,
    pub parent_ticket_id: Option<Uuid>,
    pub timestamp_signed: Timestamp,
}

/// Message payload signed into an `EddsaMessage` PCD.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub title: String,
    pub markdown: String,
    pub fields: BTreeMap<String, String>,
    pub timestamp_signed: Timestamp,
}

#[derive(Debug, Error)]
pub enum PcdError {
    #[error("signature does not match payload and signer")]
    InvalidSignature,

    #[error("could not encode payload: {0}")]
    Encode(String),

    #[error("could not decode payload: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::PrivateKey;

    use super::{MessageData, PcdError, PcdType, SerializedPcd, SignedPayload};

    fn message() -> MessageData {
        MessageData {
            title: "Doors open".into(),
            markdown: "**Doors open** at 9am".into(),
            fields: BTreeMap::from([("title".to_string(), "Doors open".to_string())]),
            timestamp_signed: 1000,
        }
    }

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let signed = SignedPayload::sign(message(), &private_key).unwrap();
        assert!(signed.verify().is_ok());
        assert_eq!(signed.signer, private_key.public_key());

        let mut tampered = signed.clone();
        tampered.payload.title = "Doors closed".into();
        assert!(matches!(tampered.verify(), Err(PcdError::InvalidSignature)));
    }

    #[test]
    fn serialized_pcd_is_verified_on_decode() {
        let private_key = PrivateKey::new();
        let signed = SignedPayload::sign(message(), &private_key).unwrap();
        let serialized = SerializedPcd::new(PcdType::EddsaMessage, &signed).unwrap();
        let decoded: SignedPayload<MessageData> = serialized.decode().unwrap();
        assert_eq!(decoded, signed);

        let json = serde_json::to_value(&serialized).unwrap();
        assert_eq!(json["type"], "eddsa-message-pcd");
    }
}
