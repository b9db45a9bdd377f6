// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed view of the pretix API, as far as the pipeline needs it.
use std::fmt;

use async_trait::async_trait;
use podbox_core::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of orders which were paid.
pub const ORDER_STATUS_PAID: &str = "p";

/// Organizer endpoint and API token.
#[derive(Clone, PartialEq, Eq)]
pub struct PretixConnection {
    pub org_url: String,
    pub token: String,
}

impl fmt::Debug for PretixConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PretixConnection")
            .field("org_url", &self.org_url)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixEvent {
    pub slug: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixEventSettings {
    pub attendee_emails_asked: bool,
    pub attendee_emails_required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixItem {
    pub id: u64,
    pub name: String,
    /// Whether the item grants entry to the event.
    pub admission: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixCheckinList {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixCheckin {
    pub list: u64,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixPosition {
    pub id: u64,
    pub item: u64,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub secret: String,
    /// Position this add-on was bought with.
    pub addon_to: Option<u64>,
    #[serde(default)]
    pub checkins: Vec<PretixCheckin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretixOrder {
    pub code: String,
    pub status: String,
    pub email: Option<String>,
    pub positions: Vec<PretixPosition>,
}

#[async_trait]
pub trait PretixApi: Send + Sync {
    async fn fetch_event(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEvent, PretixError>;

    async fn fetch_settings(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEventSettings, PretixError>;

    async fn fetch_items(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixItem>, PretixError>;

    async fn fetch_checkin_lists(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixCheckinList>, PretixError>;

    async fn fetch_orders(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixOrder>, PretixError>;

    /// Redeems the position with `secret` on the given check-in list.
    async fn push_checkin(
        &self,
        connection: &PretixConnection,
        event: &str,
        checkin_list: u64,
        secret: &str,
    ) -> Result<(), PretixError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PretixError {
    #[error("request to pretix failed: {0}")]
    Transport(String),

    #[error("pretix responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("position was already redeemed")]
    AlreadyRedeemed,
}
