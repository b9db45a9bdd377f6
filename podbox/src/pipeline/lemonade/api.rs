// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed view of the Lemonade backend.
use std::fmt;

use async_trait::async_trait;
use podbox_core::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, PartialEq, Eq)]
pub struct LemonadeConnection {
    pub backend_url: String,
    pub api_key: String,
}

impl fmt::Debug for LemonadeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LemonadeConnection")
            .field("backend_url", &self.backend_url)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemonadeTicketType {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemonadeTicket {
    pub id: String,
    pub type_id: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub checked_in_at: Option<Timestamp>,
}

#[async_trait]
pub trait LemonadeApi: Send + Sync {
    async fn fetch_ticket_types(
        &self,
        connection: &LemonadeConnection,
        event: &str,
    ) -> Result<Vec<LemonadeTicketType>, LemonadeError>;

    async fn fetch_tickets(
        &self,
        connection: &LemonadeConnection,
        event: &str,
    ) -> Result<Vec<LemonadeTicket>, LemonadeError>;

    async fn checkin_user(
        &self,
        connection: &LemonadeConnection,
        event: &str,
        user_id: &str,
    ) -> Result<(), LemonadeError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LemonadeError {
    #[error("request to lemonade failed: {0}")]
    Transport(String),

    #[error("lemonade responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("user {0} holds no ticket for this event")]
    UnknownUser(String),
}
