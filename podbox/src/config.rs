// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration and pipeline definitions.
//!
//! Pipeline definitions are created and persisted by the operator-facing part of the system and
//! handed to [`Podbox::spawn_pipeline`](crate::Podbox::spawn_pipeline) as JSON-deserializable
//! values:
//!
//! ```json
//! {
//!   "id": "5b1e7a0e-8c4a-4a3e-9c55-3c0f5fb3a2a4",
//!   "type": "csv",
//!   "options": {
//!     "csv": "title,body\nhello,world\n",
//!     "feedOptions": { "feedId": "messages", "feedDisplayName": "Messages", "feedFolder": "Messages" }
//!   }
//! }
//! ```
use std::fmt;

use podbox_core::{PrivateKey, PublicKey};
use podbox_store::ManualTicket;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capacity of the credential verification cache.
pub const DEFAULT_VERIFICATION_CACHE_CAPACITY: usize = 1000;

/// Placeholder name for tickets whose attendee name is unknown.
pub const UNKNOWN_ATTENDEE_NAME: &str = "Unknown";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// SQLite database url, defaults to a private in-memory database.
    pub database_url: String,

    pub max_connections: u32,

    /// Key signing tickets and messages. A random key is generated when not set.
    pub signing_key: Option<PrivateKey>,

    /// Issuer of email credentials accepted by feeds and check-ins.
    pub trusted_issuer: Option<PublicKey>,

    pub verification_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            max_connections: podbox_store::sqlite::DEFAULT_MAX_CONNECTIONS,
            signing_key: None,
            trusted_issuer: None,
            verification_cache_capacity: DEFAULT_VERIFICATION_CACHE_CAPACITY,
        }
    }
}

/// Operator-supplied configuration of one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: Uuid,
    #[serde(flatten)]
    pub options: PipelineOptions,
}

impl PipelineDefinition {
    pub fn from_json(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum PipelineOptions {
    /// Spreadsheet rows issued as signed messages.
    Csv(CsvPipelineOptions),

    /// Spreadsheet rows issued as tickets.
    CsvTicket(CsvTicketPipelineOptions),

    Pretix(PretixPipelineOptions),

    Lemonade(LemonadePipelineOptions),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedOptions {
    pub feed_id: String,
    pub feed_display_name: String,
    #[serde(default)]
    pub feed_description: String,
    /// Folder the issued credentials are placed into.
    pub feed_folder: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvPipelineOptions {
    pub csv: String,
    pub feed_options: FeedOptions,
}

/// Ticket holders of `event_id`, optionally restricted to one product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCriterion {
    pub event_id: Uuid,
    #[serde(default)]
    pub product_id: Option<Uuid>,
}

impl MemberCriterion {
    pub fn matches(&self, event_id: Uuid, product_id: Uuid) -> bool {
        self.event_id == event_id && self.product_id.is_none_or(|id| id == product_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreGroupConfig {
    pub group_id: Uuid,
    pub name: String,
    /// Empty criteria admit every ticket holder.
    #[serde(default)]
    pub member_criteria: Vec<MemberCriterion>,
}

impl SemaphoreGroupConfig {
    pub fn admits(&self, event_id: Uuid, product_id: Uuid) -> bool {
        self.member_criteria.is_empty()
            || self
                .member_criteria
                .iter()
                .any(|criterion| criterion.matches(event_id, product_id))
    }
}

/// Grants `quantity` tickets of (`event_id`, `product_id`) to holders of a matching ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoIssuanceRule {
    pub member_criteria: Vec<MemberCriterion>,
    pub event_id: Uuid,
    pub product_id: Uuid,
    pub quantity: usize,
}

/// Allows holders of a ticket matching `checkers` to check in tickets of `event_id` (and
/// `product_id`, if set).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinPolicy {
    pub event_id: Uuid,
    #[serde(default)]
    pub product_id: Option<Uuid>,
    pub checkers: Vec<MemberCriterion>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub id: Uuid,
    pub name: String,
    /// Identifier of the product in the external backend.
    #[serde(default)]
    pub external_id: String,
    /// Holders of this product may check in any ticket of the same event.
    #[serde(default)]
    pub is_super_user: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    pub id: Uuid,
    pub name: String,
    /// Identifier of the event in the external backend.
    #[serde(default)]
    pub external_id: String,
    pub products: Vec<ProductConfig>,
}

/// Options shared by all pipelines issuing tickets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketingOptions {
    pub events: Vec<EventConfig>,
    pub feed_options: FeedOptions,
    #[serde(default)]
    pub semaphore_groups: Vec<SemaphoreGroupConfig>,
    #[serde(default)]
    pub manual_tickets: Vec<ManualTicket>,
    /// Emails allowed to check in every ticket of this pipeline.
    #[serde(default)]
    pub superuser_emails: Vec<String>,
    #[serde(default)]
    pub auto_issuance: Vec<AutoIssuanceRule>,
    #[serde(default)]
    pub user_permissions: Vec<CheckinPolicy>,
}

impl TicketingOptions {
    pub fn event(&self, event_id: Uuid) -> Option<&EventConfig> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn product(&self, event_id: Uuid, product_id: Uuid) -> Option<&ProductConfig> {
        self.event(event_id)?
            .products
            .iter()
            .find(|product| product.id == product_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvTicketPipelineOptions {
    /// Rows of `ticketName,attendeeName,attendeeEmail` below a header row.
    pub csv: String,
    #[serde(flatten)]
    pub ticketing: TicketingOptions,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PretixPipelineOptions {
    pub pretix_api_org_url: String,
    pub pretix_api_token: String,
    #[serde(flatten)]
    pub ticketing: TicketingOptions,
}

impl fmt::Debug for PretixPipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PretixPipelineOptions")
            .field("pretix_api_org_url", &self.pretix_api_org_url)
            .field("ticketing", &self.ticketing)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LemonadePipelineOptions {
    pub lemonade_backend_url: String,
    pub lemonade_api_key: String,
    #[serde(flatten)]
    pub ticketing: TicketingOptions,
}

impl fmt::Debug for LemonadePipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LemonadePipelineOptions")
            .field("lemonade_backend_url", &self.lemonade_backend_url)
            .field("ticketing", &self.ticketing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{MemberCriterion, PipelineDefinition, PipelineOptions};

    #[test]
    fn definition_from_json() {
        let json = r#"{
            "id": "5b1e7a0e-8c4a-4a3e-9c55-3c0f5fb3a2a4",
            "type": "pretix",
            "options": {
                "pretixApiOrgUrl": "https://pretix.example.org/api/v1/organizers/panda",
                "pretixApiToken": "token",
                "events": [{
                    "id": "c3b5c7a4-9f7e-4f36-8f54-5d2d1a0b3e11",
                    "name": "Panda Con",
                    "externalId": "pandacon",
                    "products": [{
                        "id": "0f0c7f4e-2f7d-4a57-b8fa-7c3b8cbf5d0a",
                        "name": "General Admission",
                        "externalId": "42"
                    }]
                }],
                "feedOptions": {
                    "feedId": "tickets",
                    "feedDisplayName": "Tickets",
                    "feedFolder": "Panda Con"
                }
            }
        }"#;

        let definition = PipelineDefinition::from_json(json).unwrap();
        let PipelineOptions::Pretix(options) = definition.options else {
            panic!("expected pretix options");
        };
        assert_eq!(options.ticketing.events[0].products[0].external_id, "42");
        assert!(!options.ticketing.events[0].products[0].is_super_user);
        assert!(options.ticketing.semaphore_groups.is_empty());

        // Tokens are never printed.
        assert!(!format!("{options:?}").contains("token"));
    }

    #[test]
    fn criterion_without_product_matches_whole_event() {
        let event_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();

        let criterion = MemberCriterion {
            event_id,
            product_id: None,
        };
        assert!(criterion.matches(event_id, product_id));
        assert!(!criterion.matches(Uuid::new_v4(), product_id));

        let criterion = MemberCriterion {
            event_id,
            product_id: Some(product_id),
        };
        assert!(criterion.matches(event_id, product_id));
        assert!(!criterion.matches(event_id, Uuid::new_v4()));
    }
}
