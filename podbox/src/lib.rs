// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipelines syncing event tickets from external backends into signed credentials.
//!
//! A [`Podbox`] engine instantiates one pipeline per [`PipelineDefinition`]. Every load cycle of a
//! pipeline fetches its backend (a spreadsheet, pretix or Lemonade) and replaces the stored atoms.
//! Pipelines expose their functionality through capabilities:
//!
//! - feed issuance of signed tickets and messages to the holders of a credential
//! - check-in of tickets by authorized staff, pushed to the backend where the tickets came from
//! - Semaphore groups of ticket holders with a history of their roots
//!
//! ```rust,ignore
//! let podbox = podbox::builder()
//!     .trusted_issuer(issuer)
//!     .pretix_api(client)
//!     .spawn()
//!     .await?;
//!
//! let pipeline = podbox.spawn_pipeline(definition).await?;
//! let summary = podbox.load(pipeline.id()).await?;
//! ```
mod auto_issuance;
mod builder;
pub mod capability;
pub mod checkin;
pub mod config;
pub mod credential;
mod engine;
pub mod feed;
mod lru;
pub mod pipeline;
pub mod semaphore;
pub mod signing;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use capability::{Capability, CapabilityDescriptor};
pub use checkin::{ActionConfig, CheckinError, CheckinRequest, CheckinResponse};
pub use config::{Config, PipelineDefinition, PipelineOptions};
pub use credential::{CredentialError, CredentialSubservice, ProofVerifier, SignatureVerifier};
pub use engine::{Podbox, PodboxBuilder, PodboxError};
pub use feed::{FeedError, FeedRequest, FeedResponse, PcdAction};
pub use pipeline::{AnyPipeline, LoadSummary, Pipeline, PipelineError, PipelineKind};

/// Spawns an engine with an in-memory database and a random signing key.
pub async fn spawn() -> Result<Podbox<podbox_store::SqliteStore<'static>>, PodboxError> {
    Podbox::spawn().await
}

pub fn builder() -> PodboxBuilder {
    Podbox::builder()
}
