// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipelines pull ticket data from an external backend, normalize it into atoms and expose it
//! through capabilities.
//!
//! Every backend has its own pipeline type implementing [`Pipeline`]. [`AnyPipeline`] selects the
//! right one from a [`PipelineDefinition`] and dispatches to it.
//!
//! A load cycle runs fetch, validate, normalize, persist and always ends with a [`LoadSummary`].
//! Stopping a pipeline cancels a running fetch and refuses further load cycles, capability calls
//! which are already running finish.
pub mod csv;
pub mod csv_ticket;
pub mod lemonade;
pub mod pretix;
mod ticketing;

use std::fmt;
use std::sync::{Arc, Mutex};

use podbox_core::{PrivateKey, Timestamp, now};
use podbox_store::{PodboxStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capability::{Capability, CapabilityDescriptor};
use crate::checkin::{ActionConfig, CheckinRequest, CheckinResponse};
use crate::config::{PipelineDefinition, PipelineOptions};
use crate::credential::CredentialSubservice;
use crate::feed::{FeedError, FeedRequest, FeedResponse};
use crate::semaphore::SemaphoreError;

pub use self::csv::{CsvAtom, CsvPipeline};
pub use self::csv_ticket::CsvTicketPipeline;
pub use self::lemonade::{LemonadeApi, LemonadeError, LemonadePipeline};
pub use self::pretix::{PretixApi, PretixError, PretixPipeline};
pub use self::ticketing::{CheckinPusher, TicketAtom, TicketingCore};

/// Number of log lines kept in a [`LoadSummary`].
pub const MAX_SUMMARY_LOGS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Csv,
    CsvTicket,
    Pretix,
    Lemonade,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineKind::Csv => "csv",
            PipelineKind::CsvTicket => "csv_ticket",
            PipelineKind::Pretix => "pretix",
            PipelineKind::Lemonade => "lemonade",
        };
        write!(f, "{name}")
    }
}

pub trait Pipeline {
    fn id(&self) -> Uuid;

    fn kind(&self) -> PipelineKind;

    /// Capabilities of this pipeline, fixed at construction.
    fn capabilities(&self) -> &[CapabilityDescriptor];

    /// Restores state from the store. A pipeline which failed to start must not be used.
    fn start(&self) -> impl Future<Output = Result<(), PipelineError>>;

    /// Cancels running fetches and refuses further load cycles.
    fn stop(&self);

    fn is_stopped(&self) -> bool;

    /// Runs one load cycle.
    fn load(&self) -> impl Future<Output = LoadSummary>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineLog {
    pub level: LogLevel,
    pub timestamp: Timestamp,
    pub message: String,
}

/// Outcome of one load cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub success: bool,
    pub atoms_loaded: usize,
    /// Candidate records seen upstream, including invalid ones.
    pub atoms_expected: usize,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub latest_logs: Vec<PipelineLog>,
    pub error: Option<String>,
}

/// Collects the log lines of a load cycle and mirrors them to `tracing`.
pub(crate) struct LoadLog {
    pipeline_id: Uuid,
    started_at: Timestamp,
    logs: Mutex<Vec<PipelineLog>>,
}

impl LoadLog {
    pub(crate) fn new(pipeline_id: Uuid) -> Self {
        Self {
            pipeline_id,
            started_at: now(),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(pipeline_id = %self.pipeline_id, "{message}");
        self.push(LogLevel::Info, message);
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(pipeline_id = %self.pipeline_id, "{message}");
        self.push(LogLevel::Warn, message);
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(pipeline_id = %self.pipeline_id, "{message}");
        self.push(LogLevel::Error, message);
    }

    fn push(&self, level: LogLevel, message: String) {
        let mut logs = self.logs.lock().expect("acquire lock on load logs");
        if logs.len() == MAX_SUMMARY_LOGS {
            logs.remove(0);
        }
        logs.push(PipelineLog {
            level,
            timestamp: now(),
            message,
        });
    }

    fn take_logs(&self) -> Vec<PipelineLog> {
        std::mem::take(&mut *self.logs.lock().expect("acquire lock on load logs"))
    }

    pub(crate) fn succeed(self, atoms_loaded: usize, atoms_expected: usize) -> LoadSummary {
        self.info(format!(
            "loaded {atoms_loaded} of {atoms_expected} atoms"
        ));
        LoadSummary {
            success: true,
            atoms_loaded,
            atoms_expected,
            started_at: self.started_at,
            finished_at: now(),
            latest_logs: self.take_logs(),
            error: None,
        }
    }

    pub(crate) fn fail(self, err: &PipelineError) -> LoadSummary {
        self.error(format!("load failed: {err}"));
        LoadSummary {
            success: false,
            atoms_loaded: 0,
            atoms_expected: 0,
            started_at: self.started_at,
            finished_at: now(),
            latest_logs: self.take_logs(),
            error: Some(err.to_string()),
        }
    }
}

/// Shared services a pipeline is constructed with.
pub struct PipelineContext<S> {
    pub store: S,
    pub signing_key: PrivateKey,
    pub credentials: Arc<CredentialSubservice<S>>,
    pub pretix: Option<Arc<dyn PretixApi>>,
    pub lemonade: Option<Arc<dyn LemonadeApi>>,
}

impl<S: Clone> Clone for PipelineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            signing_key: self.signing_key.clone(),
            credentials: self.credentials.clone(),
            pretix: self.pretix.clone(),
            lemonade: self.lemonade.clone(),
        }
    }
}

/// Runs `fetch` unless the pipeline gets stopped first.
pub(crate) async fn until_stopped<T>(
    cancel: &CancellationToken,
    fetch: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Stopped);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Stopped),
        result = fetch => result,
    }
}

/// Deterministic atom id for a record of an external backend.
pub(crate) fn atom_id(pipeline_id: Uuid, parts: &[&str]) -> Uuid {
    Uuid::new_v5(&pipeline_id, parts.join("\u{1f}").as_bytes())
}

pub enum AnyPipeline<S> {
    Csv(CsvPipeline<S>),
    CsvTicket(CsvTicketPipeline<S>),
    Pretix(PretixPipeline<S>),
    Lemonade(LemonadePipeline<S>),
}

impl<S> AnyPipeline<S>
where
    S: PodboxStore,
{
    pub fn from_definition(
        definition: PipelineDefinition,
        context: PipelineContext<S>,
    ) -> Result<Self, PipelineError> {
        let pipeline = match definition.options {
            PipelineOptions::Csv(options) => {
                AnyPipeline::Csv(CsvPipeline::new(definition.id, options, context))
            }
            PipelineOptions::CsvTicket(options) => {
                AnyPipeline::CsvTicket(CsvTicketPipeline::new(definition.id, options, context))
            }
            PipelineOptions::Pretix(options) => {
                let api = context
                    .pretix
                    .clone()
                    .ok_or(PipelineError::MissingBackend(PipelineKind::Pretix))?;
                AnyPipeline::Pretix(PretixPipeline::new(definition.id, options, api, context))
            }
            PipelineOptions::Lemonade(options) => {
                let api = context
                    .lemonade
                    .clone()
                    .ok_or(PipelineError::MissingBackend(PipelineKind::Lemonade))?;
                AnyPipeline::Lemonade(LemonadePipeline::new(definition.id, options, api, context))
            }
        };
        Ok(pipeline)
    }

    /// Capability values bound to this pipeline.
    pub fn capability_handles(&self) -> Vec<Capability<'_, S>> {
        self.capabilities()
            .iter()
            .map(|descriptor| Capability::bind(descriptor, self))
            .collect()
    }

    pub fn ticketing(&self) -> Option<&TicketingCore<S>> {
        match self {
            AnyPipeline::Csv(_) => None,
            AnyPipeline::CsvTicket(pipeline) => Some(pipeline.core()),
            AnyPipeline::Pretix(pipeline) => Some(pipeline.core()),
            AnyPipeline::Lemonade(pipeline) => Some(pipeline.core()),
        }
    }

    pub async fn issue(&self, request: &FeedRequest) -> Result<FeedResponse, FeedError> {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.issue(request).await,
            _ => match self.ticketing() {
                Some(core) => core.issue(request).await,
                None => Err(FeedError::Unsupported),
            },
        }
    }

    pub async fn pre_check(&self, request: &CheckinRequest) -> ActionConfig {
        match self.ticketing() {
            Some(core) => core.pre_check(request).await,
            None => ActionConfig::refused(crate::checkin::CheckinError::InvalidTicket),
        }
    }

    pub async fn checkin(&self, request: &CheckinRequest) -> CheckinResponse {
        match self.ticketing() {
            Some(core) => core.checkin(request).await,
            None => CheckinResponse::failed(crate::checkin::CheckinError::InvalidTicket),
        }
    }
}

impl<S> Pipeline for AnyPipeline<S>
where
    S: PodboxStore,
{
    fn id(&self) -> Uuid {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.id(),
            AnyPipeline::CsvTicket(pipeline) => pipeline.id(),
            AnyPipeline::Pretix(pipeline) => pipeline.id(),
            AnyPipeline::Lemonade(pipeline) => pipeline.id(),
        }
    }

    fn kind(&self) -> PipelineKind {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.kind(),
            AnyPipeline::CsvTicket(pipeline) => pipeline.kind(),
            AnyPipeline::Pretix(pipeline) => pipeline.kind(),
            AnyPipeline::Lemonade(pipeline) => pipeline.kind(),
        }
    }

    fn capabilities(&self) -> &[CapabilityDescriptor] {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.capabilities(),
            AnyPipeline::CsvTicket(pipeline) => pipeline.capabilities(),
            AnyPipeline::Pretix(pipeline) => pipeline.capabilities(),
            AnyPipeline::Lemonade(pipeline) => pipeline.capabilities(),
        }
    }

    async fn start(&self) -> Result<(), PipelineError> {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.start().await,
            AnyPipeline::CsvTicket(pipeline) => pipeline.start().await,
            AnyPipeline::Pretix(pipeline) => pipeline.start().await,
            AnyPipeline::Lemonade(pipeline) => pipeline.start().await,
        }
    }

    fn stop(&self) {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.stop(),
            AnyPipeline::CsvTicket(pipeline) => pipeline.stop(),
            AnyPipeline::Pretix(pipeline) => pipeline.stop(),
            AnyPipeline::Lemonade(pipeline) => pipeline.stop(),
        }
    }

    fn is_stopped(&self) -> bool {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.is_stopped(),
            AnyPipeline::CsvTicket(pipeline) => pipeline.is_stopped(),
            AnyPipeline::Pretix(pipeline) => pipeline.is_stopped(),
            AnyPipeline::Lemonade(pipeline) => pipeline.is_stopped(),
        }
    }

    async fn load(&self) -> LoadSummary {
        match self {
            AnyPipeline::Csv(pipeline) => pipeline.load().await,
            AnyPipeline::CsvTicket(pipeline) => pipeline.load().await,
            AnyPipeline::Pretix(pipeline) => pipeline.load().await,
            AnyPipeline::Lemonade(pipeline) => pipeline.load().await,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline was stopped")]
    Stopped,

    #[error("no {0} backend client configured")]
    MissingBackend(PipelineKind),

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    #[error("could not parse spreadsheet: {0}")]
    Csv(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Semaphore(#[from] SemaphoreError),
}
