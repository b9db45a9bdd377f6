// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behaviour shared by all pipelines which issue tickets.
//!
//! Tickets are either atoms, or manual tickets from the pipeline definition or granted through
//! auto-issuance. The core persists loaded atoms, keeps Semaphore groups and auto-issued tickets
//! in line with them, issues signed tickets to feed subscribers and runs check-ins.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use podbox_core::{Commitment, TicketData, Timestamp, now};
use podbox_store::{Atom, CheckinRecord, ManualTicket, PodboxStore, StoreError, write};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auto_issuance::{AutoIssuanceProvider, HeldTicket};
use crate::capability::CapabilityDescriptor;
use crate::checkin::{
    ActionConfig, CheckinError, CheckinRequest, CheckinResponse, PendingCheckins, TicketPreview,
};
use crate::config::{EventConfig, TicketingOptions};
use crate::credential::{CredentialSubservice, VerifiedEmail};
use crate::feed::{FeedError, FeedRequest, FeedResponse, PcdAction};
use crate::pipeline::{LoadLog, PipelineContext, PipelineError};
use crate::semaphore::{MemberInfo, SemaphoreError, SemaphoreGroupProvider};
use crate::signing::PcdIssuer;

/// Ticket loaded from an external backend or a spreadsheet row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAtom {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub event_id: Uuid,
    pub product_id: Uuid,
    pub checked_in: bool,
    pub timestamp_checked_in: Option<Timestamp>,
    pub checker: Option<String>,
    /// Atom this add-on belongs to.
    pub parent_atom_id: Option<Uuid>,
    /// Identifier of the ticket in the external backend.
    pub external_id: String,
}

impl Atom for TicketAtom {
    fn id(&self) -> Uuid {
        self.id
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Forwards check-ins of atoms to the backend they were loaded from.
#[async_trait]
pub trait CheckinPusher: Send + Sync {
    async fn push_checkin(&self, event: &EventConfig, ticket: &TicketAtom) -> Result<(), String>;
}

#[derive(Clone, Debug)]
enum TicketSource {
    Atom(TicketAtom),
    Manual,
}

/// Atom or manual ticket, as seen by feeds and check-ins.
#[derive(Clone, Debug)]
struct Ticket {
    id: Uuid,
    event_id: Uuid,
    product_id: Uuid,
    attendee_email: String,
    attendee_name: String,
    parent_ticket_id: Option<Uuid>,
    source: TicketSource,
}

impl From<TicketAtom> for Ticket {
    fn from(atom: TicketAtom) -> Self {
        Self {
            id: atom.id,
            event_id: atom.event_id,
            product_id: atom.product_id,
            attendee_email: atom.email.clone().unwrap_or_default(),
            attendee_name: atom.name.clone(),
            parent_ticket_id: atom.parent_atom_id,
            source: TicketSource::Atom(atom),
        }
    }
}

impl From<ManualTicket> for Ticket {
    fn from(ticket: ManualTicket) -> Self {
        Self {
            id: ticket.id,
            event_id: ticket.event_id,
            product_id: ticket.product_id,
            attendee_email: ticket.attendee_email,
            attendee_name: ticket.attendee_name,
            parent_ticket_id: None,
            source: TicketSource::Manual,
        }
    }
}

struct CheckinState {
    timestamp: Option<Timestamp>,
    checker: Option<String>,
}

impl From<CheckinState> for CheckinError {
    fn from(state: CheckinState) -> Self {
        CheckinError::AlreadyCheckedIn {
            checkin_timestamp: state.timestamp,
            checker: state.checker,
        }
    }
}

/// Capabilities of a pipeline issuing tickets.
pub(crate) fn ticketing_capabilities(options: &TicketingOptions) -> Vec<CapabilityDescriptor> {
    let mut capabilities = vec![
        CapabilityDescriptor::FeedIssuance(options.feed_options.clone()),
        CapabilityDescriptor::Checkin,
    ];
    if !options.semaphore_groups.is_empty() {
        capabilities.push(CapabilityDescriptor::SemaphoreGroup);
    }
    capabilities
}

fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

pub struct TicketingCore<S> {
    pipeline_id: Uuid,
    options: TicketingOptions,
    store: S,
    issuer: PcdIssuer<S>,
    credentials: Arc<CredentialSubservice<S>>,
    groups: SemaphoreGroupProvider<S>,
    auto_issuance: AutoIssuanceProvider,
    pending: PendingCheckins,
    /// Check-ins of atoms are recorded in the check-in store when no pusher is set.
    pusher: Option<Arc<dyn CheckinPusher>>,
}

impl<S> TicketingCore<S>
where
    S: PodboxStore,
{
    pub(crate) fn new(
        pipeline_id: Uuid,
        options: TicketingOptions,
        context: PipelineContext<S>,
        pusher: Option<Arc<dyn CheckinPusher>>,
    ) -> Self {
        let groups = SemaphoreGroupProvider::new(
            pipeline_id,
            options.semaphore_groups.clone(),
            context.store.clone(),
        );
        let auto_issuance = AutoIssuanceProvider::new(options.auto_issuance.clone());
        Self {
            pipeline_id,
            issuer: PcdIssuer::new(pipeline_id, context.signing_key, context.store.clone()),
            store: context.store,
            credentials: context.credentials,
            groups,
            auto_issuance,
            pending: PendingCheckins::default(),
            pusher,
            options,
        }
    }

    pub fn options(&self) -> &TicketingOptions {
        &self.options
    }

    pub fn groups(&self) -> &SemaphoreGroupProvider<S> {
        &self.groups
    }

    pub fn pending(&self) -> &PendingCheckins {
        &self.pending
    }

    /// Atoms persisted by the last successful load.
    pub async fn atoms(&self) -> Result<Vec<TicketAtom>, StoreError> {
        self.store.load(self.pipeline_id).await
    }

    /// Stored atoms of events which were not fetched in this cycle.
    pub(crate) async fn atoms_of_skipped_events(
        &self,
        fetched: &HashSet<Uuid>,
    ) -> Result<Vec<TicketAtom>, StoreError> {
        if self
            .options
            .events
            .iter()
            .all(|event| fetched.contains(&event.id))
        {
            return Ok(Vec::new());
        }
        Ok(self
            .atoms()
            .await?
            .into_iter()
            .filter(|atom| !fetched.contains(&atom.event_id))
            .collect())
    }

    pub(crate) async fn start(&self) -> Result<(), PipelineError> {
        self.groups.start().await?;
        Ok(())
    }

    /// Persists the atoms of a successful fetch and brings everything derived from them in line.
    pub(crate) async fn finish_load(
        &self,
        atoms: &[TicketAtom],
        log: &LoadLog,
    ) -> Result<(), PipelineError> {
        let only_manual = atoms.is_empty() && !self.options.manual_tickets.is_empty();
        write(&self.store, async |store| {
            store.replace(self.pipeline_id, atoms).await?;
            if only_manual {
                store.mark_as_loaded(self.pipeline_id).await?;
            }
            Ok(())
        })
        .await?;

        let granted = self.issue_to_consumers(atoms).await?;
        if granted > 0 {
            log.info(format!("auto-issued {granted} manual tickets"));
        }

        let changed = self.update_groups().await?;
        if !changed.is_empty() {
            log.info(format!("updated {} semaphore groups", changed.len()));
        }

        let checked_in: HashSet<Uuid> = atoms
            .iter()
            .filter(|atom| atom.checked_in)
            .map(|atom| atom.id)
            .collect();
        let pruned = self
            .pending
            .prune(log.started_at(), |ticket_id| checked_in.contains(&ticket_id));
        if pruned > 0 {
            debug!(pipeline_id = %self.pipeline_id, pruned, "pruned pending check-ins");
        }

        Ok(())
    }

    /// Runs the auto-issuance rules for every consumer of the feed.
    async fn issue_to_consumers(&self, atoms: &[TicketAtom]) -> Result<usize, StoreError> {
        if self.auto_issuance.is_empty() {
            return Ok(0);
        }

        let consumers = self.store.load_consumers(self.pipeline_id).await?;
        let granted = self.store.load_manual_tickets(self.pipeline_id).await?;
        let timestamp = now();

        let mut issued = Vec::new();
        for consumer in &consumers {
            let held = self.held_tickets(&consumer.email, atoms);
            let granted_to: Vec<ManualTicket> = granted
                .iter()
                .filter(|ticket| same_email(&ticket.attendee_email, &consumer.email))
                .cloned()
                .collect();
            issued.extend(
                self.auto_issuance
                    .dispense(&consumer.email, &held, &granted_to, timestamp),
            );
        }

        if !issued.is_empty() {
            write(&self.store, async |store| {
                store.save_manual_tickets(self.pipeline_id, &issued).await
            })
            .await?;
        }

        Ok(issued.len())
    }

    /// Tickets of `email` the auto-issuance rules match against, besides earlier grants.
    fn held_tickets(&self, email: &str, atoms: &[TicketAtom]) -> Vec<HeldTicket> {
        let from_atoms = atoms
            .iter()
            .filter(|atom| atom.email.as_deref().is_some_and(|e| same_email(e, email)))
            .map(|atom| HeldTicket {
                event_id: atom.event_id,
                product_id: atom.product_id,
                attendee_name: atom.name.clone(),
            });
        let configured = self
            .options
            .manual_tickets
            .iter()
            .filter(|ticket| same_email(&ticket.attendee_email, email))
            .map(HeldTicket::from);
        from_atoms.chain(configured).collect()
    }

    async fn update_groups(&self) -> Result<Vec<Uuid>, SemaphoreError> {
        self.groups
            .update(async || self.member_infos().await.map_err(SemaphoreError::from))
            .await
    }

    /// Every ticket holder of the pipeline.
    async fn member_infos(&self) -> Result<Vec<MemberInfo>, StoreError> {
        let atoms: Vec<TicketAtom> = self.store.load(self.pipeline_id).await?;
        let manual = self.store.load_manual_tickets(self.pipeline_id).await?;

        let from_atoms = atoms.into_iter().filter_map(|atom| {
            atom.email.map(|email| MemberInfo {
                event_id: atom.event_id,
                product_id: atom.product_id,
                email,
            })
        });
        let from_manual = manual
            .into_iter()
            .chain(self.options.manual_tickets.iter().cloned())
            .map(|ticket| MemberInfo {
                event_id: ticket.event_id,
                product_id: ticket.product_id,
                email: ticket.attendee_email,
            });

        Ok(from_atoms.chain(from_manual).collect())
    }

    /// All tickets of one attendee.
    async fn tickets_of(&self, email: &str) -> Result<Vec<Ticket>, StoreError> {
        let atoms: Vec<TicketAtom> = self.store.load_by_email(self.pipeline_id, email).await?;
        let manual = self
            .store
            .load_manual_tickets_by_email(self.pipeline_id, email)
            .await?;
        let configured = self
            .options
            .manual_tickets
            .iter()
            .filter(|ticket| same_email(&ticket.attendee_email, email))
            .cloned();

        Ok(atoms
            .into_iter()
            .map(Ticket::from)
            .chain(manual.into_iter().chain(configured).map(Ticket::from))
            .collect())
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, StoreError> {
        if let Some(atom) = self
            .store
            .load_by_id::<TicketAtom>(self.pipeline_id, ticket_id)
            .await?
        {
            return Ok(Some(atom.into()));
        }

        if let Some(ticket) = self
            .options
            .manual_tickets
            .iter()
            .find(|ticket| ticket.id == ticket_id)
        {
            return Ok(Some(ticket.clone().into()));
        }

        Ok(self
            .store
            .load_manual_tickets(self.pipeline_id)
            .await?
            .into_iter()
            .find(|ticket| ticket.id == ticket_id)
            .map(Ticket::from))
    }

    fn is_remote(&self, ticket: &Ticket) -> bool {
        self.pusher.is_some() && matches!(ticket.source, TicketSource::Atom(_))
    }

    /// Check-in of the ticket, if it happened or is in flight.
    async fn checkin_state(&self, ticket: &Ticket) -> Result<Option<CheckinState>, StoreError> {
        if self.is_remote(ticket) {
            if let TicketSource::Atom(atom) = &ticket.source {
                if atom.checked_in {
                    return Ok(Some(CheckinState {
                        timestamp: atom.timestamp_checked_in,
                        checker: atom.checker.clone(),
                    }));
                }
            }
            return Ok(self.pending.get(ticket.id).map(|pending| CheckinState {
                timestamp: Some(pending.timestamp),
                checker: Some(pending.checker),
            }));
        }

        Ok(self
            .store
            .checkin(self.pipeline_id, ticket.id)
            .await?
            .map(|record| CheckinState {
                timestamp: Some(record.timestamp),
                checker: Some(record.checker_email),
            }))
    }

    /// Whether `email` may check in `ticket`.
    async fn is_authorized(&self, email: &str, ticket: &Ticket) -> Result<bool, StoreError> {
        if self
            .options
            .superuser_emails
            .iter()
            .any(|superuser| same_email(superuser, email))
        {
            return Ok(true);
        }

        let holdings = self.tickets_of(email).await?;

        let is_superuser = holdings.iter().any(|held| {
            held.event_id == ticket.event_id
                && self
                    .options
                    .product(held.event_id, held.product_id)
                    .is_some_and(|product| product.is_super_user)
        });
        if is_superuser {
            return Ok(true);
        }

        Ok(self.options.user_permissions.iter().any(|policy| {
            policy.event_id == ticket.event_id
                && policy.product_id.is_none_or(|id| id == ticket.product_id)
                && holdings.iter().any(|held| {
                    policy
                        .checkers
                        .iter()
                        .any(|criterion| criterion.matches(held.event_id, held.product_id))
                })
        }))
    }

    fn preview(&self, ticket: &Ticket) -> TicketPreview {
        let event = self.options.event(ticket.event_id);
        let product = self.options.product(ticket.event_id, ticket.product_id);
        TicketPreview {
            ticket_id: ticket.id,
            event_name: event.map(|event| event.name.clone()).unwrap_or_default(),
            ticket_name: product.map(|product| product.name.clone()).unwrap_or_default(),
            attendee_name: ticket.attendee_name.clone(),
            attendee_email: ticket.attendee_email.clone(),
        }
    }

    pub async fn issue(&self, request: &FeedRequest) -> Result<FeedResponse, FeedError> {
        let credential = request
            .credential
            .as_ref()
            .ok_or(FeedError::MissingCredential)?;
        let VerifiedEmail { email, commitment } =
            self.credentials.verify_and_expect_email(credential).await?;

        let changed = write(&self.store, async |store| {
            store
                .save_consumer(self.pipeline_id, &email, commitment, now())
                .await
        })
        .await?;

        let granted = self.issue_to_requester(&email).await?;
        if changed || granted > 0 {
            self.update_groups().await?;
        }

        if !self.store.has_loaded(self.pipeline_id).await? {
            debug!(pipeline_id = %self.pipeline_id, "feed requested before first load");
            return Ok(FeedResponse::default());
        }

        let tickets = self.tickets_of(&email).await?;
        let folder = &self.options.feed_options.feed_folder;
        let mut actions = vec![PcdAction::DeleteFolder {
            folder: folder.clone(),
            recursive: true,
        }];

        for event in &self.options.events {
            let mut pcds = Vec::new();
            for ticket in tickets.iter().filter(|ticket| ticket.event_id == event.id) {
                let Some(data) = self.ticket_data(ticket, event, commitment).await? else {
                    continue;
                };
                pcds.push(self.issuer.sign_ticket(data).await?);
            }
            actions.push(PcdAction::ReplaceInFolder {
                folder: format!("{folder}/{}", event.name),
                pcds,
            });
        }

        info!(
            pipeline_id = %self.pipeline_id,
            tickets = tickets.len(),
            "issued feed"
        );
        Ok(FeedResponse { actions })
    }

    async fn issue_to_requester(&self, email: &str) -> Result<usize, StoreError> {
        if self.auto_issuance.is_empty() {
            return Ok(0);
        }

        let atoms: Vec<TicketAtom> = self.store.load_by_email(self.pipeline_id, email).await?;
        let granted = self
            .store
            .load_manual_tickets_by_email(self.pipeline_id, email)
            .await?;
        let held = self.held_tickets(email, &atoms);

        let issued = self.auto_issuance.dispense(email, &held, &granted, now());
        if !issued.is_empty() {
            write(&self.store, async |store| {
                store.save_manual_tickets(self.pipeline_id, &issued).await
            })
            .await?;
            info!(
                pipeline_id = %self.pipeline_id,
                count = issued.len(),
                "auto-issued manual tickets"
            );
        }
        Ok(issued.len())
    }

    async fn ticket_data(
        &self,
        ticket: &Ticket,
        event: &EventConfig,
        commitment: Commitment,
    ) -> Result<Option<TicketData>, StoreError> {
        let Some(product) = self.options.product(event.id, ticket.product_id) else {
            warn!(
                pipeline_id = %self.pipeline_id,
                ticket_id = %ticket.id,
                "ticket of unknown product not issued"
            );
            return Ok(None);
        };
        let state = self.checkin_state(ticket).await?;

        Ok(Some(TicketData {
            ticket_id: ticket.id,
            event_id: event.id,
            event_name: event.name.clone(),
            product_id: product.id,
            ticket_name: product.name.clone(),
            attendee_name: ticket.attendee_name.clone(),
            attendee_email: ticket.attendee_email.clone(),
            attendee_commitment: Some(commitment),
            is_consumed: state.is_some(),
            is_revoked: false,
            timestamp_consumed: state.and_then(|state| state.timestamp),
            parent_ticket_id: ticket.parent_ticket_id,
            timestamp_signed: now(),
        }))
    }

    pub async fn pre_check(&self, request: &CheckinRequest) -> ActionConfig {
        let email = match self
            .credentials
            .verify_and_expect_email(&request.credential)
            .await
        {
            Ok(verified) => verified.email,
            Err(err) => {
                debug!(pipeline_id = %self.pipeline_id, %err, "check-in credential rejected");
                return ActionConfig::refused(CheckinError::InvalidSignature);
            }
        };

        match self.pre_check_inner(&email, request.ticket_id).await {
            Ok(config) => config,
            Err(err) => {
                error!(pipeline_id = %self.pipeline_id, %err, "check-in pre-check failed");
                ActionConfig::refused(CheckinError::ServerError)
            }
        }
    }

    async fn pre_check_inner(
        &self,
        email: &str,
        ticket_id: Uuid,
    ) -> Result<ActionConfig, StoreError> {
        let Some(ticket) = self.find_ticket(ticket_id).await? else {
            return Ok(ActionConfig::refused(CheckinError::InvalidTicket));
        };
        if !self.is_authorized(email, &ticket).await? {
            return Ok(ActionConfig::refused(CheckinError::NotSuperuser));
        }
        if let Some(state) = self.checkin_state(&ticket).await? {
            return Ok(ActionConfig::refused(state.into()));
        }
        Ok(ActionConfig::allowed(self.preview(&ticket)))
    }

    pub async fn checkin(&self, request: &CheckinRequest) -> CheckinResponse {
        let email = match self
            .credentials
            .verify_and_expect_email(&request.credential)
            .await
        {
            Ok(verified) => verified.email,
            Err(err) => {
                debug!(pipeline_id = %self.pipeline_id, %err, "check-in credential rejected");
                return CheckinResponse::failed(CheckinError::InvalidSignature);
            }
        };

        match self.checkin_inner(&email, request.ticket_id).await {
            Ok(response) => response,
            Err(err) => {
                error!(pipeline_id = %self.pipeline_id, %err, "check-in failed");
                CheckinResponse::failed(CheckinError::ServerError)
            }
        }
    }

    async fn checkin_inner(
        &self,
        email: &str,
        ticket_id: Uuid,
    ) -> Result<CheckinResponse, StoreError> {
        let Some(ticket) = self.find_ticket(ticket_id).await? else {
            return Ok(CheckinResponse::failed(CheckinError::InvalidTicket));
        };
        if !self.is_authorized(email, &ticket).await? {
            return Ok(CheckinResponse::failed(CheckinError::NotSuperuser));
        }
        if let Some(state) = self.checkin_state(&ticket).await? {
            return Ok(CheckinResponse::failed(state.into()));
        }

        let timestamp = now();
        match (&self.pusher, &ticket.source) {
            (Some(pusher), TicketSource::Atom(atom)) => {
                let Some(event) = self.options.event(ticket.event_id) else {
                    return Ok(CheckinResponse::failed(CheckinError::InvalidTicket));
                };
                if let Err(existing) = self.pending.try_mark_pending(ticket.id, email, timestamp) {
                    return Ok(CheckinResponse::failed(CheckinError::AlreadyCheckedIn {
                        checkin_timestamp: Some(existing.timestamp),
                        checker: Some(existing.checker),
                    }));
                }

                match pusher.push_checkin(event, atom).await {
                    Ok(()) => {
                        self.pending.mark_success(ticket.id, now());
                        info!(pipeline_id = %self.pipeline_id, %ticket_id, "checked in ticket");
                        Ok(CheckinResponse::success())
                    }
                    Err(err) => {
                        self.pending.remove(ticket.id);
                        warn!(
                            pipeline_id = %self.pipeline_id,
                            %ticket_id,
                            %err,
                            "backend refused check-in"
                        );
                        Ok(CheckinResponse::failed(CheckinError::ServerError))
                    }
                }
            }
            _ => {
                let record = CheckinRecord {
                    pipeline_id: self.pipeline_id,
                    ticket_id,
                    checker_email: email.to_string(),
                    timestamp,
                };
                match write(&self.store, async |store| store.add_checkin(record).await).await {
                    Ok(()) => {
                        info!(pipeline_id = %self.pipeline_id, %ticket_id, "checked in ticket");
                        Ok(CheckinResponse::success())
                    }
                    Err(StoreError::UniqueViolation(_)) => {
                        let existing = self.store.checkin(self.pipeline_id, ticket_id).await?;
                        Ok(CheckinResponse::failed(CheckinError::AlreadyCheckedIn {
                            checkin_timestamp: existing.as_ref().map(|record| record.timestamp),
                            checker: existing.map(|record| record.checker_email),
                        }))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}
