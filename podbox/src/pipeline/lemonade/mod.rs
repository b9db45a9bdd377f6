// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tickets loaded from Lemonade.
mod api;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use podbox_store::PodboxStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use api::{LemonadeApi, LemonadeConnection, LemonadeError, LemonadeTicket, LemonadeTicketType};

use crate::capability::CapabilityDescriptor;
use crate::config::{EventConfig, LemonadePipelineOptions};
use crate::pipeline::ticketing::ticketing_capabilities;
use crate::pipeline::{
    CheckinPusher, LoadLog, LoadSummary, Pipeline, PipelineContext, PipelineError, PipelineKind,
    TicketAtom, TicketingCore, atom_id, until_stopped,
};

struct EventData {
    ticket_types: Vec<LemonadeTicketType>,
    tickets: Vec<LemonadeTicket>,
}

struct LemonadeCheckins {
    api: Arc<dyn LemonadeApi>,
    connection: Arc<LemonadeConnection>,
}

#[async_trait]
impl CheckinPusher for LemonadeCheckins {
    async fn push_checkin(&self, event: &EventConfig, ticket: &TicketAtom) -> Result<(), String> {
        if ticket.external_id.is_empty() {
            return Err("ticket is not assigned to a lemonade user".into());
        }
        self.api
            .checkin_user(&self.connection, &event.external_id, &ticket.external_id)
            .await
            .map_err(|err| err.to_string())
    }
}

fn validate(event: &EventConfig, data: &EventData) -> Vec<String> {
    event
        .products
        .iter()
        .filter(|product| {
            !data
                .ticket_types
                .iter()
                .any(|ticket_type| ticket_type.id == product.external_id)
        })
        .map(|product| {
            format!(
                "ticket type '{}' of event '{}' does not exist",
                product.name, event.name
            )
        })
        .collect()
}

fn atomize(
    pipeline_id: Uuid,
    event: &EventConfig,
    data: &EventData,
    log: &LoadLog,
) -> Vec<TicketAtom> {
    let products: HashMap<&str, Uuid> = event
        .products
        .iter()
        .map(|product| (product.external_id.as_str(), product.id))
        .collect();

    data.tickets
        .iter()
        .filter_map(|ticket| {
            let Some(product_id) = products.get(ticket.type_id.as_str()) else {
                log.warn(format!(
                    "ticket {} has unconfigured type {}",
                    ticket.id, ticket.type_id
                ));
                return None;
            };
            let Some(email) = ticket.user_email.as_deref().filter(|email| !email.is_empty())
            else {
                log.warn(format!("ticket {} has no email", ticket.id));
                return None;
            };

            Some(TicketAtom {
                id: atom_id(pipeline_id, &["lemonade", &event.external_id, &ticket.id]),
                email: Some(email.to_lowercase()),
                name: ticket.user_name.clone().unwrap_or_default(),
                event_id: event.id,
                product_id: *product_id,
                checked_in: ticket.checked_in_at.is_some(),
                timestamp_checked_in: ticket.checked_in_at,
                checker: None,
                parent_atom_id: None,
                external_id: ticket.user_id.clone().unwrap_or_default(),
            })
        })
        .collect()
}

pub struct LemonadePipeline<S> {
    id: Uuid,
    api: Arc<dyn LemonadeApi>,
    connection: Arc<LemonadeConnection>,
    core: TicketingCore<S>,
    capabilities: Vec<CapabilityDescriptor>,
    cancel: CancellationToken,
}

impl<S> LemonadePipeline<S>
where
    S: PodboxStore,
{
    pub fn new(
        id: Uuid,
        options: LemonadePipelineOptions,
        api: Arc<dyn LemonadeApi>,
        context: PipelineContext<S>,
    ) -> Self {
        let connection = Arc::new(LemonadeConnection {
            backend_url: options.lemonade_backend_url,
            api_key: options.lemonade_api_key,
        });
        let pusher = LemonadeCheckins {
            api: api.clone(),
            connection: connection.clone(),
        };

        Self {
            id,
            capabilities: ticketing_capabilities(&options.ticketing),
            core: TicketingCore::new(id, options.ticketing, context, Some(Arc::new(pusher))),
            api,
            connection,
            cancel: CancellationToken::new(),
        }
    }

    pub fn core(&self) -> &TicketingCore<S> {
        &self.core
    }

    async fn fetch_event(&self, event: &EventConfig) -> Result<EventData, LemonadeError> {
        let external_id = event.external_id.as_str();
        Ok(EventData {
            ticket_types: self
                .api
                .fetch_ticket_types(&self.connection, external_id)
                .await?,
            tickets: self.api.fetch_tickets(&self.connection, external_id).await?,
        })
    }

    async fn fetch_all(
        &self,
        log: &LoadLog,
    ) -> Result<Vec<(EventConfig, EventData)>, PipelineError> {
        let mut fetched = Vec::new();
        for event in &self.core.options().events {
            match self.fetch_event(event).await {
                Ok(data) => fetched.push((event.clone(), data)),
                Err(err) => log.warn(format!("skipping event '{}': {err}", event.name)),
            }
        }
        Ok(fetched)
    }

    async fn load_inner(&self, log: &LoadLog) -> Result<(usize, usize), PipelineError> {
        let fetched = until_stopped(&self.cancel, self.fetch_all(log)).await?;

        let errors: Vec<String> = fetched
            .iter()
            .flat_map(|(event, data)| validate(event, data))
            .collect();
        if !errors.is_empty() {
            return Err(PipelineError::InvalidConfiguration(errors));
        }

        let mut atoms = Vec::new();
        let mut expected = 0;
        for (event, data) in &fetched {
            expected += data.tickets.len();
            atoms.extend(atomize(self.id, event, data, log));
        }

        let loaded: HashSet<Uuid> = fetched.iter().map(|(event, _)| event.id).collect();
        let kept = self.core.atoms_of_skipped_events(&loaded).await?;
        expected += kept.len();
        atoms.extend(kept);

        self.core.finish_load(&atoms, log).await?;
        Ok((atoms.len(), expected))
    }
}

impl<S> Pipeline for LemonadePipeline<S>
where
    S: PodboxStore,
{
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Lemonade
    }

    fn capabilities(&self) -> &[CapabilityDescriptor] {
        &self.capabilities
    }

    async fn start(&self) -> Result<(), PipelineError> {
        self.core.start().await
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn load(&self) -> LoadSummary {
        let log = LoadLog::new(self.id);
        match self.load_inner(&log).await {
            Ok((loaded, expected)) => log.succeed(loaded, expected),
            Err(err) => log.fail(&err),
        }
    }
}
