// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tickets loaded from pretix.
//!
//! Every configured event is fetched on its own. A configuration problem in any event fails the
//! whole load before anything is written, while an unreachable event is skipped and keeps the
//! atoms of its previous load.
mod api;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use podbox_store::PodboxStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use api::{
    ORDER_STATUS_PAID, PretixApi, PretixCheckin, PretixCheckinList, PretixConnection,
    PretixError, PretixEvent, PretixEventSettings, PretixItem, PretixOrder, PretixPosition,
};

use crate::capability::CapabilityDescriptor;
use crate::config::{EventConfig, PretixPipelineOptions};
use crate::pipeline::ticketing::ticketing_capabilities;
use crate::pipeline::{
    CheckinPusher, LoadLog, LoadSummary, Pipeline, PipelineContext, PipelineError, PipelineKind,
    TicketAtom, TicketingCore, atom_id, until_stopped,
};

/// First check-in list of every loaded event.
type CheckinLists = Arc<Mutex<HashMap<Uuid, u64>>>;

/// Everything fetched for one event.
#[derive(Clone, Debug)]
struct EventData {
    event: PretixEvent,
    settings: PretixEventSettings,
    items: Vec<PretixItem>,
    checkin_lists: Vec<PretixCheckinList>,
    orders: Vec<PretixOrder>,
}

struct PretixCheckins {
    api: Arc<dyn PretixApi>,
    connection: Arc<PretixConnection>,
    checkin_lists: CheckinLists,
}

#[async_trait]
impl CheckinPusher for PretixCheckins {
    async fn push_checkin(&self, event: &EventConfig, ticket: &TicketAtom) -> Result<(), String> {
        let checkin_list = self
            .checkin_lists
            .lock()
            .expect("acquire lock on check-in lists")
            .get(&event.id)
            .copied();
        let Some(checkin_list) = checkin_list else {
            return Err(format!("no check-in list known for event {}", event.name));
        };

        self.api
            .push_checkin(
                &self.connection,
                &event.external_id,
                checkin_list,
                &ticket.external_id,
            )
            .await
            .map_err(|err| err.to_string())
    }
}

fn position_atom_id(pipeline_id: Uuid, event: &EventConfig, position: u64) -> Uuid {
    atom_id(pipeline_id, &["pretix", &event.external_id, &position.to_string()])
}

/// Configuration problems of one event.
fn validate(event: &EventConfig, data: &EventData) -> Vec<String> {
    let mut errors = Vec::new();
    if !data.settings.attendee_emails_asked {
        errors.push(format!(
            "event '{}' must ask for attendee emails",
            data.event.name
        ));
    }
    if !data.settings.attendee_emails_required {
        errors.push(format!(
            "event '{}' must require attendee emails",
            data.event.name
        ));
    }
    if data.checkin_lists.is_empty() {
        errors.push(format!("event '{}' has no check-in list", data.event.name));
    }
    for product in &event.products {
        let admission = product
            .external_id
            .parse::<u64>()
            .ok()
            .and_then(|id| data.items.iter().find(|item| item.id == id))
            .is_some_and(|item| item.admission);
        if !admission {
            errors.push(format!(
                "product '{}' of event '{}' is not an admission item",
                product.name, data.event.name
            ));
        }
    }
    errors
}

/// Atoms of the paid positions of configured products and the number of such positions.
fn atomize(
    pipeline_id: Uuid,
    event: &EventConfig,
    data: &EventData,
    log: &LoadLog,
) -> (Vec<TicketAtom>, usize) {
    let products: HashMap<u64, Uuid> = event
        .products
        .iter()
        .filter_map(|product| {
            product
                .external_id
                .parse::<u64>()
                .ok()
                .map(|id| (id, product.id))
        })
        .collect();

    let mut atoms = Vec::new();
    let mut expected = 0;
    for order in data
        .orders
        .iter()
        .filter(|order| order.status == ORDER_STATUS_PAID)
    {
        let order_email = order.email.as_deref().filter(|email| !email.is_empty());
        let emails: HashMap<u64, Option<&str>> = order
            .positions
            .iter()
            .map(|position| {
                let own = position
                    .attendee_email
                    .as_deref()
                    .filter(|email| !email.is_empty());
                (position.id, own.or(order_email))
            })
            .collect();

        for position in &order.positions {
            let Some(product_id) = products.get(&position.item) else {
                continue;
            };
            expected += 1;

            let email = match position.addon_to {
                Some(parent) => emails.get(&parent).copied().flatten(),
                None => emails.get(&position.id).copied().flatten(),
            };
            let Some(email) = email else {
                log.warn(format!(
                    "position {} of order {} has no email",
                    position.id, order.code
                ));
                continue;
            };

            let checkin = position.checkins.first();
            atoms.push(TicketAtom {
                id: position_atom_id(pipeline_id, event, position.id),
                email: Some(email.to_lowercase()),
                name: position.attendee_name.clone().unwrap_or_default(),
                event_id: event.id,
                product_id: *product_id,
                checked_in: checkin.is_some(),
                timestamp_checked_in: checkin.map(|checkin| checkin.timestamp),
                checker: None,
                parent_atom_id: position
                    .addon_to
                    .map(|parent| position_atom_id(pipeline_id, event, parent)),
                external_id: position.secret.clone(),
            });
        }
    }

    (atoms, expected)
}

pub struct PretixPipeline<S> {
    id: Uuid,
    api: Arc<dyn PretixApi>,
    connection: Arc<PretixConnection>,
    checkin_lists: CheckinLists,
    core: TicketingCore<S>,
    capabilities: Vec<CapabilityDescriptor>,
    cancel: CancellationToken,
}

impl<S> PretixPipeline<S>
where
    S: PodboxStore,
{
    pub fn new(
        id: Uuid,
        options: PretixPipelineOptions,
        api: Arc<dyn PretixApi>,
        context: PipelineContext<S>,
    ) -> Self {
        let connection = Arc::new(PretixConnection {
            org_url: options.pretix_api_org_url,
            token: options.pretix_api_token,
        });
        let checkin_lists = CheckinLists::default();
        let pusher = PretixCheckins {
            api: api.clone(),
            connection: connection.clone(),
            checkin_lists: checkin_lists.clone(),
        };

        Self {
            id,
            capabilities: ticketing_capabilities(&options.ticketing),
            core: TicketingCore::new(id, options.ticketing, context, Some(Arc::new(pusher))),
            api,
            connection,
            checkin_lists,
            cancel: CancellationToken::new(),
        }
    }

    pub fn core(&self) -> &TicketingCore<S> {
        &self.core
    }

    async fn fetch_event(&self, event: &EventConfig) -> Result<EventData, PretixError> {
        let slug = event.external_id.as_str();
        Ok(EventData {
            event: self.api.fetch_event(&self.connection, slug).await?,
            settings: self.api.fetch_settings(&self.connection, slug).await?,
            items: self.api.fetch_items(&self.connection, slug).await?,
            checkin_lists: self.api.fetch_checkin_lists(&self.connection, slug).await?,
            orders: self.api.fetch_orders(&self.connection, slug).await?,
        })
    }

    /// Fetches all events, skipping the ones which could not be reached.
    async fn fetch_all(&self, log: &LoadLog) -> Result<Vec<(EventConfig, EventData)>, PipelineError> {
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
            let (event_atoms, event_expected) = atomize(self.id, event, data, log);
            log.info(format!(
                "event '{}': {} tickets",
                data.event.name,
                event_atoms.len()
            ));
            atoms.extend(event_atoms);
            expected += event_expected;
        }

        let loaded: HashSet<Uuid> = fetched.iter().map(|(event, _)| event.id).collect();
        let kept = self.core.atoms_of_skipped_events(&loaded).await?;
        expected += kept.len();
        atoms.extend(kept);

        {
            let mut checkin_lists = self
                .checkin_lists
                .lock()
                .expect("acquire lock on check-in lists");
            for (event, data) in &fetched {
                if let Some(list) = data.checkin_lists.first() {
                    checkin_lists.insert(event.id, list.id);
                }
            }
        }

        self.core.finish_load(&atoms, log).await?;
        Ok((atoms.len(), expected))
    }
}

impl<S> Pipeline for PretixPipeline<S>
where
    S: PodboxStore,
{
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Pretix
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

#[cfg(test)]
mod tests;
