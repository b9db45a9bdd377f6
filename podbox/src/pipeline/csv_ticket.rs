// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spreadsheet rows issued as tickets.
//!
//! Rows hold `ticketName,attendeeName,attendeeEmail` below a header row. The ticket name selects a
//! configured product. Check-ins are recorded locally since there is no backend to push them to.
use podbox_store::PodboxStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capability::CapabilityDescriptor;
use crate::config::{CsvTicketPipelineOptions, TicketingOptions};
use crate::pipeline::ticketing::ticketing_capabilities;
use crate::pipeline::{
    LoadLog, LoadSummary, Pipeline, PipelineContext, PipelineError, PipelineKind, TicketAtom,
    TicketingCore, atom_id, until_stopped,
};

/// Atoms of all valid rows and the number of rows seen.
fn parse_rows(
    pipeline_id: Uuid,
    text: &str,
    options: &TicketingOptions,
    log: &LoadLog,
) -> Result<(Vec<TicketAtom>, usize), PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut atoms = Vec::new();
    let mut rows = 0;
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| PipelineError::Csv(err.to_string()))?;
        rows += 1;

        let (Some(ticket_name), Some(attendee_name), Some(attendee_email)) =
            (record.get(0), record.get(1), record.get(2))
        else {
            log.warn(format!("row {index} has less than three columns"));
            continue;
        };
        if attendee_email.is_empty() {
            log.warn(format!("row {index} has no attendee email"));
            continue;
        }

        let product = options.events.iter().find_map(|event| {
            event
                .products
                .iter()
                .find(|product| product.name.eq_ignore_ascii_case(ticket_name))
                .map(|product| (event.id, product.id))
        });
        let Some((event_id, product_id)) = product else {
            log.warn(format!("row {index} has unknown ticket name '{ticket_name}'"));
            continue;
        };

        let values: Vec<&str> = record.iter().collect();
        atoms.push(TicketAtom {
            id: atom_id(pipeline_id, &[&index.to_string(), &values.join(",")]),
            email: Some(attendee_email.to_lowercase()),
            name: attendee_name.to_string(),
            event_id,
            product_id,
            checked_in: false,
            timestamp_checked_in: None,
            checker: None,
            parent_atom_id: None,
            external_id: index.to_string(),
        });
    }

    Ok((atoms, rows))
}

pub struct CsvTicketPipeline<S> {
    id: Uuid,
    csv: String,
    core: TicketingCore<S>,
    capabilities: Vec<CapabilityDescriptor>,
    cancel: CancellationToken,
}

impl<S> CsvTicketPipeline<S>
where
    S: PodboxStore,
{
    pub fn new(id: Uuid, options: CsvTicketPipelineOptions, context: PipelineContext<S>) -> Self {
        Self {
            id,
            capabilities: ticketing_capabilities(&options.ticketing),
            core: TicketingCore::new(id, options.ticketing, context, None),
            csv: options.csv,
            cancel: CancellationToken::new(),
        }
    }

    pub fn core(&self) -> &TicketingCore<S> {
        &self.core
    }

    async fn load_inner(&self, log: &LoadLog) -> Result<(usize, usize), PipelineError> {
        let (atoms, rows) = until_stopped(&self.cancel, async {
            parse_rows(self.id, &self.csv, self.core.options(), log)
        })
        .await?;
        self.core.finish_load(&atoms, log).await?;
        Ok((atoms.len(), rows))
    }
}

impl<S> Pipeline for CsvTicketPipeline<S>
where
    S: PodboxStore,
{
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::CsvTicket
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
