// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spreadsheet rows issued as signed messages.
//!
//! The first row names the columns. Every further row becomes one atom and, on feed requests, one
//! signed message titled with its first column.
use std::collections::BTreeMap;
use std::sync::Arc;

use podbox_core::{MessageData, now};
use podbox_store::{Atom, PodboxStore, write};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::capability::CapabilityDescriptor;
use crate::config::CsvPipelineOptions;
use crate::credential::CredentialSubservice;
use crate::feed::{FeedError, FeedRequest, FeedResponse, PcdAction};
use crate::pipeline::{
    LoadLog, LoadSummary, Pipeline, PipelineContext, PipelineError, PipelineKind, atom_id,
};
use crate::signing::PcdIssuer;

/// One spreadsheet row with its column names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvAtom {
    pub id: Uuid,
    pub row: usize,
    pub columns: Vec<(String, String)>,
}

impl Atom for CsvAtom {
    fn id(&self) -> Uuid {
        self.id
    }

    fn email(&self) -> Option<&str> {
        None
    }
}

impl CsvAtom {
    fn to_message(&self) -> MessageData {
        let title = self
            .columns
            .first()
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        let markdown = self
            .columns
            .iter()
            .map(|(name, value)| format!("**{name}**: {value}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        MessageData {
            title,
            markdown,
            fields: self.columns.iter().cloned().collect::<BTreeMap<_, _>>(),
            timestamp_signed: now(),
        }
    }
}

/// Parses a spreadsheet with a header row into atoms.
pub fn parse_csv(pipeline_id: Uuid, text: &str) -> Result<Vec<CsvAtom>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| PipelineError::Csv(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut atoms = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| PipelineError::Csv(err.to_string()))?;
        let values: Vec<&str> = record.iter().collect();
        atoms.push(CsvAtom {
            id: atom_id(pipeline_id, &[&row.to_string(), &values.join(",")]),
            row,
            columns: headers
                .iter()
                .cloned()
                .zip(values.iter().map(|value| value.to_string()))
                .collect(),
        });
    }
    Ok(atoms)
}

pub struct CsvPipeline<S> {
    id: Uuid,
    options: CsvPipelineOptions,
    store: S,
    issuer: PcdIssuer<S>,
    credentials: Arc<CredentialSubservice<S>>,
    capabilities: Vec<CapabilityDescriptor>,
    cancel: CancellationToken,
}

impl<S> CsvPipeline<S>
where
    S: PodboxStore,
{
    pub fn new(id: Uuid, options: CsvPipelineOptions, context: PipelineContext<S>) -> Self {
        let capabilities = vec![CapabilityDescriptor::FeedIssuance(
            options.feed_options.clone(),
        )];
        Self {
            id,
            issuer: PcdIssuer::new(id, context.signing_key, context.store.clone()),
            store: context.store,
            credentials: context.credentials,
            options,
            capabilities,
            cancel: CancellationToken::new(),
        }
    }

    /// Issues all rows as signed messages. A credential is optional but must be valid if given.
    pub async fn issue(&self, request: &FeedRequest) -> Result<FeedResponse, FeedError> {
        if let Some(credential) = &request.credential {
            let verified = self.credentials.verify_and_expect_email(credential).await?;
            debug!(pipeline_id = %self.id, email = %verified.email, "authenticated feed request");
        }

        if !self.store.has_loaded(self.id).await? {
            return Ok(FeedResponse::default());
        }

        let atoms: Vec<CsvAtom> = self.store.load(self.id).await?;
        let mut rows: Vec<&CsvAtom> = atoms.iter().collect();
        rows.sort_by_key(|atom| atom.row);

        let mut pcds = Vec::with_capacity(rows.len());
        for atom in rows {
            pcds.push(self.issuer.sign_message(atom.to_message()).await?);
        }

        Ok(FeedResponse {
            actions: vec![PcdAction::ReplaceInFolder {
                folder: self.options.feed_options.feed_folder.clone(),
                pcds,
            }],
        })
    }

    async fn load_inner(&self) -> Result<usize, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Stopped);
        }
        let atoms = parse_csv(self.id, &self.options.csv)?;

        write(&self.store, async |store| {
            store.replace(self.id, &atoms).await?;
            store.mark_as_loaded(self.id).await
        })
        .await?;

        Ok(atoms.len())
    }
}

impl<S> Pipeline for CsvPipeline<S>
where
    S: PodboxStore,
{
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Csv
    }

    fn capabilities(&self) -> &[CapabilityDescriptor] {
        &self.capabilities
    }

    async fn start(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn load(&self) -> LoadSummary {
        let log = LoadLog::new(self.id);
        match self.load_inner().await {
            Ok(rows) => log.succeed(rows, rows),
            Err(err) => log.fail(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use podbox_core::{MessageData, PcdType};
    use podbox_store::{AtomStore, MemoryStore};
    use uuid::Uuid;

    use crate::config::{CsvPipelineOptions, FeedOptions};
    use crate::feed::{FeedError, FeedRequest, PcdAction};
    use crate::pipeline::Pipeline;
    use crate::test_utils::{TestIssuer, test_context};

    use super::{CsvAtom, CsvPipeline, parse_csv};

    fn pipeline(csv: &str, store: MemoryStore, issuer: &TestIssuer) -> CsvPipeline<MemoryStore> {
        CsvPipeline::new(
            Uuid::new_v4(),
            CsvPipelineOptions {
                csv: csv.into(),
                feed_options: FeedOptions {
                    feed_id: "messages".into(),
                    feed_display_name: "Messages".into(),
                    feed_description: String::new(),
                    feed_folder: "Messages".into(),
                },
            },
            test_context(store, issuer),
        )
    }

    #[tokio::test]
    async fn rows_become_signed_messages() {
        let issuer = TestIssuer::new();
        let pipeline = pipeline(
            "title,body\nhello,world\nbye,moon\n",
            MemoryStore::default(),
            &issuer,
        );
        pipeline.start().await.unwrap();

        let summary = pipeline.load().await;
        assert!(summary.success);
        assert_eq!(summary.atoms_loaded, 2);

        let response = pipeline.issue(&FeedRequest::anonymous()).await.unwrap();
        assert_eq!(response.actions.len(), 1);
        let PcdAction::ReplaceInFolder { folder, pcds } = &response.actions[0] else {
            panic!("expected replace action");
        };
        assert_eq!(folder, "Messages");
        assert_eq!(pcds.len(), 2);
        assert!(pcds.iter().all(|pcd| pcd.pcd_type == PcdType::EddsaMessage));

        let first = pcds[0].decode::<MessageData>().unwrap();
        assert_eq!(first.payload.title, "hello");
        assert_eq!(first.payload.fields["body"], "world");

        // Credentials are optional, but checked when present.
        let response = pipeline
            .issue(&FeedRequest::with_credential(
                issuer.credential("panda@example.org"),
            ))
            .await
            .unwrap();
        assert_eq!(response.actions.len(), 1);

        let untrusted = TestIssuer::new();
        assert_matches!(
            pipeline
                .issue(&FeedRequest::with_credential(
                    untrusted.credential("panda@example.org")
                ))
                .await,
            Err(FeedError::Credential(_))
        );
    }

    #[test]
    fn reload_keeps_atom_ids() {
        let pipeline_id = Uuid::new_v4();
        let csv = "title,body\nhello,world\n";
        let first = parse_csv(pipeline_id, csv).unwrap();
        let second = parse_csv(pipeline_id, csv).unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0].id, parse_csv(Uuid::new_v4(), csv).unwrap()[0].id);
    }

    #[tokio::test]
    async fn malformed_spreadsheet_fails_without_writes() {
        let issuer = TestIssuer::new();
        let store = MemoryStore::default();
        let pipeline = pipeline("title,body\nhello,world,extra\n", store.clone(), &issuer);

        let summary = pipeline.load().await;
        assert!(!summary.success);
        assert!(summary.error.is_some());

        let atoms: Vec<CsvAtom> = store.load(pipeline.id).await.unwrap();
        assert!(atoms.is_empty());
        assert!(!store.has_loaded(pipeline.id).await.unwrap());

        let response = pipeline.issue(&FeedRequest::anonymous()).await.unwrap();
        assert!(response.actions.is_empty());
    }

    #[tokio::test]
    async fn stopped_pipeline_refuses_loads() {
        let issuer = TestIssuer::new();
        let pipeline = pipeline("title\nhello\n", MemoryStore::default(), &issuer);
        pipeline.stop();
        assert!(pipeline.is_stopped());

        let summary = pipeline.load().await;
        assert!(!summary.success);
        assert_eq!(summary.error.as_deref(), Some("pipeline was stopped"));
    }
}
