// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use podbox_core::PublicKey;
use podbox_store::sqlite::SqliteStore;
use podbox_store::{PodboxStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub use crate::builder::PodboxBuilder;
use crate::config::PipelineDefinition;
use crate::pipeline::{AnyPipeline, LoadSummary, Pipeline, PipelineContext, PipelineError};

type Pipelines<S> = HashMap<Uuid, Arc<AnyPipeline<S>>>;

/// Runs the pipelines of all tenants on one store.
pub struct Podbox<S> {
    context: PipelineContext<S>,
    pipelines: RwLock<Pipelines<S>>,
}

impl Podbox<SqliteStore<'static>> {
    pub fn builder() -> PodboxBuilder {
        PodboxBuilder::new()
    }

    /// Spawns the engine with an in-memory database and a random signing key.
    pub async fn spawn() -> Result<Self, PodboxError> {
        PodboxBuilder::new().spawn().await
    }
}

impl<S> Podbox<S>
where
    S: PodboxStore,
{
    pub(crate) fn new(context: PipelineContext<S>) -> Self {
        Self {
            context,
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.context.store
    }

    /// Key tickets and messages are signed with.
    pub fn public_key(&self) -> PublicKey {
        self.context.signing_key.public_key()
    }

    /// Instantiates and starts the pipeline of `definition`.
    ///
    /// A running pipeline with the same id is replaced and stopped.
    pub async fn spawn_pipeline(
        &self,
        definition: PipelineDefinition,
    ) -> Result<Arc<AnyPipeline<S>>, PodboxError> {
        let pipeline = Arc::new(AnyPipeline::from_definition(
            definition,
            self.context.clone(),
        )?);
        pipeline.start().await?;

        let replaced = self
            .pipelines
            .write()
            .expect("acquire write lock on pipelines")
            .insert(pipeline.id(), pipeline.clone());
        if let Some(replaced) = replaced {
            replaced.stop();
            debug!(pipeline_id = %pipeline.id(), "replaced running pipeline");
        }

        info!(pipeline_id = %pipeline.id(), kind = %pipeline.kind(), "started pipeline");
        Ok(pipeline)
    }

    pub fn pipeline(&self, id: Uuid) -> Option<Arc<AnyPipeline<S>>> {
        self.pipelines
            .read()
            .expect("acquire read lock on pipelines")
            .get(&id)
            .cloned()
    }

    pub fn pipelines(&self) -> Vec<Arc<AnyPipeline<S>>> {
        self.pipelines
            .read()
            .expect("acquire read lock on pipelines")
            .values()
            .cloned()
            .collect()
    }

    /// Runs one load cycle of the pipeline.
    pub async fn load(&self, id: Uuid) -> Result<LoadSummary, PodboxError> {
        let pipeline = self.pipeline(id).ok_or(PodboxError::UnknownPipeline(id))?;
        Ok(pipeline.load().await)
    }

    /// Runs one load cycle of every pipeline, one after another.
    pub async fn load_all(&self) -> Vec<LoadSummary> {
        let mut summaries = Vec::new();
        for pipeline in self.pipelines() {
            summaries.push(pipeline.load().await);
        }
        summaries
    }

    /// Stops the pipeline and removes it from the engine.
    pub fn stop(&self, id: Uuid) -> Result<(), PodboxError> {
        let pipeline = self
            .pipelines
            .write()
            .expect("acquire write lock on pipelines")
            .remove(&id)
            .ok_or(PodboxError::UnknownPipeline(id))?;
        pipeline.stop();
        info!(pipeline_id = %id, "stopped pipeline");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PodboxError {
    #[error("no pipeline with id {0}")]
    UnknownPipeline(Uuid),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
