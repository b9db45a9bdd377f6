// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::StoreError;

/// Normalized record derived from one external ticket, order position or spreadsheet row.
pub trait Atom: Serialize + DeserializeOwned {
    /// Stable identifier, equal across reloads of the same external record.
    fn id(&self) -> Uuid;

    /// Email of the attendee, if known.
    fn email(&self) -> Option<&str>;
}

/// Per-pipeline cache of atoms, indexed by id and by lower-cased email.
pub trait AtomStore {
    /// Removes all atoms of a pipeline. The pipeline stays marked as loaded.
    fn clear(&self, pipeline_id: Uuid) -> impl Future<Output = Result<(), StoreError>>;

    /// Inserts or overwrites atoms. A non-empty save marks the pipeline as loaded.
    fn save<A: Atom>(
        &self,
        pipeline_id: Uuid,
        atoms: &[A],
    ) -> impl Future<Output = Result<(), StoreError>>;

    /// Replaces the full atom set of a pipeline.
    ///
    /// Call this inside a transaction so readers never observe a partially written set.
    fn replace<A: Atom>(
        &self,
        pipeline_id: Uuid,
        atoms: &[A],
    ) -> impl Future<Output = Result<(), StoreError>> {
        async move {
            self.clear(pipeline_id).await?;
            self.save(pipeline_id, atoms).await
        }
    }

    /// All atoms of a pipeline, ordered by id.
    fn load<A: Atom>(&self, pipeline_id: Uuid) -> impl Future<Output = Result<Vec<A>, StoreError>>;

    fn load_by_id<A: Atom>(
        &self,
        pipeline_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<A>, StoreError>>;

    /// Atoms with the given email, compared case-insensitively.
    fn load_by_email<A: Atom>(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> impl Future<Output = Result<Vec<A>, StoreError>>;

    fn mark_as_loaded(&self, pipeline_id: Uuid) -> impl Future<Output = Result<(), StoreError>>;

    /// Returns `true` once atoms were saved for this pipeline at least once.
    fn has_loaded(&self, pipeline_id: Uuid) -> impl Future<Output = Result<bool, StoreError>>;
}
