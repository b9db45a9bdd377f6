// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;

use podbox_core::cbor::{decode_cbor, encode_cbor};
use uuid::Uuid;

use crate::atoms::{Atom, AtomStore};
use crate::error::StoreError;
use crate::memory::{MemoryStore, StoredAtom};

fn encode<A: Atom>(atom: &A) -> Result<(Uuid, StoredAtom), StoreError> {
    let bytes = encode_cbor(atom).map_err(|err| StoreError::Encode("atom".to_string(), err))?;
    Ok((atom.id(), (atom.email().map(str::to_lowercase), bytes)))
}

fn decode<A: Atom>(bytes: &[u8]) -> Result<A, StoreError> {
    decode_cbor(bytes).map_err(|err| StoreError::Decode("atom".to_string(), err.into()))
}

impl AtomStore for MemoryStore {
    async fn clear(&self, pipeline_id: Uuid) -> Result<(), StoreError> {
        self.write_store().atoms.remove(&pipeline_id);
        Ok(())
    }

    async fn save<A: Atom>(&self, pipeline_id: Uuid, atoms: &[A]) -> Result<(), StoreError> {
        let encoded = atoms.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        let mut store = self.write_store();
        if !encoded.is_empty() {
            store.loaded.insert(pipeline_id);
        }
        store.atoms.entry(pipeline_id).or_default().extend(encoded);
        Ok(())
    }

    async fn replace<A: Atom>(&self, pipeline_id: Uuid, atoms: &[A]) -> Result<(), StoreError> {
        let encoded = atoms
            .iter()
            .map(encode)
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        // One write lock for both steps, readers never see an empty set in between.
        let mut store = self.write_store();
        if !encoded.is_empty() {
            store.loaded.insert(pipeline_id);
        }
        store.atoms.insert(pipeline_id, encoded);
        Ok(())
    }

    async fn load<A: Atom>(&self, pipeline_id: Uuid) -> Result<Vec<A>, StoreError> {
        let store = self.read_store();
        let Some(atoms) = store.atoms.get(&pipeline_id) else {
            return Ok(Vec::new());
        };
        atoms.values().map(|(_, bytes)| decode(bytes)).collect()
    }

    async fn load_by_id<A: Atom>(
        &self,
        pipeline_id: Uuid,
        id: Uuid,
    ) -> Result<Option<A>, StoreError> {
        let store = self.read_store();
        store
            .atoms
            .get(&pipeline_id)
            .and_then(|atoms| atoms.get(&id))
            .map(|(_, bytes)| decode(bytes))
            .transpose()
    }

    async fn load_by_email<A: Atom>(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> Result<Vec<A>, StoreError> {
        let email = email.to_lowercase();
        let store = self.read_store();
        let Some(atoms) = store.atoms.get(&pipeline_id) else {
            return Ok(Vec::new());
        };
        atoms
            .values()
            .filter(|(atom_email, _)| atom_email.as_deref() == Some(email.as_str()))
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    async fn mark_as_loaded(&self, pipeline_id: Uuid) -> Result<(), StoreError> {
        self.write_store().loaded.insert(pipeline_id);
        Ok(())
    }

    async fn has_loaded(&self, pipeline_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.read_store().loaded.contains(&pipeline_id))
    }
}
