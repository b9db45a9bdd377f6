// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::cbor::{decode_cbor, encode_cbor};
use sqlx::{query, query_as};
use uuid::Uuid;

use crate::atoms::{Atom, AtomStore};
use crate::error::StoreError;
use crate::sqlite::SqliteStore;

fn decode<A: Atom>(row: (Vec<u8>,)) -> Result<A, StoreError> {
    decode_cbor(&row.0[..]).map_err(|err| StoreError::Decode("data".to_string(), err.into()))
}

impl<'a> AtomStore for SqliteStore<'a> {
    async fn clear(&self, pipeline_id: Uuid) -> Result<(), StoreError> {
        self.tx(async |tx| {
            query(
                "
                DELETE FROM
                    atoms_v1
                WHERE
                    pipeline_id = ?
                ",
            )
            .bind(pipeline_id.to_string())
            .execute(&mut **tx)
            .await?;
            Ok(())
        })
        .await
    }

    async fn save<A: Atom>(&self, pipeline_id: Uuid, atoms: &[A]) -> Result<(), StoreError> {
        if atoms.is_empty() {
            return Ok(());
        }

        self.tx(async |tx| {
            for atom in atoms {
                query(
                    "
                    INSERT OR REPLACE
                    INTO
                        atoms_v1 (
                            pipeline_id,
                            id,
                            email,
                            data
                        )
                    VALUES
                        (?, ?, ?, ?)
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(atom.id().to_string())
                .bind(atom.email().map(str::to_lowercase))
                .bind(
                    encode_cbor(atom)
                        .map_err(|err| StoreError::Encode("data".to_string(), err))?,
                )
                .execute(&mut **tx)
                .await?;
            }

            query(
                "
                INSERT OR IGNORE
                INTO
                    pipeline_loaded_v1 (
                        pipeline_id
                    )
                VALUES
                    (?)
                ",
            )
            .bind(pipeline_id.to_string())
            .execute(&mut **tx)
            .await?;

            Ok(())
        })
        .await
    }

    async fn load<A: Atom>(&self, pipeline_id: Uuid) -> Result<Vec<A>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, (Vec<u8>,)>(
                    "
                    SELECT
                        data
                    FROM
                        atoms_v1
                    WHERE
                        pipeline_id = ?
                    ORDER BY
                        id
                    ",
                )
                .bind(pipeline_id.to_string())
                .fetch_all(pool)
                .await?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn load_by_id<A: Atom>(
        &self,
        pipeline_id: Uuid,
        id: Uuid,
    ) -> Result<Option<A>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, (Vec<u8>,)>(
                    "
                    SELECT
                        data
                    FROM
                        atoms_v1
                    WHERE
                        pipeline_id = ?
                        AND id = ?
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(id.to_string())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;

        row.map(decode).transpose()
    }

    async fn load_by_email<A: Atom>(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> Result<Vec<A>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, (Vec<u8>,)>(
                    "
                    SELECT
                        data
                    FROM
                        atoms_v1
                    WHERE
                        pipeline_id = ?
                        AND email = ?
                    ORDER BY
                        id
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(email.to_lowercase())
                .fetch_all(pool)
                .await?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn mark_as_loaded(&self, pipeline_id: Uuid) -> Result<(), StoreError> {
        self.tx(async |tx| {
            query(
                "
                INSERT OR IGNORE
                INTO
                    pipeline_loaded_v1 (
                        pipeline_id
                    )
                VALUES
                    (?)
                ",
            )
            .bind(pipeline_id.to_string())
            .execute(&mut **tx)
            .await?;
            Ok(())
        })
        .await
    }

    async fn has_loaded(&self, pipeline_id: Uuid) -> Result<bool, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query(
                    "
                    SELECT
                        1
                    FROM
                        pipeline_loaded_v1
                    WHERE
                        pipeline_id = ?
                    ",
                )
                .bind(pipeline_id.to_string())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        Ok(row.is_some())
    }
}
