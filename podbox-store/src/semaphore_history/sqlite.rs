// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::{Hash, Timestamp};
use sqlx::{FromRow, query, query_as};
use uuid::Uuid;

use crate::error::{StoreError, decode_hash, decode_u64, decode_uuid};
use crate::semaphore_history::{HistoryEntry, SemaphoreHistoryStore};
use crate::sqlite::SqliteStore;

#[derive(FromRow)]
struct HistoryRow {
    sequence: i64,
    pipeline_id: String,
    group_id: String,
    root_hash: String,
    serialized_group: String,
    time_created: i64,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            pipeline_id: decode_uuid("pipeline_id", &row.pipeline_id)?,
            group_id: decode_uuid("group_id", &row.group_id)?,
            sequence: decode_u64("sequence", row.sequence)?,
            root_hash: decode_hash("root_hash", &row.root_hash)?,
            serialized_group: row.serialized_group,
            time_created: decode_u64("time_created", row.time_created)?,
        })
    }
}

impl<'a> SemaphoreHistoryStore for SqliteStore<'a> {
    async fn add_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: Hash,
        serialized_group: &str,
        now: Timestamp,
    ) -> Result<HistoryEntry, StoreError> {
        let row = self
            .tx(async |tx| {
                let row = query_as::<_, HistoryRow>(
                    "
                    INSERT
                    INTO
                        semaphore_history_v1 (
                            pipeline_id,
                            group_id,
                            root_hash,
                            serialized_group,
                            time_created
                        )
                    VALUES
                        (?, ?, ?, ?, ?)
                    RETURNING
                        sequence,
                        pipeline_id,
                        group_id,
                        root_hash,
                        serialized_group,
                        time_created
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(group_id.to_string())
                .bind(root_hash.to_hex())
                .bind(serialized_group)
                .bind(now as i64)
                .fetch_one(&mut **tx)
                .await?;
                Ok(row)
            })
            .await?;
        row.try_into()
    }

    async fn latest_history_entry(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, HistoryRow>(
                    "
                    SELECT
                        sequence,
                        pipeline_id,
                        group_id,
                        root_hash,
                        serialized_group,
                        time_created
                    FROM
                        semaphore_history_v1
                    WHERE
                        pipeline_id = ?
                        AND group_id = ?
                    ORDER BY
                        sequence DESC
                    LIMIT
                        1
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(group_id.to_string())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(HistoryEntry::try_from).transpose()
    }

    async fn history_entry_by_root(
        &self,
        pipeline_id: Uuid,
        group_id: Uuid,
        root_hash: &Hash,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, HistoryRow>(
                    "
                    SELECT
                        sequence,
                        pipeline_id,
                        group_id,
                        root_hash,
                        serialized_group,
                        time_created
                    FROM
                        semaphore_history_v1
                    WHERE
                        pipeline_id = ?
                        AND group_id = ?
                        AND root_hash = ?
                    ORDER BY
                        sequence DESC
                    LIMIT
                        1
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(group_id.to_string())
                .bind(root_hash.to_hex())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(HistoryEntry::try_from).transpose()
    }

    async fn history_group_ids(&self, pipeline_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, (String,)>(
                    "
                    SELECT DISTINCT
                        group_id
                    FROM
                        semaphore_history_v1
                    WHERE
                        pipeline_id = ?
                    ORDER BY
                        group_id
                    ",
                )
                .bind(pipeline_id.to_string())
                .fetch_all(pool)
                .await?;
                Ok(rows)
            })
            .await?;
        rows.iter()
            .map(|(group_id,)| decode_uuid("group_id", group_id))
            .collect()
    }

    async fn delete_history(&self, pipeline_id: Uuid, group_id: Uuid) -> Result<bool, StoreError> {
        let result = self
            .tx(async |tx| {
                let result = query(
                    "
                    DELETE FROM
                        semaphore_history_v1
                    WHERE
                        pipeline_id = ?
                        AND group_id = ?
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(group_id.to_string())
                .execute(&mut **tx)
                .await?;
                Ok(result)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
