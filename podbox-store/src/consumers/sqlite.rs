// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::{Commitment, Timestamp};
use sqlx::{FromRow, QueryBuilder, Sqlite, query};
use uuid::Uuid;

use crate::consumers::{Consumer, ConsumerStore};
use crate::error::{StoreError, decode_hash, decode_u64, decode_uuid};
use crate::sqlite::SqliteStore;

#[derive(FromRow)]
struct ConsumerRow {
    pipeline_id: String,
    email: String,
    commitment: String,
    time_created: i64,
    time_updated: i64,
}

impl TryFrom<ConsumerRow> for Consumer {
    type Error = StoreError;

    fn try_from(row: ConsumerRow) -> Result<Self, Self::Error> {
        Ok(Consumer {
            pipeline_id: decode_uuid("pipeline_id", &row.pipeline_id)?,
            email: row.email,
            commitment: decode_hash("commitment", &row.commitment)?,
            time_created: decode_u64("time_created", row.time_created)?,
            time_updated: decode_u64("time_updated", row.time_updated)?,
        })
    }
}

impl<'a> ConsumerStore for SqliteStore<'a> {
    async fn save_consumer(
        &self,
        pipeline_id: Uuid,
        email: &str,
        commitment: Commitment,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let result = self
            .tx(async |tx| {
                let result = query(
                    "
                    INSERT
                    INTO
                        consumers_v1 (
                            pipeline_id,
                            email,
                            commitment,
                            time_created,
                            time_updated
                        )
                    VALUES
                        (?, ?, ?, ?, ?)
                    ON CONFLICT (pipeline_id, email) DO UPDATE SET
                        commitment = excluded.commitment,
                        time_updated = excluded.time_updated
                    WHERE
                        consumers_v1.commitment != excluded.commitment
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(email.to_lowercase())
                .bind(commitment.to_hex())
                .bind(now as i64)
                .bind(now as i64)
                .execute(&mut **tx)
                .await?;
                Ok(result)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_consumers_by_emails(
        &self,
        pipeline_id: Uuid,
        emails: &[String],
    ) -> Result<Vec<Consumer>, StoreError> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .execute(async |pool| {
                let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "
                    SELECT
                        pipeline_id,
                        email,
                        commitment,
                        time_created,
                        time_updated
                    FROM
                        consumers_v1
                    WHERE
                        pipeline_id = ",
                );
                builder.push_bind(pipeline_id.to_string());
                builder.push(" AND email IN (");
                let mut separated = builder.separated(", ");
                for email in emails {
                    separated.push_bind(email.to_lowercase());
                }
                separated.push_unseparated(") ORDER BY email");

                let rows = builder
                    .build_query_as::<ConsumerRow>()
                    .fetch_all(pool)
                    .await?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(Consumer::try_from).collect()
    }

    async fn load_consumers(&self, pipeline_id: Uuid) -> Result<Vec<Consumer>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = sqlx::query_as::<_, ConsumerRow>(
                    "
                    SELECT
                        pipeline_id,
                        email,
                        commitment,
                        time_created,
                        time_updated
                    FROM
                        consumers_v1
                    WHERE
                        pipeline_id = ?
                    ORDER BY
                        email
                    ",
                )
                .bind(pipeline_id.to_string())
                .fetch_all(pool)
                .await?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(Consumer::try_from).collect()
    }
}
