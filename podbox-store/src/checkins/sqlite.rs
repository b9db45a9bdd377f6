// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{FromRow, query, query_as};
use uuid::Uuid;

use crate::checkins::{CheckinRecord, CheckinStore};
use crate::error::{StoreError, decode_u64, decode_uuid};
use crate::sqlite::SqliteStore;

#[derive(FromRow)]
struct CheckinRow {
    pipeline_id: String,
    ticket_id: String,
    checker_email: String,
    timestamp: i64,
}

impl TryFrom<CheckinRow> for CheckinRecord {
    type Error = StoreError;

    fn try_from(row: CheckinRow) -> Result<Self, Self::Error> {
        Ok(CheckinRecord {
            pipeline_id: decode_uuid("pipeline_id", &row.pipeline_id)?,
            ticket_id: decode_uuid("ticket_id", &row.ticket_id)?,
            checker_email: row.checker_email,
            timestamp: decode_u64("timestamp", row.timestamp)?,
        })
    }
}

impl<'a> CheckinStore for SqliteStore<'a> {
    async fn add_checkin(&self, record: CheckinRecord) -> Result<(), StoreError> {
        self.tx(async |tx| {
            query(
                "
                INSERT
                INTO
                    checkins_v1 (
                        pipeline_id,
                        ticket_id,
                        checker_email,
                        timestamp
                    )
                VALUES
                    (?, ?, ?, ?)
                ",
            )
            .bind(record.pipeline_id.to_string())
            .bind(record.ticket_id.to_string())
            .bind(record.checker_email.as_str())
            .bind(record.timestamp as i64)
            .execute(&mut **tx)
            .await?;
            Ok(())
        })
        .await
    }

    async fn checkin(
        &self,
        pipeline_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, CheckinRow>(
                    "
                    SELECT
                        pipeline_id,
                        ticket_id,
                        checker_email,
                        timestamp
                    FROM
                        checkins_v1
                    WHERE
                        pipeline_id = ?
                        AND ticket_id = ?
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(ticket_id.to_string())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(CheckinRecord::try_from).transpose()
    }

    async fn checkins(&self, pipeline_id: Uuid) -> Result<Vec<CheckinRecord>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, CheckinRow>(
                    "
                    SELECT
                        pipeline_id,
                        ticket_id,
                        checker_email,
                        timestamp
                    FROM
                        checkins_v1
                    WHERE
                        pipeline_id = ?
                    ORDER BY
                        ticket_id
                    ",
                )
                .bind(pipeline_id.to_string())
                .fetch_all(pool)
                .await?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(CheckinRecord::try_from).collect()
    }

    async fn delete_checkin(&self, pipeline_id: Uuid, ticket_id: Uuid) -> Result<bool, StoreError> {
        let result = self
            .tx(async |tx| {
                let result = query(
                    "
                    DELETE FROM
                        checkins_v1
                    WHERE
                        pipeline_id = ?
                        AND ticket_id = ?
                    ",
                )
                .bind(pipeline_id.to_string())
                .bind(ticket_id.to_string())
                .execute(&mut **tx)
                .await?;
                Ok(result)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
