// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::cbor::{decode_cbor, encode_cbor};
use sqlx::{query, query_as};
use uuid::Uuid;

use crate::error::StoreError;
use crate::manual_tickets::{ManualTicket, ManualTicketStore};
use crate::sqlite::SqliteStore;

fn decode(row: (Vec<u8>,)) -> Result<ManualTicket, StoreError> {
    decode_cbor(&row.0[..]).map_err(|err| StoreError::Decode("data".to_string(), err.into()))
}

impl<'a> ManualTicketStore for SqliteStore<'a> {
    async fn save_manual_tickets(
        &self,
        pipeline_id: Uuid,
        tickets: &[ManualTicket],
    ) -> Result<(), StoreError> {
        self.tx(async |tx| {
            for ticket in tickets {
                query(
                    "
                    INSERT OR REPLACE
                    INTO
                        manual_tickets_v1 (
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
                .bind(ticket.id.to_string())
                .bind(ticket.attendee_email.to_lowercase())
                .bind(
                    encode_cbor(ticket)
                        .map_err(|err| StoreError::Encode("data".to_string(), err))?,
                )
                .execute(&mut **tx)
                .await?;
            }
            Ok(())
        })
        .await
    }

    async fn load_manual_tickets(&self, pipeline_id: Uuid) -> Result<Vec<ManualTicket>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, (Vec<u8>,)>(
                    "
                    SELECT
                        data
                    FROM
                        manual_tickets_v1
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

    async fn load_manual_tickets_by_email(
        &self,
        pipeline_id: Uuid,
        email: &str,
    ) -> Result<Vec<ManualTicket>, StoreError> {
        let rows = self
            .execute(async |pool| {
                let rows = query_as::<_, (Vec<u8>,)>(
                    "
                    SELECT
                        data
                    FROM
                        manual_tickets_v1
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
}
