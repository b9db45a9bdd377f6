// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Timestamp;
use sqlx::{query, query_as};

use crate::cache::CacheStore;
use crate::error::StoreError;
use crate::sqlite::SqliteStore;

impl<'a> CacheStore for SqliteStore<'a> {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, (String,)>(
                    "
                    SELECT
                        value
                    FROM
                        cache_v1
                    WHERE
                        cache_key = ?
                    ",
                )
                .bind(key)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_value(&self, key: &str, value: &str, now: Timestamp) -> Result<(), StoreError> {
        self.tx(async |tx| {
            query(
                "
                INSERT
                INTO
                    cache_v1 (
                        cache_key,
                        value,
                        time_created,
                        time_updated
                    )
                VALUES
                    (?, ?, ?, ?)
                ON CONFLICT (cache_key) DO UPDATE SET
                    value = excluded.value,
                    time_updated = excluded.time_updated
                ",
            )
            .bind(key)
            .bind(value)
            .bind(now as i64)
            .bind(now as i64)
            .execute(&mut **tx)
            .await?;
            Ok(())
        })
        .await
    }
}
