// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{FromRow, query, query_as};

use crate::error::{StoreError, decode_hash};
use crate::sqlite::SqliteStore;
use crate::users::{UserRecord, UserStore};

#[derive(FromRow)]
struct UserRow {
    email: String,
    commitment: String,
    auth_key: Option<String>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            email: row.email,
            commitment: decode_hash("commitment", &row.commitment)?,
            auth_key: row.auth_key,
        })
    }
}

impl<'a> UserStore for SqliteStore<'a> {
    async fn save_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.tx(async |tx| {
            query(
                "
                INSERT
                INTO
                    users_v1 (
                        email,
                        commitment,
                        auth_key
                    )
                VALUES
                    (?, ?, ?)
                ON CONFLICT (email) DO UPDATE SET
                    commitment = excluded.commitment,
                    auth_key = excluded.auth_key
                ",
            )
            .bind(user.email.to_lowercase())
            .bind(user.commitment.to_hex())
            .bind(user.auth_key.as_deref())
            .execute(&mut **tx)
            .await?;
            Ok(())
        })
        .await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, UserRow>(
                    "
                    SELECT
                        email,
                        commitment,
                        auth_key
                    FROM
                        users_v1
                    WHERE
                        email = ?
                    ",
                )
                .bind(email.to_lowercase())
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn user_by_auth_key(&self, auth_key: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = self
            .execute(async |pool| {
                let row = query_as::<_, UserRow>(
                    "
                    SELECT
                        email,
                        commitment,
                        auth_key
                    FROM
                        users_v1
                    WHERE
                        auth_key = ?
                    ",
                )
                .bind(auth_key)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(UserRecord::try_from).transpose()
    }
}
