// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::cbor::EncodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// This is a critical error as it indicates that something is wrong with the usage of this
    /// API: Queries using transactions can only ever occur if a transaction was started _before_.
    #[error("tried to interact with inexistant transaction")]
    TransactionMissing,

    /// A row with the same key already exists. Callers use this to detect races between
    /// concurrent writers (for example two check-ins of the same ticket).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// SQLite database and connection error.
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(sqlx::Error),

    /// SQL table schema migration error.
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// An error occurred while encoding bytes before storing them into the database. This is a
    /// critical error.
    #[error("failed encoding '{0}' value before storing to database: {1}")]
    Encode(String, EncodeError),

    /// Invalid, corrupted data was found in the database. This is a critical error.
    #[error("could not decode corrupted '{0}' value from database: {1}")]
    Decode(String, DecodeError),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(db_err.message().to_string());
            }
        }
        StoreError::Sqlite(err)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Cbor(#[from] podbox_core::cbor::DecodeError),

    #[error(transparent)]
    Hash(#[from] podbox_core::HashError),

    #[error(transparent)]
    Uuid(#[from] uuid::Error),

    #[error("negative integer can not be a timestamp or sequence number")]
    Negative,
}

/// Helpers to decode values coming from the database while tagging them with their column name.
pub(crate) fn decode_uuid(column: &str, value: &str) -> Result<uuid::Uuid, StoreError> {
    value
        .parse()
        .map_err(|err: uuid::Error| StoreError::Decode(column.into(), err.into()))
}

pub(crate) fn decode_hash(column: &str, value: &str) -> Result<podbox_core::Hash, StoreError> {
    value
        .parse()
        .map_err(|err: podbox_core::HashError| StoreError::Decode(column.into(), err.into()))
}

pub(crate) fn decode_u64(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Decode(column.into(), DecodeError::Negative))
}
