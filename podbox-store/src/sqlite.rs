// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite backend for all Podbox stores.
use std::sync::Arc;

use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, migrate};
use tokio::sync::{Mutex, Semaphore};

use crate::error::StoreError;
use crate::traits::TransactionPermit;

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Create SQLite database if it doesn't already exist.
pub async fn create_database(url: &str) -> Result<(), StoreError> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?
    }
    Ok(())
}

/// Drop SQLite database if it exists.
pub async fn drop_database(url: &str) -> Result<(), StoreError> {
    if Sqlite::database_exists(url).await? {
        Sqlite::drop_database(url).await?
    }
    Ok(())
}

/// Embedded table migrations of all Podbox stores.
pub fn migrations() -> Migrator {
    migrate!()
}

/// Run any pending database migrations.
pub async fn run_pending_migrations(pool: &sqlx::SqlitePool) -> Result<(), StoreError> {
    migrations().run(pool).await?;
    Ok(())
}

pub struct SqliteStoreBuilder {
    url: String,
    max_connections: u32,
    run_migrations: bool,
    create_database: bool,
}

impl Default for SqliteStoreBuilder {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            create_database: true,
            run_migrations: true,
        }
    }
}

impl SqliteStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a private in-memory database with a random name.
    ///
    /// Plain `sqlite::memory:` urls are shared between pools of the same process, which mixes up
    /// state of concurrently running tests. See: https://github.com/launchbadge/sqlx/issues/2510
    #[cfg(any(test, feature = "test_utils"))]
    pub fn random_memory_url(mut self) -> Self {
        self.url = format!(
            "sqlite://podbox{}?mode=memory&cache=private",
            rand::random::<u32>()
        );
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_database(mut self, create_database: bool) -> Self {
        self.create_database = create_database;
        self
    }

    pub fn run_default_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    pub async fn build<'a>(self) -> Result<SqliteStore<'a>, StoreError> {
        if self.create_database {
            create_database(&self.url).await?;
        }

        let pool: sqlx::SqlitePool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await?;

        if self.run_migrations {
            run_pending_migrations(&pool).await?;
        }

        Ok(SqliteStore::new(pool))
    }
}

pub type Transaction<'a> = sqlx::Transaction<'a, Sqlite>;

/// SQLite database with connection pool and a single shared write transaction.
///
/// Clones share the pool and the transaction slot. SQLite serializes writing transactions, so a
/// writer first acquires a [`TransactionPermit`] with `begin` and holds it until `commit` or
/// `rollback`. Store methods which write use `tx` and fail with
/// [`StoreError::TransactionMissing`] when no transaction was started. Reads use `execute` and
/// only ever see committed state.
///
/// With a pool of one connection an open transaction occupies that connection. Reading through
/// `execute` while holding the permit in the same task therefore never resolves.
///
/// ```text
/// writer:  begin --> tx(write) --> tx(write) --> commit
/// reader:                 execute(read) ..................> sees state before `begin`
/// ```
#[derive(Clone, Debug)]
pub struct SqliteStore<'a> {
    tx: Arc<Mutex<Option<Transaction<'a>>>>,
    pool: sqlx::SqlitePool,
    semaphore: Arc<Semaphore>,
}

impl<'a> SqliteStore<'a> {
    pub(crate) fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            tx: Arc::default(),
            pool,
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// In-memory SQLite database with a random name, for tests.
    #[cfg(any(test, feature = "test_utils"))]
    pub async fn temporary() -> Self {
        SqliteStoreBuilder::new()
            .random_memory_url()
            .max_connections(1)
            .build()
            .await
            .expect("migrations succeeded")
    }

    /// Execute SQL query within the current transaction.
    ///
    /// Failing queries do not roll back the transaction automatically, the permit holder decides.
    pub async fn tx<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: AsyncFnOnce(&mut Transaction) -> Result<R, StoreError>,
    {
        let mut tx_ref = self.tx.lock().await;
        let tx = tx_ref.as_mut().ok_or(StoreError::TransactionMissing)?;

        f(tx).await
    }

    /// Execute SQL query directly against the pool.
    pub async fn execute<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: AsyncFnOnce(&sqlx::SqlitePool) -> Result<R, StoreError>,
    {
        f(&self.pool).await
    }
}

impl<'a> crate::traits::Transaction for SqliteStore<'a> {
    type Error = StoreError;

    type Permit = TransactionPermit;

    /// Waits until no other writer holds the permit, then opens a transaction on the pool.
    async fn begin(&self) -> Result<TransactionPermit, StoreError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore lives as long as the store");

        let mut tx_ref = self.tx.lock().await;
        assert!(
            tx_ref.is_none(),
            "transaction slot is empty when the permit was free"
        );

        let tx = self.pool.begin().await?;
        tx_ref.replace(tx);

        Ok(TransactionPermit(permit))
    }

    async fn rollback(&self, permit: TransactionPermit) -> Result<(), StoreError> {
        let Some(tx) = self.tx.lock().await.take() else {
            panic!("permit holder always has a transaction")
        };

        let result = tx.rollback().await.map_err(StoreError::from);

        // Free the permit both on success and failure.
        drop(permit);

        result
    }

    async fn commit(&self, permit: TransactionPermit) -> Result<(), StoreError> {
        let Some(tx) = self.tx.lock().await.take() else {
            panic!("permit holder always has a transaction")
        };

        let result = tx.commit().await.map_err(StoreError::from);

        drop(permit);

        result
    }
}

#[cfg(test)]
mod tests {
    use std::task::Poll;

    use futures_test::task::noop_context;
    use sqlx::{query, query_as};
    use tokio::pin;

    use crate::error::StoreError;
    use crate::sqlite::SqliteStore;
    use crate::traits::Transaction;

    #[tokio::test]
    async fn writes_require_a_transaction() {
        let store = SqliteStore::temporary().await;

        assert!(matches!(
            store.tx(async |_| Ok(())).await,
            Err(StoreError::TransactionMissing)
        ));

        let permit = store.begin().await.unwrap();

        // A second writer has to wait for the permit.
        assert!(matches!(
            {
                let fut = store.begin();
                let mut cx = noop_context();
                pin!(fut);
                fut.poll(&mut cx)
            },
            Poll::Pending
        ));

        assert!(store.tx(async |_| Ok(())).await.is_ok());
        store.commit(permit).await.unwrap();

        assert!(matches!(
            store.tx(async |_| Ok(())).await,
            Err(StoreError::TransactionMissing)
        ));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = SqliteStore::temporary().await;

        let permit = store.begin().await.unwrap();
        store
            .tx(async |tx| {
                query("INSERT INTO pipeline_loaded_v1 (pipeline_id) VALUES ('a')")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            })
            .await
            .unwrap();
        store.rollback(permit).await.unwrap();

        let count = store
            .execute(async |pool| {
                let row: (i64,) = query_as("SELECT COUNT(*) FROM pipeline_loaded_v1")
                    .fetch_one(pool)
                    .await?;
                Ok(row.0)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn duplicate_keys_map_to_unique_violation() {
        let store = SqliteStore::temporary().await;

        let permit = store.begin().await.unwrap();
        let result = store
            .tx(async |tx| {
                for _ in 0..2 {
                    query("INSERT INTO pipeline_loaded_v1 (pipeline_id) VALUES ('a')")
                        .execute(&mut **tx)
                        .await?;
                }
                Ok(())
            })
            .await;
        store.rollback(permit).await.unwrap();

        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
    }
}
