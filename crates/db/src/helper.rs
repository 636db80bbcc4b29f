//! `DbHelper` — pool ownership, target resolution and the query verbs.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Connection as _, FromRow, PgPool};
use tracing::{debug, info, instrument};

use crate::copy::{CopyRow, Identifier};
use crate::querier::TxGuard;
use crate::{Args, Batch, DbConfig, DbError, Querier, Scope};

/// Wrapper around a Postgres pool that routes every statement to the
/// transaction carried by the caller's [`Scope`], or to the pool when there
/// is none.
///
/// Clones share the same pool.
#[derive(Debug, Clone, Default)]
pub struct DbHelper {
    pool: Option<PgPool>,
    config: DbConfig,
}

impl DbHelper {
    /// An unconnected helper with default pool limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unconnected helper with the given pool limits.
    pub fn with_config(config: DbConfig) -> Self {
        Self { pool: None, config }
    }

    /// A helper around an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Some(pool),
            config: DbConfig::default(),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The owned pool.
    pub fn pool(&self) -> Result<&PgPool, DbError> {
        self.pool.as_ref().ok_or(DbError::NotConnected)
    }

    /// Parses `url`, creates the pool and checks that the database is reachable.
    ///
    /// Pool creation is bounded by `timeout`; on failure no pool is kept.
    /// A pool from an earlier `connect` is closed once `url` parses.
    #[instrument(skip_all, err)]
    pub async fn connect(&mut self, url: &str, timeout: Duration) -> Result<(), DbError> {
        let options = PgConnectOptions::from_str(url).map_err(DbError::ParseConfig)?;

        if let Some(previous) = self.pool.take() {
            previous.close().await;
            debug!("Previous database pool closed");
        }

        info!(
            max_connections = self.config.max_connections,
            "Connecting to database"
        );
        let pool = tokio::time::timeout(timeout, self.config.pool_options().connect_with(options))
            .await
            .map_err(|_| DbError::PoolCreationTimeout(timeout))?
            .map_err(DbError::PoolCreation)?;
        self.pool = Some(pool);

        self.ping(&Scope::new().with_timeout(timeout)).await
    }

    /// Round-trips to the server and checks that the configured database exists.
    #[instrument(skip_all, err)]
    pub async fn ping(&self, scope: &Scope) -> Result<(), DbError> {
        let pool = self.pool()?;
        let database = database_name(pool);

        scope
            .guard(async {
                let mut conn = pool.acquire().await.map_err(DbError::Ping)?;
                conn.ping().await.map_err(DbError::Ping)?;

                let found = sqlx::query("SELECT 1 AS result FROM pg_database WHERE datname = $1")
                    .bind(&database)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::Ping)?;

                match found {
                    Some(_) => Ok(()),
                    None => Err(DbError::DatabaseNotFound(database.clone())),
                }
            })
            .await
    }

    /// Closes every pooled connection. Call once, at shutdown.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }

    /// Resolves where the next statement for `scope` runs: the scope's
    /// transaction if it carries one, the pool otherwise.
    pub async fn querier(&self, scope: &Scope) -> Result<Querier, DbError> {
        if let Some(tx) = scope.transaction() {
            debug!(?tx, "Using scoped transaction");
            return Ok(Querier::Tx(TxGuard::new(tx.lock().await)));
        }
        Ok(Querier::Pool(self.pool()?.clone()))
    }

    /// Fetches exactly one row into `T`.
    ///
    /// An empty result is reported as [`DbError::NoRows`], more than one row
    /// as [`DbError::TooManyRows`]. Columns without a matching field are
    /// ignored.
    pub async fn get<T>(&self, scope: &Scope, sql: &str, args: Args) -> Result<T, DbError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        scope
            .guard(async {
                let row = self.querier(scope).await?.fetch_one(sql, args).await?;
                T::from_row(&row).map_err(DbError::Query)
            })
            .await
    }

    /// Fetches every row into a `Vec<T>`. An empty result is an empty vector.
    pub async fn select<T>(&self, scope: &Scope, sql: &str, args: Args) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        scope
            .guard(async {
                let rows = self.querier(scope).await?.fetch_all(sql, args).await?;
                rows.iter()
                    .map(|row| T::from_row(row).map_err(DbError::Query))
                    .collect()
            })
            .await
    }

    /// Executes a statement that returns no rows, such as INSERT, UPDATE or
    /// DELETE, and returns the number of rows affected.
    ///
    /// Every failure displays as `exec failed: ...`; [`DbError::root`] gives
    /// the underlying error.
    pub async fn exec(&self, scope: &Scope, sql: &str, args: Args) -> Result<u64, DbError> {
        scope
            .guard(async { self.querier(scope).await?.execute(sql, args).await })
            .await
            .map_err(DbError::in_exec)
    }

    /// Runs `batch` on the scope's target. See [`Querier::send_batch`].
    pub async fn send_batch(&self, scope: &Scope, batch: Batch) -> Result<Vec<u64>, DbError> {
        scope
            .guard(async { self.querier(scope).await?.send_batch(batch).await })
            .await
    }

    /// Bulk loads `rows` into `table`. See [`Querier::copy_from`].
    pub async fn copy_from<I>(
        &self,
        scope: &Scope,
        table: &Identifier,
        columns: &[&str],
        rows: I,
    ) -> Result<u64, DbError>
    where
        I: IntoIterator<Item = CopyRow>,
    {
        scope
            .guard(async {
                self.querier(scope)
                    .await?
                    .copy_from(table, columns, rows)
                    .await
            })
            .await
    }
}

/// The database the pool connects to; Postgres falls back to the user name.
fn database_name(pool: &PgPool) -> String {
    let options = pool.connect_options();
    options
        .get_database()
        .unwrap_or_else(|| options.get_username())
        .to_owned()
}
