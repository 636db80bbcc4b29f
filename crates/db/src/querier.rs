//! Execution targets: the pool or the transaction attached to a scope.

use std::fmt;

use sqlx::postgres::{PgPoolCopyExt, PgRow};
use sqlx::{PgConnection, PgPool};
use tokio::sync::OwnedMutexGuard;

use crate::copy::{self, CopyRow, Identifier};
use crate::scope::PgTransaction;
use crate::{Args, Batch, DbError};

/// Where a statement runs. Both variants support the same operations.
///
/// A `Tx` querier holds the transaction exclusively until it is dropped, so
/// keep it for one operation and resolve a new one for the next.
pub enum Querier {
    Pool(PgPool),
    Tx(TxGuard),
}

/// Exclusive access to a scoped transaction for statement execution.
///
/// The transaction itself stays out of reach: commit and rollback belong to
/// the runner that opened it.
///
/// ```compile_fail
/// # async fn leak(db: &db::DbHelper, scope: &db::Scope) -> Result<(), db::DbError> {
/// if let db::Querier::Tx(mut guard) = db.querier(scope).await? {
///     let _tx = guard.inner.take();
/// }
/// # Ok(())
/// # }
/// ```
pub struct TxGuard {
    inner: OwnedMutexGuard<Option<PgTransaction>>,
}

impl TxGuard {
    pub(crate) fn new(inner: OwnedMutexGuard<Option<PgTransaction>>) -> Self {
        Self { inner }
    }

    fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        match self.inner.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(DbError::TransactionClosed),
        }
    }
}

impl fmt::Debug for TxGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.inner.is_some() { "open" } else { "closed" };
        f.debug_tuple("TxGuard").field(&state).finish()
    }
}

impl Querier {
    pub fn is_transaction(&self) -> bool {
        matches!(self, Querier::Tx(_))
    }

    /// Executes a statement that returns no rows and reports the affected-row count.
    pub async fn execute(&mut self, sql: &str, args: Args) -> Result<u64, DbError> {
        let args = args.into_inner()?;
        let query = sqlx::query_with(sql, args);
        let done = match self {
            Querier::Pool(pool) => query.execute(&*pool).await,
            Querier::Tx(guard) => query.execute(guard.conn()?).await,
        };
        done.map(|d| d.rows_affected()).map_err(DbError::Exec)
    }

    /// Fetches every row of the result.
    pub async fn fetch_all(&mut self, sql: &str, args: Args) -> Result<Vec<PgRow>, DbError> {
        let args = args.into_inner()?;
        let query = sqlx::query_with(sql, args);
        let rows = match self {
            Querier::Pool(pool) => query.fetch_all(&*pool).await,
            Querier::Tx(guard) => query.fetch_all(guard.conn()?).await,
        };
        rows.map_err(DbError::Query)
    }

    /// Fetches the single row of the result.
    ///
    /// An empty result is [`DbError::NoRows`]; more than one row is
    /// [`DbError::TooManyRows`].
    pub async fn fetch_one(&mut self, sql: &str, args: Args) -> Result<PgRow, DbError> {
        exactly_one(self.fetch_all(sql, args).await?)
    }

    /// Runs a batch on one connection.
    ///
    /// On the pool the batch is all-or-nothing; in a transaction it simply
    /// joins the transaction.
    pub async fn send_batch(&mut self, batch: Batch) -> Result<Vec<u64>, DbError> {
        match self {
            Querier::Pool(pool) => {
                let mut tx = pool.begin().await.map_err(DbError::Begin)?;
                let counts = batch.run(&mut tx).await?;
                tx.commit().await.map_err(DbError::Commit)?;
                Ok(counts)
            }
            Querier::Tx(guard) => batch.run(guard.conn()?).await,
        }
    }

    /// Bulk loads `rows` into `table` and returns the number of rows copied.
    pub async fn copy_from<I>(
        &mut self,
        table: &Identifier,
        columns: &[&str],
        rows: I,
    ) -> Result<u64, DbError>
    where
        I: IntoIterator<Item = CopyRow>,
    {
        let data = copy::encode_rows(rows, columns.len())?;
        let statement = copy::copy_statement(table, columns);
        match self {
            Querier::Pool(pool) => {
                let copy_in = pool.copy_in_raw(&statement).await.map_err(DbError::Copy)?;
                copy::stream(copy_in, data).await
            }
            Querier::Tx(guard) => {
                let copy_in = guard.conn()?
                    .copy_in_raw(&statement)
                    .await
                    .map_err(DbError::Copy)?;
                copy::stream(copy_in, data).await
            }
        }
    }
}

impl fmt::Debug for Querier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Querier::Pool(pool) => f.debug_tuple("Pool").field(pool).finish(),
            Querier::Tx(guard) => f.debug_tuple("Tx").field(guard).finish(),
        }
    }
}

fn exactly_one<R>(rows: Vec<R>) -> Result<R, DbError> {
    let found = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), found) {
        (Some(row), 1) => Ok(row),
        (None, _) => Err(DbError::NoRows),
        _ => Err(DbError::TooManyRows(found)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::scope::TxHandle;

    #[tokio::test]
    async fn closed_transaction_rejects_every_operation() {
        let handle = TxHandle::closed();

        let mut querier = Querier::Tx(TxGuard::new(handle.lock().await));
        assert!(querier.is_transaction());
        let err = querier.execute("SELECT 1", args![]).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionClosed));
        drop(querier);

        let mut querier = Querier::Tx(TxGuard::new(handle.lock().await));
        let err = querier.fetch_one("SELECT 1", args![]).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionClosed));
        drop(querier);

        let mut querier = Querier::Tx(TxGuard::new(handle.lock().await));
        let err = querier.send_batch(Batch::new()).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionClosed));
    }

    #[test]
    fn single_row_is_required() {
        assert_eq!(exactly_one(vec![7]).unwrap(), 7);
        assert!(exactly_one(Vec::<i32>::new()).unwrap_err().is_no_rows());

        let err = exactly_one(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, DbError::TooManyRows(3)));
        assert_eq!(err.to_string(), "expected 1 row, got 3");
    }
}
