//! `DbHelper` variant that takes queries by name instead of SQL text.

use std::ops::{Deref, DerefMut};

use sqlset::{QueryLookup, QueryNotFound, SqlSet};
use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::{Args, DbError, DbHelper, Scope};

impl From<QueryNotFound> for DbError {
    fn from(err: QueryNotFound) -> Self {
        DbError::QueryNotFound {
            set: err.set,
            query: err.query,
        }
    }
}

/// A [`DbHelper`] that resolves SQL through a [`QueryLookup`].
///
/// Every other helper operation, including
/// [`within_transaction`](DbHelper::within_transaction), is reachable
/// through `Deref`.
#[derive(Debug, Clone)]
pub struct NamedDbHelper<L = SqlSet> {
    helper: DbHelper,
    queries: L,
}

impl<L: QueryLookup> NamedDbHelper<L> {
    pub fn new(helper: DbHelper, queries: L) -> Self {
        Self { helper, queries }
    }

    pub fn queries(&self) -> &L {
        &self.queries
    }

    /// Looks up `set`/`query` and fetches exactly one row into `T`.
    pub async fn get<T>(
        &self,
        scope: &Scope,
        set: &str,
        query: &str,
        args: Args,
    ) -> Result<T, DbError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = self.queries.query(set, query)?;
        self.helper.get(scope, sql, args).await
    }

    /// Looks up `set`/`query` and fetches every row into a `Vec<T>`.
    pub async fn select<T>(
        &self,
        scope: &Scope,
        set: &str,
        query: &str,
        args: Args,
    ) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = self.queries.query(set, query)?;
        self.helper.select(scope, sql, args).await
    }

    /// Looks up `set`/`query` and executes it, returning the affected-row count.
    ///
    /// An unknown query fails without touching the database.
    pub async fn exec(
        &self,
        scope: &Scope,
        set: &str,
        query: &str,
        args: Args,
    ) -> Result<u64, DbError> {
        let sql = self.queries.query(set, query)?;
        self.helper.exec(scope, sql, args).await
    }
}

impl<L> Deref for NamedDbHelper<L> {
    type Target = DbHelper;

    fn deref(&self) -> &Self::Target {
        &self.helper
    }
}

impl<L> DerefMut for NamedDbHelper<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.helper
    }
}
