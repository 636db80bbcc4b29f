//! Typed error type for the db crate.

use std::time::Duration;

use sqlx::error::{BoxDynError, DatabaseError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database helper is not connected")]
    NotConnected,

    #[error("parse database config failure: {0}")]
    ParseConfig(#[source] sqlx::Error),

    #[error("database pool creation failure: {0}")]
    PoolCreation(#[source] sqlx::Error),

    #[error("database pool creation timed out after {0:?}")]
    PoolCreationTimeout(Duration),

    #[error("database ping error: {0}")]
    Ping(#[source] sqlx::Error),

    #[error("database '{0}' not found in pg_database")]
    DatabaseNotFound(String),

    /// Statement that returns no rows failed. The prefix is stable so logs stay greppable.
    #[error("exec failed: {0}")]
    Exec(#[source] sqlx::Error),

    /// Any other failure of an exec call, under the same prefix.
    #[error("exec failed: {0}")]
    ExecFailed(#[source] Box<DbError>),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("no rows in result set")]
    NoRows,

    #[error("expected 1 row, got {0}")]
    TooManyRows(usize),

    #[error("failed to encode query argument: {0}")]
    Encode(#[source] BoxDynError),

    #[error("begin transaction failure: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("commit transaction failure: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("rollback transaction failure: {0}")]
    Rollback(#[source] sqlx::Error),

    #[error("transaction is already committed or rolled back")]
    TransactionClosed,

    #[error("query '{query}' not found in set '{set}'")]
    QueryNotFound { set: String, query: String },

    #[error("batch statement #{index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("copy row #{row} has {found} values, expected {expected}")]
    CopyRowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("copy failed: {0}")]
    Copy(#[source] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl DbError {
    /// The error under any `exec failed:` wrapping.
    pub fn root(&self) -> &DbError {
        match self {
            DbError::ExecFailed(inner) => inner.root(),
            other => other,
        }
    }

    /// `true` when a single-row fetch matched nothing.
    pub fn is_no_rows(&self) -> bool {
        matches!(self.root(), DbError::NoRows)
    }

    /// `true` when a named query could not be resolved.
    pub fn is_query_not_found(&self) -> bool {
        matches!(self.root(), DbError::QueryNotFound { .. })
    }

    /// The driver error wrapped by this error, if any.
    pub fn sqlx_error(&self) -> Option<&sqlx::Error> {
        match self.root() {
            DbError::ParseConfig(err)
            | DbError::PoolCreation(err)
            | DbError::Ping(err)
            | DbError::Exec(err)
            | DbError::Query(err)
            | DbError::Begin(err)
            | DbError::Commit(err)
            | DbError::Rollback(err)
            | DbError::Copy(err)
            | DbError::Batch { source: err, .. } => Some(err),
            _ => None,
        }
    }

    /// The error reported by the database server, if this wraps one.
    pub fn as_database_error(&self) -> Option<&dyn DatabaseError> {
        self.sqlx_error().and_then(|err| err.as_database_error())
    }

    /// `true` when the server rejected a write because of a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        self.as_database_error()
            .is_some_and(|err| matches!(err.kind(), ErrorKind::UniqueViolation))
    }

    /// Returns `true` if the error is likely a transient connection issue
    /// worth retrying.
    pub fn is_connection_error(&self) -> bool {
        match self.root() {
            DbError::PoolCreationTimeout(_) => true,
            other => other.sqlx_error().is_some_and(|err| {
                matches!(
                    err,
                    sqlx::Error::Io(_)
                        | sqlx::Error::Tls(_)
                        | sqlx::Error::PoolTimedOut
                        | sqlx::Error::PoolClosed
                )
            }),
        }
    }

    /// Puts the `exec failed:` prefix on an error that lacks it.
    pub(crate) fn in_exec(self) -> Self {
        match self {
            DbError::Exec(_) | DbError::ExecFailed(_) => self,
            other => DbError::ExecFailed(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn exec_error_keeps_stable_prefix_and_source() {
        let err = DbError::Exec(sqlx::Error::PoolTimedOut);
        assert!(err.to_string().starts_with("exec failed: "));
        assert!(err.source().is_some());
        assert!(err.is_connection_error());
    }

    #[test]
    fn non_driver_exec_failures_get_the_prefix() {
        let err = DbError::DeadlineExceeded.in_exec();
        assert_eq!(err.to_string(), "exec failed: operation deadline exceeded");
        assert!(matches!(err.root(), DbError::DeadlineExceeded));
        assert!(err.source().is_some());

        let err = DbError::Exec(sqlx::Error::PoolClosed).in_exec();
        assert!(matches!(err, DbError::Exec(_)));
        assert!(err.is_connection_error());

        let err = DbError::NotConnected.in_exec().in_exec();
        assert_eq!(err.to_string(), "exec failed: database helper is not connected");
    }

    #[test]
    fn query_not_found_is_checkable() {
        let err = DbError::QueryNotFound {
            set: "test".into(),
            query: "Unknown".into(),
        };
        assert!(err.is_query_not_found());
        assert!(!err.is_unique_violation());
        assert_eq!(err.to_string(), "query 'Unknown' not found in set 'test'");
    }
}
