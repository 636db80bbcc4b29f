//! `db` crate — a thin convenience layer over a Postgres pool.
//!
//! Every call takes a [`Scope`]. Inside [`DbHelper::within_transaction`] the
//! scope carries the open transaction and every statement issued with it
//! joins that transaction; outside, statements go to the pool. Rows are
//! mapped with [`sqlx::FromRow`].

pub mod args;
pub mod batch;
pub mod config;
pub mod copy;
pub mod error;
pub mod helper;
pub mod named;
pub mod querier;
pub mod scope;
pub mod transaction;

pub use args::Args;
pub use batch::Batch;
pub use config::DbConfig;
pub use copy::{CopyRow, Identifier};
pub use error::DbError;
pub use helper::DbHelper;
pub use named::NamedDbHelper;
pub use querier::{Querier, TxGuard};
pub use scope::{PgTransaction, Scope, TxHandle};
pub use transaction::{AccessMode, IsolationLevel, TxOptions};

pub use sqlset::{QueryLookup, SqlSet};
