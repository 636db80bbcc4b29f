//! Error types for query sets.

use std::path::PathBuf;

use thiserror::Error;

/// A `(set, query)` pair that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query '{query}' not found in set '{set}'")]
pub struct QueryNotFound {
    pub set: String,
    pub query: String,
}

/// Errors raised while loading query sets.
#[derive(Debug, Error)]
pub enum SqlSetError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("set '{0}' is already loaded")]
    DuplicateSet(String),

    #[error("set '{set}' defines query '{query}' more than once")]
    DuplicateQuery { set: String, query: String },

    #[error("set '{set}' has a query marker without a name on line {line}")]
    EmptyName { set: String, line: usize },
}
