//! Positional query arguments.

use std::fmt;

use sqlx::error::BoxDynError;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, Encode, Postgres, Type};

use crate::DbError;

/// Arguments bound to `$1`, `$2`, … in order.
///
/// Values are encoded as they are pushed. An encode failure is remembered
/// and reported as [`DbError::Encode`] when the statement runs.
#[derive(Default)]
pub struct Args {
    inner: PgArguments,
    error: Option<BoxDynError>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` and returns `self`, for chaining.
    pub fn push<'q, T>(mut self, value: T) -> Self
    where
        T: Encode<'q, Postgres> + Type<Postgres> + 'q,
    {
        self.add(value);
        self
    }

    /// Appends `value`.
    pub fn add<'q, T>(&mut self, value: T)
    where
        T: Encode<'q, Postgres> + Type<Postgres> + 'q,
    {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.inner.add(value) {
            self.error = Some(err);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_inner(self) -> Result<PgArguments, DbError> {
        match self.error {
            Some(err) => Err(DbError::Encode(err)),
            None => Ok(self.inner),
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("len", &self.len())
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

/// Builds [`Args`] from a list of values.
///
/// ```ignore
/// let n = helper.exec(&scope, "DELETE FROM users WHERE id = $1", args!["111"]).await?;
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new()$(.push($value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_binds_in_order() {
        let args = crate::args!["111", 42_i64, vec!["a".to_string(), "b".to_string()]];
        assert_eq!(args.len(), 3);
        assert!(args.into_inner().is_ok());
    }

    #[test]
    fn empty_macro_has_no_arguments() {
        let args = crate::args![];
        assert!(args.is_empty());
    }

    #[test]
    fn optional_values_bind_as_null() {
        let args = Args::new().push(None::<String>).push(Some(3_i32));
        assert_eq!(args.len(), 2);
    }
}
