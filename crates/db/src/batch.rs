//! Statement batches.

use sqlx::PgConnection;

use crate::{Args, DbError};

/// An ordered list of statements executed on a single connection.
#[derive(Debug, Default)]
pub struct Batch {
    statements: Vec<(String, Args)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a statement that returns no rows.
    pub fn queue(&mut self, sql: impl Into<String>, args: Args) -> &mut Self {
        self.statements.push((sql.into(), args));
        self
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Runs every statement in order, stopping at the first failure.
    ///
    /// Returns the affected-row count of each statement.
    pub(crate) async fn run(self, conn: &mut PgConnection) -> Result<Vec<u64>, DbError> {
        let mut counts = Vec::with_capacity(self.statements.len());
        for (index, (sql, args)) in self.statements.into_iter().enumerate() {
            let args = args.into_inner()?;
            let done = sqlx::query_with(&sql, args)
                .execute(&mut *conn)
                .await
                .map_err(|source| DbError::Batch { index, source })?;
            counts.push(done.rows_affected());
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn queue_keeps_insertion_order() {
        let mut batch = Batch::new();
        batch
            .queue("INSERT INTO t (id) VALUES ($1)", args![1_i32])
            .queue("DELETE FROM t WHERE id = $1", args![2_i32]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.statements[0].0, "INSERT INTO t (id) VALUES ($1)");
        assert_eq!(batch.statements[1].0, "DELETE FROM t WHERE id = $1");
    }
}
