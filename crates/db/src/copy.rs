//! Bulk loading with `COPY ... FROM STDIN` in Postgres text format.

use std::ops::DerefMut;

use sqlx::postgres::PgCopyIn;
use sqlx::PgConnection;

use crate::DbError;

/// One row of a bulk copy. `None` is written as SQL `NULL`.
pub type CopyRow = Vec<Option<String>>;

/// A possibly schema-qualified table name such as `public.users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(Vec<String>);

impl Identifier {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Quotes every part so it can be embedded in SQL text.
    pub fn sanitize(&self) -> String {
        self.0
            .iter()
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self(vec![name.to_owned()])
    }
}

fn quote(part: &str) -> String {
    let escaped: String = part.replace('"', "\"\"").chars().filter(|c| *c != '\0').collect();
    format!("\"{escaped}\"")
}

pub(crate) fn copy_statement(table: &Identifier, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("COPY {} FROM STDIN", table.sanitize());
    }
    let columns = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
    format!("COPY {} ({columns}) FROM STDIN", table.sanitize())
}

/// Encodes rows in COPY text format. Every row must have `width` values.
pub(crate) fn encode_rows<I>(rows: I, width: usize) -> Result<Vec<u8>, DbError>
where
    I: IntoIterator<Item = CopyRow>,
{
    let mut buf = String::new();
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(DbError::CopyRowWidth {
                row: index,
                expected: width,
                found: row.len(),
            });
        }
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.push('\t');
            }
            match value {
                Some(value) => escape_into(&mut buf, value),
                None => buf.push_str("\\N"),
            }
        }
        buf.push('\n');
    }
    Ok(buf.into_bytes())
}

fn escape_into(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            c => buf.push(c),
        }
    }
}

/// Sends `data` and finishes the copy, aborting it if sending fails.
pub(crate) async fn stream<C>(mut copy: PgCopyIn<C>, data: Vec<u8>) -> Result<u64, DbError>
where
    C: DerefMut<Target = PgConnection>,
{
    let sent = copy.send(data).await.map(|_| ());
    if let Err(err) = sent {
        // abort only fails if the connection is already gone
        let _ = copy.abort("client failed to send copy data").await;
        return Err(DbError::Copy(err));
    }
    copy.finish().await.map_err(DbError::Copy)
}
