//! `sqlset` crate — named SQL queries grouped into sets.
//!
//! A set is a `.sql` source in which every query is introduced by a marker
//! line:
//!
//! ```sql
//! -- name: GetCustomer
//! SELECT * FROM customers WHERE id = $1;
//! ```
//!
//! Queries are looked up by `(set, query)`.

pub mod error;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

pub use error::{QueryNotFound, SqlSetError};

/// Resolves a `(set, query)` pair to SQL text.
pub trait QueryLookup: Send + Sync {
    fn query(&self, set: &str, query: &str) -> Result<&str, QueryNotFound>;
}

/// An in-memory collection of query sets.
#[derive(Debug, Clone, Default)]
pub struct SqlSet {
    sets: BTreeMap<String, BTreeMap<String, String>>,
}

impl SqlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.sql` file in `dir`; the file stem names the set.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SqlSetError> {
        let dir = dir.as_ref();
        let io_err = |source: std::io::Error| SqlSetError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path).map_err(|source| SqlSetError::Io {
                path: path.clone(),
                source,
            })?;
            set.add_set(name, &source)?;
        }
        Ok(set)
    }

    /// Parses `source` and registers its queries under `name`.
    pub fn add_set(&mut self, name: &str, source: &str) -> Result<&mut Self, SqlSetError> {
        if self.sets.contains_key(name) {
            return Err(SqlSetError::DuplicateSet(name.to_owned()));
        }
        let queries = parse(name, source)?;
        debug!(set = name, queries = queries.len(), "Loaded query set");
        self.sets.insert(name.to_owned(), queries);
        Ok(self)
    }

    /// Set names, sorted.
    pub fn sets(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Query names of `set`, sorted. Empty for an unknown set.
    pub fn queries(&self, set: &str) -> impl Iterator<Item = &str> {
        self.sets
            .get(set)
            .into_iter()
            .flat_map(|queries| queries.keys().map(String::as_str))
    }
}

impl QueryLookup for SqlSet {
    fn query(&self, set: &str, query: &str) -> Result<&str, QueryNotFound> {
        self.sets
            .get(set)
            .and_then(|queries| queries.get(query))
            .map(String::as_str)
            .ok_or_else(|| QueryNotFound {
                set: set.to_owned(),
                query: query.to_owned(),
            })
    }
}

/// `Some(name)` if `line` is a `-- name: <name>` marker.
fn marker(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("--")?
        .trim_start()
        .strip_prefix("name:")
        .map(str::trim)
}

fn parse(set: &str, source: &str) -> Result<BTreeMap<String, String>, SqlSetError> {
    let mut queries = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    let mut finish = |current: Option<(String, String)>| -> Result<(), SqlSetError> {
        if let Some((name, body)) = current {
            if queries.insert(name.clone(), body.trim().to_owned()).is_some() {
                return Err(SqlSetError::DuplicateQuery {
                    set: set.to_owned(),
                    query: name,
                });
            }
        }
        Ok(())
    };

    for (index, line) in source.lines().enumerate() {
        match marker(line) {
            Some("") => {
                return Err(SqlSetError::EmptyName {
                    set: set.to_owned(),
                    line: index + 1,
                })
            }
            Some(name) => finish(current.replace((name.to_owned(), String::new())))?,
            None => {
                if let Some((_, body)) = current.as_mut() {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }
    }
    finish(current)?;

    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOMERS: &str = r#"
-- customer queries

-- name: GetCustomer
SELECT * FROM customers WHERE id = $1;

--name:InsertCustomer
INSERT INTO customers (id, name, email)
VALUES ($1, $2, $3);
"#;

    #[test]
    fn parses_named_queries() {
        let mut set = SqlSet::new();
        set.add_set("test", CUSTOMERS).unwrap();

        assert_eq!(
            set.query("test", "GetCustomer").unwrap(),
            "SELECT * FROM customers WHERE id = $1;"
        );
        assert_eq!(
            set.query("test", "InsertCustomer").unwrap(),
            "INSERT INTO customers (id, name, email)\nVALUES ($1, $2, $3);"
        );
        assert_eq!(
            set.queries("test").collect::<Vec<_>>(),
            ["GetCustomer", "InsertCustomer"]
        );
    }

    #[test]
    fn unknown_query_or_set_is_not_found() {
        let mut set = SqlSet::new();
        set.add_set("test", CUSTOMERS).unwrap();

        let err = set.query("test", "Unknown").unwrap_err();
        assert_eq!(
            err,
            QueryNotFound {
                set: "test".into(),
                query: "Unknown".into()
            }
        );
        assert!(set.query("other", "GetCustomer").is_err());
        assert_eq!(set.queries("other").count(), 0);
    }

    #[test]
    fn duplicate_query_is_rejected() {
        let source = "-- name: A\nSELECT 1;\n-- name: A\nSELECT 2;\n";
        let err = SqlSet::new().add_set("dup", source).unwrap_err();
        assert!(matches!(err, SqlSetError::DuplicateQuery { ref query, .. } if query == "A"));
    }

    #[test]
    fn empty_name_reports_line() {
        let source = "SELECT 0;\n-- name:\nSELECT 1;\n";
        let err = SqlSet::new().add_set("bad", source).unwrap_err();
        assert!(matches!(err, SqlSetError::EmptyName { line: 2, .. }));
    }

    #[test]
    fn duplicate_set_is_rejected() {
        let mut set = SqlSet::new();
        set.add_set("test", CUSTOMERS).unwrap();
        assert!(matches!(
            set.add_set("test", CUSTOMERS),
            Err(SqlSetError::DuplicateSet(_))
        ));
    }

    #[test]
    fn loads_sql_files_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.sql"), CUSTOMERS).unwrap();
        fs::write(dir.path().join("admin.sql"), "-- name: Count\nSELECT count(*) FROM customers;").unwrap();
        fs::write(dir.path().join("notes.txt"), "-- name: Ignored\nSELECT 1;").unwrap();

        let set = SqlSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.sets().collect::<Vec<_>>(), ["admin", "test"]);
        assert_eq!(
            set.query("admin", "Count").unwrap(),
            "SELECT count(*) FROM customers;"
        );
    }

    #[test]
    fn missing_dir_is_io_error() {
        let err = SqlSet::from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, SqlSetError::Io { .. }));
    }
}
