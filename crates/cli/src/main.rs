//! `pg-helper` CLI entry-point.
//!
//! Available sub-commands:
//! - `ping`         — connect and check that the database is reachable.
//! - `exec`         — run one statement and print the affected-row count.
//! - `named`        — run a named query from a query directory in a transaction.
//! - `list-queries` — list the query sets found in a query directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use db::{Args, DbConfig, DbHelper, NamedDbHelper, Scope};
use sqlset::SqlSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pg-helper",
    about = "Run statements through a scoped Postgres helper",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ConnArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// Seconds allowed for connecting and for each command.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    #[arg(long, default_value_t = db::config::DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,
}

impl ConnArgs {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    async fn connect(&self) -> anyhow::Result<DbHelper> {
        let config = DbConfig::default().with_max_connections(self.max_connections);
        let mut db = DbHelper::with_config(config);
        db.connect(&self.database_url, self.timeout())
            .await
            .context("failed to connect to database")?;
        Ok(db)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Connect and verify the database is reachable.
    Ping {
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Execute a statement that returns no rows.
    Exec {
        #[command(flatten)]
        conn: ConnArgs,
        sql: String,
        /// Text parameters bound to $1, $2, …
        params: Vec<String>,
    },
    /// Execute a named query inside a transaction.
    Named {
        #[command(flatten)]
        conn: ConnArgs,
        /// Directory of `<set>.sql` files.
        #[arg(long)]
        queries: PathBuf,
        set: String,
        query: String,
        /// Text parameters bound to $1, $2, …
        params: Vec<String>,
    },
    /// List query sets and their queries.
    ListQueries {
        #[arg(long)]
        queries: PathBuf,
    },
}

fn bind(params: Vec<String>) -> Args {
    params.into_iter().fold(Args::new(), Args::push)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ping { conn } => {
            let db = conn.connect().await?;
            info!("Database is reachable");
            db.close().await;
        }
        Command::Exec { conn, sql, params } => {
            let db = conn.connect().await?;
            let scope = Scope::new().with_timeout(conn.timeout());
            let result = db.exec(&scope, &sql, bind(params)).await;
            db.close().await;
            println!("{}", result?);
        }
        Command::Named {
            conn,
            queries,
            set,
            query,
            params,
        } => {
            let queries = SqlSet::from_dir(&queries)
                .with_context(|| format!("failed to load queries from {}", queries.display()))?;
            let db = NamedDbHelper::new(conn.connect().await?, queries);
            let scope = Scope::new().with_timeout(conn.timeout());

            let result = db
                .within_transaction(&scope, |tx| {
                    let (db, set, query) = (&db, &set, &query);
                    async move { db.exec(&tx, set, query, bind(params)).await }
                })
                .await;
            db.close().await;

            println!("{}", result?);
        }
        Command::ListQueries { queries } => {
            let queries = SqlSet::from_dir(&queries)
                .with_context(|| format!("failed to load queries from {}", queries.display()))?;
            for set in queries.sets() {
                for query in queries.queries(set) {
                    println!("{set}\t{query}");
                }
            }
        }
    }

    Ok(())
}
