//! Floe admin CLI: operational commands against the metadata store and the
//! Iceberg catalog.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use floe_catalog::gateway::CatalogGateway;
use floe_catalog::rest::RestCatalogGateway;
use floe_maintenance::refresh::RefreshService;
use floe_maintenance::settings::store_worker_count;
use floe_metadata::metadata_connection::connect_to_metadata_db;
use floe_metadata::sql_migration::migrate_db;
use floe_metadata::sql_task_queue;

#[derive(Parser, Debug)]
#[clap(name = "Floe Admin")]
#[clap(about = "CLI to administer a lakehouse control plane", version, author)]
#[clap(arg_required_else_help(true))]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the metadata schema up to date
    #[clap(name = "migrate")]
    Migrate,

    /// Refresh metadata for every table the catalog reports
    #[clap(name = "refresh-all")]
    RefreshAll,

    /// Refresh metadata for one table
    #[clap(name = "refresh-table")]
    RefreshTable { table: String },

    /// Delete every task row regardless of state
    #[clap(name = "flush-tasks")]
    FlushTasks,

    /// Persist the worker concurrency cap
    #[clap(name = "set-task-concurrency")]
    SetTaskConcurrency { value: usize },
}

fn make_catalog() -> Result<Arc<dyn CatalogGateway>> {
    let catalog_uri =
        std::env::var("FLOE_CATALOG_URI").with_context(|| "reading FLOE_CATALOG_URI")?;
    let database = std::env::var("FLOE_ICEBERG_DEFAULT_DATABASE")
        .unwrap_or_else(|_| String::from("main"));
    Ok(Arc::new(RestCatalogGateway::new(catalog_uri, database)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Cli::parse();

    let connection_string = std::env::var("FLOE_SQL_CONNECTION_STRING")
        .with_context(|| "reading FLOE_SQL_CONNECTION_STRING")?;
    let pool = connect_to_metadata_db(&connection_string).await?;

    match args.command {
        Commands::Migrate => {
            migrate_db(pool).await.with_context(|| "migrate_db")?;
        }
        Commands::RefreshAll => {
            migrate_db(pool.clone()).await.with_context(|| "migrate_db")?;
            let refresh = RefreshService::new(pool, make_catalog()?);
            refresh.refresh_all_tables(&CancellationToken::new()).await?;
        }
        Commands::RefreshTable { table } => {
            migrate_db(pool.clone()).await.with_context(|| "migrate_db")?;
            let refresh = RefreshService::new(pool, make_catalog()?);
            refresh.refresh_table_full(&table).await?;
        }
        Commands::FlushTasks => {
            let deleted = sql_task_queue::flush(&pool).await?;
            println!("deleted {deleted} tasks");
        }
        Commands::SetTaskConcurrency { value } => {
            store_worker_count(&pool, value).await?;
        }
    }
    Ok(())
}
