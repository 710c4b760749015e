//! Floe admin server: the control plane for an Apache-Iceberg lakehouse.
//!
//! One process hosts the HTTP API, the task worker and the periodic
//! refresh, all sharing the metadata database. Correctness across several
//! instances comes from atomic row updates, not coordination.
//!
//! Env variables (override the config file):
//!  - `FLOE_SQL_CONNECTION_STRING` : metadata database
//!  - `FLOE_CATALOG_URI` : Iceberg REST catalog
//!  - `FLOE_ENGINE_URI` : lakehouse engine statement API

mod api;
mod config;
mod error;
mod observability;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floe_catalog::gateway::CatalogGateway;
use floe_catalog::rest::RestCatalogGateway;
use floe_engine::gateway::MaintenanceEngine;
use floe_engine::trino::TrinoStatementClient;
use floe_maintenance::limiter::ConcurrencyLimiter;
use floe_maintenance::periodic::run_periodic_refresh;
use floe_maintenance::planner::TaskPlanner;
use floe_maintenance::refresh::RefreshService;
use floe_maintenance::settings::load_worker_count;
use floe_maintenance::worker::TaskWorker;
use floe_metadata::metadata_connection::connect_and_migrate;

use api::{AppContext, make_router};
use config::load_config;

#[derive(Parser, Debug)]
#[clap(name = "Floe Admin Server")]
#[clap(about = "Control plane for Apache-Iceberg lakehouse maintenance", version, author)]
struct Cli {
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long)]
    listen_endpoint: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Cli::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(listen_endpoint) = args.listen_endpoint {
        config.listen_endpoint = listen_endpoint;
    }

    let pool = connect_and_migrate(&config.database.uri).await?;
    let catalog: Arc<dyn CatalogGateway> = Arc::new(RestCatalogGateway::new(
        config.catalog.uri.clone(),
        config.iceberg.default_database.clone(),
    ));
    let engine_client = Arc::new(TrinoStatementClient::new(
        config.engine.uri.clone(),
        String::from("floe"),
    ));
    let engine = Arc::new(MaintenanceEngine::new(
        engine_client,
        config.engine.catalog.clone(),
        config.iceberg.default_database.clone(),
    ));
    let refresh = Arc::new(RefreshService::new(pool.clone(), catalog));

    let worker_count = load_worker_count(&pool, config.tasks.worker_count).await?;
    let limiter = ConcurrencyLimiter::new(worker_count);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let worker = TaskWorker::new(
        pool.clone(),
        engine,
        refresh.clone(),
        limiter.clone(),
        Duration::from_secs(config.tasks.poll_interval_seconds.max(1)),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));
    tokio::spawn(run_periodic_refresh(
        refresh.clone(),
        Duration::from_secs(config.refresh.interval_seconds.max(1)),
        shutdown.clone(),
    ));

    let context = Arc::new(AppContext {
        planner: TaskPlanner::new(pool.clone()),
        pool,
        refresh,
        limiter,
        shutdown: shutdown.clone(),
    });

    let app = make_router(context);
    let listener = tokio::net::TcpListener::bind(config.listen_endpoint)
        .await
        .with_context(|| format!("binding {}", config.listen_endpoint))?;
    info!("serving on {}", config.listen_endpoint);
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;
    let _ = worker_handle.await;
    Ok(())
}
