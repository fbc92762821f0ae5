/// file: src/main.rs
/// description: CLI entrypoint, runtime setup, and server/batch startup orchestration.
mod api;
mod batch;
mod catalog;
mod category;
mod config;
mod enrich;
mod fetch;
mod models;
mod product;
mod resolve;
mod sanitize;
mod store;

use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::batch::BatchOpts;
use crate::enrich::{Enricher, ResolveOutcome};
use crate::fetch::Fetcher;
use crate::store::ContentStore;

/// abm_mirror — catalog mirroring and on-demand enrichment for the ABM storefront.
#[derive(Debug, Parser)]
#[command(name = "abm_mirror", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP service (resolution + on-demand enrichment).
    Server,
    /// Batch-enrich stored product records from the source site.
    EnrichProducts {
        /// Extract but write nothing.
        #[arg(long)]
        dry_run: bool,
        /// Cap on records processed this run.
        #[arg(long)]
        limit: Option<usize>,
        /// Skip records that already have data.
        #[arg(long)]
        only_empty: bool,
    },
    /// Re-extract stored category pages from the source site.
    MirrorCategories {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        only_empty: bool,
    },
    /// Resolve one catalog-number query and print the destination.
    Resolve { query: String },
    /// Health-check the content store and source site, then exit.
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging — respect RUST_LOG; default to "info".
    // Set LOG_FORMAT=json (e.g. in production) for machine-readable output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,abm_mirror=debug"));

    let json_format = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    if json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let cfg = config::Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Config load error: {e}");
        panic!("Cannot start without a valid configuration: {e}");
    });

    let cli = Cli::parse();

    match cli.command {
        Command::Server => run_server(cfg).await,
        Command::EnrichProducts {
            dry_run,
            limit,
            only_empty,
        } => {
            let opts = BatchOpts {
                dry_run,
                limit,
                only_empty,
            };
            let enricher = build_enricher(&cfg).await?;
            batch::enrich_products(&enricher, &cfg.batch, &opts).await?;
            Ok(())
        }
        Command::MirrorCategories {
            dry_run,
            limit,
            only_empty,
        } => {
            let opts = BatchOpts {
                dry_run,
                limit,
                only_empty,
            };
            let enricher = build_enricher(&cfg).await?;
            batch::mirror_categories(&enricher, &cfg.batch, &opts).await?;
            Ok(())
        }
        Command::Resolve { query } => run_resolve(cfg, &query).await,
        Command::Healthcheck => run_healthcheck(cfg).await,
    }
}

// ---------------------------------------------------------------------------
// Sub-command handlers
// ---------------------------------------------------------------------------

async fn run_server(cfg: config::Config) -> Result<()> {
    let addr = cfg.server.addr()?;
    info!(%addr, "API server listening");

    let enricher = Arc::new(build_enricher(&cfg).await?);
    let state = api::AppState {
        store: enricher.store().clone(),
        enricher,
        cfg: Arc::new(cfg.clone()),
    };

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if !cfg.server.cors_allow_origins.is_empty() {
        let mut origins = Vec::with_capacity(cfg.server.cors_allow_origins.len());
        for origin in &cfg.server.cors_allow_origins {
            origins.push(HeaderValue::from_str(origin).map_err(|e| {
                anyhow::anyhow!("Invalid CORS_ALLOW_ORIGINS entry `{origin}`: {e}")
            })?);
        }
        cors = cors.allow_origin(origins);
    }

    let app = api::router(state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_resolve(cfg: config::Config, query: &str) -> Result<()> {
    let enricher = build_enricher(&cfg).await?;
    match enricher.resolve_query(query).await? {
        ResolveOutcome::Internal(path) => println!("internal\t{path}"),
        ResolveOutcome::External(url) => println!("external\t{url}"),
    }
    Ok(())
}

async fn run_healthcheck(cfg: config::Config) -> Result<()> {
    info!("Running health check…");

    let pool = store::build_pool(&cfg.database)?;
    let content_store = ContentStore::new(pool);
    match content_store.ping().await {
        Ok(()) => info!("Content store: ok"),
        Err(e) => tracing::warn!("Content store: {e}"),
    }

    let fetcher = Fetcher::new(&cfg.source)?;
    match fetcher.probe(&cfg.source.base_url).await {
        Ok(()) => info!("Source site: ok"),
        Err(e) => tracing::warn!("Source site: {e}"),
    }

    info!("Health check complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared wiring
// ---------------------------------------------------------------------------

async fn build_enricher(cfg: &config::Config) -> Result<Enricher> {
    let pool = store::build_pool(&cfg.database)?;
    let content_store = ContentStore::new(pool);

    // Fail fast before doing any work — a misconfigured store should not
    // result in a silently broken process that fetches pages it cannot
    // persist.
    content_store.ping().await.map_err(|e| {
        anyhow::anyhow!(
            "Content store connectivity check failed: {}\n\
             Hint: verify POSTGRES_* env vars are correct, PostgreSQL is running, \
             and migrations/001_initial.sql has been applied.\n\
             Cause chain: {}",
            e,
            error_chain(&e)
        )
    })?;

    let fetcher = Fetcher::new(&cfg.source)?;
    Ok(Enricher::new(content_store, fetcher, cfg.source.clone()))
}

/// Walks the `std::error::Error::source()` chain and returns each cause
/// joined with " -> " so the full context is visible in a single log line.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut src = e.source();
    while let Some(cause) = src {
        parts.push(cause.to_string());
        src = cause.source();
    }
    if parts.is_empty() {
        String::from("(no further cause)")
    } else {
        parts.join(" -> ")
    }
}
