/// file: src/api.rs
/// description: HTTP router and interactive resolution/enrichment handlers.
/// HTTP API — the storefront-facing entry points.
///
/// Route map:
///   GET /health              — store + source-site reachability
///   GET /resolve?q=…         — catalog-number resolution, always a redirect
///   GET /products/{slug}     — on-demand enrichment + record JSON
///   GET /categories/{*path}  — mirrored category record JSON
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::enrich::{Enricher, ResolveOutcome};
use crate::models::{
    AppError, CategoryResponse, ComponentStatus, HealthResponse, ProductResponse, ServiceHealth,
};
use crate::store::ContentStore;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub store: ContentStore,
    pub enricher: Arc<Enricher>,
    pub cfg: Arc<Config>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/resolve", get(resolve_handler))
        .route("/products/{slug}", get(product_handler))
        .route("/categories/{*path}", get(category_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.store.ping().await;
    let source_ok = state
        .enricher
        .fetcher()
        .probe(&state.cfg.source.base_url)
        .await;

    let overall = if db_ok.is_ok() && source_ok.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    let body = HealthResponse {
        status: overall.to_owned(),
        services: ServiceHealth {
            database: ComponentStatus {
                healthy: db_ok.is_ok(),
                error: db_ok.err().map(|e| e.to_string()),
            },
            source: ComponentStatus {
                healthy: source_ok.is_ok(),
                error: source_ok.err().map(|e| e.to_string()),
            },
        },
    };

    let status = if overall == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

// ---------------------------------------------------------------------------
// GET /resolve?q=…
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResolveParams {
    q: String,
}

/// Always ends in a navigable redirect: an internal product page on a
/// resolution/cache hit, the source site's own search otherwise.
async fn resolve_handler(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Redirect, AppError> {
    let outcome = state.enricher.resolve_query(&params.q).await?;
    match &outcome {
        ResolveOutcome::Internal(path) => {
            info!(query = %params.q, target = %path, "Resolved internally");
        }
        ResolveOutcome::External(url) => {
            info!(query = %params.q, target = %url, "Redirecting to source search");
        }
    }
    Ok(Redirect::to(outcome.target()))
}

// ---------------------------------------------------------------------------
// GET /products/{slug}
// ---------------------------------------------------------------------------

/// A page view triggers enrichment when the record is missing critical
/// data; the call blocks within the fetcher's timeout. A missing record
/// surfaces as 404 with an external deep link in the body.
async fn product_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let record = state.enricher.ensure_enriched(&slug).await?;
    Ok(Json(ProductResponse {
        success: true,
        data: record,
    }))
}

// ---------------------------------------------------------------------------
// GET /categories/{*path}
// ---------------------------------------------------------------------------

/// Categories are mirrored by the batch job, not on view; this simply
/// serves the stored record.
async fn category_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<CategoryResponse>, AppError> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if segments.is_empty() {
        return Err(AppError::BadRequest("empty category path".to_owned()));
    }

    let record = state
        .store
        .find_category_by_path(&state.cfg.source.brand, &segments)
        .await?
        .ok_or_else(|| AppError::NotFound(path.clone()))?;

    Ok(Json(CategoryResponse {
        success: true,
        data: record,
    }))
}
