/// file: src/models.rs
/// description: Domain records, extraction shapes, and AppError mapping.
/// Domain types for the catalog mirror: stored product/category records,
/// extractor outputs, search resolution, and the failure taxonomy.
///
/// A "parse miss" (expected structure absent from a page) is deliberately
/// not an error here — extractors return empty fields and the merge layer
/// discards them. `AppError` covers network, HTTP status, store, and input
/// failures only.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AppError {
    /// DNS, connect, reset, or timeout. Retryable in batch mode only.
    #[error("network failure fetching {url}: {reason}")]
    Network {
        url: String,
        reason: String,
        timeout: bool,
    },

    /// Non-2xx response from the source site. Never retried.
    #[error("source returned HTTP {status} for {url}")]
    HttpStatus {
        url: String,
        status: u16,
        body_sample: String,
    },

    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("not found: {0}")]
    NotFound(String),

    /// No stored record and the source fetch failed — the caller must fall
    /// back to deep-linking the user to the external site.
    #[error("no data for {slug}")]
    NoData { slug: String, external_url: String },

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Batch mode retries network-level failures only, never HTTP statuses.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Network { timeout: true, .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            success: bool,
            error: String,
            #[serde(rename = "fallbackUrl", skip_serializing_if = "Option::is_none")]
            fallback_url: Option<String>,
        }

        let (status, fallback_url) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            AppError::NoData { external_url, .. } => {
                (StatusCode::NOT_FOUND, Some(external_url.clone()))
            }
            AppError::BadRequest(_) | AppError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Network { timeout: true, .. } => (StatusCode::GATEWAY_TIMEOUT, None),
            AppError::Network { .. } | AppError::HttpStatus { .. } => {
                (StatusCode::BAD_GATEWAY, None)
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let message = self.to_string();
        (
            status,
            Json(Body {
                success: false,
                error: message,
                fallback_url,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Product record — persisted, keyed by slug
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub slug: String,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Ordered category slugs, root → leaf.
    #[serde(rename = "categoryPath")]
    pub category_path: Vec<String>,
    /// Human-readable titles parallel to `category_path`.
    #[serde(rename = "categoryPathTitles")]
    pub category_path_titles: Vec<String>,
    #[serde(rename = "specsHtml", skip_serializing_if = "Option::is_none")]
    pub specs_html: Option<String>,
    #[serde(rename = "datasheetHtml", skip_serializing_if = "Option::is_none")]
    pub datasheet_html: Option<String>,
    #[serde(rename = "documentsHtml", skip_serializing_if = "Option::is_none")]
    pub documents_html: Option<String>,
    #[serde(rename = "faqsHtml", skip_serializing_if = "Option::is_none")]
    pub faqs_html: Option<String>,
    #[serde(rename = "referencesHtml", skip_serializing_if = "Option::is_none")]
    pub references_html: Option<String>,
    #[serde(rename = "reviewsHtml", skip_serializing_if = "Option::is_none")]
    pub reviews_html: Option<String>,
    pub docs: Vec<DocLink>,
    #[serde(rename = "imageUrls")]
    pub image_urls: Vec<String>,
    /// Presence signals "successfully scraped at least once".
    #[serde(rename = "enrichedAt", skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn tab_fragments(&self) -> [&Option<String>; 6] {
        [
            &self.specs_html,
            &self.datasheet_html,
            &self.documents_html,
            &self.faqs_html,
            &self.references_html,
            &self.reviews_html,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocLink {
    pub label: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Product extraction output — everything optional, nothing authoritative
// ---------------------------------------------------------------------------

/// What one parse of a product page yielded. Empty fields mean "the page
/// did not offer this", and the merge layer must not write them.
#[derive(Debug, Clone, Default)]
pub struct ProductExtract {
    pub title: Option<String>,
    pub sku: Option<String>,
    pub category_path: Vec<String>,
    pub category_path_titles: Vec<String>,
    pub specs_html: Option<String>,
    pub datasheet_html: Option<String>,
    pub documents_html: Option<String>,
    pub faqs_html: Option<String>,
    pub references_html: Option<String>,
    pub reviews_html: Option<String>,
    pub docs: Vec<DocLink>,
    pub image_urls: Vec<String>,
}

/// Field-level patch applied to a stored record. `None` means "leave the
/// stored value untouched" — there is no way to express "blank this out",
/// which is the point.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub sku: Option<String>,
    pub category_path: Option<Vec<String>>,
    pub category_path_titles: Option<Vec<String>>,
    pub specs_html: Option<String>,
    pub datasheet_html: Option<String>,
    pub documents_html: Option<String>,
    pub faqs_html: Option<String>,
    pub references_html: Option<String>,
    pub reviews_html: Option<String>,
    pub docs: Option<Vec<DocLink>>,
    pub image_urls: Option<Vec<String>>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl ProductPatch {
    /// True when no content field would be written (the enrichment stamp
    /// does not count as content).
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.sku.is_none()
            && self.category_path.is_none()
            && self.category_path_titles.is_none()
            && self.specs_html.is_none()
            && self.datasheet_html.is_none()
            && self.documents_html.is_none()
            && self.faqs_html.is_none()
            && self.references_html.is_none()
            && self.reviews_html.is_none()
            && self.docs.is_none()
            && self.image_urls.is_none()
    }
}

// ---------------------------------------------------------------------------
// Category record & content blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub brand: String,
    /// Ordered slug segments; unique within a brand. A category with
    /// children stays addressable even when it has no own content blocks.
    pub path: Vec<String>,
    pub title: String,
    #[serde(rename = "sourceUrl", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub blocks: Vec<ContentBlock>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// One structured block of a category page, in source document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentBlock {
    Html { html: String },
    Resources { cards: Vec<ResourceCard> },
    Publications { items: Vec<Publication> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCard {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub href: String,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub order: u32,
    pub citation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// Extractor output for one category page.
#[derive(Debug, Clone, Default)]
pub struct CategoryExtract {
    pub title: Option<String>,
    pub blocks: Vec<ContentBlock>,
}

// ---------------------------------------------------------------------------
// Search resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
}

/// Outcome of parsing a source-site search-results page. Always carries
/// the search URL so callers can fall back to the external site.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResolution {
    Single {
        #[serde(rename = "productUrl")]
        product_url: String,
        title: String,
        #[serde(rename = "searchUrl")]
        search_url: String,
    },
    Multiple {
        candidates: Vec<Candidate>,
        #[serde(rename = "searchUrl")]
        search_url: String,
    },
    None {
        #[serde(rename = "searchUrl")]
        search_url: String,
    },
}

// ---------------------------------------------------------------------------
// HTTP response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub data: ProductRecord,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub success: bool,
    pub data: CategoryRecord,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub services: ServiceHealth,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub database: ComponentStatus,
    pub source: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Batch run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchSummary {
    pub processed: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}
