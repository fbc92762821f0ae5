/// file: src/store.rs
/// description: PostgreSQL pool setup and product/category data access layer.
/// Content store — deadpool_postgres pool + all SQL operations.
///
/// Persistence is deliberately split into explicit `find_*` / `insert_*` /
/// `patch_*` operations composed by the orchestrator, never an implicit
/// upsert: the "only overwrite with non-empty data" rule lives in the
/// application layer where it is visible and testable. The DDL is in
/// `migrations/001_initial.sql`.
use chrono::{DateTime, Utc};
use deadpool_postgres::{
    Config as PoolConfig, ManagerConfig, Pool, PoolConfig as DeadpoolPoolConfig, RecyclingMethod,
    Runtime,
};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::models::{AppError, CategoryRecord, ContentBlock, ProductPatch, ProductRecord};

// ---------------------------------------------------------------------------
// Pool construction
// ---------------------------------------------------------------------------

pub fn build_pool(cfg: &DatabaseConfig) -> anyhow::Result<Pool> {
    let mut pc = PoolConfig::new();
    pc.host = Some(cfg.host.clone());
    pc.port = Some(cfg.port);
    pc.dbname = Some(cfg.database.clone());
    pc.user = Some(cfg.user.clone());
    if !cfg.password.is_empty() {
        pc.password = Some(cfg.password.clone());
    }
    pc.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    pc.pool = Some(DeadpoolPoolConfig::new(cfg.max_connections));

    pc.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {e}"))
}

// ---------------------------------------------------------------------------
// Column-list constants
// ---------------------------------------------------------------------------

const PRODUCT_COLS: &str = "id, slug, source_url, title, sku, category_path, \
     category_path_titles, specs_html, datasheet_html, documents_html, faqs_html, \
     references_html, reviews_html, docs, image_urls, enriched_at, created_at, updated_at";

const CATEGORY_COLS: &str = "id, brand, path, title, source_url, blocks, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn map_product_row(row: &Row) -> ProductRecord {
    let docs: serde_json::Value = row.get("docs");
    ProductRecord {
        id: row.get("id"),
        slug: row.get("slug"),
        source_url: row.get("source_url"),
        title: row.get("title"),
        sku: row.get("sku"),
        category_path: row.get("category_path"),
        category_path_titles: row.get("category_path_titles"),
        specs_html: row.get("specs_html"),
        datasheet_html: row.get("datasheet_html"),
        documents_html: row.get("documents_html"),
        faqs_html: row.get("faqs_html"),
        references_html: row.get("references_html"),
        reviews_html: row.get("reviews_html"),
        docs: serde_json::from_value(docs).unwrap_or_default(),
        image_urls: row.get("image_urls"),
        enriched_at: row.get::<_, Option<DateTime<Utc>>>("enriched_at"),
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
        updated_at: row.get::<_, DateTime<Utc>>("updated_at"),
    }
}

fn map_category_row(row: &Row) -> CategoryRecord {
    let blocks: serde_json::Value = row.get("blocks");
    CategoryRecord {
        id: row.get("id"),
        brand: row.get("brand"),
        path: row.get("path"),
        title: row.get("title"),
        source_url: row.get("source_url"),
        blocks: serde_json::from_value(blocks).unwrap_or_default(),
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
        updated_at: row.get::<_, DateTime<Utc>>("updated_at"),
    }
}

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ContentStore {
    pool: Pool,
}

impl ContentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    // ── Liveness ────────────────────────────────────────────────────────────

    pub async fn ping(&self) -> Result<(), AppError> {
        let conn = self.pool.get().await?;
        conn.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    // ── Products: find ──────────────────────────────────────────────────────

    pub async fn find_product_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ProductRecord>, AppError> {
        let conn = self.pool.get().await?;
        let sql = format!("SELECT {PRODUCT_COLS} FROM products WHERE slug = $1");
        let rows = conn.query(&sql, &[&slug]).await?;
        Ok(rows.first().map(map_product_row))
    }

    pub async fn find_product_by_sku(&self, sku: &str) -> Result<Option<ProductRecord>, AppError> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT {PRODUCT_COLS} FROM products \
             WHERE upper(sku) = upper($1) \
             ORDER BY created_at ASC LIMIT 1"
        );
        let rows = conn.query(&sql, &[&sku]).await?;
        Ok(rows.first().map(map_product_row))
    }

    /// Slugs eligible for a batch run. With `only_empty`, records that
    /// already carry data are skipped.
    pub async fn list_product_slugs(&self, only_empty: bool) -> Result<Vec<String>, AppError> {
        let conn = self.pool.get().await?;
        let sql = if only_empty {
            sql_list_empty_product_slugs()
        } else {
            sql_list_all_product_slugs()
        };
        let rows = conn.query(sql, &[]).await?;
        Ok(rows.iter().map(|r| r.get("slug")).collect())
    }

    // ── Products: create & patch ────────────────────────────────────────────

    /// Create the minimal identity record the resolution flow produces.
    /// A concurrent insert of the same slug is a no-op, not an error.
    pub async fn insert_product(
        &self,
        slug: &str,
        title: &str,
        sku: Option<&str>,
        source_url: &str,
        category_path: &[String],
        category_path_titles: &[String],
    ) -> Result<(), AppError> {
        let conn = self.pool.get().await?;
        conn.execute(
            sql_insert_product(),
            &[
                &slug,
                &title,
                &sku,
                &source_url,
                &category_path,
                &category_path_titles,
            ],
        )
        .await?;
        Ok(())
    }

    /// Apply a field-level patch. Only the fields the patch carries are
    /// written; everything else stays untouched at the storage layer too.
    pub async fn patch_product(&self, slug: &str, patch: &ProductPatch) -> Result<(), AppError> {
        let docs_json = match &patch.docs {
            Some(d) => Some(serde_json::to_value(d)?),
            None => None,
        };

        let (sql, field_params) = build_product_patch(patch, &docs_json);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(field_params.len() + 1);
        params.push(&slug);
        params.extend(field_params);

        let conn = self.pool.get().await?;
        let n = conn.execute(&sql, &params).await?;
        if n == 0 {
            return Err(AppError::NotFound(slug.to_owned()));
        }
        Ok(())
    }

    // ── Categories ──────────────────────────────────────────────────────────

    pub async fn find_category_by_path(
        &self,
        brand: &str,
        path: &[String],
    ) -> Result<Option<CategoryRecord>, AppError> {
        let conn = self.pool.get().await?;
        let sql = format!("SELECT {CATEGORY_COLS} FROM categories WHERE brand = $1 AND path = $2");
        let rows = conn.query(&sql, &[&brand, &path]).await?;
        Ok(rows.first().map(map_category_row))
    }

    /// Create a category node (possibly virtual: no own content yet).
    /// Duplicate paths within a brand are a no-op.
    pub async fn insert_category(
        &self,
        brand: &str,
        path: &[String],
        title: &str,
        source_url: Option<&str>,
    ) -> Result<(), AppError> {
        let conn = self.pool.get().await?;
        conn.execute(sql_insert_category(), &[&brand, &path, &title, &source_url])
            .await?;
        Ok(())
    }

    /// Replace a category's structured content blocks. Title is refreshed
    /// only when the extraction produced one.
    pub async fn update_category_content(
        &self,
        brand: &str,
        path: &[String],
        title: Option<&str>,
        blocks: &[ContentBlock],
    ) -> Result<(), AppError> {
        let blocks_json = serde_json::to_value(blocks)?;
        let conn = self.pool.get().await?;
        let n = conn
            .execute(
                sql_update_category_content(),
                &[&brand, &path, &blocks_json, &title],
            )
            .await?;
        if n == 0 {
            return Err(AppError::NotFound(path.join("/")));
        }
        Ok(())
    }

    /// Category whose leaf path segment matches `slug` — lets a free-text
    /// query land on an already-mirrored category page.
    pub async fn find_category_by_leaf_slug(
        &self,
        brand: &str,
        slug: &str,
    ) -> Result<Option<CategoryRecord>, AppError> {
        let conn = self.pool.get().await?;
        let rows = conn.query(sql_find_category_by_leaf(), &[&brand, &slug]).await?;
        Ok(rows.first().map(map_category_row))
    }

    pub async fn list_categories(&self, brand: &str) -> Result<Vec<CategoryRecord>, AppError> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT {CATEGORY_COLS} FROM categories WHERE brand = $1 ORDER BY path ASC"
        );
        let rows = conn.query(&sql, &[&brand]).await?;
        Ok(rows.iter().map(map_category_row).collect())
    }
}

// ---------------------------------------------------------------------------
// SQL builders
// ---------------------------------------------------------------------------

fn sql_insert_product() -> &'static str {
    "INSERT INTO products \
     (slug, title, sku, source_url, category_path, category_path_titles) \
     VALUES ($1, $2, $3, $4, $5, $6) \
     ON CONFLICT (slug) DO NOTHING"
}

fn sql_insert_category() -> &'static str {
    "INSERT INTO categories (brand, path, title, source_url) \
     VALUES ($1, $2, $3, $4) \
     ON CONFLICT (brand, path) DO NOTHING"
}

fn sql_update_category_content() -> &'static str {
    "UPDATE categories \
     SET blocks = $3, \
         title = COALESCE(NULLIF($4, ''), title), \
         updated_at = now() \
     WHERE brand = $1 AND path = $2"
}

fn sql_find_category_by_leaf() -> &'static str {
    "SELECT id, brand, path, title, source_url, blocks, created_at, updated_at \
     FROM categories \
     WHERE brand = $1 AND path[array_length(path, 1)] = $2 \
     ORDER BY array_length(path, 1) ASC \
     LIMIT 1"
}

fn sql_list_all_product_slugs() -> &'static str {
    "SELECT slug FROM products ORDER BY created_at ASC, slug ASC"
}

/// "Empty" mirrors the orchestrator's criticality rule: never scraped, or
/// missing images, category path, or all tab fragments.
fn sql_list_empty_product_slugs() -> &'static str {
    "SELECT slug FROM products \
     WHERE enriched_at IS NULL \
        OR cardinality(image_urls) = 0 \
        OR cardinality(category_path) = 0 \
        OR (COALESCE(specs_html, '') = '' \
            AND COALESCE(datasheet_html, '') = '' \
            AND COALESCE(documents_html, '') = '' \
            AND COALESCE(faqs_html, '') = '' \
            AND COALESCE(references_html, '') = '' \
            AND COALESCE(reviews_html, '') = '') \
     ORDER BY created_at ASC, slug ASC"
}

/// Build the dynamic UPDATE for a product patch. `$1` is reserved for the
/// slug (pushed by the caller); field clauses and parameters are pushed in
/// lock-step from `$2` on, and `updated_at` is always stamped.
fn build_product_patch<'a>(
    patch: &'a ProductPatch,
    docs_json: &'a Option<serde_json::Value>,
) -> (String, Vec<&'a (dyn ToSql + Sync)>) {
    let mut sets: Vec<String> = vec!["updated_at = now()".to_owned()];
    let mut params: Vec<&'a (dyn ToSql + Sync)> = Vec::new();

    let columns: [(&str, Option<&'a (dyn ToSql + Sync)>); 13] = [
        ("title", opt(&patch.title)),
        ("sku", opt(&patch.sku)),
        ("category_path", opt(&patch.category_path)),
        ("category_path_titles", opt(&patch.category_path_titles)),
        ("specs_html", opt(&patch.specs_html)),
        ("datasheet_html", opt(&patch.datasheet_html)),
        ("documents_html", opt(&patch.documents_html)),
        ("faqs_html", opt(&patch.faqs_html)),
        ("references_html", opt(&patch.references_html)),
        ("reviews_html", opt(&patch.reviews_html)),
        ("docs", opt(docs_json)),
        ("image_urls", opt(&patch.image_urls)),
        ("enriched_at", opt(&patch.enriched_at)),
    ];

    for (column, value) in columns {
        if let Some(value) = value {
            params.push(value);
            sets.push(format!("{column} = ${}", params.len() + 1));
        }
    }

    let sql = format!("UPDATE products SET {} WHERE slug = $1", sets.join(", "));
    (sql, params)
}

fn opt<T: ToSql + Sync>(value: &Option<T>) -> Option<&(dyn ToSql + Sync)> {
    value.as_ref().map(|v| v as &(dyn ToSql + Sync))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn insert_statements_never_clobber_existing_identity() {
        assert!(sql_insert_product().contains("ON CONFLICT (slug) DO NOTHING"));
        assert!(sql_insert_category().contains("ON CONFLICT (brand, path) DO NOTHING"));
    }

    #[test]
    fn category_update_keeps_stored_title_when_extraction_had_none() {
        assert!(sql_update_category_content().contains("COALESCE(NULLIF($4, ''), title)"));
    }

    #[test]
    fn leaf_slug_lookup_prefers_the_shallowest_match() {
        let sql = sql_find_category_by_leaf();
        assert!(sql.contains("path[array_length(path, 1)] = $2"));
        assert!(sql.contains("ORDER BY array_length(path, 1) ASC"));
    }

    #[test]
    fn empty_slug_listing_mirrors_criticality_rule() {
        let sql = sql_list_empty_product_slugs();
        assert!(sql.contains("enriched_at IS NULL"));
        assert!(sql.contains("cardinality(image_urls) = 0"));
        assert!(sql.contains("cardinality(category_path) = 0"));
        assert!(sql.contains("COALESCE(reviews_html, '') = ''"));
    }

    #[test]
    fn patch_builder_writes_only_carried_fields() {
        let patch = ProductPatch {
            title: Some("Cas9 Nuclease".into()),
            image_urls: Some(vec!["https://example.com/a.jpg".into()]),
            enriched_at: Some(Utc::now()),
            ..Default::default()
        };
        let (sql, params) = build_product_patch(&patch, &None);

        assert!(sql.starts_with("UPDATE products SET updated_at = now()"));
        assert!(sql.contains("title = $2"));
        assert!(sql.contains("image_urls = $3"));
        assert!(sql.contains("enriched_at = $4"));
        assert!(sql.ends_with("WHERE slug = $1"));
        // absent fields never appear — an empty extraction cannot blank them
        assert!(!sql.contains("specs_html"));
        assert!(!sql.contains("sku"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn patch_builder_with_empty_patch_only_stamps_timestamps() {
        let patch = ProductPatch {
            enriched_at: Some(Utc::now()),
            ..Default::default()
        };
        let (sql, params) = build_product_patch(&patch, &None);
        assert_eq!(
            sql,
            "UPDATE products SET updated_at = now(), enriched_at = $2 WHERE slug = $1"
        );
        assert_eq!(params.len(), 1);
    }
}
