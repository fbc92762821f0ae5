/// file: src/enrich.rs
/// description: Idempotent upsert/enrichment orchestration and query resolution.
/// Decides when a record needs enrichment, performs fetch + extract, and
/// merges only non-empty extracted fields into the store. The non-empty
/// merge is the central correctness invariant of the whole pipeline: a
/// transient scrape failure or template mismatch degrades to
/// stale-but-present data, never to blank fields. It is also what makes
/// repeated or concurrent enrichment of one record idempotent without any
/// locking beyond the store's row-level writes.
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{is_identifier_like, slug_from_url, slugify};
use crate::category::extract_category;
use crate::config::SourceConfig;
use crate::fetch::Fetcher;
use crate::models::{
    AppError, CategoryRecord, ProductExtract, ProductPatch, ProductRecord,
    SearchResolution,
};
use crate::product::extract_product;
use crate::resolve::resolve_search;
use crate::store::ContentStore;

// ---------------------------------------------------------------------------
// Options & outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EnrichOpts {
    /// Extra fetch attempts on network failures. The interactive path
    /// fails fast; only batch runs retry.
    pub retries: u32,
    pub dry_run: bool,
}

impl EnrichOpts {
    pub fn interactive() -> Self {
        Self {
            retries: 0,
            dry_run: false,
        }
    }
}

/// Where a user query ends up: an internal page, or the source site's own
/// search. Resolution never dead-ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Internal(String),
    External(String),
}

impl ResolveOutcome {
    pub fn target(&self) -> &str {
        match self {
            ResolveOutcome::Internal(t) | ResolveOutcome::External(t) => t,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure decision & merge rules
// ---------------------------------------------------------------------------

/// Enrichment runs only when the record was never scraped or a critical
/// field is empty; a fully-enriched record is served as-is on every view.
pub fn needs_enrichment(rec: &ProductRecord) -> bool {
    if rec.enriched_at.is_none() {
        return true;
    }
    if rec.image_urls.is_empty() || rec.category_path.is_empty() {
        return true;
    }
    let has_text_content = rec
        .tab_fragments()
        .iter()
        .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()));
    !has_text_content
}

/// Build the patch a fresh extraction justifies: only non-empty extracted
/// values, and only where they differ from what is stored. An empty
/// extraction yields an empty patch — it can never erase prior good data.
pub fn merge_patch(rec: &ProductRecord, ex: &ProductExtract) -> ProductPatch {
    let mut patch = ProductPatch::default();

    if let Some(title) = clean(&ex.title)
        && title != rec.title
    {
        patch.title = Some(title);
    }
    if let Some(sku) = clean(&ex.sku)
        && rec.sku.as_deref() != Some(sku.as_str())
    {
        patch.sku = Some(sku);
    }
    if !ex.category_path.is_empty() && ex.category_path != rec.category_path {
        patch.category_path = Some(ex.category_path.clone());
        patch.category_path_titles = Some(ex.category_path_titles.clone());
    }

    patch.specs_html = fragment_update(&ex.specs_html, &rec.specs_html);
    patch.datasheet_html = fragment_update(&ex.datasheet_html, &rec.datasheet_html);
    patch.documents_html = fragment_update(&ex.documents_html, &rec.documents_html);
    patch.faqs_html = fragment_update(&ex.faqs_html, &rec.faqs_html);
    patch.references_html = fragment_update(&ex.references_html, &rec.references_html);
    patch.reviews_html = fragment_update(&ex.reviews_html, &rec.reviews_html);

    if !ex.docs.is_empty() && ex.docs != rec.docs {
        patch.docs = Some(ex.docs.clone());
    }
    if !ex.image_urls.is_empty() && ex.image_urls != rec.image_urls {
        patch.image_urls = Some(ex.image_urls.clone());
    }

    patch
}

/// Apply a patch locally — what the stored record will look like after
/// `patch_product`. Used for dry runs and to avoid a read-back round trip.
pub fn apply_patch(rec: &ProductRecord, patch: &ProductPatch) -> ProductRecord {
    let mut out = rec.clone();
    if let Some(v) = &patch.title {
        out.title = v.clone();
    }
    if let Some(v) = &patch.sku {
        out.sku = Some(v.clone());
    }
    if let Some(v) = &patch.category_path {
        out.category_path = v.clone();
    }
    if let Some(v) = &patch.category_path_titles {
        out.category_path_titles = v.clone();
    }
    if let Some(v) = &patch.specs_html {
        out.specs_html = Some(v.clone());
    }
    if let Some(v) = &patch.datasheet_html {
        out.datasheet_html = Some(v.clone());
    }
    if let Some(v) = &patch.documents_html {
        out.documents_html = Some(v.clone());
    }
    if let Some(v) = &patch.faqs_html {
        out.faqs_html = Some(v.clone());
    }
    if let Some(v) = &patch.references_html {
        out.references_html = Some(v.clone());
    }
    if let Some(v) = &patch.reviews_html {
        out.reviews_html = Some(v.clone());
    }
    if let Some(v) = &patch.docs {
        out.docs = v.clone();
    }
    if let Some(v) = &patch.image_urls {
        out.image_urls = v.clone();
    }
    if let Some(ts) = patch.enriched_at {
        out.enriched_at = Some(ts);
        out.updated_at = ts;
    }
    out
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn fragment_update(new: &Option<String>, stored: &Option<String>) -> Option<String> {
    let new = clean(new)?;
    if stored.as_deref() == Some(new.as_str()) {
        return None;
    }
    Some(new)
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct Enricher {
    store: ContentStore,
    fetcher: Fetcher,
    source: SourceConfig,
}

impl Enricher {
    pub fn new(store: ContentStore, fetcher: Fetcher, source: SourceConfig) -> Self {
        Self {
            store,
            fetcher,
            source,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Interactive entry point, bounded by the fetcher timeout. Serves the
    /// stored record when it is fresh; on scrape failure with an existing
    /// record, logs and returns the stale record untouched. Only a missing
    /// record surfaces as `NoData`.
    pub async fn ensure_enriched(&self, slug: &str) -> Result<ProductRecord, AppError> {
        let Some(rec) = self.store.find_product_by_slug(slug).await? else {
            return Err(AppError::NoData {
                slug: slug.to_owned(),
                external_url: self.source.search_url(slug),
            });
        };

        if !needs_enrichment(&rec) {
            debug!(slug, "Record fully enriched; skipping re-scrape");
            return Ok(rec);
        }

        match self.refresh(&rec, &EnrichOpts::interactive()).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                warn!(slug, error = %e, "Enrichment failed; serving last known good record");
                Ok(rec)
            }
        }
    }

    /// One fetch + extract + merge + patch cycle. Batch callers pass
    /// retries; `dry_run` skips all writes.
    pub async fn refresh(
        &self,
        rec: &ProductRecord,
        opts: &EnrichOpts,
    ) -> Result<ProductRecord, AppError> {
        let html = if opts.retries > 0 {
            self.fetcher
                .fetch_with_retry(&rec.source_url, opts.retries)
                .await?
        } else {
            self.fetcher.fetch(&rec.source_url).await?
        };

        let extract = extract_product(&html, &rec.source_url);
        let mut patch = merge_patch(rec, &extract);
        // the scrape itself succeeded, even if it yielded nothing new
        patch.enriched_at = Some(Utc::now());

        let updated = apply_patch(rec, &patch);
        if opts.dry_run {
            info!(
                slug = %rec.slug,
                changed = !patch.is_empty(),
                "Dry run: skipping store write"
            );
            return Ok(updated);
        }

        self.store.patch_product(&rec.slug, &patch).await?;

        // Breadcrumb-derived ancestors become addressable (virtual) category
        // nodes; failure here must not fail the product enrichment.
        if let Err(e) = self
            .ensure_category_ancestry(&updated.category_path, &updated.category_path_titles)
            .await
        {
            warn!(slug = %rec.slug, error = %e, "Category ancestry upsert failed");
        }

        Ok(updated)
    }

    /// Create any missing category node along `path` so every prefix is
    /// addressable, even without own content.
    async fn ensure_category_ancestry(
        &self,
        path: &[String],
        titles: &[String],
    ) -> Result<(), AppError> {
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            if self
                .store
                .find_category_by_path(&self.source.brand, prefix)
                .await?
                .is_some()
            {
                continue;
            }
            let title = titles.get(depth - 1).map(String::as_str).unwrap_or("");
            self.store
                .insert_category(&self.source.brand, prefix, title, None)
                .await?;
        }
        Ok(())
    }

    /// Re-extract one category page and replace its structured content.
    /// An extraction that produced nothing leaves the stored blocks alone.
    pub async fn refresh_category(
        &self,
        rec: &CategoryRecord,
        opts: &EnrichOpts,
    ) -> Result<bool, AppError> {
        let Some(source_url) = rec.source_url.as_deref() else {
            debug!(path = %rec.path.join("/"), "Virtual category node; nothing to fetch");
            return Ok(false);
        };

        let html = if opts.retries > 0 {
            self.fetcher.fetch_with_retry(source_url, opts.retries).await?
        } else {
            self.fetcher.fetch(source_url).await?
        };

        let extract = extract_category(&html, source_url);
        if extract.blocks.is_empty() && extract.title.is_none() {
            debug!(path = %rec.path.join("/"), "Category extraction empty; keeping stored content");
            return Ok(false);
        }

        if opts.dry_run {
            info!(
                path = %rec.path.join("/"),
                blocks = extract.blocks.len(),
                "Dry run: skipping category write"
            );
            return Ok(true);
        }

        self.store
            .update_category_content(
                &self.source.brand,
                &rec.path,
                extract.title.as_deref(),
                &extract.blocks,
            )
            .await?;
        Ok(true)
    }

    // ── Query resolution ────────────────────────────────────────────────────

    /// User-facing resolution. Identifier-like queries may auto-resolve to
    /// an internal product page; everything else — and every ambiguous or
    /// failed lookup — redirects to the source site's own search. Free-text
    /// keyword searches are never migrated into the store.
    pub async fn resolve_query(&self, query: &str) -> Result<ResolveOutcome, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::BadRequest("empty query".to_owned()));
        }

        if !is_identifier_like(query) {
            // a keyword query may still land on an already-mirrored category
            // page; it is never migrated into the store automatically
            if let Some(cat) = self
                .store
                .find_category_by_leaf_slug(&self.source.brand, &slugify(query))
                .await?
            {
                return Ok(ResolveOutcome::Internal(format!(
                    "/categories/{}",
                    cat.path.join("/")
                )));
            }
            return Ok(ResolveOutcome::External(self.source.search_url(query)));
        }

        // cache hit: the catalog number was looked up before
        if let Some(rec) = self.store.find_product_by_sku(query).await? {
            return Ok(ResolveOutcome::Internal(format!("/products/{}", rec.slug)));
        }

        let search_url = self.source.search_url(query);
        let html = match self.fetcher.fetch(&search_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(query, error = %e, "Search fetch failed; deep-linking to source site");
                return Ok(ResolveOutcome::External(search_url));
            }
        };

        let base = Url::parse(&self.source.base_url)?;
        match resolve_search(&html, &search_url, &base) {
            SearchResolution::Single {
                product_url, title, ..
            } => {
                let slug = slug_from_url(&product_url);
                if slug.is_empty() {
                    return Ok(ResolveOutcome::External(search_url));
                }
                self.store
                    .insert_product(&slug, &title, Some(query), &product_url, &[], &[])
                    .await?;
                info!(query, slug, "Catalog number resolved to new product record");
                Ok(ResolveOutcome::Internal(format!("/products/{slug}")))
            }
            SearchResolution::Multiple { candidates, .. } => {
                debug!(query, count = candidates.len(), "Ambiguous catalog number");
                Ok(ResolveOutcome::External(search_url))
            }
            SearchResolution::None { .. } => Ok(ResolveOutcome::External(search_url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocLink;
    use uuid::Uuid;

    fn stored_record() -> ProductRecord {
        ProductRecord {
            id: Uuid::new_v4(),
            slug: "cas9-nuclease-t3189".into(),
            source_url: "https://www.abmgood.com/cas9-nuclease-t3189.html".into(),
            title: "Cas9 Nuclease".into(),
            sku: Some("T3189".into()),
            category_path: vec!["gene-editing".into(), "crispr".into()],
            category_path_titles: vec!["Gene Editing".into(), "CRISPR".into()],
            specs_html: Some("<table><tr><td>Unit Size</td><td>100 µg</td></tr></table>".into()),
            datasheet_html: None,
            documents_html: None,
            faqs_html: None,
            references_html: None,
            reviews_html: None,
            docs: vec![DocLink {
                label: "CoA".into(),
                url: "https://www.abmgood.com/docs/t3189-coa.pdf".into(),
            }],
            image_urls: vec![
                "https://www.abmgood.com/media/1.jpg".into(),
                "https://www.abmgood.com/media/2.jpg".into(),
                "https://www.abmgood.com/media/3.jpg".into(),
                "https://www.abmgood.com/media/4.jpg".into(),
                "https://www.abmgood.com/media/5.jpg".into(),
            ],
            enriched_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let rec = stored_record();
        let extract = ProductExtract {
            title: Some("Cas9 Nuclease v2".into()),
            faqs_html: Some("<p>Q&amp;A</p>".into()),
            image_urls: vec!["https://www.abmgood.com/media/new.jpg".into()],
            ..Default::default()
        };

        let first = merge_patch(&rec, &extract);
        let after_first = apply_patch(&rec, &first);

        // same payload again: nothing left to write
        let second = merge_patch(&after_first, &extract);
        assert!(second.is_empty());

        let after_second = apply_patch(&after_first, &second);
        assert_eq!(after_first.title, after_second.title);
        assert_eq!(after_first.faqs_html, after_second.faqs_html);
        assert_eq!(after_first.image_urls, after_second.image_urls);
    }

    #[test]
    fn empty_extraction_cannot_regress_stored_images() {
        let rec = stored_record();
        let extract = ProductExtract::default(); // total parse miss

        let patch = merge_patch(&rec, &extract);
        assert!(patch.is_empty());

        let after = apply_patch(&rec, &patch);
        assert_eq!(after.image_urls.len(), 5);
        assert_eq!(after.image_urls, rec.image_urls);
        assert_eq!(after.specs_html, rec.specs_html);
        assert_eq!(after.docs, rec.docs);
    }

    #[test]
    fn whitespace_only_fragments_count_as_empty() {
        let rec = stored_record();
        let extract = ProductExtract {
            specs_html: Some("   \n  ".into()),
            title: Some("  ".into()),
            ..Default::default()
        };
        let patch = merge_patch(&rec, &extract);
        assert!(patch.is_empty());
    }

    #[test]
    fn needs_enrichment_gates_on_stamp_and_critical_fields() {
        let rec = stored_record();
        assert!(!needs_enrichment(&rec));

        let mut never_scraped = stored_record();
        never_scraped.enriched_at = None;
        assert!(needs_enrichment(&never_scraped));

        let mut no_images = stored_record();
        no_images.image_urls.clear();
        assert!(needs_enrichment(&no_images));

        let mut no_path = stored_record();
        no_path.category_path.clear();
        assert!(needs_enrichment(&no_path));

        let mut no_text = stored_record();
        no_text.specs_html = None;
        assert!(needs_enrichment(&no_text));
    }

    #[test]
    fn one_nonempty_tab_satisfies_the_text_criterion() {
        let mut rec = stored_record();
        rec.specs_html = None;
        rec.reviews_html = Some("<p>Great enzyme.</p>".into());
        assert!(!needs_enrichment(&rec));
    }

    #[test]
    fn enrichment_stamp_applies_through_patch() {
        let rec = stored_record();
        let ts = Utc::now();
        let patch = ProductPatch {
            enriched_at: Some(ts),
            ..Default::default()
        };
        let after = apply_patch(&rec, &patch);
        assert_eq!(after.enriched_at, Some(ts));
        assert_eq!(after.updated_at, ts);
    }
}
