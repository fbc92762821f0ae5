/// file: src/batch.rs
/// description: Operator batch jobs: full-catalog enrichment and category mirroring.
/// Sequential per-record loops with an inter-item delay — a deliberate
/// throughput throttle against the source site, not a correctness
/// requirement. A failed record is logged and skipped; the run always
/// continues to the end and reports a summary.
use std::time::Duration;

use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::enrich::{EnrichOpts, Enricher};
use crate::models::{AppError, BatchSummary};

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOpts {
    /// Extract but write nothing.
    pub dry_run: bool,
    /// Cap on items processed this run.
    pub limit: Option<usize>,
    /// Skip records that already carry data.
    pub only_empty: bool,
}

// ---------------------------------------------------------------------------
// Product enrichment
// ---------------------------------------------------------------------------

pub async fn enrich_products(
    enricher: &Enricher,
    cfg: &BatchConfig,
    opts: &BatchOpts,
) -> Result<BatchSummary, AppError> {
    let mut slugs = enricher.store().list_product_slugs(opts.only_empty).await?;
    if let Some(limit) = opts.limit {
        slugs.truncate(limit);
    }
    info!(
        total = slugs.len(),
        dry_run = opts.dry_run,
        only_empty = opts.only_empty,
        "Starting product enrichment run"
    );

    let enrich_opts = EnrichOpts {
        retries: cfg.max_retries,
        dry_run: opts.dry_run,
    };

    let mut summary = BatchSummary::default();
    for (i, slug) in slugs.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(cfg.inter_item_delay_ms)).await;
        }
        summary.processed += 1;

        let rec = match enricher.store().find_product_by_slug(slug).await {
            Ok(Some(rec)) => rec,
            Ok(None) => {
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(slug, error = %e, "Record read failed; skipping");
                summary.failed += 1;
                continue;
            }
        };

        match enricher.refresh(&rec, &enrich_opts).await {
            Ok(_) => summary.enriched += 1,
            Err(e) => {
                warn!(slug, error = %e, "Enrichment failed; skipping record");
                summary.failed += 1;
            }
        }
    }

    info!(
        processed = summary.processed,
        enriched = summary.enriched,
        skipped = summary.skipped,
        failed = summary.failed,
        "Product enrichment run complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Category mirroring
// ---------------------------------------------------------------------------

pub async fn mirror_categories(
    enricher: &Enricher,
    cfg: &BatchConfig,
    opts: &BatchOpts,
) -> Result<BatchSummary, AppError> {
    let brand = enricher.source().brand.clone();
    let mut categories = enricher.store().list_categories(&brand).await?;
    if opts.only_empty {
        categories.retain(|c| c.blocks.is_empty());
    }
    if let Some(limit) = opts.limit {
        categories.truncate(limit);
    }
    info!(
        total = categories.len(),
        dry_run = opts.dry_run,
        "Starting category mirror run"
    );

    let enrich_opts = EnrichOpts {
        retries: cfg.max_retries,
        dry_run: opts.dry_run,
    };

    let mut summary = BatchSummary::default();
    for (i, category) in categories.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(cfg.inter_item_delay_ms)).await;
        }
        summary.processed += 1;

        match enricher.refresh_category(category, &enrich_opts).await {
            Ok(true) => summary.enriched += 1,
            Ok(false) => summary.skipped += 1,
            Err(e) => {
                warn!(path = %category.path.join("/"), error = %e, "Category mirror failed; skipping");
                summary.failed += 1;
            }
        }
    }

    info!(
        processed = summary.processed,
        enriched = summary.enriched,
        skipped = summary.skipped,
        failed = summary.failed,
        "Category mirror run complete"
    );
    Ok(summary)
}
