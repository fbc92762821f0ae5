/// file: src/product.rs
/// description: Product-detail page extraction (breadcrumb, SKU, tabs, docs, images).
/// The supplier renders product pages from several legacy template
/// generations, so every field is extracted through a chain of named
/// strategies tried in priority order. Each field is independent: a miss
/// leaves that field empty and never aborts the others.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::catalog::slugify;
use crate::models::{DocLink, ProductExtract};
use crate::sanitize::sanitize_fragment;

// ---------------------------------------------------------------------------
// Field constants
// ---------------------------------------------------------------------------

/// Breadcrumb containers across template generations, most specific first.
const BREADCRUMB_SELECTORS: &[&str] = &[
    ".breadcrumbs li",
    "nav.breadcrumb li",
    "ol.breadcrumb li",
    "ul.breadcrumb li",
    "#breadcrumbs li",
    ".breadcrumb li",
    ".breadcrumbs a",
    ".breadcrumb a",
];

/// Longer trails leak the product's own title on some templates; keeping
/// the last 3 segments is the accepted mitigation.
const MAX_BREADCRUMB_SEGMENTS: usize = 4;
const KEPT_BREADCRUMB_SEGMENTS: usize = 3;

const DOC_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx"];

/// URL substrings that mark marketing/chrome images rather than product
/// photos.
const IMAGE_NOISE_TOKENS: &[&str] = &[
    "logo",
    "flag",
    "favicon",
    "icon",
    "badge",
    "sprite",
    "placeholder",
];

/// Thumbnail dimensions the site uses exclusively for partner/vendor logos.
const LOGO_THUMB_DIMENSIONS: &[&str] = &["1x1", "88x31", "120x60", "150x50", "200x50"];

static SKU_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:cat(?:alog)?\.?\s*no\.?|sku)\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9-]{1,23})")
        .expect("sku label pattern")
});

static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[$€£¥]\s*\d|\b\d[\d,]*(?:\.\d+)?\s*(?:usd|eur|gbp|cad)\b")
        .expect("currency pattern")
});

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn extract_product(html: &str, source_url: &str) -> ProductExtract {
    let Ok(base) = Url::parse(source_url) else {
        debug!(source_url, "Unparseable source URL; skipping extraction");
        return ProductExtract::default();
    };
    let doc = Html::parse_document(html);

    let (category_path_titles, category_path) = extract_breadcrumb(&doc);

    ProductExtract {
        title: extract_title(&doc),
        sku: extract_sku(&doc),
        category_path,
        category_path_titles,
        specs_html: extract_specifications(&doc, &base),
        datasheet_html: extract_tab(&doc, "Datasheet", &base),
        documents_html: extract_tab(&doc, "Documents", &base),
        faqs_html: extract_tab(&doc, "FAQ", &base),
        references_html: extract_tab(&doc, "References", &base),
        reviews_html: extract_tab(&doc, "Reviews", &base),
        docs: extract_docs(&doc, &base),
        image_urls: extract_images(&doc, &base),
    }
}

// ---------------------------------------------------------------------------
// Breadcrumb / category path
// ---------------------------------------------------------------------------

fn extract_breadcrumb(doc: &Html) -> (Vec<String>, Vec<String>) {
    for sel_str in BREADCRUMB_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };

        let mut titles: Vec<String> = Vec::new();
        for el in doc.select(&sel) {
            let text = normalized_text(el);
            // separator-only items ("/", "›") are markup noise
            if !text.chars().any(char::is_alphanumeric) {
                continue;
            }
            titles.push(text);
        }
        if titles.is_empty() {
            continue;
        }

        if titles
            .first()
            .is_some_and(|t| t.eq_ignore_ascii_case("home"))
        {
            titles.remove(0);
        }
        titles.dedup();
        if titles.len() > MAX_BREADCRUMB_SEGMENTS {
            titles = titles.split_off(titles.len() - KEPT_BREADCRUMB_SEGMENTS);
        }

        let slugs = titles.iter().map(|t| slugify(t)).collect();
        return (titles, slugs);
    }
    (Vec::new(), Vec::new())
}

// ---------------------------------------------------------------------------
// Title & SKU
// ---------------------------------------------------------------------------

fn extract_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("h1").ok()?;
    let text = doc.select(&sel).next().map(normalized_text)?;
    (!text.is_empty()).then_some(text)
}

/// First "Cat. No. / Catalog No. / SKU" labelled code anywhere in the page
/// text wins.
fn extract_sku(doc: &Html) -> Option<String> {
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    SKU_LABEL
        .captures(&text)
        .map(|c| c[1].to_owned())
}

// ---------------------------------------------------------------------------
// Tab content
// ---------------------------------------------------------------------------

/// Generic tab extraction: tab-nav/panel strategy first, heading fallback
/// second, sanitized before storage. A miss is `None`, never garbage.
fn extract_tab(doc: &Html, name: &str, base: &Url) -> Option<String> {
    let raw = tab_fragment_raw(doc, name)?;
    let clean = sanitize_fragment(&raw, base);
    (!clean.is_empty()).then_some(clean)
}

fn tab_fragment_raw(doc: &Html, name: &str) -> Option<String> {
    if let Some(panel) = find_tab_panel(doc, name) {
        let inner = panel.inner_html();
        if !inner.trim().is_empty() {
            return Some(inner);
        }
    }
    heading_section_raw(doc, name)
}

/// Primary strategy: a nav control whose visible label matches the tab
/// name and whose target is an in-page anchor or ARIA-controlled panel id.
fn find_tab_panel<'a>(doc: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    let target = tab_target_id(doc, name)?;
    element_by_id(doc, &target)
}

fn tab_target_id(doc: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse("a[href], [role='tab'], [aria-controls]").ok()?;
    for el in doc.select(&sel) {
        if !label_matches(&normalized_text(el), name) {
            continue;
        }
        if let Some(id) = el.value().attr("aria-controls")
            && !id.is_empty()
        {
            return Some(id.to_owned());
        }
        if let Some(href) = el.value().attr("href")
            && let Some(frag) = href.trim().strip_prefix('#')
            && !frag.is_empty()
        {
            return Some(frag.to_owned());
        }
        // a matching label without an in-page target is a plain site link;
        // keep scanning
    }
    None
}

fn element_by_id<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(&format!(r#"[id="{}"]"#, id.replace('"', ""))).ok()?;
    doc.select(&sel).next()
}

/// Fallback strategy: a heading matching the tab name, plus following
/// siblings up to the next heading of equal-or-higher level.
fn heading_section_raw(doc: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse("h1, h2, h3, h4, h5, h6").ok()?;
    for heading in doc.select(&sel) {
        if !label_matches(&normalized_text(heading), name) {
            continue;
        }
        let level = heading_level(heading.value().name());

        let mut parts: Vec<String> = Vec::new();
        for sibling in heading.next_siblings() {
            if let Some(el) = ElementRef::wrap(sibling) {
                if let Some(sib_level) = try_heading_level(el.value().name())
                    && sib_level <= level
                {
                    break;
                }
                parts.push(el.html());
            }
        }
        if !parts.is_empty() {
            return Some(parts.concat());
        }
    }
    None
}

fn label_matches(label: &str, name: &str) -> bool {
    // "FAQs (3)" should match "FAQ"; labels are short so contains is safe
    label.to_lowercase().contains(&name.to_lowercase())
}

fn heading_level(tag: &str) -> u8 {
    try_heading_level(tag).unwrap_or(6)
}

fn try_heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Specifications — table-preferring variant with price-row stripping
// ---------------------------------------------------------------------------

/// Specifications prefers `<table>` markup inside the panel over the raw
/// panel HTML, and drops any row carrying pricing: the mirrored site never
/// shows prices.
fn extract_specifications(doc: &Html, base: &Url) -> Option<String> {
    let raw = tab_fragment_raw(doc, "Specifications")?;

    let fragment = Html::parse_fragment(&raw);
    let table_sel = Selector::parse("table").ok()?;
    let tables: Vec<ElementRef<'_>> = fragment.select(&table_sel).collect();

    let html = if tables.is_empty() {
        raw
    } else {
        tables.iter().map(|t| strip_price_rows(*t)).collect()
    };

    let clean = sanitize_fragment(&html, base);
    (!clean.is_empty()).then_some(clean)
}

/// Rebuild a table keeping row order, minus rows whose first cell is
/// literally "Price" or whose text contains a currency amount.
fn strip_price_rows(table: ElementRef<'_>) -> String {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return table.html();
    };

    let mut rows: Vec<String> = Vec::new();
    for row in table.select(&row_sel) {
        let first_cell = row.select(&cell_sel).next().map(normalized_text);
        if first_cell.is_some_and(|c| c.eq_ignore_ascii_case("price")) {
            continue;
        }
        if CURRENCY_AMOUNT.is_match(&normalized_text(row)) {
            continue;
        }
        rows.push(row.html());
    }
    format!("<table>{}</table>", rows.concat())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn extract_docs(doc: &Html, base: &Url) -> Vec<DocLink> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<DocLink> = Vec::new();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        let path = resolved.path().to_lowercase();
        if !DOC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }

        let url = resolved.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let mut label = normalized_text(el);
        if label.is_empty() {
            label = resolved
                .path_segments()
                .and_then(|mut s| s.next_back())
                .unwrap_or_default()
                .to_owned();
        }
        out.push(DocLink { label, url });
    }
    out
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn extract_images(doc: &Html, base: &Url) -> Vec<String> {
    let Ok(sel) = Selector::parse("img") else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for el in doc.select(&sel) {
        let attrs = el.value();
        let mut raw_urls: Vec<&str> = Vec::new();

        // lazy-load attributes hold the real image; the src is then just a
        // spacer/spinner placeholder
        let lazy: Vec<&str> = ["data-src", "data-original", "data-lazy"]
            .iter()
            .filter_map(|k| attrs.attr(k))
            .collect();
        if lazy.is_empty() {
            if let Some(v) = attrs.attr("src") {
                raw_urls.push(v);
            }
        } else {
            raw_urls.extend(lazy);
        }
        for key in ["srcset", "data-srcset"] {
            if let Some(srcset) = attrs.attr(key) {
                for entry in srcset.split(',') {
                    if let Some(u) = entry.split_whitespace().next() {
                        raw_urls.push(u);
                    }
                }
            }
        }

        for raw in raw_urls {
            let Ok(resolved) = base.join(raw.trim()) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let url = resolved.to_string();
            if is_noise_image(&url) {
                continue;
            }
            if seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }
    out
}

fn is_noise_image(url: &str) -> bool {
    let lower = url.to_lowercase();
    IMAGE_NOISE_TOKENS.iter().any(|t| lower.contains(t))
        || LOGO_THUMB_DIMENSIONS.iter().any(|d| lower.contains(d))
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn normalized_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_URL: &str = "https://www.abmgood.com/cas9-nuclease-t3189.html";

    /// A condensed tabbed-template product page.
    const TABBED_PAGE: &str = r##"
<html><body>
  <ul class="breadcrumbs">
    <li><a href="/">Home</a></li>
    <li><a href="/gene-editing.html">Gene Editing</a></li>
    <li><a href="/gene-editing/crispr.html">CRISPR</a></li>
    <li>Cas9 Nuclease</li>
  </ul>
  <h1>Cas9 Nuclease</h1>
  <p>Cat. No. T3189</p>
  <ul class="tab-nav">
    <li><a href="#tab-specs">Specifications</a></li>
    <li><a href="#tab-datasheet">Datasheet</a></li>
    <li><a href="#tab-faq">FAQs (2)</a></li>
  </ul>
  <div id="tab-specs">
    <table>
      <tr><th>Unit Size</th><td>100 µg</td></tr>
      <tr><td>Price</td><td>contact us</td></tr>
      <tr><td>Special Offer</td><td>$199.00 per vial</td></tr>
      <tr><th>Storage</th><td>-20°C</td></tr>
    </table>
  </div>
  <div id="tab-datasheet"><p>Recombinant Cas9 protein datasheet.</p></div>
  <div id="tab-faq"><p>Q: Is it NLS-tagged? A: Yes.</p></div>
  <img src="/media/product/cas9-vial.jpg">
  <img src="/media/logos/abm-logo.png">
  <img src="/media/banners/award-88x31.gif">
  <img data-src="/media/product/cas9-gel.jpg" src="/media/spinner.gif">
  <a href="/docs/t3189-coa.pdf">Certificate of Analysis</a>
  <a href="/docs/t3189-coa.pdf">CoA (duplicate)</a>
  <a href="/docs/t3189-manual.docx"></a>
</body></html>"##;

    #[test]
    fn breadcrumb_drops_home_and_slugifies() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert_eq!(
            ex.category_path_titles,
            vec!["Gene Editing", "CRISPR", "Cas9 Nuclease"]
        );
        assert_eq!(
            ex.category_path,
            vec!["gene-editing", "crispr", "cas9-nuclease"]
        );
    }

    #[test]
    fn breadcrumb_longer_than_four_keeps_last_three() {
        let html = r#"
          <ul class="breadcrumbs">
            <li>Home</li><li>Root</li><li>Mid</li><li>Leaf</li><li>Sub</li><li>Product Name</li>
          </ul>"#;
        let ex = extract_product(html, SOURCE_URL);
        assert_eq!(ex.category_path_titles, vec!["Leaf", "Sub", "Product Name"]);
    }

    #[test]
    fn consecutive_duplicate_breadcrumb_segments_collapse() {
        let html = r#"
          <ul class="breadcrumbs">
            <li>Home</li><li>CRISPR</li><li>CRISPR</li><li>Cas9</li>
          </ul>"#;
        let ex = extract_product(html, SOURCE_URL);
        assert_eq!(ex.category_path_titles, vec!["CRISPR", "Cas9"]);
    }

    #[test]
    fn sku_found_by_catalog_label() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert_eq!(ex.sku.as_deref(), Some("T3189"));

        let alt = extract_product("<p>Catalog No: LV590</p>", SOURCE_URL);
        assert_eq!(alt.sku.as_deref(), Some("LV590"));
    }

    #[test]
    fn title_from_first_h1() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert_eq!(ex.title.as_deref(), Some("Cas9 Nuclease"));
    }

    #[test]
    fn specs_prefer_tables_and_strip_price_rows() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        let specs = ex.specs_html.expect("specs extracted");
        assert!(specs.contains("Unit Size"));
        assert!(specs.contains("Storage"));
        assert!(!specs.contains("Price"));
        assert!(!specs.contains("$199.00"));
        // order of surviving rows preserved
        let unit = specs.find("Unit Size").expect("unit row");
        let storage = specs.find("Storage").expect("storage row");
        assert!(unit < storage);
    }

    #[test]
    fn tabs_extract_independently() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert!(ex.datasheet_html.expect("datasheet").contains("datasheet"));
        assert!(ex.faqs_html.expect("faq").contains("NLS-tagged"));
        // no References/Reviews structure anywhere on the page
        assert!(ex.references_html.is_none());
        assert!(ex.reviews_html.is_none());
    }

    #[test]
    fn heading_fallback_collects_until_next_heading() {
        let html = r#"
          <h2>Datasheet</h2>
          <p>Purity ≥ 95% by SDS-PAGE.</p>
          <p>Supplied in storage buffer.</p>
          <h2>Shipping</h2>
          <p>Shipped on dry ice.</p>"#;
        let ex = extract_product(html, SOURCE_URL);
        let datasheet = ex.datasheet_html.expect("datasheet via heading");
        assert!(datasheet.contains("Purity"));
        assert!(datasheet.contains("storage buffer"));
        assert!(!datasheet.contains("dry ice"));
    }

    #[test]
    fn images_filter_noise_and_dedupe_in_order() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert_eq!(
            ex.image_urls,
            vec![
                "https://www.abmgood.com/media/product/cas9-vial.jpg",
                "https://www.abmgood.com/media/product/cas9-gel.jpg",
            ]
        );
    }

    #[test]
    fn docs_dedupe_by_url_with_filename_fallback_label() {
        let ex = extract_product(TABBED_PAGE, SOURCE_URL);
        assert_eq!(ex.docs.len(), 2);
        assert_eq!(ex.docs[0].label, "Certificate of Analysis");
        assert_eq!(
            ex.docs[0].url,
            "https://www.abmgood.com/docs/t3189-coa.pdf"
        );
        assert_eq!(ex.docs[1].label, "t3189-manual.docx");
    }

    #[test]
    fn missing_structure_yields_empty_fields_not_garbage() {
        let ex = extract_product("<html><body><p>bare page</p></body></html>", SOURCE_URL);
        assert!(ex.category_path.is_empty());
        assert!(ex.sku.is_none());
        assert!(ex.specs_html.is_none());
        assert!(ex.image_urls.is_empty());
        assert!(ex.docs.is_empty());
    }
}
