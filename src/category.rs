/// file: src/category.rs
/// description: Category/listing page extraction into ordered content blocks.
/// Category markup is inconsistent across category types, so this extractor
/// works structurally: find the primary content region, drop navigation and
/// scripts, then partition the remaining children — in document order —
/// into resource-card blocks, publication-citation blocks, and generic HTML.
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{CategoryExtract, ContentBlock, Publication, ResourceCard};
use crate::sanitize::sanitize_fragment_filtered;

/// Primary content region candidates, most specific first.
const REGION_SELECTORS: &[&str] = &[
    "div.category-description",
    "#main-content",
    "main",
    "#content",
    ".content",
    "article",
    "body",
];

/// Promotional call-to-action stripped from generic blocks as noise.
const CTA_TEXT: &str = "request free sample";

/// Citation-number markers in the first column: "1", "12.", "[3]".
static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[?(\d{1,4})[\]. :]?$").expect("citation marker pattern"));

pub fn extract_category(html: &str, source_url: &str) -> CategoryExtract {
    let Ok(base) = Url::parse(source_url) else {
        return CategoryExtract::default();
    };
    let doc = Html::parse_document(html);

    let title = extract_title(&doc);
    let Some(region) = find_region(&doc) else {
        return CategoryExtract {
            title,
            blocks: Vec::new(),
        };
    };

    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut generic_buffer: Vec<String> = Vec::new();

    for child in region.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        if is_structural_noise(&el) {
            continue;
        }

        if let Some(items) = try_publications(&el) {
            flush_generic(&mut generic_buffer, &mut blocks, &base);
            blocks.push(ContentBlock::Publications { items });
        } else if let Some(cards) = try_resource_cards(&el, &base) {
            flush_generic(&mut generic_buffer, &mut blocks, &base);
            blocks.push(ContentBlock::Resources { cards });
        } else {
            generic_buffer.push(el.html());
        }
    }
    flush_generic(&mut generic_buffer, &mut blocks, &base);

    CategoryExtract { title, blocks }
}

// ---------------------------------------------------------------------------
// Region & noise
// ---------------------------------------------------------------------------

fn extract_title(doc: &Html) -> Option<String> {
    for sel_str in ["h1", "title"] {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let text = normalized_text(el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn find_region(doc: &Html) -> Option<ElementRef<'_>> {
    for sel_str in REGION_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next()
            && !normalized_text(el).is_empty()
        {
            return Some(el);
        }
    }
    None
}

/// The top category-navigation list and script tags are structural noise,
/// not content.
fn is_structural_noise(el: &ElementRef<'_>) -> bool {
    let name = el.value().name();
    if matches!(name, "script" | "style" | "nav") {
        return true;
    }
    if matches!(name, "ul" | "ol")
        && let Some(class) = el.value().attr("class")
        && class.to_lowercase().contains("categor")
    {
        return true;
    }
    false
}

// ---------------------------------------------------------------------------
// Resource cards
// ---------------------------------------------------------------------------

/// An image-bearing anchor list. Title is required — a candidate without
/// one is dropped, and a container without enough surviving cards is not a
/// resource block at all.
fn try_resource_cards(el: &ElementRef<'_>, base: &Url) -> Option<Vec<ResourceCard>> {
    let (Ok(anchor_sel), Ok(img_sel)) = (Selector::parse("a[href]"), Selector::parse("img")) else {
        return None;
    };

    let mut cards: Vec<ResourceCard> = Vec::new();
    for anchor in el.select(&anchor_sel) {
        let Some(img) = anchor.select(&img_sel).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(href) = base.join(href.trim()) else {
            continue;
        };

        let image_url = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .and_then(|s| base.join(s.trim()).ok())
            .map(|u| u.to_string());

        let mut texts = anchor
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned);
        let title = texts
            .next()
            .or_else(|| img.value().attr("alt").map(|a| a.trim().to_owned()))
            .filter(|t| !t.is_empty());
        let Some(title) = title else {
            continue; // title required
        };
        let subtitle = texts.next();

        cards.push(ResourceCard {
            title,
            subtitle,
            href: href.to_string(),
            image_url,
        });
    }

    let list_like = matches!(el.value().name(), "ul" | "ol");
    if cards.is_empty() || (!list_like && cards.len() < 2) {
        return None;
    }
    Some(cards)
}

// ---------------------------------------------------------------------------
// Publications
// ---------------------------------------------------------------------------

/// A table whose first column holds citation-number markers. Every data row
/// must carry a marker; anything looser falls through to generic HTML.
fn try_publications(el: &ElementRef<'_>) -> Option<Vec<Publication>> {
    let table = if el.value().name() == "table" {
        *el
    } else {
        let table_sel = Selector::parse("table").ok()?;
        el.select(&table_sel).next()?
    };

    let (Ok(row_sel), Ok(cell_sel), Ok(doi_sel)) = (
        Selector::parse("tr"),
        Selector::parse("td, th"),
        Selector::parse(r#"a[href*="doi.org"]"#),
    ) else {
        return None;
    };

    let mut items: Vec<Publication> = Vec::new();
    for row in table.select(&row_sel) {
        let mut cells = row.select(&cell_sel);
        let Some(first) = cells.next() else {
            continue;
        };
        // header rows (all <th>) are skipped, not disqualifying
        if first.value().name() == "th" {
            continue;
        }

        let marker = normalized_text(first);
        let caps = CITATION_MARKER.captures(&marker)?;
        let order: u32 = caps[1].parse().ok()?;

        let mut citation = cells.map(normalized_text).collect::<Vec<_>>().join(" ");
        let doi = row
            .select(&doi_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(ToOwned::to_owned);

        // split a trailing "Product: ..." out of the citation text
        let mut product = None;
        if let Some(idx) = citation.find("Product:") {
            let tail = citation[idx + "Product:".len()..].trim().to_owned();
            if !tail.is_empty() {
                product = Some(tail);
            }
            citation.truncate(idx);
        }
        let citation = citation.trim().trim_end_matches('|').trim().to_owned();

        items.push(Publication {
            order,
            citation,
            doi,
            product,
        });
    }

    (!items.is_empty()).then_some(items)
}

// ---------------------------------------------------------------------------
// Generic HTML
// ---------------------------------------------------------------------------

fn flush_generic(buffer: &mut Vec<String>, blocks: &mut Vec<ContentBlock>, base: &Url) {
    if buffer.is_empty() {
        return;
    }
    let raw = buffer.concat();
    buffer.clear();

    let html = sanitize_fragment_filtered(&raw, base, |el| {
        matches!(el.value().name(), "a" | "button")
            && el
                .text()
                .collect::<String>()
                .to_lowercase()
                .contains(CTA_TEXT)
    });
    if !html.is_empty() {
        blocks.push(ContentBlock::Html { html });
    }
}

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

    const SOURCE_URL: &str = "https://www.abmgood.com/gene-editing.html";

    /// One resource-card list and one publications table interleaved with
    /// two paragraphs of prose.
    const CATEGORY_PAGE: &str = r##"
<html><head><title>Gene Editing | ABM</title></head><body>
<main>
  <ul class="category-list"><li><a href="/crispr.html">CRISPR</a></li></ul>
  <script>trackPageView()</script>
  <h1>Gene Editing</h1>
  <p>Everything you need for <a href="/crispr-guide">genome engineering</a>.</p>
  <ul class="resource-cards">
    <li><a href="/app-notes/cas9-delivery.html">
      <img src="/media/cards/cas9-delivery.jpg">
      <span>Cas9 Delivery Methods</span>
      <span>Application note</span>
    </a></li>
    <li><a href="/protocols/untitled.html"><img src="/media/cards/blank.jpg"></a></li>
  </ul>
  <p>Cited in over 900 peer-reviewed publications. <a class="cta" href="/free-sample">Request Free Sample</a></p>
  <table class="top-publications">
    <tr><th>#</th><th>Citation</th></tr>
    <tr><td>1.</td><td>Smith et al., Nature 2023. <a href="https://doi.org/10.1000/ng.123">link</a> Product: Cas9 Nuclease</td></tr>
    <tr><td>2.</td><td>Chen et al., Cell 2022.</td></tr>
  </table>
</main>
</body></html>"##;

    #[test]
    fn blocks_mirror_source_order_exactly() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        let kinds: Vec<&str> = ex
            .blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Html { .. } => "html",
                ContentBlock::Resources { .. } => "resources",
                ContentBlock::Publications { .. } => "publications",
            })
            .collect();
        assert_eq!(kinds, vec!["html", "resources", "html", "publications"]);
    }

    #[test]
    fn title_comes_from_h1() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        assert_eq!(ex.title.as_deref(), Some("Gene Editing"));
    }

    #[test]
    fn nav_list_and_scripts_are_removed() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        for block in &ex.blocks {
            if let ContentBlock::Html { html } = block {
                assert!(!html.contains("trackPageView"));
                assert!(!html.contains("category-list"));
            }
        }
    }

    #[test]
    fn resource_cards_require_a_title() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        let cards = ex
            .blocks
            .iter()
            .find_map(|b| match b {
                ContentBlock::Resources { cards } => Some(cards),
                _ => None,
            })
            .expect("resource block");

        // the second, title-less candidate was dropped
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Cas9 Delivery Methods");
        assert_eq!(cards[0].subtitle.as_deref(), Some("Application note"));
        assert_eq!(
            cards[0].href,
            "https://www.abmgood.com/app-notes/cas9-delivery.html"
        );
        assert_eq!(
            cards[0].image_url.as_deref(),
            Some("https://www.abmgood.com/media/cards/cas9-delivery.jpg")
        );
    }

    #[test]
    fn publications_parse_order_doi_and_product() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        let items = ex
            .blocks
            .iter()
            .find_map(|b| match b {
                ContentBlock::Publications { items } => Some(items),
                _ => None,
            })
            .expect("publications block");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].order, 1);
        assert!(items[0].citation.starts_with("Smith et al."));
        assert_eq!(items[0].doi.as_deref(), Some("https://doi.org/10.1000/ng.123"));
        assert_eq!(items[0].product.as_deref(), Some("Cas9 Nuclease"));
        assert_eq!(items[1].order, 2);
        assert!(items[1].doi.is_none());
        assert!(items[1].product.is_none());
    }

    #[test]
    fn cta_is_stripped_and_relative_links_absolutized() {
        let ex = extract_category(CATEGORY_PAGE, SOURCE_URL);
        let html_blocks: Vec<&String> = ex
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Html { html } => Some(html),
                _ => None,
            })
            .collect();

        assert_eq!(html_blocks.len(), 2);
        assert!(html_blocks[0].contains(r#"href="https://www.abmgood.com/crispr-guide""#));
        assert!(!html_blocks[1].contains("Request Free Sample"));
        assert!(html_blocks[1].contains("peer-reviewed"));
    }

    #[test]
    fn spec_style_tables_do_not_classify_as_publications() {
        let html = r#"
          <main>
            <table><tr><td>Unit Size</td><td>100 µg</td></tr></table>
          </main>"#;
        let ex = extract_category(html, SOURCE_URL);
        assert_eq!(ex.blocks.len(), 1);
        assert!(matches!(ex.blocks[0], ContentBlock::Html { .. }));
    }

    #[test]
    fn page_without_region_yields_no_blocks() {
        let ex = extract_category("<html><body></body></html>", SOURCE_URL);
        assert!(ex.blocks.is_empty());
    }
}
