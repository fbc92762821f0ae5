/// file: src/resolve.rs
/// description: Search-results page parsing and outcome classification.
/// Turns the supplier's own search-results HTML into a deduplicated list of
/// candidate product links, classified as exactly-one (auto-navigable),
/// many (disambiguation needed), or none. Membership in the results page is
/// the only filter — the site's own relevance ranking is trusted, no fuzzy
/// matching against the query.
use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::models::{Candidate, SearchResolution};

/// Product detail pages on the source site are flat `.html` paths.
pub const PRODUCT_PAGE_EXT: &str = ".html";

/// Cap for the "multiple" case; beyond this, disambiguation in the UI is
/// useless anyway.
const MAX_CANDIDATES: usize = 20;

pub fn resolve_search(html: &str, search_url: &str, base: &Url) -> SearchResolution {
    let candidates = collect_candidates(html, base);

    match candidates.len() {
        0 => SearchResolution::None {
            search_url: search_url.to_owned(),
        },
        1 => {
            let only = &candidates[0];
            SearchResolution::Single {
                product_url: only.url.clone(),
                title: only.title.clone(),
                search_url: search_url.to_owned(),
            }
        }
        _ => SearchResolution::Multiple {
            candidates: candidates.into_iter().take(MAX_CANDIDATES).collect(),
            search_url: search_url.to_owned(),
        },
    }
}

/// Same-origin anchors ending in the product-page extension, deduplicated
/// by absolute URL in first-seen order.
fn collect_candidates(html: &str, base: &Url) -> Vec<Candidate> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Candidate> = Vec::new();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if resolved.host_str() != base.host_str() {
            continue;
        }
        if !resolved.path().ends_with(PRODUCT_PAGE_EXT) {
            continue;
        }

        let mut url = resolved;
        url.set_fragment(None);
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = el
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        out.push(Candidate { title, url });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.abmgood.com/catalogsearch/result/?q=T3189").expect("base")
    }

    const SEARCH_URL: &str = "https://www.abmgood.com/catalogsearch/result/?q=T3189";

    #[test]
    fn one_product_anchor_resolves_to_single() {
        let html = r#"
            <div class="results">
              <a href="/cas9-nuclease-t3189.html">Cas9 Nuclease</a>
              <a href="https://partner.example.com/cas9.html">External mirror</a>
              <a href="/support/contact">Contact us</a>
            </div>"#;
        match resolve_search(html, SEARCH_URL, &base()) {
            SearchResolution::Single {
                product_url, title, ..
            } => {
                assert_eq!(
                    product_url,
                    "https://www.abmgood.com/cas9-nuclease-t3189.html"
                );
                assert_eq!(title, "Cas9 Nuclease");
            }
            other => panic!("expected Single, got {other:?}"),
        }
    }

    #[test]
    fn zero_anchors_resolve_to_none_with_fallback_url() {
        let html = "<div class='results'><p>No products matched your search.</p></div>";
        match resolve_search(html, SEARCH_URL, &base()) {
            SearchResolution::None { search_url } => assert_eq!(search_url, SEARCH_URL),
            other => panic!("expected None, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_hrefs_with_different_text_collapse_to_one() {
        let html = r#"
            <a href="/cas9-nuclease-t3189.html"><img src="/i/t.jpg"></a>
            <a href="/cas9-nuclease-t3189.html">Cas9 Nuclease</a>"#;
        match resolve_search(html, SEARCH_URL, &base()) {
            SearchResolution::Single { product_url, .. } => {
                assert_eq!(
                    product_url,
                    "https://www.abmgood.com/cas9-nuclease-t3189.html"
                );
            }
            other => panic!("expected Single after dedup, got {other:?}"),
        }
    }

    #[test]
    fn many_anchors_resolve_to_multiple_in_first_seen_order() {
        let html = r#"
            <a href="/cas9-nuclease-t3189.html">Cas9 Nuclease</a>
            <a href="/cas9-nickase-t3190.html">Cas9 Nickase</a>
            <a href="/cas9-hifi-t3191.html">Cas9 HiFi</a>"#;
        match resolve_search(html, SEARCH_URL, &base()) {
            SearchResolution::Multiple { candidates, .. } => {
                assert_eq!(candidates.len(), 3);
                assert_eq!(candidates[0].title, "Cas9 Nuclease");
                assert_eq!(candidates[2].title, "Cas9 HiFi");
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn multiple_is_capped_at_twenty() {
        let mut html = String::new();
        for i in 0..30 {
            html.push_str(&format!("<a href=\"/product-{i}.html\">Product {i}</a>"));
        }
        match resolve_search(&html, SEARCH_URL, &base()) {
            SearchResolution::Multiple { candidates, .. } => {
                assert_eq!(candidates.len(), 20);
                assert_eq!(candidates[0].title, "Product 0");
                assert_eq!(candidates[19].title, "Product 19");
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }
}
