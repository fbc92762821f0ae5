/// file: src/sanitize.rs
/// description: Allowlist HTML sanitizer for stored content fragments.
/// Pure transform: fragment in, cleaned fragment out. Dangerous tags are
/// dropped with their subtree, unknown-but-harmless tags are unwrapped
/// (children kept), relative URLs are absolutized against the source page,
/// and external links open in a new tab with `rel="noopener noreferrer"`.
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use url::Url;

/// Tags whose entire subtree is discarded.
const DROP_TAGS: &[&str] = &[
    "script", "style", "iframe", "noscript", "form", "input", "select", "textarea", "button",
    "object", "embed", "link", "meta", "svg", "canvas",
];

/// Tags emitted as-is (with filtered attributes).
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "hr", "ul", "ol", "li", "a", "img", "table", "thead", "tbody", "tfoot", "tr", "td",
    "th", "caption", "strong", "b", "em", "i", "u", "sup", "sub", "span", "div", "h2", "h3", "h4",
    "h5", "h6", "blockquote", "pre", "code",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Sanitize an HTML fragment for storage.
pub fn sanitize_fragment(html: &str, base: &Url) -> String {
    sanitize_fragment_filtered(html, base, |_| false)
}

/// Same as [`sanitize_fragment`], with an extra caller-supplied predicate:
/// elements for which `drop` returns true are removed with their subtree.
/// Used by the category extractor to strip promotional calls-to-action.
pub fn sanitize_fragment_filtered<F>(html: &str, base: &Url, drop: F) -> String
where
    F: Fn(&ElementRef) -> bool + Copy,
{
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for child in fragment.root_element().children() {
        serialize_node(child, base, drop, &mut out);
    }
    out.trim().to_owned()
}

fn serialize_node<F>(node: NodeRef<'_, Node>, base: &Url, drop: F, out: &mut String)
where
    F: Fn(&ElementRef) -> bool + Copy,
{
    match node.value() {
        Node::Text(t) => out.push_str(&escape_text(&t)),
        Node::Element(el) => {
            let name = el.name();
            if DROP_TAGS.contains(&name) {
                return;
            }
            if let Some(el_ref) = ElementRef::wrap(node)
                && drop(&el_ref)
            {
                return;
            }

            if !ALLOWED_TAGS.contains(&name) {
                // Unknown tag: unwrap, keep children.
                for child in node.children() {
                    serialize_node(child, base, drop, out);
                }
                return;
            }

            out.push('<');
            out.push_str(name);
            write_attrs(name, &el, base, out);
            out.push('>');

            if VOID_TAGS.contains(&name) {
                return;
            }
            for child in node.children() {
                serialize_node(child, base, drop, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {} // comments, doctypes, processing instructions
    }
}

fn write_attrs(tag: &str, el: &scraper::node::Element, base: &Url, out: &mut String) {
    match tag {
        "a" => {
            if let Some(href) = el.attr("href")
                && let Some(abs) = absolutize(href, base)
            {
                push_attr(out, "href", abs.as_str());
                if abs.host_str() != base.host_str() {
                    push_attr(out, "target", "_blank");
                    push_attr(out, "rel", "noopener noreferrer");
                }
            }
            if let Some(title) = el.attr("title") {
                push_attr(out, "title", title);
            }
        }
        "img" => {
            if let Some(src) = el.attr("src")
                && let Some(abs) = absolutize(src, base)
            {
                push_attr(out, "src", abs.as_str());
            }
            if let Some(alt) = el.attr("alt") {
                push_attr(out, "alt", alt);
            }
        }
        "td" | "th" => {
            for key in ["colspan", "rowspan"] {
                if let Some(v) = el.attr(key) {
                    push_attr(out, key, v);
                }
            }
        }
        _ => {}
    }
}

/// Resolve against the page URL; refuse anything that is not http(s).
fn absolutize(raw: &str, base: &Url) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let resolved = base.join(trimmed).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
