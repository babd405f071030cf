//! Synchronous HTML helpers over `scrape-core`.
//!
//! Parsed documents never cross an `.await`; callers pass the page source in
//! and get owned results back.

use scrape_core::{Document, NodeId, NodeKind, Tag};
use url::Url;

use crate::error::ExtractionError;

const OUTLINE_CANDIDATES: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    "#content",
    "#main-content",
    ".content",
    "section",
    "table",
    "h1",
    "h2",
    "p",
];

/// Elements whose content is never rendered as text.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start and end a line of rendered text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tr", "ul",
];

const MAX_ID_CANDIDATES: usize = 20;
const PREVIEW_CHARS: usize = 80;

/// A selector that matched something on an inspected page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCandidate {
    pub selector: String,
    pub matches: usize,
    pub preview: String,
}

fn invalid(selector: &str, reason: impl ToString) -> ExtractionError {
    ExtractionError::InvalidSelector {
        selector: selector.to_owned(),
        reason: reason.to_string(),
    }
}

/// Whether `selector` matches at least one element.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidSelector`] if the selector does not parse.
pub fn selector_matches(html: &str, selector: &str) -> Result<bool, ExtractionError> {
    let soup = scrape_core::Soup::parse(html);
    let tags = soup.find_all(selector).map_err(|e| invalid(selector, e))?;
    Ok(!tags.is_empty())
}

/// Visible text of every element matching `selector`, joined in document order.
/// `None` when nothing matches.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidSelector`] if the selector does not parse.
pub fn inner_text(html: &str, selector: &str) -> Result<Option<String>, ExtractionError> {
    let soup = scrape_core::Soup::parse(html);
    let tags = soup.find_all(selector).map_err(|e| invalid(selector, e))?;
    if tags.is_empty() {
        return Ok(None);
    }
    let parts: Vec<String> = tags
        .into_iter()
        .map(visible_text)
        .filter(|text| !text.is_empty())
        .collect();
    Ok(Some(parts.join("\n\n")))
}

/// Candidate selectors present on the page, with match counts and a text preview.
#[must_use]
pub fn outline(html: &str) -> Vec<SelectorCandidate> {
    let soup = scrape_core::Soup::parse(html);
    let mut candidates = Vec::new();

    for selector in OUTLINE_CANDIDATES {
        if let Ok(tags) = soup.find_all(selector)
            && let Some(first) = tags.first()
        {
            candidates.push(SelectorCandidate {
                selector: (*selector).to_owned(),
                matches: tags.len(),
                preview: preview(&visible_text(*first)),
            });
        }
    }

    if let Ok(tags) = soup.find_all("[id]") {
        for tag in tags.into_iter().take(MAX_ID_CANDIDATES) {
            let Some(id) = tag.get("id") else { continue };
            let text = preview(&visible_text(tag));
            if id.is_empty() || text.is_empty() {
                continue;
            }
            candidates.push(SelectorCandidate {
                selector: format!("#{id}"),
                matches: 1,
                preview: text,
            });
        }
    }

    candidates
}

/// Render an outline as the observation text shown to the model.
#[must_use]
pub fn format_outline(url: &str, candidates: &[SelectorCandidate]) -> String {
    if candidates.is_empty() {
        return format!("No candidate selectors found on {url}");
    }
    let mut out = format!("Candidate selectors on {url}:\n");
    for c in candidates {
        out.push_str(&format!(
            "- `{}` ({} match{}): {}\n",
            c.selector,
            c.matches,
            if c.matches == 1 { "" } else { "es" },
            c.preview
        ));
    }
    out
}

/// Text of `tag` as a browser would render it: hidden elements skipped,
/// whitespace collapsed, one line per block element.
fn visible_text(tag: Tag<'_>) -> String {
    let mut buf = String::new();
    collect_visible(tag.document(), tag.node_id(), false, &mut buf);
    normalize_text(&buf)
}

fn collect_visible(doc: &Document, id: NodeId, preformatted: bool, buf: &mut String) {
    let Some(node) = doc.get(id) else { return };
    match &node.kind {
        NodeKind::Text { content } if preformatted => buf.push_str(content),
        NodeKind::Text { content } => push_collapsed(content, buf),
        NodeKind::Element { name, .. } => {
            let name = name.as_str();
            if HIDDEN_ELEMENTS.contains(&name) {
                return;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                line_break(buf);
            }
            let preformatted = preformatted || name == "pre";
            for child in doc.children(id) {
                collect_visible(doc, child, preformatted, buf);
            }
            if block {
                line_break(buf);
            } else if matches!(name, "td" | "th") {
                pad_space(buf);
            }
        }
        NodeKind::Comment { .. } => {}
    }
}

fn push_collapsed(text: &str, buf: &mut String) {
    if text.starts_with(char::is_whitespace) {
        pad_space(buf);
    }
    let mut words = text.split_whitespace();
    if let Some(first) = words.next() {
        buf.push_str(first);
        for word in words {
            buf.push(' ');
            buf.push_str(word);
        }
        if text.ends_with(char::is_whitespace) {
            pad_space(buf);
        }
    }
}

fn pad_space(buf: &mut String) {
    if !buf.is_empty() && !buf.ends_with(char::is_whitespace) {
        buf.push(' ');
    }
}

fn line_break(buf: &mut String) {
    let kept = buf.trim_end_matches([' ', '\t']).len();
    buf.truncate(kept);
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
}

/// Trim every line and collapse runs of blank lines into one.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = false;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = false;
    }
    out
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

/// Accept only `http`/`https` URLs; private and loopback hosts need `allow_private`.
///
/// # Errors
///
/// Returns [`ExtractionError::UrlNotAllowed`] describing the rejection.
pub fn validate_url(raw: &str, allow_private: bool) -> Result<Url, ExtractionError> {
    let parsed =
        Url::parse(raw).map_err(|_| ExtractionError::UrlNotAllowed(format!("invalid URL: {raw}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ExtractionError::UrlNotAllowed(format!(
            "scheme not allowed: {}",
            parsed.scheme()
        )));
    }

    if !allow_private
        && let Some(host) = parsed.host()
        && is_private_host(&host)
    {
        return Err(ExtractionError::UrlNotAllowed(format!(
            "private/local host blocked: {}",
            parsed.host_str().unwrap_or("")
        )));
    }

    Ok(parsed)
}

fn is_private_v4(v4: std::net::Ipv4Addr) -> bool {
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
}

fn is_private_host(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(d) => *d == "localhost",
        url::Host::Ipv4(v4) => is_private_v4(*v4),
        url::Host::Ipv6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                return true;
            }
            let seg = v6.segments();
            // fe80::/10 link-local, fc00::/7 unique local
            if seg[0] & 0xffc0 == 0xfe80 || seg[0] & 0xfe00 == 0xfc00 {
                return true;
            }
            v6.to_ipv4_mapped().is_some_and(is_private_v4)
        }
    }
}
