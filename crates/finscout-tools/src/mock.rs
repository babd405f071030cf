//! Test-only browser backend and fixtures.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::browser::{Browser, PageSession};
use crate::error::ExtractionError;
use crate::html;

#[derive(Debug, Clone)]
struct MockPage {
    html: String,
    load_delay: Duration,
}

/// Serves canned pages and counts sessions, so tests can assert release.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    pages: HashMap<String, MockPage>,
    open: Arc<AtomicUsize>,
    launched: Arc<AtomicUsize>,
}

impl MockBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.with_slow_page(url, html, Duration::ZERO)
    }

    #[must_use]
    pub fn with_slow_page(
        mut self,
        url: impl Into<String>,
        html: impl Into<String>,
        load_delay: Duration,
    ) -> Self {
        self.pages.insert(
            url.into(),
            MockPage {
                html: html.into(),
                load_delay,
            },
        );
        self
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn launched_sessions(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
}

impl Browser for MockBrowser {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession, ExtractionError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            pages: self.pages.clone(),
            open: Arc::clone(&self.open),
            current: None,
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct MockSession {
    pages: HashMap<String, MockPage>,
    open: Arc<AtomicUsize>,
    current: Option<(String, String)>,
    released: bool,
}

impl MockSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl PageSession for MockSession {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<(), ExtractionError> {
        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractionError::NavigationFailed {
                url: url.to_owned(),
                reason: "HTTP 404 Not Found".into(),
            })?;
        if !page.load_delay.is_zero() {
            tokio::time::sleep(page.load_delay).await;
        }
        self.current = Some((url.to_owned(), page.html));
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExtractionError> {
        let (url, page) = self
            .current
            .clone()
            .ok_or_else(|| ExtractionError::Session("no page loaded".into()))?;
        if html::selector_matches(&page, selector)? {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(ExtractionError::SelectorNotFound {
            selector: selector.to_owned(),
            url,
            timeout,
        })
    }

    fn html(&self) -> Option<&str> {
        self.current.as_ref().map(|(_, page)| page.as_str())
    }

    async fn close(mut self) {
        self.release();
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build a small valid PDF with one Helvetica text line per page.
#[must_use]
pub fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_owned());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_owned(),
    );
    for (i, text) in pages.iter().enumerate() {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let content = format!("BT /F1 12 Tf 72 720 Td ({escaped}) Tj ET");
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
    }
    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_pdf_has_header_and_trailer() {
        let bytes = minimal_pdf(&["one", "two"]);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("/Count 2"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[tokio::test]
    async fn drop_releases_session() {
        let browser = MockBrowser::new();
        {
            let _session = browser.launch().await.unwrap();
            assert_eq!(browser.open_sessions(), 1);
        }
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unknown_url_fails_navigation() {
        let browser = MockBrowser::new();
        let mut session = browser.launch().await.unwrap();
        let err = session
            .goto("https://nowhere.example", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NavigationFailed { .. }));
        session.close().await;
        assert_eq!(browser.open_sessions(), 0);
    }
}
