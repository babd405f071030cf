use std::path::Path;
use std::time::Duration;

use crate::browser::{Browser, PageSession};
use crate::config::ExtractConfig;
use crate::error::ExtractionError;
use crate::html::{self, SelectorCandidate};
use crate::pdf::PdfReader;
use crate::source::{ExtractedDocument, SourceReference};

/// Turns source references into plain text.
///
/// Every page load runs in its own browser session, released before the
/// call returns on every path.
#[derive(Debug)]
pub struct ContentExtractor<B> {
    browser: B,
    pdf: PdfReader,
    navigation_timeout: Duration,
    selector_timeout: Duration,
    allow_private_hosts: bool,
}

impl<B: Browser> ContentExtractor<B> {
    #[must_use]
    pub fn new(browser: B, config: &ExtractConfig) -> Self {
        Self {
            browser,
            pdf: PdfReader::new(config.max_file_size),
            navigation_timeout: config.navigation_timeout(),
            selector_timeout: config.selector_timeout(),
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, navigation: Duration, selector: Duration) -> Self {
        self.navigation_timeout = navigation;
        self.selector_timeout = selector;
        self
    }

    /// Extract the text behind `source`. A URL needs a selector, either on the
    /// reference itself or passed in `selector` (which wins).
    ///
    /// # Errors
    ///
    /// Any [`ExtractionError`] from reading the file or loading the page.
    pub async fn extract(
        &self,
        source: &SourceReference,
        selector: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let text = match source {
            SourceReference::File { path } => self.read_pdf(path).await?,
            SourceReference::Url { address, selector: own } => {
                let selector = selector.or(own.as_deref()).ok_or_else(|| {
                    ExtractionError::MissingSelector {
                        url: address.clone(),
                    }
                })?;
                self.scrape(address, selector).await?
            }
        };
        Ok(ExtractedDocument {
            text,
            source: source.clone(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ExtractionError::UnreadableFile`] on any read or parse failure.
    pub async fn read_pdf(&self, path: &Path) -> Result<String, ExtractionError> {
        self.pdf.read(path).await
    }

    /// Load `url` and return the visible text inside `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NavigationTimeout`] when the page does not
    /// load within the navigation bound and [`ExtractionError::SelectorNotFound`]
    /// when the selector does not appear within the selector bound.
    pub async fn scrape(&self, url: &str, selector: &str) -> Result<String, ExtractionError> {
        html::validate_url(url, self.allow_private_hosts)?;
        let mut session = self.browser.launch().await?;
        let result = self.scrape_in(&mut session, url, selector).await;
        session.close().await;
        match &result {
            Ok(text) => tracing::info!(chars = text.len(), "scraped {url} [{selector}]"),
            Err(e) => tracing::warn!("scrape failed: {e}"),
        }
        result
    }

    /// Load `url` and list selectors worth scraping.
    ///
    /// # Errors
    ///
    /// Returns navigation errors as for [`Self::scrape`].
    pub async fn inspect(&self, url: &str) -> Result<Vec<SelectorCandidate>, ExtractionError> {
        html::validate_url(url, self.allow_private_hosts)?;
        let mut session = self.browser.launch().await?;
        let result = match self.navigate(&mut session, url).await {
            Ok(()) => Ok(session.html().map(html::outline).unwrap_or_default()),
            Err(e) => Err(e),
        };
        session.close().await;
        result
    }

    async fn navigate(&self, session: &mut B::Session, url: &str) -> Result<(), ExtractionError> {
        let timeout = self.navigation_timeout;
        match tokio::time::timeout(timeout, session.goto(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::NavigationTimeout {
                url: url.to_owned(),
                timeout,
            }),
        }
    }

    async fn scrape_in(
        &self,
        session: &mut B::Session,
        url: &str,
        selector: &str,
    ) -> Result<String, ExtractionError> {
        let not_found = || ExtractionError::SelectorNotFound {
            selector: selector.to_owned(),
            url: url.to_owned(),
            timeout: self.selector_timeout,
        };

        self.navigate(session, url).await?;

        let timeout = self.selector_timeout;
        match tokio::time::timeout(timeout, session.wait_for_selector(selector, timeout)).await {
            Ok(result) => result?,
            Err(_) => return Err(not_found()),
        }

        session.inner_text(selector)?.ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBrowser, minimal_pdf};

    const RULE_PAGE: &str = "<html><body><nav>menu</nav>\
        <article id=\"rule\"><h1>Liquidity Rule</h1><p>Banks report LCR daily.</p></article>\
        </body></html>";

    fn extractor(browser: MockBrowser) -> ContentExtractor<MockBrowser> {
        let config = ExtractConfig {
            allow_private_hosts: true,
            ..ExtractConfig::default()
        };
        ContentExtractor::new(browser, &config)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn scrape_returns_scoped_text_and_releases_session() {
        let browser = MockBrowser::new().with_page("https://reg.example/rule", RULE_PAGE);
        let ex = extractor(browser.clone());
        let text = ex.scrape("https://reg.example/rule", "article").await.unwrap();
        assert_eq!(text, "Liquidity Rule\nBanks report LCR daily.");
        assert_eq!(browser.launched_sessions(), 1);
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn missing_selector_fails_and_releases_session() {
        let browser = MockBrowser::new().with_page("https://reg.example/rule", RULE_PAGE);
        let ex = extractor(browser.clone());
        let err = ex
            .scrape("https://reg.example/rule", "#does-not-exist")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExtractionError::SelectorNotFound {
                selector: "#does-not-exist".into(),
                url: "https://reg.example/rule".into(),
                timeout: Duration::from_millis(100),
            }
        );
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn slow_page_hits_navigation_timeout() {
        let browser = MockBrowser::new().with_slow_page(
            "https://reg.example/slow",
            RULE_PAGE,
            Duration::from_secs(5),
        );
        let ex = extractor(browser.clone());
        let err = ex.scrape("https://reg.example/slow", "article").await.unwrap_err();
        assert!(matches!(err, ExtractionError::NavigationTimeout { .. }));
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn sessions_are_not_shared() {
        let browser = MockBrowser::new().with_page("https://reg.example/rule", RULE_PAGE);
        let ex = extractor(browser.clone());
        ex.scrape("https://reg.example/rule", "article").await.unwrap();
        ex.scrape("https://reg.example/rule", "h1").await.unwrap();
        assert_eq!(browser.launched_sessions(), 2);
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn url_without_selector_is_rejected() {
        let ex = extractor(MockBrowser::new());
        let source = SourceReference::parse("https://reg.example/rule");
        let err = ex.extract(&source, None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::MissingSelector { .. }));
    }

    #[tokio::test]
    async fn explicit_selector_overrides_reference() {
        let browser = MockBrowser::new().with_page("https://reg.example/rule", RULE_PAGE);
        let ex = extractor(browser);
        let source = SourceReference::parse("https://reg.example/rule").with_selector("nav");
        let doc = ex.extract(&source, Some("h1")).await.unwrap();
        assert_eq!(doc.text, "Liquidity Rule");
    }

    #[tokio::test]
    async fn inspect_lists_candidates() {
        let browser = MockBrowser::new().with_page("https://reg.example/rule", RULE_PAGE);
        let ex = extractor(browser.clone());
        let candidates = ex.inspect("https://reg.example/rule").await.unwrap();
        assert!(candidates.iter().any(|c| c.selector == "article"));
        assert!(candidates.iter().any(|c| c.selector == "#rule"));
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn file_source_reads_pdf_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.pdf");
        std::fs::write(
            &path,
            minimal_pdf(&["Alpha provisions", "Bravo provisions", "Charlie provisions"]),
        )
        .unwrap();
        let ex = extractor(MockBrowser::new());
        let doc = ex
            .extract(&SourceReference::File { path: path.clone() }, None)
            .await
            .unwrap();
        let a = doc.text.find("Alpha").unwrap();
        let b = doc.text.find("Bravo").unwrap();
        let c = doc.text.find("Charlie").unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn file_url_is_not_allowed() {
        let ex = extractor(MockBrowser::new());
        let err = ex.scrape("file:///etc/hosts", "body").await.unwrap_err();
        assert!(matches!(err, ExtractionError::UrlNotAllowed(_)));
    }
}
