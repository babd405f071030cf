//! Isolated page sessions.
//!
//! A [`Browser`] hands out one [`PageSession`] per extraction. Sessions hold
//! the loaded page and must be closed when the extraction ends, whether it
//! succeeded or not.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ExtractConfig;
use crate::error::ExtractionError;
use crate::html;

pub trait Browser: Send + Sync {
    type Session: PageSession;

    /// Open a fresh session that shares no cookies or state with any other.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Session`] if the session cannot be created.
    fn launch(&self) -> impl Future<Output = Result<Self::Session, ExtractionError>> + Send;
}

pub trait PageSession: Send {
    /// Load `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NavigationTimeout`] or [`ExtractionError::NavigationFailed`].
    fn goto(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ExtractionError>> + Send;

    /// Wait until `selector` matches on the loaded page.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::SelectorNotFound`] once `timeout` elapses without a match.
    fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ExtractionError>> + Send;

    /// Current page source, if a page is loaded.
    fn html(&self) -> Option<&str>;

    /// Release the session.
    fn close(self) -> impl Future<Output = ()> + Send;

    /// Visible text of the elements matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Session`] when no page is loaded.
    fn inner_text(&self, selector: &str) -> Result<Option<String>, ExtractionError> {
        let page = self
            .html()
            .ok_or_else(|| ExtractionError::Session("no page loaded".into()))?;
        html::inner_text(page, selector)
    }
}

/// Plain HTTP backend: each session fetches with its own client and polls the
/// page until the selector appears.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    user_agent: String,
    max_body_bytes: usize,
    poll_interval: Duration,
}

impl HttpBrowser {
    #[must_use]
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
            poll_interval: config.poll_interval(),
        }
    }
}

impl Browser for HttpBrowser {
    type Session = HttpSession;

    async fn launch(&self) -> Result<HttpSession, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ExtractionError::Session(e.to_string()))?;
        tracing::debug!("browser session opened");
        Ok(HttpSession {
            client,
            max_body_bytes: self.max_body_bytes,
            poll_interval: self.poll_interval,
            url: None,
            page: None,
            open: true,
        })
    }
}

#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    max_body_bytes: usize,
    poll_interval: Duration,
    url: Option<String>,
    page: Option<String>,
    open: bool,
}

impl HttpSession {
    async fn fetch(&self, url: &str) -> Result<String, ExtractionError> {
        let failed = |reason: String| ExtractionError::NavigationFailed {
            url: url.to_owned(),
            reason,
        };

        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(failed(format!("HTTP {}", resp.status())));
        }

        let max = self.max_body_bytes;
        if let Some(declared) = resp.content_length()
            && declared > u64::try_from(max).unwrap_or(u64::MAX)
        {
            return Err(failed(format!("response too large: {declared} bytes (max: {max})")));
        }

        // Content-Length can be missing, so the cap also applies while streaming.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| failed(e.to_string()))? {
            if bytes.len() + chunk.len() > max {
                return Err(failed(format!("response too large: more than {max} bytes")));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl PageSession for HttpSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), ExtractionError> {
        let page = match tokio::time::timeout(timeout, self.fetch(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::NavigationTimeout {
                    url: url.to_owned(),
                    timeout,
                });
            }
        };
        self.url = Some(url.to_owned());
        self.page = Some(page);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExtractionError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| ExtractionError::Session("no page loaded".into()))?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(page) = &self.page
                && html::selector_matches(page, selector)?
            {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ExtractionError::SelectorNotFound {
                    selector: selector.to_owned(),
                    url,
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.fetch(&url)).await {
                Ok(Ok(page)) => self.page = Some(page),
                Ok(Err(e)) => tracing::debug!("reload while waiting for '{selector}' failed: {e}"),
                Err(_) => {}
            }
        }
    }

    fn html(&self) -> Option<&str> {
        self.page.as_deref()
    }

    async fn close(mut self) {
        self.page = None;
        self.open = false;
        tracing::debug!("browser session closed");
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("browser session dropped without close");
        }
    }
}
