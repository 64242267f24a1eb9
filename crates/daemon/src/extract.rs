//! Extractor seam: the opaque collaborator that turns a notice URL into
//! structured tender data.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use tender_core::model::TenderData;
use tender_core::validation::extract_reg_number;

use crate::config::DaemonConfig;
use crate::parse;

/// Generic extraction failure carrying a human-readable message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExtractError(String);

impl ExtractError {
    /// Wraps any displayable error.
    pub fn new(msg: impl std::fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

/// One extraction attempt against a rendered notice page.
///
/// Implementations own their timeouts; callers see only success or a failure
/// message. The task manager treats this as a black box.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts structured tender data from the given portal URL.
    async fn extract(&self, url: &str) -> Result<TenderData, ExtractError>;
}

/// Documents-tab URL for a registration number.
pub fn documents_url(reg_number: &str) -> String {
    format!(
        "https://zakupki.gov.ru/epz/order/notice/ea20/view/documents.html?regNumber={reg_number}"
    )
}

/// Production extractor: a fresh headless Chromium per task.
///
/// The portal renders client-side and fences scripted access, so the plain
/// page source is useless; we take the DOM after navigation settles. One
/// browser per extraction keeps sessions isolated and guarantees the process
/// is gone when the task finishes, at the cost of startup latency.
pub struct BrowserExtractor {
    timeout: Duration,
    headless: bool,
}

impl BrowserExtractor {
    /// Builds an extractor from daemon configuration.
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.browser_timeout_ms),
            headless: config.browser_headless,
        }
    }

    async fn session(&self, url: &str) -> Result<TenderData, ExtractError> {
        let builder = BrowserConfig::builder().no_sandbox();
        let builder = if self.headless {
            builder
        } else {
            builder.with_head()
        };
        let browser_config = builder.build().map_err(ExtractError::new)?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ExtractError::new(format!("browser launch failed: {e}")))?;

        // Drive the CDP event loop until the browser goes away.
        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        // The deadline wraps only the page work: teardown below must run
        // even when the extraction times out, or the child process and the
        // driver task linger until drop.
        let result = with_deadline(self.timeout, self.fetch_and_parse(&browser, url)).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        let _ = browser.wait().await;
        driver.abort();

        result
    }

    async fn fetch_and_parse(
        &self,
        browser: &Browser,
        url: &str,
    ) -> Result<TenderData, ExtractError> {
        let page = browser
            .new_page(url)
            .await
            .map_err(|e| ExtractError::new(format!("navigation failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ExtractError::new(format!("page load failed: {e}")))?;
        let html = page
            .content()
            .await
            .map_err(|e| ExtractError::new(format!("reading page content failed: {e}")))?;

        let mut tender = parse::parse_notice(&html)?;

        // Attachments live on a separate tab keyed by the same regNumber.
        if let Some(reg) = extract_reg_number(url) {
            match self.fetch_documents(browser, &reg).await {
                Ok(attachments) => tender.attachments = attachments,
                Err(e) => {
                    // A notice without a readable documents tab is still a
                    // usable record.
                    debug!(reg_number = %reg, error = %e, "documents tab not extracted");
                }
            }
        }

        Ok(tender)
    }

    async fn fetch_documents(
        &self,
        browser: &Browser,
        reg_number: &str,
    ) -> Result<Vec<tender_core::model::Attachment>, ExtractError> {
        let page = browser
            .new_page(documents_url(reg_number))
            .await
            .map_err(ExtractError::new)?;
        page.wait_for_navigation().await.map_err(ExtractError::new)?;
        let html = page.content().await.map_err(ExtractError::new)?;
        Ok(parse::parse_attachments(&html))
    }
}

/// Bounds `work` by `timeout`, mapping an elapsed deadline to an
/// extraction error.
async fn with_deadline<F>(timeout: Duration, work: F) -> Result<TenderData, ExtractError>
where
    F: std::future::Future<Output = Result<TenderData, ExtractError>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(ExtractError::new(format!(
            "extraction timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl Extractor for BrowserExtractor {
    async fn extract(&self, url: &str) -> Result<TenderData, ExtractError> {
        self.session(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_url_carries_reg_number() {
        let url = documents_url("0123456789");
        assert!(url.contains("documents.html?regNumber=0123456789"));
        assert!(url.starts_with("https://zakupki.gov.ru/"));
    }

    #[tokio::test]
    async fn deadline_elapses_into_an_extraction_error() {
        let result =
            with_deadline(Duration::from_millis(10), futures::future::pending()).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
