//! Chromium session plumbing shared by the adapters and enrichers.
//!
//! One `BrowserSession` lives for the whole run. The primary page drives the
//! listing site; enrichment lookups open ephemeral tabs wrapped in `TabGuard`
//! so the tab is released on every exit path, not just the happy one.

use std::ops::Deref;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chromium and spawn the CDP event pump.
    pub async fn launch(headful: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder().window_size(1440, 900);
        if headful {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// The long-lived primary page that drives the listing site.
    pub async fn primary_page(&self, url: &str) -> Result<Page> {
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("opening primary page {url}"))?;
        Ok(page)
    }

    /// An ephemeral tab scoped to one enrichment call.
    pub async fn open_tab(&self, url: &str) -> Result<TabGuard> {
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("opening tab {url}"))?;
        Ok(TabGuard::new(page, url.to_string()))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {e}");
        }
        self.handler_task.abort();
    }
}

/// RAII wrapper around an ephemeral tab. chromiumoxide pages have no Drop of
/// their own; without an explicit close each lookup would leak a tab, which
/// adds up over thousands of enrichments. Prefer the async `close()`; the
/// `Drop` fallback spawns a background close for error/panic paths.
pub struct TabGuard {
    page: Option<Page>,
    label: String,
    runtime: tokio::runtime::Handle,
}

impl TabGuard {
    pub fn new(page: Page, label: String) -> Self {
        Self {
            page: Some(page),
            label,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            page.close()
                .await
                .with_context(|| format!("closing tab {}", self.label))?;
            debug!("tab closed: {}", self.label);
        }
        Ok(())
    }

    fn page(&self) -> &Page {
        // Only reachable while `page` is still Some: `close` consumes self.
        self.page.as_ref().expect("tab already closed")
    }
}

impl Deref for TabGuard {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        self.page()
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let label = std::mem::take(&mut self.label);
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    warn!("tab cleanup failed for {label}: {e}");
                }
            });
        }
    }
}

/// Poll for an element until it appears or the deadline passes. All element
/// waits in the pipeline go through here so every wait is bounded.
pub async fn wait_for(page: &Page, selector: &str, timeout: Duration) -> Result<Element> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!(
                "element {selector:?} not found within {:.1}s",
                timeout.as_secs_f64()
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Non-waiting lookup for optional elements (ad close buttons, detail cards).
pub async fn try_find(page: &Page, selector: &str) -> Option<Element> {
    page.find_element(selector).await.ok()
}

/// Focus a control and type into it.
pub async fn type_into(element: &Element, text: &str) -> Result<()> {
    element.click().await.context("focusing input")?;
    element.type_str(text).await.context("typing input")?;
    Ok(())
}

pub async fn scroll_to_bottom(page: &Page) -> Result<()> {
    page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await
        .context("scrolling to bottom")?;
    Ok(())
}

/// Trimmed inner text of an element, if it has any.
pub async fn text_of(element: &Element) -> Option<String> {
    element
        .inner_text()
        .await
        .ok()
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
