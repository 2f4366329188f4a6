//! Job-board adapter (Naukri-style source).
//!
//! Paged results: the terminal signal is the next-page control going
//! absent/disabled rather than count stability, though the orchestrator's
//! convergence tracker still applies on top.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::{debug, info, warn};

use crate::browser::{text_of, try_find, type_into, wait_for};
use crate::records::{or_na, ListingRecord};

use super::{RevealOutcome, SiteAdapter};

const BASE_URL: &str = "https://www.naukri.com/";

// Search surface
const SEARCH_INPUTS: &str = "input.suggestor-input";
const SEARCH_SUBMIT: &str = "button.qsbSubmit";

// Result rows
const ROW: &str = "div.srp-jobtuple-wrapper";
const ROW_TITLE: &str = "a.title";
const ROW_COMPANY: &str = "a.comp-name";
const ROW_LOCATION: &str = "span.locWdth";

// Pagination and interstitials
const NEXT_LINK: &str = "div.styles_pagination-cont__sWLS8 a.styles_btn-secondary__2AsIP";
const NEXT_DISABLED: &str = "disabled";
const AD_CLOSE: &str = "span.crossIcon, div.styles_ppContainer__eEPgR .crossIcon";

const CONTROL_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

pub struct JobBoardAdapter {
    page: Page,
    industry: String,
    city: String,
    source_label: String,
}

impl JobBoardAdapter {
    pub fn new(page: Page, industry: String, city: String, source_label: String) -> Self {
        Self {
            page,
            industry,
            city,
            source_label,
        }
    }

    /// Ad interstitials pop over the result list at random; closing one that
    /// isn't there is not an error.
    async fn dismiss_interstitial(&self) {
        if let Some(close) = try_find(&self.page, AD_CLOSE).await {
            if close.click().await.is_ok() {
                debug!("dismissed ad interstitial");
            }
        }
    }
}

#[async_trait]
impl SiteAdapter for JobBoardAdapter {
    fn source_label(&self) -> &str {
        &self.source_label
    }

    fn headers(&self) -> [&'static str; 7] {
        [
            "Job_Title",
            "Company_Name",
            "Location",
            "Address",
            "Phone",
            "Website",
            "GST_Number(s)",
        ]
    }

    async fn apply_filters(&mut self) -> Result<()> {
        self.page
            .goto(BASE_URL)
            .await
            .context("navigating to job board")?;

        // The search bar exposes keyword / experience / location inputs with
        // one shared class. Keyword is first, location last.
        wait_for(&self.page, SEARCH_INPUTS, CONTROL_TIMEOUT)
            .await
            .context("job search bar never appeared")?;
        let inputs = self
            .page
            .find_elements(SEARCH_INPUTS)
            .await
            .context("reading search inputs")?;
        let keyword = inputs
            .first()
            .context("keyword input missing from search bar")?;
        type_into(keyword, &self.industry).await?;
        let location = inputs
            .last()
            .context("location input missing from search bar")?;
        type_into(location, &self.city).await?;

        let submit = wait_for(&self.page, SEARCH_SUBMIT, CONTROL_TIMEOUT)
            .await
            .context("search submit button never appeared")?;
        submit.click().await.context("submitting search")?;

        self.page
            .wait_for_navigation()
            .await
            .context("waiting for result page")?;
        tokio::time::sleep(SETTLE_DELAY).await;
        info!("searching jobs: {} in {}", self.industry, self.city);
        Ok(())
    }

    async fn extract_visible_rows(&mut self) -> Result<Vec<ListingRecord>> {
        self.dismiss_interstitial().await;

        let rows = self
            .page
            .find_elements(ROW)
            .await
            .context("reading result rows")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let title = match row.find_element(ROW_TITLE).await {
                Ok(el) => or_na(text_of(&el).await),
                Err(_) => or_na(None),
            };
            let entity = match row.find_element(ROW_COMPANY).await {
                Ok(el) => or_na(text_of(&el).await),
                Err(_) => or_na(None),
            };
            let location = match row.find_element(ROW_LOCATION).await {
                Ok(el) => or_na(text_of(&el).await),
                Err(_) => or_na(None),
            };
            records.push(ListingRecord {
                title,
                entity_name: entity,
                location,
                source_label: self.source_label.clone(),
            });
        }
        Ok(records)
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome> {
        self.dismiss_interstitial().await;

        // Two anchors share the class: Previous and Next. Pick by label.
        let candidates = self
            .page
            .find_elements(NEXT_LINK)
            .await
            .unwrap_or_default();
        let mut next = None;
        for el in candidates {
            if let Some(label) = text_of(&el).await {
                if label.eq_ignore_ascii_case("next") {
                    next = Some(el);
                    break;
                }
            }
        }

        let Some(next) = next else {
            debug!("no next-page control; source exhausted");
            return Ok(RevealOutcome::Exhausted);
        };
        if let Ok(Some(class)) = next.attribute("class").await {
            if class.contains(NEXT_DISABLED) {
                debug!("next-page control disabled; source exhausted");
                return Ok(RevealOutcome::Exhausted);
            }
        }

        if let Err(e) = next.click().await {
            // A click swallowed by an overlay is transient; the convergence
            // tracker ends the run if it keeps happening.
            warn!("next-page click failed: {e}");
            return Ok(RevealOutcome::Revealed);
        }
        let _ = self.page.wait_for_navigation().await;
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(RevealOutcome::Revealed)
    }
}
