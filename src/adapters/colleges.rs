//! College-directory adapter (Shiksha-style source).
//!
//! Lazy-loaded list: reveal is a scroll to the bottom, and termination is
//! purely the orchestrator's count-stability rule.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::{debug, info};

use crate::browser::{scroll_to_bottom, text_of, try_find, type_into, wait_for};
use crate::records::{or_na, ListingRecord};

use super::{RevealOutcome, SiteAdapter};

const BASE_URL: &str = "https://www.shiksha.com";

// Result rows
const ROW: &str = "div.tuple-clg";
const ROW_NAME: &str = "a.tuple-inst-name";
const ROW_LOCALITY: &str = "span.inst-locality";
const ROW_COURSE: &str = "span.course-name";

// Location facet
const FACET_SEARCH: &str = "input.filter-search-input";
const FACET_OPTION: &str = "label.filter-label";

const CONTROL_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

pub struct CollegeDirectoryAdapter {
    page: Page,
    state: String,
    city: String,
    course: String,
    source_label: String,
}

impl CollegeDirectoryAdapter {
    pub fn new(
        page: Page,
        state: String,
        city: String,
        course: String,
        source_label: String,
    ) -> Self {
        Self {
            page,
            state,
            city,
            course,
            source_label,
        }
    }

    fn listing_url(&self) -> String {
        let course = slugify(&self.course);
        let city = slugify(&self.city);
        format!("{BASE_URL}/{course}/colleges/{course}-colleges-{city}")
    }

    /// Narrow the list to the requested state through the location facet.
    /// The facet is optional on some course pages; only the facet search box
    /// being present but unusable is treated as fatal.
    async fn apply_state_facet(&self) -> Result<()> {
        let Some(search) = try_find(&self.page, FACET_SEARCH).await else {
            debug!("no location facet on this listing; skipping state filter");
            return Ok(());
        };
        type_into(&search, &self.state).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let options = self
            .page
            .find_elements(FACET_OPTION)
            .await
            .context("reading location facet options")?;
        for option in options {
            if let Some(label) = text_of(&option).await {
                if label.to_lowercase().contains(&self.state.to_lowercase()) {
                    option.click().await.context("selecting state facet")?;
                    tokio::time::sleep(SETTLE_DELAY).await;
                    return Ok(());
                }
            }
        }
        debug!("state {:?} not offered by the facet", self.state);
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for CollegeDirectoryAdapter {
    fn source_label(&self) -> &str {
        &self.source_label
    }

    fn headers(&self) -> [&'static str; 7] {
        [
            "Course",
            "College_Name",
            "Location",
            "Address",
            "Phone",
            "Website",
            "GST_Number(s)",
        ]
    }

    async fn apply_filters(&mut self) -> Result<()> {
        let url = self.listing_url();
        self.page
            .goto(url.as_str())
            .await
            .with_context(|| format!("navigating to {url}"))?;

        // The row container is the required control here: without it the
        // course/city combination has no listing at all.
        wait_for(&self.page, ROW, CONTROL_TIMEOUT)
            .await
            .context("college listing never appeared")?;

        self.apply_state_facet().await?;
        info!(
            "listing colleges: {} in {}, {}",
            self.course, self.city, self.state
        );
        Ok(())
    }

    async fn extract_visible_rows(&mut self) -> Result<Vec<ListingRecord>> {
        let rows = self
            .page
            .find_elements(ROW)
            .await
            .context("reading college rows")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = match row.find_element(ROW_NAME).await {
                Ok(el) => or_na(text_of(&el).await),
                Err(_) => or_na(None),
            };
            // Per-row course tag when shown, otherwise the searched course.
            let title = match row.find_element(ROW_COURSE).await {
                Ok(el) => or_na(text_of(&el).await.or_else(|| Some(self.course.clone()))),
                Err(_) => self.course.clone(),
            };
            let location = match row.find_element(ROW_LOCALITY).await {
                Ok(el) => or_na(text_of(&el).await),
                Err(_) => format!("{}, {}", self.city, self.state),
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
        scroll_to_bottom(&self.page).await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(RevealOutcome::Revealed)
    }
}

fn slugify(s: &str) -> String {
    s.trim().to_lowercase().replace(char::is_whitespace, "-")
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugs_are_lowercase_hyphenated() {
        assert_eq!(slugify("B Tech"), "b-tech");
        assert_eq!(slugify(" Navi Mumbai "), "navi-mumbai");
    }
}
