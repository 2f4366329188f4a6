//! GST registration lookup against a registry search surface.
//!
//! A name search can return several registrations (one per state for large
//! employers). Selection rotates through them: the first candidate not yet
//! attributed to that entity wins, so repeated rows for one employer surface
//! distinct registrations instead of repeating the first hit.

use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::browser::{text_of, type_into, wait_for, BrowserSession, TabGuard};
use crate::records::NOT_AVAILABLE;
use crate::state::GstLedger;

use super::GstLookup;

const SEARCH_URL: &str = "https://www.knowyourgst.com/gst-number-search/";
const NAME_INPUT: &str = "input#gstnumber";
const SUBMIT: &str = "button[type='submit']";
const RESULT_AREA: &str = "div#searchresult, table.table";

const CONTROL_TIMEOUT: Duration = Duration::from_secs(12);
const RESULT_TIMEOUT: Duration = Duration::from_secs(8);

/// 15-character GSTIN: state code, PAN, registration digit, a literal Z,
/// checksum character.
const GSTIN_PATTERN: &str = r"\b\d{2}[A-Z]{5}\d{4}[A-Z][A-Z\d]Z[A-Z\d]\b";

pub struct GstEnricher<'a> {
    session: &'a BrowserSession,
    pattern: Regex,
}

impl<'a> GstEnricher<'a> {
    pub fn new(session: &'a BrowserSession) -> Self {
        Self {
            session,
            // The pattern is a compile-time constant; a bad one is a bug.
            pattern: Regex::new(GSTIN_PATTERN).expect("GSTIN pattern must compile"),
        }
    }

    async fn fetch_candidates(&self, entity: &str) -> Result<Vec<String>> {
        let tab = self.session.open_tab(SEARCH_URL).await?;
        let result = self.search_in_tab(&tab, entity).await;
        // Close on both paths; thousands of lookups must not leak tabs.
        if let Err(e) = tab.close().await {
            warn!("gst tab close: {e}");
        }
        result
    }

    async fn search_in_tab(&self, tab: &TabGuard, entity: &str) -> Result<Vec<String>> {
        let input = wait_for(tab, NAME_INPUT, CONTROL_TIMEOUT)
            .await
            .context("registry search input")?;
        type_into(&input, entity).await?;

        let submit = wait_for(tab, SUBMIT, CONTROL_TIMEOUT)
            .await
            .context("registry search submit")?;
        submit.click().await.context("submitting registry search")?;

        let results = wait_for(tab, RESULT_AREA, RESULT_TIMEOUT)
            .await
            .context("registry results")?;
        let text = text_of(&results).await.unwrap_or_default();
        Ok(scan_gstins(&self.pattern, &text))
    }
}

/// GSTIN-shaped codes in page order, first occurrence only.
fn scan_gstins(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// First candidate not yet attributed to this entity; attributes it on pick.
pub fn select_fresh(entity: &str, candidates: &[String], ledger: &mut GstLedger) -> String {
    for candidate in candidates {
        if !ledger.is_attributed(entity, candidate) {
            ledger.attribute(entity, candidate);
            return candidate.clone();
        }
    }
    NOT_AVAILABLE.to_string()
}

#[async_trait::async_trait]
impl GstLookup for GstEnricher<'_> {
    async fn lookup(&self, entity: &str, ledger: &mut GstLedger) -> String {
        match self.fetch_candidates(entity).await {
            Ok(candidates) => select_fresh(entity, &candidates, ledger),
            Err(e) => {
                warn!("gst lookup failed for {entity:?}: {e}");
                NOT_AVAILABLE.to_string()
            }
        }
    }
}
