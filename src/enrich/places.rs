//! Maps place lookup: address, phone and website for an (entity, location)
//! pair, each read independently so one missing field never blanks the rest.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::browser::{text_of, try_find, type_into, wait_for, BrowserSession, TabGuard};
use crate::records::or_na;

use super::{PlaceDetails, PlaceLookup};

const MAPS_URL: &str = "https://www.google.com/maps";
const SEARCH_BOX: &str = "input#searchboxinput";
const FIRST_RESULT: &str = "div[role='feed'] a.hfpxzc";
const ADDRESS: &str = "button[data-item-id='address']";
const PHONE: &str = "button[data-item-id^='phone']";
const WEBSITE: &str = "a[data-item-id='authority']";

const CONTROL_TIMEOUT: Duration = Duration::from_secs(12);
const FIELD_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_DELAY: Duration = Duration::from_millis(2000);

pub struct PlaceEnricher<'a> {
    session: &'a BrowserSession,
}

impl<'a> PlaceEnricher<'a> {
    pub fn new(session: &'a BrowserSession) -> Self {
        Self { session }
    }

    async fn lookup_in_tab(&self, tab: &TabGuard, query: &str) -> Result<PlaceDetails> {
        let search = wait_for(tab, SEARCH_BOX, CONTROL_TIMEOUT)
            .await
            .context("maps search box")?;
        type_into(&search, query).await?;
        search.press_key("Enter").await.context("submitting maps query")?;
        tokio::time::sleep(SETTLE_DELAY).await;

        // A specific enough query lands straight on the detail card; an
        // ambiguous one shows a results list, in which case take the first.
        if try_find(tab, ADDRESS).await.is_none() {
            if let Some(first) = try_find(tab, FIRST_RESULT).await {
                if first.click().await.is_ok() {
                    tokio::time::sleep(SETTLE_DELAY).await;
                } else {
                    debug!("first maps result not clickable for {query:?}");
                }
            }
        }

        Ok(PlaceDetails {
            address: read_field(tab, ADDRESS).await,
            phone: read_field(tab, PHONE).await,
            website: read_field(tab, WEBSITE).await,
        })
    }
}

/// One detail-card field with its own bounded wait and sentinel fallback.
async fn read_field(tab: &TabGuard, selector: &str) -> String {
    match wait_for(tab, selector, FIELD_TIMEOUT).await {
        Ok(el) => or_na(text_of(&el).await),
        Err(_) => or_na(None),
    }
}

#[async_trait::async_trait]
impl PlaceLookup for PlaceEnricher<'_> {
    async fn lookup(&self, entity: &str, location: &str) -> PlaceDetails {
        let query = format!("{entity} {location}");
        let tab = match self.session.open_tab(MAPS_URL).await {
            Ok(tab) => tab,
            Err(e) => {
                warn!("maps tab failed for {query:?}: {e}");
                return PlaceDetails::unavailable();
            }
        };

        let details = match self.lookup_in_tab(&tab, &query).await {
            Ok(details) => details,
            Err(e) => {
                warn!("place lookup failed for {query:?}: {e}");
                PlaceDetails::unavailable()
            }
        };
        if let Err(e) = tab.close().await {
            warn!("maps tab close: {e}");
        }
        details
    }
}
