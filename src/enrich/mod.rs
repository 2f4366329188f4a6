//! Per-record enrichment: GST registration lookup and maps place lookup.
//!
//! Both lookups run in ephemeral tabs and both are best-effort: any failure
//! inside them collapses to `"N/A"` sentinels and never aborts the run.

pub mod gst;
pub mod places;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::records::NOT_AVAILABLE;
use crate::state::GstLedger;

/// Address/phone/website resolved for an (entity, location) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceDetails {
    pub address: String,
    pub phone: String,
    pub website: String,
}

impl PlaceDetails {
    /// All-sentinel result used for total lookup failure.
    pub fn unavailable() -> Self {
        Self {
            address: NOT_AVAILABLE.to_string(),
            phone: NOT_AVAILABLE.to_string(),
            website: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Resolves a GST registration number for an entity, rotating through the
/// candidates via the ledger. Returns `"N/A"` when nothing fresh is found.
#[async_trait]
pub trait GstLookup: Sync {
    async fn lookup(&self, entity: &str, ledger: &mut GstLedger) -> String;
}

/// Resolves address/phone/website for an (entity, location) pair.
#[async_trait]
pub trait PlaceLookup: Sync {
    async fn lookup(&self, entity: &str, location: &str) -> PlaceDetails;
}

/// Randomized pause between consecutive record enrichments so back-to-back
/// tab lookups don't hammer the lookup surfaces.
pub async fn polite_pause() {
    let secs = rand::thread_rng().gen_range(1..=3);
    debug!("pausing {secs}s before next lookup");
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_failure_is_all_sentinels() {
        let details = PlaceDetails::unavailable();
        assert_eq!(details.address, NOT_AVAILABLE);
        assert_eq!(details.phone, NOT_AVAILABLE);
        assert_eq!(details.website, NOT_AVAILABLE);
    }
}
