use serde::Serialize;

/// Placeholder written wherever a field could not be resolved. Every export
/// column and DB cell carries either a real value or this, never an empty cell.
pub const NOT_AVAILABLE: &str = "N/A";

/// One row as extracted from a listing site, before enrichment.
#[derive(Debug, Clone, Serialize)]
pub struct ListingRecord {
    pub title: String,
    pub entity_name: String,
    pub location: String,
    pub source_label: String,
}

/// Identity of a record within one run: a row seen again on a later
/// scroll/page cycle maps to the same key and is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub title: String,
    pub entity: String,
    pub location: String,
}

impl ListingRecord {
    /// First comma-delimited segment of the raw location, trimmed.
    /// "Pune, Maharashtra" and "Pune, MH, India" both canonicalize to "Pune".
    pub fn canonical_location(&self) -> &str {
        self.location
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or(self.location.trim())
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            title: self.title.trim().to_string(),
            entity: self.entity_name.trim().to_string(),
            location: self.canonical_location().to_string(),
        }
    }

    /// Rows missing a headline field are rendering artifacts (ad tiles,
    /// skeleton placeholders) and don't count toward pagination convergence.
    pub fn is_valid(&self) -> bool {
        self.title != NOT_AVAILABLE && self.entity_name != NOT_AVAILABLE
    }
}

/// A listing row plus everything the enrichment stage resolved for it.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub listing: ListingRecord,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub gst_number: String,
}

impl EnrichedRecord {
    pub fn new(
        listing: ListingRecord,
        address: String,
        phone: String,
        website: String,
        gst_number: String,
    ) -> Self {
        Self {
            listing,
            address,
            phone,
            website,
            gst_number,
        }
    }
}

/// Map an optional scraped value to a non-empty string or the sentinel.
pub fn or_na(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}
