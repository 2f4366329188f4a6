//! Per-source adapters behind one interface.
//!
//! The orchestrator knows nothing about any site's DOM. Each adapter owns the
//! primary page, applies that source's search controls once, and answers two
//! questions for the rest of the run: what rows are visible, and how do we
//! reveal more.

pub mod colleges;
pub mod jobs;

use anyhow::Result;
use async_trait::async_trait;

use crate::records::ListingRecord;

/// The two search-term shapes the CLI accepts.
#[derive(Debug, Clone)]
pub enum SearchQuery {
    Jobs { industry: String, city: String },
    Colleges { state: String, city: String, course: String },
}

impl SearchQuery {
    /// Short tag identifying which adapter/run produced a record.
    pub fn source_label(&self) -> String {
        match self {
            Self::Jobs { industry, city } => {
                format!("jobs:{}:{}", slug(industry), slug(city))
            }
            Self::Colleges { state, city, course } => {
                format!("colleges:{}:{}:{}", slug(state), slug(city), slug(course))
            }
        }
    }

    /// Workbook file name for this run, before collision versioning.
    pub fn export_file_name(&self) -> String {
        match self {
            Self::Jobs { industry, city } => {
                format!("{}_{}.xlsx", underscored(industry), underscored(city))
            }
            Self::Colleges { state, city, course } => format!(
                "{}_{}_{}.xlsx",
                underscored(course),
                underscored(city),
                underscored(state)
            ),
        }
    }
}

fn slug(s: &str) -> String {
    s.trim().to_lowercase().replace(char::is_whitespace, "-")
}

fn underscored(s: &str) -> String {
    s.trim().replace(char::is_whitespace, "_")
}

/// What happened when the adapter tried to reveal more rows.
#[derive(Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    /// More content may have loaded; extract again.
    Revealed,
    /// The source's own terminal signal (next-page control absent/disabled).
    Exhausted,
}

#[async_trait]
pub trait SiteAdapter: Send {
    fn source_label(&self) -> &str;

    /// Export header row for this source family. Cell order is always
    /// (title, entity, location, address, phone, website, gst).
    fn headers(&self) -> [&'static str; 7];

    /// Navigate to the source and apply the search filters. A required
    /// search control that never appears is fatal for the run; filters are
    /// assumed stable within one invocation, so nothing here is retried.
    async fn apply_filters(&mut self) -> Result<()>;

    /// Read whatever rows are currently rendered. Missing sub-fields become
    /// `"N/A"`; only a wholesale failure to read the page is an error.
    async fn extract_visible_rows(&mut self) -> Result<Vec<ListingRecord>>;

    /// Trigger one reveal cycle (scroll or next-page activation).
    async fn reveal_more(&mut self) -> Result<RevealOutcome>;
}
