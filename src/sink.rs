//! Dual persistence: authoritative workbook plus best-effort MySQL mirror.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::db::{self, DbConfig};
use crate::export;
use crate::records::EnrichedRecord;

/// Called with the cumulative record set after every enriched batch and on
/// interruption. Implementations must be safe to call repeatedly with a
/// growing prefix-stable slice.
#[async_trait]
pub trait PersistenceSink: Send {
    async fn flush(&mut self, records: &[EnrichedRecord]) -> Result<()>;
}

pub struct DualSink {
    export_path: PathBuf,
    headers: [&'static str; 7],
    db: Option<DbConfig>,
    mirrored: usize,
}

impl DualSink {
    pub fn new(export_path: PathBuf, headers: [&'static str; 7], db: Option<DbConfig>) -> Self {
        Self {
            export_path,
            headers,
            db,
            mirrored: 0,
        }
    }
}

#[async_trait]
impl PersistenceSink for DualSink {
    async fn flush(&mut self, records: &[EnrichedRecord]) -> Result<()> {
        // Workbook first: it is the durability baseline, so its failure is a
        // real error. The rewrite covers the whole cumulative set.
        export::write_workbook(&self.export_path, &self.headers, records)?;

        // Mirror only the tail that hasn't made it over yet; on failure the
        // cursor stays put and the next flush retries those rows.
        if let Some(config) = &self.db {
            match db::mirror_records(config, &records[self.mirrored..]).await {
                Ok(()) => self.mirrored = records.len(),
                Err(e) => warn!("mirror write failed (workbook still saved): {e:#}"),
            }
        }
        Ok(())
    }
}
