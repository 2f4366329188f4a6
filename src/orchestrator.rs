//! The run loop: reveal rows, dedup, enrich, persist, repeat.
//!
//! One cycle is extract → dedup → enrich → flush → reveal. Convergence and
//! the attempt ceiling come from the cycle tracker; the adapter can also end
//! the run itself by reporting its next-page control exhausted. The interrupt
//! flag is sampled between phases and between per-record enrichments, never
//! mid-operation, and every termination path ends in a final flush of the
//! records that completed enrichment.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::adapters::{RevealOutcome, SiteAdapter};
use crate::enrich::{polite_pause, GstLookup, PlaceLookup};
use crate::paginate::{CycleTracker, PaginationConfig, Verdict};
use crate::records::EnrichedRecord;
use crate::sink::PersistenceSink;
use crate::state::{RunState, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Navigating,
    Extracting,
    Enriching,
    Persisting,
    Paginating,
    Terminated,
}

pub struct RunOptions {
    pub pagination: PaginationConfig,
    /// Randomized pauses between lookups; off in tests.
    pub polite_delays: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pagination: PaginationConfig::default(),
            polite_delays: true,
        }
    }
}

pub async fn run(
    adapter: &mut dyn SiteAdapter,
    gst: &dyn GstLookup,
    places: &dyn PlaceLookup,
    sink: &mut dyn PersistenceSink,
    state: &mut RunState,
    options: &RunOptions,
) -> Result<RunSummary> {
    let mut phase = Phase::Navigating;
    let mut tracker = CycleTracker::new(options.pagination);
    let mut interrupted = false;
    debug!("phase: {phase:?}");

    adapter.apply_filters().await?;

    while phase != Phase::Terminated {
        if state.interrupt.is_raised() {
            interrupted = true;
            break;
        }

        phase = Phase::Extracting;
        debug!("phase: {phase:?}");
        let rows = adapter.extract_visible_rows().await?;
        let valid: Vec<_> = rows.into_iter().filter(|r| r.is_valid()).collect();
        let valid_count = valid.len();
        let fresh: Vec<_> = valid
            .into_iter()
            .filter(|r| !state.dedup.seen(&r.dedup_key()))
            .collect();
        debug!(
            "cycle {}: {} valid rows visible, {} fresh, {} keys in ledger",
            tracker.cycles() + 1,
            valid_count,
            fresh.len(),
            state.dedup.len()
        );

        phase = Phase::Enriching;
        debug!("phase: {phase:?}");
        let progress = batch_progress(fresh.len());
        let mut enriched_any = false;
        for record in fresh {
            if state.interrupt.is_raised() {
                // The record in hand has not been enriched; drop it rather
                // than persist it half-filled.
                interrupted = true;
                break;
            }

            // The pre-filter ran against the ledger as it stood before this
            // batch; a row rendered twice within one frame gets past it, so
            // check again at the point of recording.
            let key = record.dedup_key();
            if state.dedup.seen(&key) {
                continue;
            }
            state.dedup.record(key);
            let gst_number = gst.lookup(&record.entity_name, &mut state.gst).await;
            let place = places
                .lookup(&record.entity_name, record.canonical_location())
                .await;

            info!(
                "{} | {} | {} | {}",
                record.title, record.entity_name, record.location, gst_number
            );
            let enriched = EnrichedRecord::new(
                record,
                place.address,
                place.phone,
                place.website,
                gst_number,
            );
            debug!(
                "enriched: {}",
                serde_json::to_string(&enriched).unwrap_or_default()
            );
            state.records.push(enriched);
            enriched_any = true;
            progress.inc(1);

            if options.polite_delays {
                polite_pause().await;
            }
        }
        progress.finish_and_clear();

        if enriched_any {
            phase = Phase::Persisting;
            debug!("phase: {phase:?}");
            sink.flush(&state.records).await?;
        }
        if interrupted {
            break;
        }

        phase = Phase::Paginating;
        debug!("phase: {phase:?}");
        match tracker.observe(valid_count) {
            Verdict::Converged => {
                info!("row count stable; source exhausted after {} cycles", tracker.cycles());
                phase = Phase::Terminated;
            }
            Verdict::CeilingHit => {
                info!("cycle ceiling reached at {} cycles", tracker.cycles());
                phase = Phase::Terminated;
            }
            Verdict::Continue => match adapter.reveal_more().await? {
                RevealOutcome::Exhausted => {
                    info!("source reports no further pages");
                    phase = Phase::Terminated;
                }
                RevealOutcome::Revealed => {}
            },
        }
    }

    if interrupted {
        info!(
            "interrupted; flushing {} completed records",
            state.records.len()
        );
        sink.flush(&state.records).await?;
    }

    Ok(RunSummary {
        records: state.records.len(),
        cycles: tracker.cycles(),
        interrupted,
    })
}

fn batch_progress(len: usize) -> ProgressBar {
    if len == 0 {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("enriching [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::PlaceDetails;
    use crate::records::{ListingRecord, NOT_AVAILABLE};
    use crate::state::{GstLedger, InterruptFlag};
    use async_trait::async_trait;

    fn record(title: &str, entity: &str, location: &str) -> ListingRecord {
        ListingRecord {
            title: title.into(),
            entity_name: entity.into(),
            location: location.into(),
            source_label: "test".into(),
        }
    }

    /// Replays a fixed script of per-cycle visible rows; the last frame
    /// repeats forever, modeling a source whose count has stopped growing.
    struct ScriptedAdapter {
        frames: Vec<Vec<ListingRecord>>,
        cycle: usize,
        reveals: usize,
        exhausted_after: Option<usize>,
    }

    impl ScriptedAdapter {
        fn new(frames: Vec<Vec<ListingRecord>>) -> Self {
            Self {
                frames,
                cycle: 0,
                reveals: 0,
                exhausted_after: None,
            }
        }
    }

    #[async_trait]
    impl SiteAdapter for ScriptedAdapter {
        fn source_label(&self) -> &str {
            "test"
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
            Ok(())
        }

        async fn extract_visible_rows(&mut self) -> Result<Vec<ListingRecord>> {
            let frame = self
                .frames
                .get(self.cycle)
                .or_else(|| self.frames.last())
                .cloned()
                .unwrap_or_default();
            self.cycle += 1;
            Ok(frame)
        }

        async fn reveal_more(&mut self) -> Result<RevealOutcome> {
            self.reveals += 1;
            if self.exhausted_after.is_some_and(|n| self.reveals >= n) {
                return Ok(RevealOutcome::Exhausted);
            }
            Ok(RevealOutcome::Revealed)
        }
    }

    /// Hands out GSTINs from a per-entity pool, through the real rotation.
    struct PooledGst {
        pool: Vec<String>,
    }

    #[async_trait]
    impl GstLookup for PooledGst {
        async fn lookup(&self, entity: &str, ledger: &mut GstLedger) -> String {
            crate::enrich::gst::select_fresh(entity, &self.pool, ledger)
        }
    }

    struct FixedPlaces;

    #[async_trait]
    impl PlaceLookup for FixedPlaces {
        async fn lookup(&self, _entity: &str, _location: &str) -> PlaceDetails {
            PlaceDetails {
                address: "14 MG Road".into(),
                phone: NOT_AVAILABLE.into(),
                website: "example.in".into(),
            }
        }
    }

    /// Records every flush: lengths plus the final snapshot.
    #[derive(Default)]
    struct RecordingSink {
        flush_lengths: Vec<usize>,
        last: Vec<EnrichedRecord>,
    }

    #[async_trait]
    impl PersistenceSink for RecordingSink {
        async fn flush(&mut self, records: &[EnrichedRecord]) -> Result<()> {
            self.flush_lengths.push(records.len());
            self.last = records.to_vec();
            Ok(())
        }
    }

    fn options(stable: u32, max: u32) -> RunOptions {
        RunOptions {
            pagination: PaginationConfig {
                stable_cycles: stable,
                max_cycles: max,
            },
            polite_delays: false,
        }
    }

    fn fresh_state() -> RunState {
        RunState::new(InterruptFlag::new())
    }

    async fn drive(
        adapter: &mut ScriptedAdapter,
        gst_pool: Vec<&str>,
        state: &mut RunState,
        opts: &RunOptions,
    ) -> (RunSummary, RecordingSink) {
        let gst = PooledGst {
            pool: gst_pool.into_iter().map(String::from).collect(),
        };
        let mut sink = RecordingSink::default();
        let summary = run(adapter, &gst, &FixedPlaces, &mut sink, state, opts)
            .await
            .unwrap();
        (summary, sink)
    }

    #[tokio::test]
    async fn repeated_rows_are_emitted_once() {
        // the same row is visible on two consecutive cycles
        let row = record("Data Analyst", "Acme", "Pune, MH");
        let mut adapter = ScriptedAdapter::new(vec![vec![row.clone()], vec![row.clone()]]);
        let mut state = fresh_state();
        let (summary, sink) = drive(&mut adapter, vec!["27ABCDE1234F1Z5"], &mut state, &options(2, 60)).await;

        assert_eq!(summary.records, 1);
        assert!(!summary.interrupted);
        assert_eq!(sink.last.len(), 1);
        assert_eq!(sink.last[0].listing.entity_name, "Acme");
    }

    #[tokio::test]
    async fn duplicate_rows_in_one_frame_enrich_once() {
        // the source renders the identical tuple twice on a single page
        let row = record("Data Analyst", "Acme", "Pune, MH");
        let mut adapter = ScriptedAdapter::new(vec![vec![row.clone(), row.clone()]]);
        let mut state = fresh_state();
        let (summary, sink) =
            drive(&mut adapter, vec!["27ABCDE1234F1Z5"], &mut state, &options(2, 60)).await;

        assert_eq!(summary.records, 1);
        assert_eq!(sink.last.len(), 1);
        // the single attribution proves the lookup ran once
        assert_eq!(state.gst.attributed_count("Acme"), 1);
    }

    #[tokio::test]
    async fn halts_n_cycles_after_growth_stops() {
        // counts 1, 2, 3, then flat: with N=4 the run sees 3 + 4 cycles
        let frames = vec![
            vec![record("T1", "E1", "Pune")],
            vec![record("T1", "E1", "Pune"), record("T2", "E2", "Pune")],
            vec![
                record("T1", "E1", "Pune"),
                record("T2", "E2", "Pune"),
                record("T3", "E3", "Pune"),
            ],
        ];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let (summary, _) = drive(&mut adapter, vec![], &mut state, &options(4, 60)).await;

        assert_eq!(summary.cycles, 3 + 4);
        assert_eq!(summary.records, 3);
    }

    #[tokio::test]
    async fn adapter_exhaustion_ends_the_run_early() {
        let frames = vec![vec![record("T1", "E1", "Pune")]];
        let mut adapter = ScriptedAdapter::new(frames);
        adapter.exhausted_after = Some(1);
        let mut state = fresh_state();
        let (summary, _) = drive(&mut adapter, vec![], &mut state, &options(5, 60)).await;

        // one reveal attempt, then the source said done
        assert_eq!(adapter.reveals, 1);
        assert_eq!(summary.records, 1);
    }

    #[tokio::test]
    async fn every_batch_is_flushed_as_it_completes() {
        let frames = vec![
            vec![record("T1", "E1", "Pune")],
            vec![record("T1", "E1", "Pune"), record("T2", "E2", "Pune")],
        ];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let (_, sink) = drive(&mut adapter, vec![], &mut state, &options(2, 60)).await;

        // flush after cycle 1 (1 record) and cycle 2 (2 cumulative); the
        // flat tail cycles add nothing and flush nothing
        assert_eq!(sink.flush_lengths, vec![1, 2]);
    }

    #[tokio::test]
    async fn gst_rotation_never_reuses_within_an_entity() {
        // three distinct roles at one employer; two registrations available
        let frames = vec![vec![
            record("Analyst", "Acme", "Pune"),
            record("Engineer", "Acme", "Pune"),
            record("Manager", "Acme", "Pune"),
        ]];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let (_, sink) = drive(
            &mut adapter,
            vec!["27ABCDE1234F1Z5", "29ABCDE1234F1Z2"],
            &mut state,
            &options(1, 60),
        )
        .await;

        let gstins: Vec<_> = sink.last.iter().map(|r| r.gst_number.clone()).collect();
        assert_eq!(
            gstins,
            vec!["27ABCDE1234F1Z5", "29ABCDE1234F1Z2", NOT_AVAILABLE]
        );
    }

    #[tokio::test]
    async fn no_cell_is_ever_empty() {
        let frames = vec![vec![record("T1", "E1", "Pune")]];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let (_, sink) = drive(&mut adapter, vec![], &mut state, &options(1, 60)).await;

        for r in &sink.last {
            for cell in [&r.address, &r.phone, &r.website, &r.gst_number] {
                assert!(!cell.is_empty());
            }
        }
        // no pool configured, so the registry column is the sentinel
        assert_eq!(sink.last[0].gst_number, NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn interrupt_before_a_record_drops_it_but_flushes_the_rest() {
        /// Raises the interrupt flag after the first successful lookup, as a
        /// ctrl-c landing mid-batch would.
        struct InterruptingGst {
            flag: InterruptFlag,
        }

        #[async_trait]
        impl GstLookup for InterruptingGst {
            async fn lookup(&self, _entity: &str, _ledger: &mut GstLedger) -> String {
                self.flag.raise();
                "27ABCDE1234F1Z5".to_string()
            }
        }

        let frames = vec![vec![
            record("Analyst", "Acme", "Pune"),
            record("Engineer", "Globex", "Pune"),
        ]];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let gst = InterruptingGst {
            flag: state.interrupt.clone(),
        };
        let mut sink = RecordingSink::default();
        let summary = run(
            &mut adapter,
            &gst,
            &FixedPlaces,
            &mut sink,
            &mut state,
            &options(5, 60),
        )
        .await
        .unwrap();

        assert!(summary.interrupted);
        // first record completed enrichment and was flushed; the second was
        // mid-batch at interrupt time and dropped
        assert_eq!(summary.records, 1);
        assert_eq!(sink.last.len(), 1);
        assert_eq!(sink.last[0].listing.entity_name, "Acme");
    }

    #[tokio::test]
    async fn invalid_rows_do_not_reach_enrichment() {
        let frames = vec![vec![
            record("T1", "E1", "Pune"),
            record(NOT_AVAILABLE, NOT_AVAILABLE, "Pune"), // skeleton tile
        ]];
        let mut adapter = ScriptedAdapter::new(frames);
        let mut state = fresh_state();
        let (summary, _) = drive(&mut adapter, vec![], &mut state, &options(1, 60)).await;
        assert_eq!(summary.records, 1);
    }
}
