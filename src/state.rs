use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::records::{DedupKey, EnrichedRecord};

/// Which (title, entity, location) keys have already been emitted this run.
/// Checked before a row enters enrichment; lookups are expensive and must
/// never run twice for one key.
#[derive(Debug, Default)]
pub struct DedupLedger {
    keys: HashSet<DedupKey>,
}

impl DedupLedger {
    pub fn seen(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    pub fn record(&mut self, key: DedupKey) {
        self.keys.insert(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// GSTINs already attributed per entity. A registry search for a large
/// employer returns several registrations (one per state); rotating through
/// them means repeated rows for the same employer each surface a different
/// registration instead of repeating the first hit.
#[derive(Debug, Default)]
pub struct GstLedger {
    attributed: HashMap<String, HashSet<String>>,
}

impl GstLedger {
    pub fn is_attributed(&self, entity: &str, gstin: &str) -> bool {
        self.attributed
            .get(entity)
            .is_some_and(|set| set.contains(gstin))
    }

    /// Returns false if the GSTIN was already attributed to this entity.
    pub fn attribute(&mut self, entity: &str, gstin: &str) -> bool {
        self.attributed
            .entry(entity.to_string())
            .or_default()
            .insert(gstin.to_string())
    }

    pub fn attributed_count(&self, entity: &str) -> usize {
        self.attributed.get(entity).map_or(0, HashSet::len)
    }
}

/// Raised by the ctrl-c watcher, sampled by the orchestrator between phases
/// and between per-record enrichments. Never aborts an in-flight wait; the
/// operation finishes (or times out) first.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything mutable over one run. Constructed fresh per invocation (and per
/// test); discarded at process exit. Only the orchestrator task touches it.
pub struct RunState {
    pub records: Vec<EnrichedRecord>,
    pub dedup: DedupLedger,
    pub gst: GstLedger,
    pub interrupt: InterruptFlag,
}

impl RunState {
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self {
            records: Vec::new(),
            dedup: DedupLedger::default(),
            gst: GstLedger::default(),
            interrupt,
        }
    }
}

/// Final counts reported after a run.
pub struct RunSummary {
    pub records: usize,
    pub cycles: u32,
    pub interrupted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(title: &str, entity: &str, location: &str) -> DedupKey {
        DedupKey {
            title: title.into(),
            entity: entity.into(),
            location: location.into(),
        }
    }

    #[test]
    fn seen_after_record() {
        let mut ledger = DedupLedger::default();
        let k = key("Data Analyst", "Acme", "Pune");
        assert!(!ledger.seen(&k));
        ledger.record(k.clone());
        assert!(ledger.seen(&k));
        ledger.record(k.clone());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn same_fields_different_entity_are_distinct() {
        let mut ledger = DedupLedger::default();
        ledger.record(key("Data Analyst", "Acme", "Pune"));
        assert!(!ledger.seen(&key("Data Analyst", "Globex", "Pune")));
    }

    #[test]
    fn gstin_attributed_once_per_entity() {
        let mut ledger = GstLedger::default();
        assert!(ledger.attribute("Acme", "27ABCDE1234F1Z5"));
        assert!(!ledger.attribute("Acme", "27ABCDE1234F1Z5"));
        assert!(ledger.is_attributed("Acme", "27ABCDE1234F1Z5"));
        assert_eq!(ledger.attributed_count("Acme"), 1);
        // same GSTIN for a different entity is a separate attribution
        assert!(ledger.attribute("Acme Ltd", "27ABCDE1234F1Z5"));
    }

    #[test]
    fn interrupt_flag_is_shared() {
        let flag = InterruptFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_raised());
        clone.raise();
        assert!(flag.is_raised());
    }
}
