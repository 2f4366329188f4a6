//! Convergence detection for open-ended scroll/pagination streams.
//!
//! Lazy-loading sites keep the row count flat for a cycle or two while a batch
//! is in flight, so a single unchanged observation is not proof of exhaustion.
//! The tracker requires the valid-row count to hold still for several
//! consecutive cycles before declaring convergence, and a hard ceiling bounds
//! the run against a source that keeps dribbling out rows forever.

#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    /// Consecutive cycles without growth before the list counts as exhausted.
    pub stable_cycles: u32,
    /// Absolute cap on reveal cycles regardless of convergence.
    pub max_cycles: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            stable_cycles: 5,
            max_cycles: 60,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Converged,
    CeilingHit,
}

/// Observes the valid-row count once per reveal cycle.
pub struct CycleTracker {
    config: PaginationConfig,
    cycles: u32,
    stable: u32,
    last_count: usize,
}

impl CycleTracker {
    pub fn new(config: PaginationConfig) -> Self {
        Self {
            config,
            cycles: 0,
            stable: 0,
            last_count: 0,
        }
    }

    pub fn observe(&mut self, valid_count: usize) -> Verdict {
        self.cycles += 1;
        if valid_count > self.last_count {
            self.stable = 0;
            self.last_count = valid_count;
        } else {
            self.stable += 1;
        }

        if self.stable >= self.config.stable_cycles {
            Verdict::Converged
        } else if self.cycles >= self.config.max_cycles {
            Verdict::CeilingHit
        } else {
            Verdict::Continue
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}
