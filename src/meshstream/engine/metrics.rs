//! Run counters and the cooperative stop signal.

use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counters tracked across one MESHJOIN run.
///
/// At clean termination `emitted + expired_unmatched == ingested`; while the
/// run is in flight `emitted + expired_unmatched <= ingested`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinMetrics {
    /// Stream tuples admitted into the buffer
    pub ingested: u64,
    /// Enriched tuples durably written to the sink
    pub emitted: u64,
    /// Stream tuples that completed a full master cycle without a match
    pub expired_unmatched: u64,
    /// Full rotations through the master relation
    pub cycles_completed: u64,
}

impl JoinMetrics {
    /// Log the final summary at shutdown.
    pub fn log_summary(&self) {
        info!("MESHJOIN summary:");
        info!("    tuples ingested:    {}", self.ingested);
        info!("    tuples emitted:     {}", self.emitted);
        info!("    expired unmatched:  {}", self.expired_unmatched);
        info!("    cycles completed:   {}", self.cycles_completed);
    }
}

/// Cloneable handle used to request a graceful stop.
///
/// The driver observes the flag at the start of each step: refill halts,
/// buffered tuples drain through at most one further cycle, survivors are
/// expired, and the run ends cleanly.
#[derive(Debug, Clone, Default)]
pub struct StopController {
    flag: Arc<AtomicBool>,
}

impl StopController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the engine to stop producing and drain.
    pub fn request_stop(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            info!("stop requested; source refill will halt");
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
