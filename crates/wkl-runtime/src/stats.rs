#![forbid(unsafe_code)]

//! Frame statistics published by the UI thread and readable from anywhere.
//!
//! The UI thread accumulates into a [`FrameStats`] it owns and publishes a
//! copy after each tick or event. Readers on other threads take a lock-free
//! snapshot through [`SharedFrameStats::load`].

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::applier::Invocation;

/// Cumulative counters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub ticks: u64,
    pub events: u64,
    /// Invocations that ran a worklet, including finishing ones.
    pub applied: u64,
    pub skipped: u64,
    pub unchanged: u64,
    pub finished: u64,
    /// Duration of the most recent tick or event, in microseconds.
    pub last_tick_us: u64,
}

impl FrameStats {
    /// Count one invocation outcome.
    pub fn record(&mut self, invocation: &Invocation) {
        match invocation {
            Invocation::Applied(_) => self.applied += 1,
            Invocation::Finished(_) => {
                self.applied += 1;
                self.finished += 1;
            }
            Invocation::Unchanged => self.unchanged += 1,
            Invocation::Skipped(_) => self.skipped += 1,
        }
    }

    /// One JSON object, newline-terminated.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let line = serde_json::json!({
            "event": "frame_stats",
            "ticks": self.ticks,
            "events": self.events,
            "applied": self.applied,
            "skipped": self.skipped,
            "unchanged": self.unchanged,
            "finished": self.finished,
            "last_tick_us": self.last_tick_us,
        });
        format!("{line}\n")
    }
}

/// Cloneable read handle over the latest published [`FrameStats`].
#[derive(Debug, Clone)]
pub struct SharedFrameStats {
    inner: Arc<ArcSwap<FrameStats>>,
}

impl Default for SharedFrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedFrameStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(FrameStats::default())),
        }
    }

    #[must_use]
    pub fn load(&self) -> FrameStats {
        **self.inner.load()
    }

    pub fn publish(&self, stats: FrameStats) {
        self.inner.store(Arc::new(stats));
    }
}
