#![forbid(unsafe_code)]

//! A deterministic [`Scheduler`] for tests.
//!
//! Nothing runs until the test drains a queue. The test plays both threads:
//! it owns the UI state and passes it to [`ManualScheduler::run_ui_until_idle`],
//! and calls [`ManualScheduler::run_js_until_idle`] to play the script side.
//! Ordering is exactly post order per queue. A queue whose lock was poisoned
//! by a panicking test thread keeps working.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::scheduler::{JsTask, Scheduler, UiTask};

/// Queues for both threads, drained on demand.
pub struct ManualScheduler<U> {
    ui: Mutex<VecDeque<UiTask<U>>>,
    js: Mutex<VecDeque<JsTask>>,
}

impl<U> Default for ManualScheduler<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> std::fmt::Debug for ManualScheduler<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending_ui", &self.pending_ui())
            .field("pending_js", &self.pending_js())
            .finish()
    }
}

impl<U> ManualScheduler<U> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ui: Mutex::new(VecDeque::new()),
            js: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn pending_ui(&self) -> usize {
        locked(&self.ui).len()
    }

    #[must_use]
    pub fn pending_js(&self) -> usize {
        locked(&self.js).len()
    }

    /// Run the oldest UI task, if any. Returns whether one ran.
    pub fn run_one_ui(&self, state: &mut U) -> bool {
        // The lock is released before the task runs so it can post more work.
        let task = locked(&self.ui).pop_front();
        match task {
            Some(task) => {
                task(state);
                true
            }
            None => false,
        }
    }

    /// Run the oldest script task, if any. Returns whether one ran.
    pub fn run_one_js(&self) -> bool {
        let task = locked(&self.js).pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run UI tasks, including ones posted while draining, until the queue is
    /// empty. Returns how many ran.
    pub fn run_ui_until_idle(&self, state: &mut U) -> usize {
        let mut ran = 0;
        while self.run_one_ui(state) {
            ran += 1;
        }
        ran
    }

    /// Run script tasks until the queue is empty. Returns how many ran.
    pub fn run_js_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one_js() {
            ran += 1;
        }
        ran
    }

    /// Alternate both queues until neither has work left.
    pub fn run_until_idle(&self, state: &mut U) -> usize {
        let mut ran = 0;
        loop {
            let step = self.run_ui_until_idle(state) + self.run_js_until_idle();
            if step == 0 {
                return ran;
            }
            ran += step;
        }
    }
}

impl<U> Scheduler<U> for ManualScheduler<U> {
    fn schedule_on_ui(&self, task: UiTask<U>) {
        locked(&self.ui).push_back(task);
    }

    fn schedule_on_js(&self, task: JsTask) {
        locked(&self.js).push_back(task);
    }
}

fn locked<T>(queue: &Mutex<T>) -> MutexGuard<'_, T> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}
