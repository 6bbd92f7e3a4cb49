#![forbid(unsafe_code)]

//! The cross-thread work-queue contract.
//!
//! Two logical threads exist: the **UI thread**, which owns a piece of state
//! `U` (all registries live there), and the **script thread**. Work moves
//! between them only as posted closures:
//!
//! - a [`UiTask`] runs on the UI thread with exclusive access to `&mut U`;
//! - a [`JsTask`] runs on the script thread.
//!
//! # Invariants
//!
//! 1. Posting never blocks the caller.
//! 2. Tasks posted from one thread to one target run in post order. Nothing is
//!    promised between different origins.
//! 3. Tasks only capture owned data (`Send + 'static`); nothing posted can
//!    borrow from the stack of the thread that posted it.
//! 4. A task may post further tasks to either thread. No task waits on the
//!    other thread's queue.
//!
//! # Failure Modes
//!
//! - **Target stopped**: posting after shutdown drops the task and logs a
//!   warning. There is no cancellation primitive; a posted task that reaches
//!   a live queue runs to completion.
//! - **Task panics**: not caught. The owning thread dies with it.

use std::time::Duration;

/// Work for the UI thread.
pub type UiTask<U> = Box<dyn FnOnce(&mut U) + Send + 'static>;

/// Work for the script thread.
pub type JsTask = Box<dyn FnOnce() + Send + 'static>;

/// Posts closures onto the UI thread or the script thread.
pub trait Scheduler<U>: Send + Sync {
    /// Enqueue `task` for the UI thread.
    fn schedule_on_ui(&self, task: UiTask<U>);

    /// Enqueue `task` for the script thread.
    fn schedule_on_js(&self, task: JsTask);
}

/// Convenience wrappers that box the closure for the caller.
pub trait SchedulerExt<U>: Scheduler<U> {
    fn on_ui(&self, task: impl FnOnce(&mut U) + Send + 'static) {
        self.schedule_on_ui(Box::new(task));
    }

    fn on_js(&self, task: impl FnOnce() + Send + 'static) {
        self.schedule_on_js(Box::new(task));
    }
}

impl<U, S: Scheduler<U> + ?Sized> SchedulerExt<U> for S {}

/// Thread naming and frame pacing for [`ThreadScheduler`](crate::thread_scheduler::ThreadScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Name of the spawned UI thread.
    pub ui_thread_name: String,
    /// Name of the spawned script thread.
    pub js_thread_name: String,
    /// When set, the UI thread runs its frame hook at this interval between
    /// tasks. When `None`, frames are driven entirely by posted tasks.
    pub frame_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ui_thread_name: "wkl-ui".into(),
            js_thread_name: "wkl-js".into(),
            frame_interval: None,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_thread_names(mut self, ui: impl Into<String>, js: impl Into<String>) -> Self {
        self.ui_thread_name = ui.into();
        self.js_thread_name = js.into();
        self
    }
}
