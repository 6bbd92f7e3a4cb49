#![forbid(unsafe_code)]

//! A [`Scheduler`] backed by two dedicated OS threads.
//!
//! The UI thread constructs and exclusively owns the UI state `U`. Nothing
//! else ever touches it: every mutation arrives as a posted [`UiTask`]. This
//! is the single-writer rule enforced by construction, so registries living
//! in `U` need no locks.
//!
//! # Frames
//!
//! With [`SchedulerConfig::frame_interval`] set, the UI thread runs a frame
//! hook at that cadence between tasks. A slow frame or task pushes the next
//! deadline out rather than queueing catch-up frames.
//!
//! # Shutdown
//!
//! [`ThreadScheduler::shutdown`] (or drop) stops the UI thread first and joins
//! it, then stops and joins the script thread. Script tasks posted by the last
//! UI tasks are therefore still delivered before the script thread exits.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use wkl_core::scheduler::{SchedulerConfig, SchedulerExt};
//! use wkl_core::thread_scheduler::ThreadScheduler;
//!
//! let scheduler = ThreadScheduler::start(SchedulerConfig::default(), |_| 0u64).unwrap();
//! let handle = scheduler.handle();
//! let (tx, rx) = mpsc::channel();
//!
//! let back = handle.clone();
//! handle.on_ui(move |count: &mut u64| {
//!     *count += 1;
//!     let seen = *count;
//!     back.on_js(move || tx.send(seen).unwrap());
//! });
//!
//! assert_eq!(rx.recv().unwrap(), 1);
//! scheduler.shutdown();
//! ```

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::SchedulerError;
use crate::scheduler::{JsTask, Scheduler, SchedulerConfig, UiTask};

const UI_THREAD: &str = "ui";
const JS_THREAD: &str = "script";

/// Hook run by the UI thread once per frame interval.
pub type FrameHook<U> = Box<dyn FnMut(&mut U) + Send + 'static>;

enum UiMsg<U> {
    Task(UiTask<U>),
    Shutdown,
}

enum JsMsg {
    Task(JsTask),
    Shutdown,
}

/// Cloneable posting handle for a running [`ThreadScheduler`].
///
/// Handles stay valid after the scheduler shuts down; posting through them
/// then drops the task with a warning.
pub struct SchedulerHandle<U> {
    ui_tx: mpsc::Sender<UiMsg<U>>,
    js_tx: mpsc::Sender<JsMsg>,
}

impl<U> Clone for SchedulerHandle<U> {
    fn clone(&self) -> Self {
        Self {
            ui_tx: self.ui_tx.clone(),
            js_tx: self.js_tx.clone(),
        }
    }
}

impl<U> std::fmt::Debug for SchedulerHandle<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle").finish_non_exhaustive()
    }
}

impl<U> SchedulerHandle<U> {
    /// Post to the UI thread, reporting whether it was still running.
    pub fn try_schedule_on_ui(&self, task: UiTask<U>) -> Result<(), SchedulerError> {
        self.ui_tx
            .send(UiMsg::Task(task))
            .map_err(|_| SchedulerError::Stopped { thread: UI_THREAD })
    }

    /// Post to the script thread, reporting whether it was still running.
    pub fn try_schedule_on_js(&self, task: JsTask) -> Result<(), SchedulerError> {
        self.js_tx
            .send(JsMsg::Task(task))
            .map_err(|_| SchedulerError::Stopped { thread: JS_THREAD })
    }
}

impl<U> Scheduler<U> for SchedulerHandle<U> {
    fn schedule_on_ui(&self, task: UiTask<U>) {
        if let Err(err) = self.try_schedule_on_ui(task) {
            tracing::warn!(%err, "task dropped");
        }
    }

    fn schedule_on_js(&self, task: JsTask) {
        if let Err(err) = self.try_schedule_on_js(task) {
            tracing::warn!(%err, "task dropped");
        }
    }
}

/// Owner of the UI and script threads.
pub struct ThreadScheduler<U> {
    handle: SchedulerHandle<U>,
    ui_thread: Option<JoinHandle<()>>,
    js_thread: Option<JoinHandle<()>>,
}

impl<U: 'static> ThreadScheduler<U> {
    /// Spawn both threads. `init` runs on the UI thread and builds the state
    /// it will own; it receives a handle so the state can post work itself.
    pub fn start(
        config: SchedulerConfig,
        init: impl FnOnce(SchedulerHandle<U>) -> U + Send + 'static,
    ) -> Result<Self, SchedulerError> {
        Self::spawn(config, init, None)
    }

    /// Like [`start`](Self::start), with a hook run once per
    /// `config.frame_interval`. Without an interval the hook never runs.
    pub fn start_with_frames(
        config: SchedulerConfig,
        init: impl FnOnce(SchedulerHandle<U>) -> U + Send + 'static,
        on_frame: impl FnMut(&mut U) + Send + 'static,
    ) -> Result<Self, SchedulerError> {
        Self::spawn(config, init, Some(Box::new(on_frame)))
    }

    fn spawn(
        config: SchedulerConfig,
        init: impl FnOnce(SchedulerHandle<U>) -> U + Send + 'static,
        on_frame: Option<FrameHook<U>>,
    ) -> Result<Self, SchedulerError> {
        let (ui_tx, ui_rx) = mpsc::channel::<UiMsg<U>>();
        let (js_tx, js_rx) = mpsc::channel::<JsMsg>();
        let handle = SchedulerHandle { ui_tx, js_tx };

        let js_thread = thread::Builder::new()
            .name(config.js_thread_name.clone())
            .spawn(move || js_loop(js_rx))
            .map_err(|source| SchedulerError::Spawn {
                thread: JS_THREAD,
                source,
            })?;

        let ui_handle = handle.clone();
        let frame_interval = config.frame_interval;
        let ui_thread = thread::Builder::new()
            .name(config.ui_thread_name.clone())
            .spawn(move || {
                let state = init(ui_handle);
                ui_loop(state, ui_rx, frame_interval, on_frame);
            });
        let ui_thread = match ui_thread {
            Ok(joined) => joined,
            Err(source) => {
                let _ = handle.js_tx.send(JsMsg::Shutdown);
                let _ = js_thread.join();
                return Err(SchedulerError::Spawn {
                    thread: UI_THREAD,
                    source,
                });
            }
        };

        tracing::debug!(
            ui = %config.ui_thread_name,
            js = %config.js_thread_name,
            frame_interval_us = frame_interval.map(|d| d.as_micros() as u64),
            "scheduler started"
        );

        Ok(Self {
            handle,
            ui_thread: Some(ui_thread),
            js_thread: Some(js_thread),
        })
    }

    /// A cloneable handle for posting work.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle<U> {
        self.handle.clone()
    }

    /// Stop both threads after they drain what was posted before this call.
    pub fn shutdown(mut self) {
        self.stop();
    }
}

impl<U> ThreadScheduler<U> {
    fn stop(&mut self) {
        if let Some(ui) = self.ui_thread.take() {
            let _ = self.handle.ui_tx.send(UiMsg::Shutdown);
            let _ = ui.join();
        }
        if let Some(js) = self.js_thread.take() {
            let _ = self.handle.js_tx.send(JsMsg::Shutdown);
            let _ = js.join();
        }
    }
}

impl<U> Scheduler<U> for ThreadScheduler<U> {
    fn schedule_on_ui(&self, task: UiTask<U>) {
        self.handle.schedule_on_ui(task);
    }

    fn schedule_on_js(&self, task: JsTask) {
        self.handle.schedule_on_js(task);
    }
}

impl<U> Drop for ThreadScheduler<U> {
    fn drop(&mut self) {
        // Best-effort shutdown if the caller forgot to call shutdown().
        self.stop();
    }
}

/// The UI thread's main loop: run tasks in arrival order, interleaving frame
/// hooks when a frame interval is configured.
fn ui_loop<U>(
    mut state: U,
    rx: mpsc::Receiver<UiMsg<U>>,
    frame_interval: Option<Duration>,
    mut on_frame: Option<FrameHook<U>>,
) {
    let mut next_frame = frame_interval.map(|interval| Instant::now() + interval);
    loop {
        let msg = match next_frame {
            None => match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => return,
            },
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        };

        match msg {
            Some(UiMsg::Task(task)) => task(&mut state),
            Some(UiMsg::Shutdown) => return,
            None => {}
        }

        if let (Some(interval), Some(deadline)) = (frame_interval, next_frame) {
            let now = Instant::now();
            if now >= deadline {
                if let Some(hook) = on_frame.as_mut() {
                    hook(&mut state);
                }
                let following = deadline + interval;
                next_frame = Some(if following <= now {
                    now + interval
                } else {
                    following
                });
            }
        }
    }
}

fn js_loop(rx: mpsc::Receiver<JsMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            JsMsg::Task(task) => task(),
            JsMsg::Shutdown => return,
        }
    }
}
