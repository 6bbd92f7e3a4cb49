#![forbid(unsafe_code)]

//! Script-thread entry points.
//!
//! Every call decodes its arguments where it is made, posts one UI task that
//! touches the registries, and returns. Calls that produce an answer take a
//! [`ScriptCallback`]; the UI task posts a second task onto the script thread
//! that hands the callback an owned value. Nothing here blocks.
//!
//! Malformed boundary values are rejected synchronously with a
//! [`DecodeError`] and nothing is posted.
//!
//! Build the bridge over a [`SchedulerHandle`](wkl_core::thread_scheduler::SchedulerHandle)
//! rather than the owning scheduler: listeners keep a clone of the bridge's
//! scheduler alive inside the UI state.

use std::sync::Arc;

use wkl_core::{
    ApplierId, Callable, DecodeError, MapperId, Scheduler, SharedValueDescriptor, SharedValueId,
    Value, WorkletId, decode_id_list,
};

use crate::runtime::UiRuntime;
use crate::worklet::Listener;

/// Script-side function receiving one value.
pub type ScriptCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone)]
pub struct Bridge {
    scheduler: Arc<dyn Scheduler<UiRuntime>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

impl Bridge {
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler<UiRuntime>>) -> Self {
        Self { scheduler }
    }

    fn post(&self, task: impl FnOnce(&mut UiRuntime) + Send + 'static) {
        self.scheduler.schedule_on_ui(Box::new(task));
    }

    /// Post a UI task that computes a value and delivers it to `callback` on
    /// the script thread.
    fn post_with_reply(
        &self,
        callback: ScriptCallback,
        compute: impl FnOnce(&mut UiRuntime) -> Value + Send + 'static,
    ) {
        let scheduler = Arc::clone(&self.scheduler);
        self.post(move |rt| {
            let value = compute(rt);
            scheduler.schedule_on_js(Box::new(move || callback(value)));
        });
    }

    // ─── Worklets ───────────────────────────────────────────────────────

    pub fn register_worklet(&self, id: WorkletId, body: Callable, arity: usize) {
        self.post(move |rt| rt.register_worklet(id, body, arity));
    }

    pub fn unregister_worklet(&self, id: WorkletId) {
        self.post(move |rt| {
            rt.unregister_worklet(id);
        });
    }

    /// Attach a completion callback to a worklet, or clear it with `None`.
    ///
    /// The callback runs on the script thread with `Undefined` each time an
    /// applier driving the worklet finishes.
    pub fn set_worklet_listener(&self, id: WorkletId, callback: Option<ScriptCallback>) {
        let listener = callback.map(|callback| self.listener_for(callback));
        self.post(move |rt| {
            rt.set_worklet_listener(id, listener);
        });
    }

    fn listener_for(&self, callback: ScriptCallback) -> Listener {
        let scheduler = Arc::clone(&self.scheduler);
        Arc::new(move || {
            let callback = Arc::clone(&callback);
            scheduler.schedule_on_js(Box::new(move || callback(Value::Undefined)));
        })
    }

    // ─── Shared values ──────────────────────────────────────────────────

    /// Create a shared value unless `id` is already taken.
    pub fn register_shared_value(&self, id: SharedValueId, value: &Value) -> Result<(), DecodeError> {
        let descriptor = SharedValueDescriptor::try_from(value)?;
        self.post(move |rt| {
            rt.register_shared_value(id, &descriptor);
        });
        Ok(())
    }

    /// Replace a shared value's payload, creating it if absent.
    pub fn set_shared_value(&self, id: SharedValueId, value: &Value) -> Result<(), DecodeError> {
        let descriptor = SharedValueDescriptor::try_from(value)?;
        self.post(move |rt| {
            rt.set_shared_value(id, &descriptor);
        });
        Ok(())
    }

    pub fn unregister_shared_value(&self, id: SharedValueId) {
        self.post(move |rt| {
            rt.unregister_shared_value(id);
        });
    }

    /// Deliver the current value of `id` to `callback`, `Undefined` if absent.
    pub fn get_shared_value_async(&self, id: SharedValueId, callback: ScriptCallback) {
        self.post_with_reply(callback, move |rt| rt.shared_value(id).unwrap_or_default());
    }

    /// Run a worklet starter and deliver its result, `Undefined` if it could
    /// not run.
    pub fn start_worklet_async(&self, id: SharedValueId, callback: ScriptCallback) {
        self.post_with_reply(callback, move |rt| rt.start_worklet(id).unwrap_or_default());
    }

    // ─── Appliers and mappers ───────────────────────────────────────────

    pub fn register_applier_on_render(
        &self,
        id: ApplierId,
        worklet: WorkletId,
        inputs: &Value,
    ) -> Result<(), DecodeError> {
        let inputs = decode_id_list(inputs, "inputs")?;
        self.post(move |rt| {
            rt.register_applier_on_render(id, worklet, inputs);
        });
        Ok(())
    }

    pub fn unregister_applier_from_render(&self, id: ApplierId) {
        self.post(move |rt| {
            rt.unregister_applier_from_render(id);
        });
    }

    pub fn register_applier_on_event(
        &self,
        id: ApplierId,
        event_name: &str,
        worklet: WorkletId,
        inputs: &Value,
    ) -> Result<(), DecodeError> {
        let inputs = decode_id_list(inputs, "inputs")?;
        let event_name = event_name.to_owned();
        self.post(move |rt| {
            rt.register_applier_on_event(id, &event_name, worklet, inputs);
        });
        Ok(())
    }

    pub fn unregister_applier_from_event(&self, id: ApplierId) {
        self.post(move |rt| {
            rt.unregister_applier_from_event(id);
        });
    }

    pub fn register_mapper(
        &self,
        id: MapperId,
        worklet: WorkletId,
        inputs: &Value,
    ) -> Result<(), DecodeError> {
        let inputs = decode_id_list(inputs, "inputs")?;
        self.post(move |rt| {
            rt.register_mapper(id, worklet, inputs);
        });
        Ok(())
    }

    pub fn unregister_mapper(&self, id: MapperId) {
        self.post(move |rt| {
            rt.unregister_mapper(id);
        });
    }

    // ─── Ticks, events, diagnostics ─────────────────────────────────────

    /// Request one render tick.
    pub fn render(&self) {
        self.post(|rt| {
            rt.render();
        });
    }

    /// Dispatch `name` with a JSON payload.
    pub fn on_event(&self, name: &str, payload: &str) {
        let name = name.to_owned();
        let payload = payload.to_owned();
        self.post(move |rt| {
            rt.dispatch_event_json(&name, &payload);
        });
    }

    /// Deliver the space-separated ids of the selected registry, or the
    /// invalid selector message, as a string.
    pub fn registers_state(&self, selector: i32, callback: ScriptCallback) {
        self.post_with_reply(callback, move |rt| Value::String(rt.registers_state(selector)));
    }
}
