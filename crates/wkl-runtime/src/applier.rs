#![forbid(unsafe_code)]

//! Appliers bind a worklet to an ordered list of shared-value inputs, and the
//! registry that triggers them on render ticks or named events.
//!
//! # Calling convention
//!
//! A worklet bound by an applier is called with the current value of each
//! input, in declared order, followed by one frame argument
//! `{ now: <ms>, event: <payload or undefined> }`.
//!
//! # Completion
//!
//! A worklet that returns `true` is done: its applier is unbound once the
//! pass completes and the worklet's listener fires.
//!
//! # Invariants
//!
//! 1. An id is bound at most once: to the render pass, or to a single event
//!    name. Binding it again drops the previous binding.
//! 2. A render tick invokes each render-bound applier exactly once, in
//!    registration order.
//! 3. An event invokes exactly the appliers bound to that event name, in
//!    registration order.
//! 4. An applier whose worklet or input has been unregistered is skipped,
//!    never treated as a fault.

use ahash::AHashMap;
use wkl_core::{ApplierId, SharedValueId, Value, WorkletId};

use crate::shared_value::{Construction, SharedValueRegistry, Unresolved};
use crate::worklet::WorkletRegistry;

/// Per-pass context handed to every invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Milliseconds since the session started, or the caller's timestamp.
    pub now_ms: f64,
    /// Event payload; `Undefined` during render ticks.
    pub event: Value,
}

impl Frame {
    #[must_use]
    pub fn render(now_ms: f64) -> Self {
        Self {
            now_ms,
            event: Value::Undefined,
        }
    }

    #[must_use]
    pub fn event(now_ms: f64, event: Value) -> Self {
        Self { now_ms, event }
    }

    /// The trailing argument passed to worklets.
    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::object([
            ("now", Value::Number(self.now_ms)),
            ("event", self.event.clone()),
        ])
    }
}

/// Why an invocation did not call its worklet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingWorklet(WorkletId),
    MissingInput(SharedValueId),
}

/// Outcome of one applier or mapper evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The worklet ran and returned this value.
    Applied(Value),
    /// The worklet ran and returned `true`, asking to be unbound.
    Finished(Value),
    /// Inputs unchanged since the last run; nothing was called.
    Unchanged,
    Skipped(SkipReason),
}

impl Invocation {
    /// The worklet's result, if it ran.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Applied(value) | Self::Finished(value) => Some(value),
            Self::Unchanged | Self::Skipped(_) => None,
        }
    }

    #[must_use]
    pub fn ran(&self) -> bool {
        self.result().is_some()
    }
}

/// A worklet bound to input shared values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applier {
    id: ApplierId,
    worklet: WorkletId,
    inputs: Vec<SharedValueId>,
}

impl Applier {
    #[must_use]
    pub fn new(id: ApplierId, worklet: WorkletId, inputs: Vec<SharedValueId>) -> Self {
        Self {
            id,
            worklet,
            inputs,
        }
    }

    /// Build an applier only if its worklet and every input exist right now.
    pub fn resolve(
        id: ApplierId,
        worklet: WorkletId,
        inputs: Vec<SharedValueId>,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Construction<Self> {
        let Some(registered) = worklets.get(worklet) else {
            return Construction::Declined(Unresolved::Worklet(worklet));
        };
        if let Some(missing) = inputs.iter().find(|input| !values.contains(**input)) {
            return Construction::Declined(Unresolved::SharedValue(*missing));
        }
        if registered.arity() != inputs.len() {
            tracing::warn!(
                %id,
                %worklet,
                arity = registered.arity(),
                inputs = inputs.len(),
                "applier input count differs from worklet arity"
            );
        }
        Construction::Built(Self::new(id, worklet, inputs))
    }

    #[must_use]
    pub fn id(&self) -> ApplierId {
        self.id
    }

    #[must_use]
    pub fn worklet(&self) -> WorkletId {
        self.worklet
    }

    #[must_use]
    pub fn inputs(&self) -> &[SharedValueId] {
        &self.inputs
    }

    /// Read the inputs, call the worklet, and return what it produced.
    ///
    /// Where the result goes is the caller's business.
    pub fn invoke(
        &self,
        frame: &Frame,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Invocation {
        let Some(worklet) = worklets.get(self.worklet) else {
            return Invocation::Skipped(SkipReason::MissingWorklet(self.worklet));
        };
        let mut args = Vec::with_capacity(self.inputs.len() + 1);
        for input in &self.inputs {
            match values.value_of(*input, worklets) {
                Some(value) => args.push(value),
                None => return Invocation::Skipped(SkipReason::MissingInput(*input)),
            }
        }
        args.push(frame.as_value());

        let result = worklet.call(&args);
        if result == Value::Bool(true) {
            Invocation::Finished(result)
        } else {
            Invocation::Applied(result)
        }
    }
}

/// Render-bound and event-bound appliers.
#[derive(Debug, Default)]
pub struct ApplierRegistry {
    render: Vec<Applier>,
    events: AHashMap<String, Vec<Applier>>,
    event_of: AHashMap<ApplierId, String>,
}

impl ApplierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an applier to the render pass. An applier already render-bound
    /// under the same id is replaced in its slot; an event binding under the
    /// same id is dropped.
    pub fn register_for_render(&mut self, applier: Applier) {
        let id = applier.id;
        self.unregister_from_event(id);
        match self.render.iter_mut().find(|bound| bound.id == id) {
            Some(slot) => {
                *slot = applier;
                tracing::debug!(%id, "render applier replaced");
            }
            None => {
                self.render.push(applier);
                tracing::debug!(%id, "render applier registered");
            }
        }
    }

    /// Returns whether the id was render-bound.
    pub fn unregister_from_render(&mut self, id: ApplierId) -> bool {
        let before = self.render.len();
        self.render.retain(|bound| bound.id != id);
        let removed = self.render.len() != before;
        if removed {
            tracing::debug!(%id, "render applier unregistered");
        }
        removed
    }

    /// Bind an applier to `event_name`, dropping any previous binding of the
    /// same id.
    pub fn register_for_event(&mut self, event_name: impl Into<String>, applier: Applier) {
        let id = applier.id;
        let event_name = event_name.into();
        self.unregister_from_render(id);
        self.unregister_from_event(id);
        tracing::debug!(%id, event = %event_name, "event applier registered");
        self.events
            .entry(event_name.clone())
            .or_default()
            .push(applier);
        self.event_of.insert(id, event_name);
    }

    /// Remove the id from whichever event bucket holds it.
    pub fn unregister_from_event(&mut self, id: ApplierId) -> bool {
        let Some(event_name) = self.event_of.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.events.get_mut(&event_name) {
            bucket.retain(|bound| bound.id != id);
            if bucket.is_empty() {
                self.events.remove(&event_name);
            }
        }
        tracing::debug!(%id, event = %event_name, "event applier unregistered");
        true
    }

    /// Invoke every render-bound applier once, in registration order.
    pub fn run_render_tick(
        &mut self,
        frame: &Frame,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Vec<(ApplierId, Invocation)> {
        let outcomes = run_all(&self.render, frame, values, worklets);
        let finished = finished_ids(&outcomes);
        if !finished.is_empty() {
            self.render.retain(|bound| !finished.contains(&bound.id));
            notify_finished(&outcomes, worklets);
        }
        outcomes
            .into_iter()
            .map(|(id, _, invocation)| (id, invocation))
            .collect()
    }

    /// Invoke every applier bound to `event_name`, in registration order.
    pub fn run_event(
        &mut self,
        event_name: &str,
        frame: &Frame,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Vec<(ApplierId, Invocation)> {
        let Some(bucket) = self.events.get(event_name) else {
            return Vec::new();
        };
        let outcomes = run_all(bucket, frame, values, worklets);
        let finished = finished_ids(&outcomes);
        for id in &finished {
            self.unregister_from_event(*id);
        }
        notify_finished(&outcomes, worklets);
        outcomes
            .into_iter()
            .map(|(id, _, invocation)| (id, invocation))
            .collect()
    }

    /// Render-bound ids in registration order.
    #[must_use]
    pub fn render_ids(&self) -> Vec<ApplierId> {
        self.render.iter().map(Applier::id).collect()
    }

    /// Event-bound ids in ascending order.
    #[must_use]
    pub fn event_ids(&self) -> Vec<ApplierId> {
        let mut ids: Vec<_> = self.event_of.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The event name an id is bound to, if any.
    #[must_use]
    pub fn bound_event(&self, id: ApplierId) -> Option<&str> {
        self.event_of.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn is_render_bound(&self, id: ApplierId) -> bool {
        self.render.iter().any(|bound| bound.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.render.len() + self.event_of.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Id, worklet and outcome of one applier call.
type Outcome = (ApplierId, WorkletId, Invocation);

fn run_all(
    appliers: &[Applier],
    frame: &Frame,
    values: &SharedValueRegistry,
    worklets: &WorkletRegistry,
) -> Vec<Outcome> {
    appliers
        .iter()
        .map(|applier| {
            let invocation = applier.invoke(frame, values, worklets);
            if let Invocation::Skipped(reason) = &invocation {
                tracing::trace!(id = %applier.id, ?reason, "applier skipped");
            }
            (applier.id, applier.worklet, invocation)
        })
        .collect()
}

fn finished_ids(outcomes: &[Outcome]) -> Vec<ApplierId> {
    outcomes
        .iter()
        .filter(|(_, _, invocation)| matches!(invocation, Invocation::Finished(_)))
        .map(|(id, _, _)| *id)
        .collect()
}

/// Fire the listener of each finished applier's worklet, once per applier.
fn notify_finished(outcomes: &[Outcome], worklets: &WorkletRegistry) {
    for (id, worklet, _) in outcomes
        .iter()
        .filter(|(_, _, invocation)| matches!(invocation, Invocation::Finished(_)))
    {
        tracing::debug!(%id, %worklet, "applier finished");
        if let Some(worklet) = worklets.get(*worklet) {
            worklet.notify_listener();
        }
    }
}
