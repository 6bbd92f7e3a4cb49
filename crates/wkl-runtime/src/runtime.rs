#![forbid(unsafe_code)]

//! The UI-thread session.
//!
//! [`UiRuntime`] owns every registry and is the `U` in
//! [`Scheduler<U>`](wkl_core::Scheduler): script-thread entry points reach it
//! only through scheduled UI tasks. Render ticks and events enter here
//! directly from the UI thread.
//!
//! # Tick order
//!
//! With `mappers_before_appliers` (the default) a tick evaluates every mapper,
//! then every render applier. Otherwise the order is reversed. The
//! [`RenderSurface`] receives each result in the order the worklets ran.

use std::fmt;

use web_time::{Duration, Instant};
use wkl_core::{
    ApplierId, Callable, MapperId, SharedValueDescriptor, SharedValueId, Value, WorkletId,
};

use crate::applier::{Applier, ApplierRegistry, Frame, Invocation};
use crate::config::RuntimeConfig;
use crate::diagnostics::{INVALID_SELECTOR_MESSAGE, RegistrySelector, format_ids};
use crate::mapper::{Mapper, MapperRegistry};
use crate::shared_value::{Construction, Payload, RegisterOutcome, SharedValueRegistry};
use crate::stats::{FrameStats, SharedFrameStats};
use crate::worklet::{Listener, WorkletRegistry};

/// Where a published result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    Mapper(MapperId),
    Applier(ApplierId),
}

/// Receives the result of every mapper and render applier that ran in a tick.
pub trait RenderSurface {
    fn publish(&mut self, from: Producer, value: &Value);
}

/// Every outcome of one tick or event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub mappers: Vec<(MapperId, Invocation)>,
    pub appliers: Vec<(ApplierId, Invocation)>,
}

impl FrameReport {
    #[must_use]
    pub fn applier(&self, id: ApplierId) -> Option<&Invocation> {
        self.appliers
            .iter()
            .find(|(applier, _)| *applier == id)
            .map(|(_, invocation)| invocation)
    }

    #[must_use]
    pub fn mapper(&self, id: MapperId) -> Option<&Invocation> {
        self.mappers
            .iter()
            .find(|(mapper, _)| *mapper == id)
            .map(|(_, invocation)| invocation)
    }

    /// Number of worklet calls made.
    #[must_use]
    pub fn ran(&self) -> usize {
        self.mappers
            .iter()
            .map(|(_, i)| i)
            .chain(self.appliers.iter().map(|(_, i)| i))
            .filter(|i| i.ran())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty() && self.appliers.is_empty()
    }
}

pub struct UiRuntime {
    config: RuntimeConfig,
    worklets: WorkletRegistry,
    values: SharedValueRegistry,
    appliers: ApplierRegistry,
    mappers: MapperRegistry,
    surface: Option<Box<dyn RenderSurface>>,
    started: Instant,
    stats: FrameStats,
    published: SharedFrameStats,
}

impl fmt::Debug for UiRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiRuntime")
            .field("config", &self.config)
            .field("worklets", &self.worklets.len())
            .field("values", &self.values.len())
            .field("appliers", &self.appliers.len())
            .field("mappers", &self.mappers.len())
            .field("has_surface", &self.surface.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for UiRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl UiRuntime {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            worklets: WorkletRegistry::new(),
            values: SharedValueRegistry::new(),
            appliers: ApplierRegistry::new(),
            mappers: MapperRegistry::new(),
            surface: None,
            started: Instant::now(),
            stats: FrameStats::default(),
            published: SharedFrameStats::new(),
        }
    }

    #[must_use]
    pub fn with_surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn set_surface(&mut self, surface: Option<Box<dyn RenderSurface>>) {
        self.surface = surface;
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn worklets(&self) -> &WorkletRegistry {
        &self.worklets
    }

    #[must_use]
    pub fn values(&self) -> &SharedValueRegistry {
        &self.values
    }

    #[must_use]
    pub fn appliers(&self) -> &ApplierRegistry {
        &self.appliers
    }

    #[must_use]
    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    /// Counters as of the last tick or event.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Read handle for other threads.
    #[must_use]
    pub fn stats_handle(&self) -> SharedFrameStats {
        self.published.clone()
    }

    // ─── Worklets ───────────────────────────────────────────────────────

    pub fn register_worklet(&mut self, id: WorkletId, body: Callable, arity: usize) {
        self.worklets.register(id, body, arity);
    }

    pub fn unregister_worklet(&mut self, id: WorkletId) -> bool {
        self.worklets.unregister(id)
    }

    pub fn set_worklet_listener(&mut self, id: WorkletId, listener: Option<Listener>) -> bool {
        self.worklets.set_listener(id, listener)
    }

    // ─── Shared values ──────────────────────────────────────────────────

    /// Create `id` from `descriptor` unless it already exists.
    pub fn register_shared_value(
        &mut self,
        id: SharedValueId,
        descriptor: &SharedValueDescriptor,
    ) -> RegisterOutcome {
        let worklets = &self.worklets;
        self.values
            .register_if_absent(id, |values: &SharedValueRegistry| {
                Payload::build(descriptor, values, worklets)
            })
    }

    /// Replace the payload of `id`, creating it if absent.
    pub fn set_shared_value(
        &mut self,
        id: SharedValueId,
        descriptor: &SharedValueDescriptor,
    ) -> RegisterOutcome {
        let worklets = &self.worklets;
        self.values
            .set_or_create(id, |values: &SharedValueRegistry| {
                Payload::build(descriptor, values, worklets)
            })
    }

    pub fn unregister_shared_value(&mut self, id: SharedValueId) -> bool {
        self.values.unregister(id)
    }

    /// Current boundary value of `id`, if registered.
    #[must_use]
    pub fn shared_value(&self, id: SharedValueId) -> Option<Value> {
        self.values.value_of(id, &self.worklets)
    }

    /// Call the worklet starter stored under `id` with live argument values.
    pub fn start_worklet(&self, id: SharedValueId) -> Option<Value> {
        self.values.start_worklet(id, &self.worklets)
    }

    // ─── Appliers and mappers ───────────────────────────────────────────

    /// Bind an applier to render ticks, if its worklet and inputs exist.
    pub fn register_applier_on_render(
        &mut self,
        id: ApplierId,
        worklet: WorkletId,
        inputs: Vec<SharedValueId>,
    ) -> RegisterOutcome {
        let existed = self.applier_bound(id);
        match Applier::resolve(id, worklet, inputs, &self.values, &self.worklets) {
            Construction::Built(applier) => {
                self.appliers.register_for_render(applier);
                bound_outcome(existed)
            }
            Construction::Declined(missing) => {
                tracing::debug!(%id, %missing, "render applier declined");
                RegisterOutcome::Declined(missing)
            }
        }
    }

    pub fn unregister_applier_from_render(&mut self, id: ApplierId) -> bool {
        self.appliers.unregister_from_render(id)
    }

    /// Bind an applier to `event_name`, if its worklet and inputs exist.
    pub fn register_applier_on_event(
        &mut self,
        id: ApplierId,
        event_name: &str,
        worklet: WorkletId,
        inputs: Vec<SharedValueId>,
    ) -> RegisterOutcome {
        let existed = self.applier_bound(id);
        match Applier::resolve(id, worklet, inputs, &self.values, &self.worklets) {
            Construction::Built(applier) => {
                self.appliers.register_for_event(event_name, applier);
                bound_outcome(existed)
            }
            Construction::Declined(missing) => {
                tracing::debug!(%id, event = event_name, %missing, "event applier declined");
                RegisterOutcome::Declined(missing)
            }
        }
    }

    pub fn unregister_applier_from_event(&mut self, id: ApplierId) -> bool {
        self.appliers.unregister_from_event(id)
    }

    pub fn register_mapper(
        &mut self,
        id: MapperId,
        worklet: WorkletId,
        inputs: Vec<SharedValueId>,
    ) -> RegisterOutcome {
        let existed = self.mappers.get(id).is_some();
        let applier_id = ApplierId::new(id.raw());
        match Applier::resolve(applier_id, worklet, inputs, &self.values, &self.worklets) {
            Construction::Built(applier) => {
                self.mappers.add_mapper(Mapper::new(id, applier));
                bound_outcome(existed)
            }
            Construction::Declined(missing) => {
                tracing::debug!(%id, %missing, "mapper declined");
                RegisterOutcome::Declined(missing)
            }
        }
    }

    pub fn unregister_mapper(&mut self, id: MapperId) -> bool {
        self.mappers.remove_mapper(id)
    }

    fn applier_bound(&self, id: ApplierId) -> bool {
        self.appliers.is_render_bound(id) || self.appliers.bound_event(id).is_some()
    }

    // ─── Ticks and events ───────────────────────────────────────────────

    /// Milliseconds since this session was created.
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Run one render tick stamped with the session clock.
    pub fn render(&mut self) -> FrameReport {
        let now_ms = self.now_ms();
        self.render_at(now_ms)
    }

    /// Run one render tick stamped `now_ms`.
    pub fn render_at(&mut self, now_ms: f64) -> FrameReport {
        let span = tracing::debug_span!("wkl.render_tick", now_ms);
        let _guard = span.enter();
        let started = Instant::now();
        let frame = Frame::render(now_ms);

        let mut report = FrameReport::default();
        if self.config.mappers_before_appliers {
            report.mappers = self.mappers.evaluate(&frame, &self.values, &self.worklets);
            report.appliers = self
                .appliers
                .run_render_tick(&frame, &self.values, &self.worklets);
        } else {
            report.appliers = self
                .appliers
                .run_render_tick(&frame, &self.values, &self.worklets);
            report.mappers = self.mappers.evaluate(&frame, &self.values, &self.worklets);
        }
        self.publish_results(&report);

        self.stats.ticks += 1;
        self.finish(&report, started, "render tick");
        report
    }

    fn publish_results(&mut self, report: &FrameReport) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let mappers = report
            .mappers
            .iter()
            .map(|(id, invocation)| (Producer::Mapper(*id), invocation));
        let appliers = report
            .appliers
            .iter()
            .map(|(id, invocation)| (Producer::Applier(*id), invocation));
        let ordered: Vec<(Producer, &Invocation)> = if self.config.mappers_before_appliers {
            mappers.chain(appliers).collect()
        } else {
            appliers.chain(mappers).collect()
        };
        for (from, invocation) in ordered {
            if let Some(value) = invocation.result() {
                surface.publish(from, value);
            }
        }
    }

    /// Dispatch an event to the appliers bound to `name`.
    pub fn dispatch_event(&mut self, name: &str, payload: Value) -> FrameReport {
        let span = tracing::debug_span!("wkl.event", event = name);
        let _guard = span.enter();
        let started = Instant::now();
        let frame = Frame::event(self.now_ms(), payload);

        let report = FrameReport {
            mappers: Vec::new(),
            appliers: self
                .appliers
                .run_event(name, &frame, &self.values, &self.worklets),
        };

        self.stats.events += 1;
        self.finish(&report, started, "event");
        report
    }

    /// Dispatch an event whose payload arrives as JSON text. Unparsable text
    /// dispatches an `Undefined` payload.
    pub fn dispatch_event_json(&mut self, name: &str, payload: &str) -> FrameReport {
        let value = Value::from_json_str(payload).unwrap_or_else(|err| {
            tracing::debug!(event = name, %err, "event payload is not JSON");
            Value::Undefined
        });
        self.dispatch_event(name, value)
    }

    fn finish(&mut self, report: &FrameReport, started: Instant, what: &'static str) {
        for (_, invocation) in &report.mappers {
            self.stats.record(invocation);
        }
        for (_, invocation) in &report.appliers {
            self.stats.record(invocation);
        }
        let elapsed = started.elapsed();
        self.stats.last_tick_us = duration_us(elapsed);
        if elapsed > self.config.slow_tick_budget {
            tracing::warn!(
                elapsed_us = duration_us(elapsed),
                budget_us = duration_us(self.config.slow_tick_budget),
                "slow {what}"
            );
        }
        self.published.publish(self.stats);
    }

    // ─── Diagnostics ────────────────────────────────────────────────────

    /// Live ids in the selected registry, ascending.
    #[must_use]
    pub fn snapshot(&self, selector: RegistrySelector) -> Vec<u32> {
        let mut ids: Vec<u32> = match selector {
            RegistrySelector::SharedValues => {
                self.values.ids().into_iter().map(SharedValueId::raw).collect()
            }
            RegistrySelector::Worklets => {
                self.worklets.ids().into_iter().map(WorkletId::raw).collect()
            }
            RegistrySelector::Appliers => self
                .appliers
                .render_ids()
                .into_iter()
                .chain(self.appliers.event_ids())
                .map(ApplierId::raw)
                .collect(),
        };
        ids.sort_unstable();
        ids
    }

    /// Snapshot for a raw selector code, space-separated, or the invalid
    /// selector message.
    #[must_use]
    pub fn registers_state(&self, selector: i32) -> String {
        match RegistrySelector::try_from(selector) {
            Ok(selector) => format_ids(&self.snapshot(selector)),
            Err(err) => {
                tracing::debug!(%err, "registers state requested");
                INVALID_SELECTOR_MESSAGE.to_owned()
            }
        }
    }
}

fn bound_outcome(existed: bool) -> RegisterOutcome {
    if existed {
        RegisterOutcome::Replaced
    } else {
        RegisterOutcome::Inserted
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
