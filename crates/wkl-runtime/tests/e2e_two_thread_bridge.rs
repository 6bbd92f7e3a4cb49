//! E2E integration test: the bridge driving a `UiRuntime` over real UI and
//! script threads.
//!
//! Validates:
//! 1. Registrations posted from the script side land on the UI thread in
//!    post order.
//! 2. Replies and completion listeners arrive on the script thread.
//! 3. Frame-driven ticks recompute appliers and publish stats readable from
//!    the test thread.
//! 4. Shutdown drains pending work and joins both threads.

#![forbid(unsafe_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wkl_core::thread_scheduler::{SchedulerHandle, ThreadScheduler};
use wkl_core::{ApplierId, Callable, MapperId, Scheduler, SharedValueId, Value, WorkletId};
use wkl_runtime::{Bridge, Producer, RenderSurface, RuntimeConfig, ScriptCallback, UiRuntime};

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────────

fn start(config: RuntimeConfig) -> (ThreadScheduler<UiRuntime>, Bridge) {
    let scheduler = ThreadScheduler::start(config.scheduler_config(), move |_| {
        UiRuntime::new(config)
    })
    .expect("threads spawn");
    let bridge = bridge_over(scheduler.handle());
    (scheduler, bridge)
}

fn bridge_over(handle: SchedulerHandle<UiRuntime>) -> Bridge {
    Bridge::new(Arc::new(handle) as Arc<dyn Scheduler<UiRuntime>>)
}

/// A callback that forwards each value, tagged with the calling thread name.
fn forward() -> (ScriptCallback, mpsc::Receiver<(Option<String>, Value)>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let callback: ScriptCallback = Arc::new(move |value| {
        let name = thread::current().name().map(str::to_owned);
        let _ = tx.lock().unwrap().send((name, value));
    });
    (callback, rx)
}

fn ids(raw: &[u32]) -> Value {
    Value::Array(raw.iter().map(|n| Value::from(*n)).collect())
}

fn doubler() -> Callable {
    Callable::new(|args| match args.first().and_then(Value::as_number) {
        Some(n) => Value::Number(n * 2.0),
        None => Value::Undefined,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Request / reply
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn get_async_replies_on_script_thread() {
    let (scheduler, bridge) = start(RuntimeConfig::default());
    let (callback, rx) = forward();

    bridge
        .set_shared_value(SharedValueId::new(1), &Value::from(7.5))
        .unwrap();
    bridge.get_shared_value_async(SharedValueId::new(1), Arc::clone(&callback));
    bridge.get_shared_value_async(SharedValueId::new(99), callback);

    let (thread_name, value) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread_name.as_deref(), Some("wkl-js"));
    assert_eq!(value, Value::Number(7.5));
    let (_, missing) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(missing, Value::Undefined);

    scheduler.shutdown();
}

#[test]
fn worklet_runs_on_ui_thread_and_result_follows_input() {
    let config = RuntimeConfig::default().with_thread_names("e2e-ui", "e2e-js");
    let (scheduler, bridge) = start(config);
    let (callback, rx) = forward();

    let observe = Arc::clone(&callback);
    bridge.register_worklet(
        WorkletId::new(10),
        Callable::new(move |args| {
            let doubled = Value::Number(args[0].as_number().unwrap_or(f64::NAN) * 2.0);
            observe(doubled.clone());
            doubled
        }),
        1,
    );
    bridge
        .set_shared_value(SharedValueId::new(1), &Value::from(0.0))
        .unwrap();
    bridge
        .register_applier_on_render(ApplierId::new(100), WorkletId::new(10), &ids(&[1]))
        .unwrap();
    bridge.render();
    bridge
        .set_shared_value(SharedValueId::new(1), &Value::from(5.0))
        .unwrap();
    bridge.render();

    let (first_thread, first) = rx.recv_timeout(TIMEOUT).unwrap();
    let (_, second) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(first_thread.as_deref(), Some("e2e-ui"));
    assert_eq!(first, Value::Number(0.0));
    assert_eq!(second, Value::Number(10.0));

    scheduler.shutdown();
}

#[test]
fn completion_listener_notifies_script_thread() {
    let (scheduler, bridge) = start(RuntimeConfig::default());
    let (callback, rx) = forward();

    bridge.register_worklet(WorkletId::new(1), Callable::new(|_| Value::Bool(true)), 0);
    bridge.set_worklet_listener(WorkletId::new(1), Some(callback));
    bridge
        .register_applier_on_event(ApplierId::new(1), "tap", WorkletId::new(1), &ids(&[]))
        .unwrap();
    bridge.on_event("tap", "{}");
    bridge.on_event("tap", "{}");

    let (thread_name, value) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread_name.as_deref(), Some("wkl-js"));
    assert_eq!(value, Value::Undefined);

    // The applier unbound itself, so the second tap fires nothing.
    let (state_cb, state_rx) = forward();
    bridge.registers_state(3, state_cb);
    let (_, state) = state_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(state, Value::from(""));
    assert!(rx.try_recv().is_err());

    scheduler.shutdown();
}

#[test]
fn diagnostics_over_the_bridge() {
    let (scheduler, bridge) = start(RuntimeConfig::default());
    let (callback, rx) = forward();

    bridge.register_worklet(WorkletId::new(3), doubler(), 1);
    for raw in [5, 2, 9] {
        bridge
            .register_shared_value(SharedValueId::new(raw), &Value::from(1.0))
            .unwrap();
    }
    bridge
        .register_mapper(MapperId::new(1), WorkletId::new(3), &ids(&[2]))
        .unwrap();
    bridge.registers_state(1, Arc::clone(&callback));
    bridge.registers_state(2, Arc::clone(&callback));
    bridge.registers_state(-1, callback);

    let replies: Vec<Value> = (0..3)
        .map(|_| rx.recv_timeout(TIMEOUT).unwrap().1)
        .collect();
    assert_eq!(
        replies,
        [
            Value::from("2 5 9"),
            Value::from("3"),
            Value::from(wkl_runtime::INVALID_SELECTOR_MESSAGE),
        ]
    );

    scheduler.shutdown();
}

// ═══════════════════════════════════════════════════════════════════════
// Frame-driven ticks
// ═══════════════════════════════════════════════════════════════════════

struct ChannelSurface(mpsc::Sender<(Producer, Value)>);

impl RenderSurface for ChannelSurface {
    fn publish(&mut self, from: Producer, value: &Value) {
        let _ = self.0.send((from, value.clone()));
    }
}

#[test]
fn frame_interval_drives_render_ticks() {
    let config = RuntimeConfig::default().with_frame_interval(Duration::from_millis(2));
    let (surface_tx, surface_rx) = mpsc::channel();
    let (stats_tx, stats_rx) = mpsc::channel();

    let rt_config = config.clone();
    let scheduler = ThreadScheduler::start_with_frames(
        config.scheduler_config(),
        move |_| {
            let rt = UiRuntime::new(rt_config).with_surface(ChannelSurface(surface_tx));
            let _ = stats_tx.send(rt.stats_handle());
            rt
        },
        |rt: &mut UiRuntime| {
            rt.render();
        },
    )
    .unwrap();
    let stats = stats_rx.recv_timeout(TIMEOUT).unwrap();
    let bridge = bridge_over(scheduler.handle());

    bridge.register_worklet(WorkletId::new(1), doubler(), 1);
    bridge
        .set_shared_value(SharedValueId::new(1), &Value::from(21.0))
        .unwrap();
    bridge
        .register_applier_on_render(ApplierId::new(4), WorkletId::new(1), &ids(&[1]))
        .unwrap();

    let (from, value) = surface_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(from, Producer::Applier(ApplierId::new(4)));
    assert_eq!(value, Value::Number(42.0));

    scheduler.shutdown();
    let published = stats.load();
    assert!(published.ticks >= 1);
    assert!(published.applied >= 1);
}

#[test]
fn shutdown_drains_posted_work() {
    let (scheduler, bridge) = start(RuntimeConfig::default());
    let (callback, rx) = forward();

    for raw in 0..50 {
        bridge
            .set_shared_value(SharedValueId::new(raw), &Value::from(f64::from(raw)))
            .unwrap();
    }
    bridge.get_shared_value_async(SharedValueId::new(49), callback);
    scheduler.shutdown();

    let (_, value) = rx.try_recv().expect("reply delivered before shutdown returned");
    assert_eq!(value, Value::Number(49.0));
}
