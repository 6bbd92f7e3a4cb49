#![forbid(unsafe_code)]

//! UI-thread registries and script-thread entry points for the worklet
//! runtime.
//!
//! A [`UiRuntime`] lives on the UI thread and owns every registry. The script
//! thread talks to it only through a [`Bridge`], which posts work over a
//! [`wkl_core::Scheduler`].
//!
//! # Example
//!
//! ```
//! use wkl_core::{ApplierId, Callable, SharedValueDescriptor, SharedValueId, Value, WorkletId};
//! use wkl_runtime::{Invocation, UiRuntime};
//!
//! let mut rt = UiRuntime::default();
//! rt.register_shared_value(SharedValueId::new(1), &SharedValueDescriptor::Double(4.0));
//! rt.register_worklet(
//!     WorkletId::new(1),
//!     Callable::new(|args| Value::Number(args[0].as_number().unwrap_or(0.0) + 1.0)),
//!     1,
//! );
//! rt.register_applier_on_render(ApplierId::new(1), WorkletId::new(1), vec![SharedValueId::new(1)]);
//!
//! let report = rt.render();
//! assert_eq!(
//!     report.applier(ApplierId::new(1)),
//!     Some(&Invocation::Applied(Value::Number(5.0)))
//! );
//! ```

pub mod applier;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod runtime;
pub mod shared_value;
pub mod stats;
pub mod worklet;

pub use applier::{Applier, ApplierRegistry, Frame, Invocation, SkipReason};
pub use bridge::{Bridge, ScriptCallback};
pub use config::RuntimeConfig;
pub use diagnostics::{INVALID_SELECTOR_MESSAGE, RegistrySelector};
pub use error::{ConfigError, Result, RuntimeError};
pub use mapper::{Mapper, MapperRegistry};
pub use runtime::{FrameReport, Producer, RenderSurface, UiRuntime};
pub use shared_value::{
    Construction, Payload, RegisterOutcome, SharedValue, SharedValueRegistry, Unresolved,
};
pub use stats::{FrameStats, SharedFrameStats};
pub use worklet::{Listener, Worklet, WorkletRegistry};
