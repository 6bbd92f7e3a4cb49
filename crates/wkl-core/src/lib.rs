#![forbid(unsafe_code)]

//! Core: boundary values, typed ids, shared-value descriptors, and the
//! two-thread scheduler contract.

pub mod descriptor;
pub mod error;
pub mod id;
pub mod manual_scheduler;
pub mod scheduler;
pub mod thread_scheduler;
pub mod value;

pub use descriptor::{SharedValueDescriptor, decode_id_list};
pub use error::{CoreError, DecodeError, Result, SchedulerError};
pub use id::{ApplierId, MapperId, SharedValueId, WorkletId};
pub use scheduler::{JsTask, Scheduler, SchedulerConfig, SchedulerExt, UiTask};
pub use value::{Callable, Value, ValueKind};
