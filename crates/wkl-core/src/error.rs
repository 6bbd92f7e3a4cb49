use thiserror::Error;

use crate::value::ValueKind;

pub type Result<T> = std::result::Result<T, CoreError>;

/// A boundary value whose shape matches no shared-value variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported shared value kind: {kind}")]
    UnsupportedKind { kind: ValueKind },

    #[error("object carries none of the isWorklet/isFunction/isArray/isObject markers")]
    UnknownMarker,

    #[error("missing field `{field}`")]
    MissingField { field: &'static str },

    #[error("field `{field}` must be {expected}, got {found}")]
    WrongFieldKind {
        field: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("field `{field}` holds an invalid id at index {index}")]
    InvalidId { field: &'static str, index: usize },

    #[error("object has {ids} ids but {names} property names")]
    FieldCountMismatch { ids: usize, names: usize },
}

/// Failure to hand work to one of the two threads.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{thread} thread has stopped")]
    Stopped { thread: &'static str },

    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
