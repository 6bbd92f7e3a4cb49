#![forbid(unsafe_code)]

use thiserror::Error;
use wkl_core::{DecodeError, SchedulerError};

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// An environment override that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("unknown registry selector: {selector}")]
    InvalidSelector { selector: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_variable() {
        let err = ConfigError::InvalidValue {
            var: "WKL_SLOW_TICK_US",
            value: "fast".into(),
            expected: "integer",
        };
        assert_eq!(
            err.to_string(),
            "WKL_SLOW_TICK_US=\"fast\" is not a valid integer"
        );
        let wrapped = RuntimeError::from(err);
        assert!(wrapped.to_string().starts_with("WKL_SLOW_TICK_US"));
    }

    #[test]
    fn selector_error_reports_value() {
        let err = RuntimeError::InvalidSelector { selector: 7 };
        assert_eq!(err.to_string(), "unknown registry selector: 7");
    }
}
