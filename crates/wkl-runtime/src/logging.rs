#![forbid(unsafe_code)]

//! Optional `tracing` subscriber setup.
//!
//! The library only emits events. Binaries and tests that want output call
//! [`init`] (feature `subscriber`), filtered by `WKL_LOG` with the usual
//! `EnvFilter` syntax, e.g. `WKL_LOG=wkl_runtime=debug`.

/// Environment variable holding the log filter.
pub const ENV_LOG: &str = "WKL_LOG";

#[cfg(feature = "subscriber")]
const DEFAULT_FILTER: &str = "warn";

/// Install a global fmt subscriber. Returns `false` if one was already set.
#[cfg(feature = "subscriber")]
pub fn init() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

#[cfg(all(test, feature = "subscriber"))]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        let _ = init();
        assert!(!init());
    }
}
