#![forbid(unsafe_code)]

//! Runtime configuration with environment overrides.
//!
//! | Variable | Field | Format |
//! |---|---|---|
//! | `WKL_FRAME_INTERVAL_MS` | `frame_interval` | milliseconds, `0` disables |
//! | `WKL_SLOW_TICK_US` | `slow_tick_budget` | microseconds |
//! | `WKL_UI_THREAD` | `ui_thread_name` | text |
//! | `WKL_JS_THREAD` | `js_thread_name` | text |
//! | `WKL_MAPPERS_FIRST` | `mappers_before_appliers` | `1/true/yes/on` or `0/false/no/off` |

use std::time::Duration;

use wkl_core::SchedulerConfig;

use crate::error::ConfigError;

pub const ENV_FRAME_INTERVAL_MS: &str = "WKL_FRAME_INTERVAL_MS";
pub const ENV_SLOW_TICK_US: &str = "WKL_SLOW_TICK_US";
pub const ENV_UI_THREAD: &str = "WKL_UI_THREAD";
pub const ENV_JS_THREAD: &str = "WKL_JS_THREAD";
pub const ENV_MAPPERS_FIRST: &str = "WKL_MAPPERS_FIRST";

const DEFAULT_SLOW_TICK_BUDGET: Duration = Duration::from_micros(16_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Fixed render cadence for [`ThreadScheduler`](wkl_core::thread_scheduler::ThreadScheduler).
    /// `None` leaves ticks to the caller.
    pub frame_interval: Option<Duration>,
    /// Ticks and events slower than this are logged at `warn`.
    pub slow_tick_budget: Duration,
    pub ui_thread_name: String,
    pub js_thread_name: String,
    /// Evaluate and publish mappers before render appliers on each tick.
    pub mappers_before_appliers: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            frame_interval: scheduler.frame_interval,
            slow_tick_budget: DEFAULT_SLOW_TICK_BUDGET,
            ui_thread_name: scheduler.ui_thread_name,
            js_thread_name: scheduler.js_thread_name,
            mappers_before_appliers: true,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_slow_tick_budget(mut self, budget: Duration) -> Self {
        self.slow_tick_budget = budget;
        self
    }

    #[must_use]
    pub fn with_thread_names(mut self, ui: impl Into<String>, js: impl Into<String>) -> Self {
        self.ui_thread_name = ui.into();
        self.js_thread_name = js.into();
        self
    }

    #[must_use]
    pub fn with_mappers_before_appliers(mut self, enabled: bool) -> Self {
        self.mappers_before_appliers = enabled;
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup(ENV_FRAME_INTERVAL_MS) {
            let ms = parse_u64(ENV_FRAME_INTERVAL_MS, &val)?;
            self.frame_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(val) = lookup(ENV_SLOW_TICK_US) {
            self.slow_tick_budget = Duration::from_micros(parse_u64(ENV_SLOW_TICK_US, &val)?);
        }
        if let Some(val) = lookup(ENV_UI_THREAD) {
            self.ui_thread_name = parse_name(ENV_UI_THREAD, val)?;
        }
        if let Some(val) = lookup(ENV_JS_THREAD) {
            self.js_thread_name = parse_name(ENV_JS_THREAD, val)?;
        }
        if let Some(val) = lookup(ENV_MAPPERS_FIRST) {
            self.mappers_before_appliers = parse_bool(ENV_MAPPERS_FIRST, &val)?;
        }
        Ok(self)
    }

    /// The subset the threaded scheduler needs.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let config = SchedulerConfig::default()
            .with_thread_names(self.ui_thread_name.clone(), self.js_thread_name.clone());
        match self.frame_interval {
            Some(interval) => config.with_frame_interval(interval),
            None => config,
        }
    }
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: val.to_owned(),
        expected: "non-negative integer",
    })
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: val.to_owned(),
            expected: "boolean",
        }),
    }
}

fn parse_name(var: &'static str, val: String) -> Result<String, ConfigError> {
    if val.trim().is_empty() {
        return Err(ConfigError::Empty { var });
    }
    Ok(val)
}
