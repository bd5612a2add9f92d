//! # Scheduler configuration
//!
//! Optional knobs for a [`Scheduler`](crate::scheduler::Scheduler), usually
//! read from a TOML file by the binary.
//!
//! ```toml
//! event_capacity = 4096
//! stop_at = 12.5          # seconds of simulated time
//! command_batch_limit = 64
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use serde::{Deserialize, Serialize};

pub use crate::error::ConfigError;
use crate::time::SimTime;

/// Tuning for a single scheduler instance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Arena slots reserved up front.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Simulated time, in seconds, at which a stop is requested.
    #[serde(default)]
    pub stop_at: Option<f64>,
    /// Upper bound on commands run per step.
    #[serde(default)]
    pub command_batch_limit: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            event_capacity: default_event_capacity(),
            stop_at: None,
            command_batch_limit: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// `stop_at` as a simulated instant. Negative values clamp to the origin.
    pub fn stop_time(&self) -> Option<SimTime> {
        self.stop_at.map(SimTime::from_secs_f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(stop) = self.stop_at {
            if !stop.is_finite() || stop < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "stop_at",
                    reason: format!("expected non-negative seconds, got {stop}"),
                });
            }
        }
        if self.command_batch_limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "command_batch_limit",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn default_event_capacity() -> usize {
    1024
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<SchedulerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
