//! Configuration for vigil-eye

use crate::error::MonitorError;
use crate::thresholds::ThresholdConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Model label aliases mapped to canonical prohibited-object names
pub fn default_prohibited_objects() -> BTreeMap<String, String> {
    [
        ("cell phone", "phone"),
        ("mobile phone", "phone"),
        ("phone", "phone"),
        ("book", "book"),
        ("calculator", "calculator"),
        ("laptop", "external-device"),
        ("remote", "external-device"),
        ("keyboard", "external-device"),
        ("external device", "external-device"),
        ("external-device", "external-device"),
    ]
    .into_iter()
    .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
    .collect()
}

/// Monitoring session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between scheduler ticks (milliseconds)
    pub tick_interval_ms: u64,
    /// Fixed wait after a failed detection before retrying (milliseconds)
    pub retry_backoff_ms: u64,
    /// Retries per tick before the tick is dropped
    pub max_retries: u32,
    /// How long `stop()` waits for the tick loop to wind down (milliseconds)
    pub stop_timeout_ms: u64,
    /// Left/right landmark imbalance around the nose, as a fraction of face
    /// width, that counts as head movement
    pub head_movement_threshold: f32,
    /// Buffer for session state notifications
    pub state_channel_capacity: usize,
    /// Detector label (lowercase) -> canonical prohibited object name
    pub prohibited_objects: BTreeMap<String, String>,
    /// Initial classification thresholds
    pub thresholds: ThresholdConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 33,
            retry_backoff_ms: 30_000,
            max_retries: 5,
            stop_timeout_ms: 1_000,
            head_movement_threshold: 0.15,
            state_channel_capacity: 64,
            prohibited_objects: default_prohibited_objects(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 || self.tick_interval_ms > 60_000 {
            return Err("Tick interval must be between 1 and 60000 ms".to_string());
        }

        if self.retry_backoff_ms > 3_600_000 {
            return Err("Retry backoff too large (max 1 hour)".to_string());
        }

        if self.max_retries > 100 {
            return Err("Max retries too large (max 100)".to_string());
        }

        if !(self.head_movement_threshold > 0.0 && self.head_movement_threshold < 1.0) {
            return Err("Head movement threshold must be in (0, 1)".to_string());
        }

        if self.prohibited_objects.is_empty() {
            return Err("At least one prohibited object is required".to_string());
        }

        for (alias, canonical) in &self.prohibited_objects {
            if alias.trim().is_empty() || canonical.trim().is_empty() {
                return Err("Prohibited object labels must be non-empty".to_string());
            }
        }

        if self.state_channel_capacity == 0 || self.state_channel_capacity > 10_000 {
            return Err("State channel capacity must be between 1 and 10000".to_string());
        }

        self.thresholds.validate().map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Load from a TOML, YAML or JSON file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let config: MonitorConfig = vigil_core::config::load_from_path(path)?;
        config.validate().map_err(MonitorError::Config)?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
