//! Runtime-adjustable classification thresholds

use crate::error::MonitorError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Thresholds consulted by the classifier on every processed frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum object confidence, in (0, 1]
    pub min_detection_confidence: f32,
    /// Width of the edge margin band used for gaze checks, in (0, 0.5)
    pub gaze_divergence_threshold: f32,
    /// Process every n-th tick, n >= 1
    pub frame_sample_interval: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            gaze_divergence_threshold: 0.3,
            frame_sample_interval: 3,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        check_confidence(self.min_detection_confidence)?;
        check_gaze(self.gaze_divergence_threshold)?;
        check_interval(self.frame_sample_interval)?;
        Ok(())
    }
}

fn check_confidence(value: f32) -> Result<(), MonitorError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(MonitorError::Config(format!(
            "min_detection_confidence must be in (0, 1], got {}",
            value
        )))
    }
}

fn check_gaze(value: f32) -> Result<(), MonitorError> {
    if value > 0.0 && value < 0.5 {
        Ok(())
    } else {
        Err(MonitorError::Config(format!(
            "gaze_divergence_threshold must be in (0, 0.5), got {}",
            value
        )))
    }
}

fn check_interval(value: u32) -> Result<(), MonitorError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(MonitorError::Config("frame_sample_interval must be at least 1".to_string()))
    }
}

/// Partial threshold change; `None` fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub min_detection_confidence: Option<f32>,
    pub gaze_divergence_threshold: Option<f32>,
    pub frame_sample_interval: Option<u32>,
}

impl ThresholdUpdate {
    pub fn min_detection_confidence(mut self, value: f32) -> Self {
        self.min_detection_confidence = Some(value);
        self
    }

    pub fn gaze_divergence_threshold(mut self, value: f32) -> Self {
        self.gaze_divergence_threshold = Some(value);
        self
    }

    pub fn frame_sample_interval(mut self, value: u32) -> Self {
        self.frame_sample_interval = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min_detection_confidence.is_none()
            && self.gaze_divergence_threshold.is_none()
            && self.frame_sample_interval.is_none()
    }
}

/// Holds the live threshold config.
///
/// Readers always get a whole copy, so a classification never mixes fields
/// from before and after an update.
pub struct ThresholdController {
    config: RwLock<ThresholdConfig>,
}

impl ThresholdController {
    pub fn new(initial: ThresholdConfig) -> Result<Self, MonitorError> {
        initial.validate()?;
        Ok(Self {
            config: RwLock::new(initial),
        })
    }

    pub fn get(&self) -> ThresholdConfig {
        *self.config.read()
    }

    /// Apply a partial update. Every supplied field is range checked before
    /// anything is written; on error the previous config stays in place.
    pub fn set(&self, update: ThresholdUpdate) -> Result<ThresholdConfig, MonitorError> {
        if let Some(v) = update.min_detection_confidence {
            check_confidence(v)?;
        }
        if let Some(v) = update.gaze_divergence_threshold {
            check_gaze(v)?;
        }
        if let Some(v) = update.frame_sample_interval {
            check_interval(v)?;
        }

        if update.is_empty() {
            debug!("Empty threshold update ignored");
            return Ok(self.get());
        }

        let mut config = self.config.write();
        if let Some(v) = update.min_detection_confidence {
            config.min_detection_confidence = v;
        }
        if let Some(v) = update.gaze_divergence_threshold {
            config.gaze_divergence_threshold = v;
        }
        if let Some(v) = update.frame_sample_interval {
            config.frame_sample_interval = v;
        }
        info!(
            "Thresholds updated: confidence={} gaze={} interval={}",
            config.min_detection_confidence, config.gaze_divergence_threshold, config.frame_sample_interval
        );
        Ok(*config)
    }

    /// Replace the whole config after validating it
    pub fn replace(&self, config: ThresholdConfig) -> Result<(), MonitorError> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }
}

impl Default for ThresholdController {
    fn default() -> Self {
        Self {
            config: RwLock::new(ThresholdConfig::default()),
        }
    }
}
