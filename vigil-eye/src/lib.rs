//! vigil-eye: violation pipeline for remote exam proctoring
//!
//! Turns per-frame detection output into a stable violation ledger. Frames
//! come from a [`FrameSource`], detections from one or more
//! [`DetectionModel`]s; the [`MonitoringSession`] samples frames, retries
//! failed detections and feeds the classifier and aggregator.

pub mod config;
pub mod error;
pub mod frame_source;
pub mod models;
pub mod processing;
pub mod session;
pub mod thresholds;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use frame_source::{FrameSource, ImageFrameSource, SyntheticFrameSource};
pub use models::{DetectionModel, ReplayModel};
pub use processing::{ViolationAggregator, ViolationClassifier};
pub use session::{MonitoringSession, SessionState, SessionStats};
pub use thresholds::{ThresholdConfig, ThresholdController, ThresholdUpdate};
