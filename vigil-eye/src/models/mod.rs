//! Detection model capability and bundled adapters

pub mod replay;

pub use replay::ReplayModel;

use crate::error::MonitorError;
use async_trait::async_trait;
use vigil_core::{DetectionResult, Frame};

/// A perception model that turns a frame into detections.
///
/// Object detectors fill `objects`, face detectors fill `faces`; the session
/// combines the fragments of every model before classification.
#[async_trait]
pub trait DetectionModel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Load weights or warm up. Called once while the session initializes.
    async fn load(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    /// Run the model on one frame
    async fn detect(&self, frame: &Frame) -> Result<DetectionResult, MonitorError>;
}
