//! Error types for vigil-eye

use thiserror::Error;
use vigil_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// Invalid threshold or configuration value; nothing was changed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient model or frame source failure during a tick
    #[error("Detection failure: {0}")]
    DetectionFailure(String),

    /// Frame source or model could not be acquired
    #[error("Initialization failure: {0}")]
    Initialization(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Session stopped")]
    SessionStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<MonitorError> for CoreError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Core(inner) => inner,
            MonitorError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Monitor(other.to_string()),
        }
    }
}
