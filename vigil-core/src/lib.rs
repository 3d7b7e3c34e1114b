//! vigil-core: shared data model for the vigil proctoring pipeline
//!
//! Geometry, frames, detection results and the violation ledger live here so
//! that model adapters, the monitoring session and host applications agree on
//! one set of types.

pub mod config;
pub mod error;
pub mod types;
pub mod violation;

pub use error::{Error, Result};
pub use types::{BoundingBox, DetectedFace, FaceKeypoint, DetectedObject, DetectionResult, Frame, Point, Snapshot};
pub use violation::{ViolationEvent, ViolationLedger, ViolationRecord, ViolationType};
