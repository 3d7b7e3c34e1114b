//! Violation processing pipeline

pub mod aggregator;
pub mod classifier;

pub use aggregator::{ViolationAggregator, ViolationCallback};
pub use classifier::ViolationClassifier;
