//! Classification and aggregation tests driven by detector JSON

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_core::{DetectionResult, Frame, ViolationType};
use vigil_eye::processing::{ViolationAggregator, ViolationClassifier};
use vigil_eye::{MonitorError, ThresholdConfig};

fn detection(json: &str) -> DetectionResult {
    serde_json::from_str(json).unwrap()
}

fn gaze(threshold: f32) -> ThresholdConfig {
    ThresholdConfig {
        gaze_divergence_threshold: threshold,
        ..Default::default()
    }
}

#[test]
fn test_phone_without_face() {
    let classifier = ViolationClassifier::default();
    let result = detection(
        r#"{"objects":[{"label":"phone","confidence":0.9,"boundingBox":{"xCenter":0.3,"yCenter":0.6,"width":0.1,"height":0.2}}],"faces":[]}"#,
    );

    let events = classifier.classify(&result, &ThresholdConfig::default(), &Frame::blank(4, 4));
    let kinds: Vec<ViolationType> = events.iter().map(|e| e.violation_type.clone()).collect();
    assert_eq!(kinds, vec![ViolationType::object("phone"), ViolationType::FaceNotVisible]);
    assert_eq!(events[0].confidence, 0.9);
}

#[test]
fn test_centered_face_is_clean() {
    let classifier = ViolationClassifier::default();
    let result = detection(
        r#"{"objects":[],"faces":[{"boundingBox":{"xCenter":0.5,"yCenter":0.5,"width":0.2,"height":0.2}}]}"#,
    );
    let events = classifier.classify(&result, &gaze(0.23), &Frame::blank(4, 4));
    assert!(events.is_empty());
}

#[test]
fn test_face_at_edge_is_looking_away() {
    let classifier = ViolationClassifier::default();
    let result = detection(
        r#"{"objects":[],"faces":[{"boundingBox":{"xCenter":0.05,"yCenter":0.5,"width":0.2,"height":0.2}}]}"#,
    );
    let events = classifier.classify(&result, &gaze(0.23), &Frame::blank(4, 4));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].violation_type, ViolationType::LookingAway);
}

#[test]
fn test_missing_fields_default_to_empty() {
    let classifier = ViolationClassifier::default();
    let events = classifier.classify(&detection("{}"), &ThresholdConfig::default(), &Frame::blank(1, 1));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].violation_type, ViolationType::FaceNotVisible);
}

#[test]
fn test_unlisted_object_ignored() {
    let classifier = ViolationClassifier::default();
    let result = detection(
        r#"{"objects":[{"label":"cup","confidence":0.99,"boundingBox":{"xCenter":0.3,"yCenter":0.6,"width":0.1,"height":0.2}}],
            "faces":[{"boundingBox":{"xCenter":0.5,"yCenter":0.5,"width":0.2,"height":0.2}}]}"#,
    );
    assert!(classifier
        .classify(&result, &ThresholdConfig::default(), &Frame::blank(1, 1))
        .is_empty());
}

#[test]
fn test_classification_is_deterministic() {
    let classifier = ViolationClassifier::default();
    let frame = Frame::blank(4, 4);
    let result = detection(
        r#"{"objects":[{"label":"book","confidence":0.7,"boundingBox":{"xCenter":0.3,"yCenter":0.6,"width":0.1,"height":0.2}}],"faces":[]}"#,
    );

    let first = classifier.classify(&result, &ThresholdConfig::default(), &frame);
    let second = classifier.classify(&result, &ThresholdConfig::default(), &frame);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.violation_type, b.violation_type);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.occurred_at, b.occurred_at);
    }
}

#[test]
fn test_aggregator_counts_and_latest_snapshot() {
    let classifier = ViolationClassifier::default();
    let aggregator = ViolationAggregator::new();
    let result = detection(r#"{"objects":[],"faces":[]}"#);

    let early = Frame::blank(2, 2);
    let late = Frame::blank(6, 6);
    aggregator
        .merge(&classifier.classify(&result, &ThresholdConfig::default(), &early))
        .unwrap();
    aggregator
        .merge(&classifier.classify(&result, &ThresholdConfig::default(), &late))
        .unwrap();

    let ledger = aggregator.snapshot();
    let record = ledger.get(&ViolationType::FaceNotVisible).unwrap();
    assert_eq!(record.count, 2);
    assert_eq!(record.timestamps, vec![early.captured_at, late.captured_at]);
    assert_eq!(record.last_snapshot.as_ref().map(|s| s.width), Some(6));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_frozen_aggregator_rejects_and_skips_callbacks() {
    let aggregator = ViolationAggregator::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    aggregator.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let events = ViolationClassifier::default().classify(
        &DetectionResult::new(),
        &ThresholdConfig::default(),
        &Frame::blank(1, 1),
    );
    aggregator.merge(&events).unwrap();
    aggregator.freeze();

    assert!(matches!(aggregator.merge(&events), Err(MonitorError::SessionStopped)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(aggregator.snapshot().total_count(), 1);
}
