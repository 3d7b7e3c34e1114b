//! Violation classification
//!
//! Maps one frame's detection output to violation events. Rules are evaluated
//! independently, so a single frame can produce several events:
//!
//! - a prohibited object at or above the confidence threshold
//! - no face, or more than one face
//! - a single face whose center sits in the edge margin band (looking away)
//! - a single face whose eye/ear landmarks sit lopsided around the nose (head movement)

use crate::config::MonitorConfig;
use crate::thresholds::ThresholdConfig;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use vigil_core::types::FaceKeypoint;
use vigil_core::{DetectedFace, DetectionResult, Frame, ViolationEvent, ViolationType};

/// Left/right keypoint pairs compared around the nose for head movement
const LATERAL_PAIRS: [(FaceKeypoint, FaceKeypoint); 2] = [
    (FaceKeypoint::RightEye, FaceKeypoint::LeftEye),
    (FaceKeypoint::RightEar, FaceKeypoint::LeftEar),
];

/// Stateless violation classifier
#[derive(Debug, Clone)]
pub struct ViolationClassifier {
    prohibited: HashMap<String, String>,
    head_movement_threshold: f32,
}

impl ViolationClassifier {
    /// Create a classifier from a label alias table and head movement threshold
    pub fn new(prohibited_objects: &BTreeMap<String, String>, head_movement_threshold: f32) -> Self {
        let prohibited = prohibited_objects
            .iter()
            .map(|(alias, canonical)| (normalize_label(alias), canonical.trim().to_string()))
            .collect();
        Self {
            prohibited,
            head_movement_threshold,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(&config.prohibited_objects, config.head_movement_threshold)
    }

    /// Canonical prohibited-object name for a detector label, if it is proscribed
    pub fn canonical_label(&self, label: &str) -> Option<&str> {
        self.prohibited.get(&normalize_label(label)).map(String::as_str)
    }

    /// Classify one frame's detections.
    ///
    /// Deterministic for identical inputs: timestamps come from the frame's
    /// capture time and every event carries a snapshot of that frame.
    pub fn classify(
        &self,
        detection: &DetectionResult,
        thresholds: &ThresholdConfig,
        frame: &Frame,
    ) -> Vec<ViolationEvent> {
        let mut found: Vec<(ViolationType, f32)> = Vec::new();

        for object in &detection.objects {
            if object.confidence < thresholds.min_detection_confidence {
                continue;
            }
            if let Some(canonical) = self.canonical_label(&object.label) {
                found.push((ViolationType::object(canonical), object.confidence));
            }
        }

        match detection.faces.as_slice() {
            [] => found.push((ViolationType::FaceNotVisible, 1.0)),
            [face] => {
                if is_looking_away(face, thresholds.gaze_divergence_threshold) {
                    found.push((ViolationType::LookingAway, 1.0));
                }
                if self.has_head_movement(face) {
                    found.push((ViolationType::HeadMovement, 1.0));
                }
            }
            _ => found.push((ViolationType::MultipleFaces, 1.0)),
        }

        if found.is_empty() {
            return Vec::new();
        }

        debug!(
            "Classified {} violations from {} objects and {} faces",
            found.len(),
            detection.objects.len(),
            detection.faces.len()
        );

        let snapshot = frame.snapshot();
        found
            .into_iter()
            .map(|(violation_type, confidence)| ViolationEvent {
                violation_type,
                confidence,
                occurred_at: frame.captured_at,
                snapshot: snapshot.clone(),
            })
            .collect()
    }

    /// A turned head puts one side's landmarks closer to the nose than the
    /// other's. The imbalance is measured relative to face width so that
    /// faces close to the camera are not flagged.
    fn has_head_movement(&self, face: &DetectedFace) -> bool {
        let width = face.bounding_box.width;
        let Some(nose) = face.keypoint(FaceKeypoint::NoseTip) else {
            return false;
        };
        if !(width > 0.0) {
            return false;
        }

        LATERAL_PAIRS
            .iter()
            .filter_map(|(right, left)| Some((face.keypoint(*right)?, face.keypoint(*left)?)))
            .any(|(right, left)| {
                let imbalance = ((nose.x - right.x) - (left.x - nose.x)).abs();
                imbalance / width > self.head_movement_threshold
            })
    }
}

impl Default for ViolationClassifier {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Face center inside the margin band on any edge
fn is_looking_away(face: &DetectedFace, margin: f32) -> bool {
    let center = face.bounding_box.center();
    center.x < margin || center.x > 1.0 - margin || center.y < margin || center.y > 1.0 - margin
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{BoundingBox, Point};

    fn centered_face() -> DetectedFace {
        DetectedFace::new(BoundingBox::new(0.5, 0.5, 0.2, 0.2))
    }

    fn types(events: &[ViolationEvent]) -> Vec<String> {
        events.iter().map(|e| e.violation_type.to_string()).collect()
    }

    #[test]
    fn test_canonical_label_aliases() {
        let classifier = ViolationClassifier::default();
        assert_eq!(classifier.canonical_label("cell phone"), Some("phone"));
        assert_eq!(classifier.canonical_label("  Cell Phone "), Some("phone"));
        assert_eq!(classifier.canonical_label("laptop"), Some("external-device"));
        assert_eq!(classifier.canonical_label("person"), None);
    }

    #[test]
    fn test_low_confidence_object_ignored() {
        let classifier = ViolationClassifier::default();
        let detection = DetectionResult::new()
            .with_object("book", 0.49, BoundingBox::new(0.2, 0.2, 0.1, 0.1))
            .with_face(centered_face());
        let events = classifier.classify(&detection, &ThresholdConfig::default(), &Frame::blank(2, 2));
        assert!(events.is_empty());
    }

    #[test]
    fn test_confidence_at_threshold_counts() {
        let classifier = ViolationClassifier::default();
        let detection = DetectionResult::new()
            .with_object("book", 0.5, BoundingBox::new(0.2, 0.2, 0.1, 0.1))
            .with_face(centered_face());
        let events = classifier.classify(&detection, &ThresholdConfig::default(), &Frame::blank(2, 2));
        assert_eq!(types(&events), vec!["object_detected:book"]);
        assert_eq!(events[0].confidence, 0.5);
    }

    #[test]
    fn test_multiple_labels_each_emit() {
        let classifier = ViolationClassifier::default();
        let bbox = BoundingBox::new(0.2, 0.2, 0.1, 0.1);
        let detection = DetectionResult::new()
            .with_object("cell phone", 0.9, bbox)
            .with_object("book", 0.7, bbox)
            .with_object("cell phone", 0.8, bbox)
            .with_face(centered_face());
        let events = classifier.classify(&detection, &ThresholdConfig::default(), &Frame::blank(2, 2));
        assert_eq!(
            types(&events),
            vec!["object_detected:phone", "object_detected:book", "object_detected:phone"]
        );
    }

    #[test]
    fn test_face_count_rules() {
        let classifier = ViolationClassifier::default();
        let config = ThresholdConfig::default();
        let frame = Frame::blank(2, 2);

        let none = classifier.classify(&DetectionResult::new(), &config, &frame);
        assert_eq!(types(&none), vec!["face_not_visible"]);

        let two = DetectionResult::new().with_face(centered_face()).with_face(centered_face());
        assert_eq!(types(&classifier.classify(&two, &config, &frame)), vec!["multiple_faces"]);
    }

    #[test]
    fn test_multiple_faces_skip_gaze_checks() {
        let classifier = ViolationClassifier::default();
        let edge = DetectedFace::new(BoundingBox::new(0.02, 0.5, 0.1, 0.1));
        let detection = DetectionResult::new().with_face(edge.clone()).with_face(edge);
        let events = classifier.classify(&detection, &ThresholdConfig::default(), &Frame::blank(2, 2));
        assert_eq!(types(&events), vec!["multiple_faces"]);
    }

    #[test]
    fn test_looking_away_each_edge() {
        let classifier = ViolationClassifier::default();
        let config = ThresholdConfig {
            gaze_divergence_threshold: 0.23,
            ..Default::default()
        };
        for (x, y) in [(0.1, 0.5), (0.9, 0.5), (0.5, 0.1), (0.5, 0.9)] {
            let detection = DetectionResult::new().with_face(DetectedFace::new(BoundingBox::new(x, y, 0.2, 0.2)));
            let events = classifier.classify(&detection, &config, &Frame::blank(2, 2));
            assert_eq!(types(&events), vec!["looking_away"], "center ({}, {})", x, y);
        }
    }

    #[test]
    fn test_head_movement_from_landmarks() {
        let classifier = ViolationClassifier::default();
        let turned = centered_face().with_landmarks(vec![
            Point::new(0.52, 0.45),
            Point::new(0.58, 0.45),
            Point::new(0.60, 0.50),
            Point::new(0.58, 0.56),
            Point::new(0.42, 0.48),
            Point::new(0.64, 0.48),
        ]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(turned),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert_eq!(types(&events), vec!["head_movement"]);
    }

    #[test]
    fn test_frontal_landmarks_no_head_movement() {
        let classifier = ViolationClassifier::default();
        let frontal = centered_face().with_landmarks(vec![
            Point::new(0.46, 0.45),
            Point::new(0.54, 0.45),
            Point::new(0.50, 0.50),
            Point::new(0.50, 0.56),
            Point::new(0.40, 0.48),
            Point::new(0.60, 0.48),
        ]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(frontal),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_large_frontal_face_no_head_movement() {
        let classifier = ViolationClassifier::default();
        let close_up = DetectedFace::new(BoundingBox::new(0.5, 0.5, 0.5, 0.5)).with_landmarks(vec![
            Point::new(0.40, 0.42),
            Point::new(0.60, 0.42),
            Point::new(0.50, 0.52),
            Point::new(0.50, 0.62),
            Point::new(0.28, 0.48),
            Point::new(0.72, 0.48),
        ]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(close_up),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_large_turned_face_head_movement() {
        let classifier = ViolationClassifier::default();
        let close_up = DetectedFace::new(BoundingBox::new(0.5, 0.5, 0.5, 0.5)).with_landmarks(vec![
            Point::new(0.46, 0.42),
            Point::new(0.64, 0.42),
            Point::new(0.66, 0.52),
            Point::new(0.62, 0.62),
            Point::new(0.34, 0.48),
            Point::new(0.70, 0.48),
        ]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(close_up),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert_eq!(types(&events), vec!["head_movement"]);
    }

    #[test]
    fn test_partial_landmarks_skip_head_movement() {
        let classifier = ViolationClassifier::default();
        let face = centered_face().with_landmarks(vec![Point::new(0.1, 0.45)]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(face),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_looking_away_and_head_movement_together() {
        let classifier = ViolationClassifier::default();
        let face = DetectedFace::new(BoundingBox::new(0.1, 0.5, 0.2, 0.2)).with_landmarks(vec![
            Point::new(0.02, 0.45),
            Point::new(0.08, 0.45),
            Point::new(0.20, 0.50),
        ]);
        let events = classifier.classify(
            &DetectionResult::new().with_face(face),
            &ThresholdConfig::default(),
            &Frame::blank(2, 2),
        );
        assert_eq!(types(&events), vec!["looking_away", "head_movement"]);
    }

    #[test]
    fn test_events_carry_frame_time_and_snapshot() {
        let classifier = ViolationClassifier::default();
        let frame = Frame::blank(8, 6);
        let events = classifier.classify(&DetectionResult::new(), &ThresholdConfig::default(), &frame);
        assert_eq!(events[0].occurred_at, frame.captured_at);
        assert_eq!(events[0].snapshot.width, 8);
        assert_eq!(events[0].snapshot.byte_len(), 8 * 6 * 3);
    }
}
