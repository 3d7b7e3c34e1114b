use proptest::prelude::*;
use vigil_core::{BoundingBox, DetectedFace, DetectionResult, Frame, ViolationLedger, ViolationType};
use vigil_eye::{MonitorError, ThresholdConfig, ThresholdController, ThresholdUpdate, ViolationClassifier};

fn labels() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["cell phone", "book", "laptop", "calculator", "cup", "person"])
}

fn detection() -> impl Strategy<Value = DetectionResult> {
    let object = (labels(), 0.01f32..1.0, 0.0f32..1.0, 0.0f32..1.0);
    let face = (0.0f32..1.0, 0.0f32..1.0);
    (
        prop::collection::vec(object, 0..5),
        prop::collection::vec(face, 0..3),
    )
        .prop_map(|(objects, faces)| {
            let mut result = DetectionResult::new();
            for (label, confidence, x, y) in objects {
                result = result.with_object(label, confidence, BoundingBox::new(x, y, 0.1, 0.1));
            }
            for (x, y) in faces {
                result = result.with_face(DetectedFace::new(BoundingBox::new(x, y, 0.2, 0.2)));
            }
            result
        })
}

proptest! {
    #[test]
    fn test_out_of_range_confidence_rejected(value in prop_oneof![-10.0f32..=0.0, 1.0001f32..10.0]) {
        let controller = ThresholdController::default();
        let before = controller.get();
        let result = controller.set(ThresholdUpdate::default().min_detection_confidence(value));
        prop_assert!(matches!(result, Err(MonitorError::Config(_))));
        prop_assert_eq!(controller.get(), before);
    }

    #[test]
    fn test_centered_face_never_looking_away(
        (margin, x, y) in (0.01f32..0.49).prop_flat_map(|m| (Just(m), m..(1.0 - m), m..(1.0 - m)))
    ) {
        let classifier = ViolationClassifier::default();
        let thresholds = ThresholdConfig {
            gaze_divergence_threshold: margin,
            ..Default::default()
        };
        let detection = DetectionResult::new().with_face(DetectedFace::new(BoundingBox::new(x, y, 0.2, 0.2)));
        let events = classifier.classify(&detection, &thresholds, &Frame::blank(1, 1));
        prop_assert!(events.iter().all(|e| e.violation_type != ViolationType::LookingAway));
    }

    #[test]
    fn test_repeated_merge_doubles_counts(result in detection()) {
        let classifier = ViolationClassifier::default();
        let thresholds = ThresholdConfig::default();
        let frame = Frame::blank(1, 1);

        let mut once = ViolationLedger::new();
        once.merge(&classifier.classify(&result, &thresholds, &frame));

        let mut twice = ViolationLedger::new();
        twice.merge(&classifier.classify(&result, &thresholds, &frame));
        twice.merge(&classifier.classify(&result, &thresholds, &frame));

        prop_assert_eq!(once.len(), twice.len());
        for (violation_type, record) in &once {
            let doubled = twice.get(violation_type).unwrap();
            prop_assert_eq!(doubled.count, record.count * 2);
            prop_assert_eq!(doubled.timestamps.len(), record.timestamps.len() * 2);
        }
    }

    #[test]
    fn test_object_merges_leave_face_records_alone(phones in 1usize..20) {
        let classifier = ViolationClassifier::default();
        let thresholds = ThresholdConfig::default();
        let frame = Frame::blank(1, 1);
        let mut ledger = ViolationLedger::new();
        ledger.merge(&classifier.classify(&DetectionResult::new(), &thresholds, &frame));
        let before = ledger.get(&ViolationType::FaceNotVisible).unwrap().clone();

        let phone_only = DetectionResult::new()
            .with_object("cell phone", 0.9, BoundingBox::new(0.2, 0.2, 0.1, 0.1))
            .with_face(DetectedFace::new(BoundingBox::new(0.5, 0.5, 0.2, 0.2)));
        for _ in 0..phones {
            ledger.merge(&classifier.classify(&phone_only, &thresholds, &frame));
        }

        let after = ledger.get(&ViolationType::FaceNotVisible).unwrap();
        prop_assert_eq!(after.count, before.count);
        prop_assert_eq!(&after.timestamps, &before.timestamps);
        prop_assert_eq!(ledger.count(&ViolationType::object("phone")), phones as u64);
    }

    #[test]
    fn test_object_threshold_is_inclusive(confidence in 0.05f32..=1.0, threshold in 0.05f32..=1.0) {
        let classifier = ViolationClassifier::default();
        let thresholds = ThresholdConfig {
            min_detection_confidence: threshold,
            ..Default::default()
        };
        let detection = DetectionResult::new()
            .with_object("book", confidence, BoundingBox::new(0.2, 0.2, 0.1, 0.1))
            .with_face(DetectedFace::new(BoundingBox::new(0.5, 0.5, 0.2, 0.2)));
        let events = classifier.classify(&detection, &thresholds, &Frame::blank(1, 1));
        prop_assert_eq!(events.len(), usize::from(confidence >= threshold));
    }
}
