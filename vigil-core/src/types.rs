//! Frames, geometry and detection results

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Point in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in normalized center form, all values in [0, 1] of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(alias = "xCenter")]
    pub x_center: f32,
    #[serde(alias = "yCenter")]
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self { x_center, y_center, width, height }
    }

    /// Convert a top-left pixel box (x, y, width, height) into normalized center form.
    ///
    /// Returns `None` for empty frames or non-finite input.
    pub fn from_pixels(x: f32, y: f32, width: f32, height: f32, frame_width: u32, frame_height: u32) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        if !x.is_finite() || !y.is_finite() || !width.is_finite() || !height.is_finite() {
            return None;
        }
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        Some(Self {
            x_center: (x + width / 2.0) / fw,
            y_center: (y + height / 2.0) / fh,
            width: width / fw,
            height: height / fh,
        })
    }

    pub fn center(&self) -> Point {
        Point::new(self.x_center, self.y_center)
    }

    pub fn left(&self) -> f32 {
        self.x_center - self.width / 2.0
    }

    pub fn right(&self) -> f32 {
        self.x_center + self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.y_center - self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y_center + self.height / 2.0
    }
}

/// One decoded video frame
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed pixel data, layout is up to the frame source
    pub data: Bytes,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            captured_at: Utc::now(),
        }
    }

    /// Black RGB frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(3);
        Self::new(width, height, vec![0u8; len])
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Archive copy of this frame. Pixel bytes are shared, not duplicated.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            captured_at: self.captured_at,
            data: self.data.clone(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Frame copy kept as evidence for a violation.
///
/// Only the metadata is serialized; pixel data stays in memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    #[serde(skip)]
    data: Bytes,
}

impl Snapshot {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Labelled object from an object detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    #[serde(alias = "boundingBox")]
    pub bounding_box: BoundingBox,
}

/// Face keypoints in the order emitted by six-point face detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceKeypoint {
    RightEye = 0,
    LeftEye = 1,
    NoseTip = 2,
    Mouth = 3,
    RightEar = 4,
    LeftEar = 5,
}

/// Face from a face/landmark detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(alias = "boundingBox")]
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Point>>,
}

impl DetectedFace {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self { bounding_box, landmarks: None }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<Point>) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn keypoint(&self, keypoint: FaceKeypoint) -> Option<Point> {
        self.landmarks
            .as_ref()
            .and_then(|points| points.get(keypoint as usize))
            .copied()
    }
}

/// Output of one or more detection models for a single frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, label: &str, confidence: f32, bounding_box: BoundingBox) -> Self {
        self.objects.push(DetectedObject {
            label: label.to_string(),
            confidence,
            bounding_box,
        });
        self
    }

    pub fn with_face(mut self, face: DetectedFace) -> Self {
        self.faces.push(face);
        self
    }

    /// Fold a fragment from another model into this result
    pub fn absorb(&mut self, fragment: DetectionResult) {
        self.objects.extend(fragment.objects);
        self.faces.extend(fragment.faces);
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.faces.is_empty()
    }
}
