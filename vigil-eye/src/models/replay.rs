//! Replay of recorded detections

use super::DetectionModel;
use crate::error::MonitorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info};
use vigil_core::{DetectionResult, Frame};

/// Serves recorded detection results, one per `detect` call, in order.
///
/// Recordings are JSON lines, one `DetectionResult` per line. Once the
/// recording runs out every call fails and [`ReplayModel::wait_exhausted`]
/// resolves.
pub struct ReplayModel {
    name: String,
    recording: Mutex<VecDeque<DetectionResult>>,
    total: usize,
    exhausted: AtomicBool,
    exhausted_notify: Notify,
}

impl ReplayModel {
    pub fn new(name: impl Into<String>, results: Vec<DetectionResult>) -> Self {
        let total = results.len();
        Self {
            name: name.into(),
            recording: Mutex::new(results.into()),
            total,
            exhausted: AtomicBool::new(false),
            exhausted_notify: Notify::new(),
        }
    }

    /// Parse a JSON lines recording. Blank lines are skipped.
    pub fn from_json_lines(name: impl Into<String>, reader: impl BufRead) -> Result<Self, MonitorError> {
        let mut results = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let result: DetectionResult = serde_json::from_str(&line).map_err(|e| {
                MonitorError::Config(format!("Invalid detection on line {}: {}", index + 1, e))
            })?;
            results.push(result);
        }
        Ok(Self::new(name, results))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("replay")
            .to_string();
        Self::from_json_lines(name, std::io::BufReader::new(file))
    }

    /// Number of recorded frames
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.recording.lock().len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Resolves once a `detect` call has found the recording empty
    pub async fn wait_exhausted(&self) {
        if self.is_exhausted() {
            return;
        }
        self.exhausted_notify.notified().await;
    }
}

#[async_trait]
impl DetectionModel for ReplayModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<(), MonitorError> {
        if self.total == 0 {
            return Err(MonitorError::Initialization(format!("Recording '{}' is empty", self.name)));
        }
        info!("Replay model '{}' loaded with {} frames", self.name, self.total);
        Ok(())
    }

    async fn detect(&self, _frame: &Frame) -> Result<DetectionResult, MonitorError> {
        let next = self.recording.lock().pop_front();
        match next {
            Some(result) => {
                debug!("Replaying frame {}/{}", self.total - self.remaining(), self.total);
                Ok(result)
            }
            None => {
                if !self.exhausted.swap(true, Ordering::SeqCst) {
                    info!("Replay model '{}' exhausted", self.name);
                    self.exhausted_notify.notify_one();
                }
                Err(MonitorError::DetectionFailure("Recording exhausted".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RECORDING: &str = r#"{"objects":[{"label":"cell phone","confidence":0.9,"bounding_box":{"x_center":0.2,"y_center":0.2,"width":0.1,"height":0.1}}],"faces":[]}

{"faces":[{"boundingBox":{"xCenter":0.5,"yCenter":0.5,"width":0.2,"height":0.2}}]}
"#;

    #[tokio::test]
    async fn test_replay_serves_in_order() {
        let model = ReplayModel::from_json_lines("exam", Cursor::new(RECORDING)).unwrap();
        assert_eq!(model.total(), 2);
        model.load().await.unwrap();

        let frame = Frame::blank(2, 2);
        let first = model.detect(&frame).await.unwrap();
        assert_eq!(first.objects[0].label, "cell phone");
        let second = model.detect(&frame).await.unwrap();
        assert_eq!(second.faces.len(), 1);
        assert_eq!(model.remaining(), 0);
        assert!(!model.is_exhausted());

        assert!(model.detect(&frame).await.is_err());
        assert!(model.is_exhausted());
        let mut waiter = tokio_test::task::spawn(model.wait_exhausted());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_wait_exhausted_wakes_waiter() {
        let model = std::sync::Arc::new(ReplayModel::new("short", vec![]));
        let waiter = {
            let model = model.clone();
            tokio::spawn(async move { model.wait_exhausted().await })
        };
        tokio::task::yield_now().await;
        assert!(model.detect(&Frame::blank(1, 1)).await.is_err());
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_recording_fails_load() {
        let model = ReplayModel::new("empty", vec![]);
        assert!(matches!(model.load().await, Err(MonitorError::Initialization(_))));
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let raw = "{\"faces\":[]}\nnot json\n";
        match ReplayModel::from_json_lines("bad", Cursor::new(raw)) {
            Err(MonitorError::Config(msg)) => assert!(msg.contains("line 2")),
            _ => panic!("Expected config error"),
        }
    }
}
