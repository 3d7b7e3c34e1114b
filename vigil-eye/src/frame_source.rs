//! Frame sources

use crate::error::MonitorError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};
use vigil_core::Frame;

const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Supplies the current video frame on demand
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Acquire the underlying device or stream
    async fn open(&self) -> Result<(), MonitorError>;

    /// Current decodable frame
    async fn current_frame(&self) -> Result<Frame, MonitorError>;

    /// Release the device or stream. Safe to call more than once.
    fn release(&self);
}

fn validate_resolution(width: u32, height: u32) -> Result<(), MonitorError> {
    if width == 0 || height == 0 {
        return Err(MonitorError::Config("Resolution must be non-zero".to_string()));
    }
    if width > MAX_WIDTH || height > MAX_HEIGHT {
        return Err(MonitorError::Config("Resolution too large (max 8K)".to_string()));
    }
    Ok(())
}

/// Blank frames of a fixed resolution, for replaying recorded detections
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    is_open: AtomicBool,
    frames_served: AtomicU64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Result<Self, MonitorError> {
        validate_resolution(width, height)?;
        Ok(Self {
            width,
            height,
            is_open: AtomicBool::new(false),
            frames_served: AtomicU64::new(0),
        })
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn open(&self) -> Result<(), MonitorError> {
        self.is_open.store(true, Ordering::SeqCst);
        info!("Synthetic frame source opened at {}x{}", self.width, self.height);
        Ok(())
    }

    async fn current_frame(&self) -> Result<Frame, MonitorError> {
        if !self.is_open() {
            return Err(MonitorError::DetectionFailure("Frame source not open".to_string()));
        }
        self.frames_served.fetch_add(1, Ordering::Relaxed);
        Ok(Frame::blank(self.width, self.height))
    }

    fn release(&self) {
        if self.is_open.swap(false, Ordering::SeqCst) {
            info!("Synthetic frame source released");
        }
    }
}

/// Cycles through a fixed list of image files decoded to RGB
pub struct ImageFrameSource {
    paths: Vec<PathBuf>,
    frames: RwLock<Vec<Frame>>,
    cursor: AtomicUsize,
}

impl ImageFrameSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            frames: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// All png/jpeg files in a directory, sorted by file name
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(Self::new(paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn decode(path: &Path) -> Result<Frame, MonitorError> {
        let image = image::open(path)?.to_rgb8();
        let (width, height) = image.dimensions();
        validate_resolution(width, height)?;
        Ok(Frame::new(width, height, image.into_raw()))
    }
}

#[async_trait]
impl FrameSource for ImageFrameSource {
    fn name(&self) -> &str {
        "images"
    }

    async fn open(&self) -> Result<(), MonitorError> {
        if self.paths.is_empty() {
            return Err(MonitorError::Initialization("No image files to serve".to_string()));
        }

        let paths = self.paths.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            paths.iter().map(|p| Self::decode(p)).collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| MonitorError::Initialization(format!("Image decoding task failed: {}", e)))?
        .map_err(|e| MonitorError::Initialization(format!("Failed to decode frames: {}", e)))?;

        info!("Image frame source opened with {} frames", decoded.len());
        *self.frames.write() = decoded;
        self.cursor.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn current_frame(&self) -> Result<Frame, MonitorError> {
        let frames = self.frames.read();
        if frames.is_empty() {
            return Err(MonitorError::DetectionFailure("Frame source not open".to_string()));
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % frames.len();
        debug!("Serving image frame {}", index);
        Ok(frames[index].clone().with_captured_at(Utc::now()))
    }

    fn release(&self) {
        let mut frames = self.frames.write();
        if !frames.is_empty() {
            frames.clear();
            info!("Image frame source released");
        }
    }
}
