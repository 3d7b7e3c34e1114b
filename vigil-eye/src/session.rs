//! Monitoring session: state machine, frame scheduling and failure recovery
//!
//! A session owns the thresholds, the violation ledger and one tokio task that
//! drives the tick loop. Only one frame is ever in flight: the next tick is not
//! taken until the current detect -> classify -> merge cycle has finished or
//! failed. Failed detections are retried after a fixed backoff; after
//! `max_retries` failures the tick is dropped and scheduling carries on, so a
//! flaky model never ends the session.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::frame_source::FrameSource;
use crate::models::DetectionModel;
use crate::processing::{ViolationAggregator, ViolationClassifier};
use crate::thresholds::{ThresholdConfig, ThresholdController, ThresholdUpdate};
use futures_util::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_core::{DetectionResult, Frame, ViolationEvent, ViolationLedger};

/// Lifecycle state of a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Initializing,
    Running,
    Retrying { attempt: u32 },
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Initializing => f.write_str("initializing"),
            SessionState::Running => f.write_str("running"),
            SessionState::Retrying { attempt } => write!(f, "retrying({})", attempt),
            SessionState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Counters for the tick loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detection_failures: u64,
    pub retries: u64,
    pub ticks_dropped: u64,
    pub events_merged: u64,
}

#[derive(Default)]
struct StatsCounters {
    ticks: AtomicU64,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    detection_failures: AtomicU64,
    retries: AtomicU64,
    ticks_dropped: AtomicU64,
    events_merged: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            events_merged: self.events_merged.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
struct Resources {
    frame_source: Arc<dyn FrameSource>,
    models: Vec<Arc<dyn DetectionModel>>,
}

struct SessionInner {
    id: Uuid,
    config: MonitorConfig,
    classifier: ViolationClassifier,
    thresholds: ThresholdController,
    aggregator: ViolationAggregator,
    state: RwLock<SessionState>,
    state_tx: broadcast::Sender<SessionState>,
    stop_tx: watch::Sender<bool>,
    resources: RwLock<Option<Resources>>,
    stats: StatsCounters,
}

impl SessionInner {
    /// Move to `next` unless the session is already stopped.
    /// Returns whether the transition happened.
    fn transition(&self, next: SessionState) -> bool {
        let previous = {
            let mut state = self.state.write();
            if *state == SessionState::Stopped {
                return false;
            }
            std::mem::replace(&mut *state, next)
        };
        self.announce(previous, next);
        true
    }

    /// Move from `expected` to `next`, failing if the session is elsewhere
    fn transition_from(&self, expected: SessionState, next: SessionState, op: &str) -> Result<(), MonitorError> {
        {
            let mut state = self.state.write();
            if *state != expected {
                return Err(MonitorError::InvalidState(format!(
                    "{} requires state {}, session is {}",
                    op, expected, *state
                )));
            }
            *state = next;
        }
        self.announce(expected, next);
        Ok(())
    }

    fn announce(&self, previous: SessionState, next: SessionState) {
        if previous != next {
            info!("Session {} {} -> {}", self.id, previous, next);
        }
        // No receivers is fine
        let _ = self.state_tx.send(next);
    }

    fn release_resources(&self) {
        if let Some(resources) = self.resources.write().take() {
            resources.frame_source.release();
            debug!("Session {} released frame source '{}'", self.id, resources.frame_source.name());
        }
    }
}

enum TickOutcome {
    Processed,
    Dropped,
    Cancelled,
}

/// One proctoring session over a frame source and a set of detection models
pub struct MonitoringSession {
    inner: Arc<SessionInner>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitoringSession {
    /// Create an idle session
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::Config)?;

        let thresholds = ThresholdController::new(config.thresholds)?;
        let classifier = ViolationClassifier::from_config(&config);
        let (state_tx, _) = broadcast::channel(config.state_channel_capacity);
        let (stop_tx, _) = watch::channel(false);

        let inner = SessionInner {
            id: Uuid::new_v4(),
            config,
            classifier,
            thresholds,
            aggregator: ViolationAggregator::new(),
            state: RwLock::new(SessionState::Idle),
            state_tx,
            stop_tx,
            resources: RwLock::new(None),
            stats: StatsCounters::default(),
        };

        Ok(Self {
            inner: Arc::new(inner),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Acquire the frame source and load every model.
    ///
    /// On failure everything acquired so far is released and the session is
    /// back in `Idle`. On success it waits in `Initializing` for [`start`].
    ///
    /// [`start`]: MonitoringSession::start
    pub async fn initialize(
        &self,
        frame_source: Arc<dyn FrameSource>,
        models: Vec<Arc<dyn DetectionModel>>,
        initial: ThresholdConfig,
    ) -> Result<(), MonitorError> {
        self.inner
            .transition_from(SessionState::Idle, SessionState::Initializing, "initialize")?;

        if let Err(e) = self.acquire(&frame_source, &models, initial).await {
            // stop() may have run meanwhile; only fall back from Initializing
            let _ = self
                .inner
                .transition_from(SessionState::Initializing, SessionState::Idle, "initialize rollback");
            return Err(e);
        }

        *self.inner.resources.write() = Some(Resources { frame_source, models });

        if self.state() == SessionState::Stopped {
            self.inner.release_resources();
            return Err(MonitorError::SessionStopped);
        }

        info!("Session {} initialized", self.inner.id);
        Ok(())
    }

    async fn acquire(
        &self,
        frame_source: &Arc<dyn FrameSource>,
        models: &[Arc<dyn DetectionModel>],
        initial: ThresholdConfig,
    ) -> Result<(), MonitorError> {
        initial.validate()?;

        if models.is_empty() {
            return Err(MonitorError::Initialization(
                "At least one detection model is required".to_string(),
            ));
        }

        frame_source.open().await.map_err(|e| {
            MonitorError::Initialization(format!("Frame source '{}' failed to open: {}", frame_source.name(), e))
        })?;

        for model in models {
            if let Err(e) = model.load().await {
                frame_source.release();
                return Err(MonitorError::Initialization(format!(
                    "Model '{}' failed to load: {}",
                    model.name(),
                    e
                )));
            }
            info!("Model '{}' ready", model.name());
        }

        if let Err(e) = self.inner.thresholds.replace(initial) {
            frame_source.release();
            return Err(e);
        }
        Ok(())
    }

    /// Enter `Running` and spawn the tick loop. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), MonitorError> {
        let resources = self
            .inner
            .resources
            .read()
            .clone()
            .ok_or_else(|| MonitorError::InvalidState("start requires a successful initialize".to_string()))?;

        let stop_rx = self.inner.stop_tx.subscribe();
        let mut handle_slot = self.loop_handle.lock();
        self.inner
            .transition_from(SessionState::Initializing, SessionState::Running, "start")?;

        let inner = self.inner.clone();
        *handle_slot = Some(tokio::spawn(run_loop(inner, resources, stop_rx)));
        Ok(())
    }

    /// Stop the session from any state.
    ///
    /// Freezes the ledger, cancels the tick loop (dropping any in-flight
    /// detection) and releases the frame source. Idempotent.
    pub async fn stop(&self) {
        // Frozen before Stopped is visible to any reader
        self.inner.aggregator.freeze();

        let previous = {
            let mut state = self.inner.state.write();
            std::mem::replace(&mut *state, SessionState::Stopped)
        };
        if previous == SessionState::Stopped {
            return;
        }
        self.inner.announce(previous, SessionState::Stopped);
        let _ = self.inner.stop_tx.send(true);

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            match tokio::time::timeout(self.inner.config.stop_timeout(), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => error!("Session {} tick loop failed: {}", self.inner.id, e),
                Err(_) => {
                    warn!("Session {} tick loop did not stop in time, aborting", self.inner.id);
                    abort.abort();
                }
            }
        }

        self.inner.release_resources();
        let stats = self.stats();
        info!(
            "Session {} stopped after {} ticks ({} processed, {} violations)",
            self.inner.id, stats.ticks, stats.frames_processed, stats.events_merged
        );
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Receive every state transition from now on
    pub fn subscribe_state(&self) -> broadcast::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.inner.thresholds.get()
    }

    /// Change thresholds; applies from the next processed frame
    pub fn set_threshold(&self, update: ThresholdUpdate) -> Result<ThresholdConfig, MonitorError> {
        self.inner.thresholds.set(update)
    }

    /// Copy of the violation ledger
    pub fn violations(&self) -> ViolationLedger {
        self.inner.aggregator.snapshot()
    }

    /// Register a callback invoked once per merged violation event
    pub fn on_violation<F>(&self, callback: F)
    where
        F: Fn(&ViolationEvent) + Send + Sync + 'static,
    {
        self.inner.aggregator.subscribe(callback);
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.stats.snapshot()
    }
}

impl Drop for MonitoringSession {
    fn drop(&mut self) {
        let _ = self.inner.stop_tx.send(true);
        if let Some(handle) = self.loop_handle.lock().take() {
            handle.abort();
        }
        self.inner.release_resources();
    }
}

async fn run_loop(inner: Arc<SessionInner>, resources: Resources, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        tick += 1;
        StatsCounters::bump(&inner.stats.ticks, 1);

        let interval = u64::from(inner.thresholds.get().frame_sample_interval.max(1));
        if tick % interval != 0 {
            StatsCounters::bump(&inner.stats.frames_skipped, 1);
            continue;
        }

        match process_tick(&inner, &resources, &mut stop_rx).await {
            TickOutcome::Processed | TickOutcome::Dropped => {}
            TickOutcome::Cancelled => break,
        }
    }

    debug!("Session {} tick loop exited after {} ticks", inner.id, tick);
}

/// Run one sampled tick, retrying failed detections
async fn process_tick(
    inner: &SessionInner,
    resources: &Resources,
    stop_rx: &mut watch::Receiver<bool>,
) -> TickOutcome {
    let max_retries = inner.config.max_retries;
    let mut attempt: u32 = 0;

    loop {
        let thresholds = inner.thresholds.get();
        let cycle = tokio::select! {
            biased;
            _ = stop_rx.changed() => return TickOutcome::Cancelled,
            result = capture_and_detect(resources) => result,
        };

        match cycle {
            Ok((frame, detection)) => {
                let events = inner.classifier.classify(&detection, &thresholds, &frame);
                match inner.aggregator.merge(&events) {
                    Ok(merged) => {
                        StatsCounters::bump(&inner.stats.frames_processed, 1);
                        StatsCounters::bump(&inner.stats.events_merged, merged as u64);
                    }
                    Err(MonitorError::SessionStopped) => return TickOutcome::Cancelled,
                    Err(e) => {
                        error!("Failed to merge violations: {}", e);
                    }
                }
                if attempt > 0 {
                    info!("Detection recovered after {} retries", attempt);
                    inner.transition(SessionState::Running);
                }
                return TickOutcome::Processed;
            }
            Err(e) => {
                StatsCounters::bump(&inner.stats.detection_failures, 1);
                attempt += 1;

                if attempt > max_retries {
                    warn!(
                        "Detection still failing after {} retries, dropping tick: {}",
                        max_retries, e
                    );
                    StatsCounters::bump(&inner.stats.ticks_dropped, 1);
                    if !inner.transition(SessionState::Running) {
                        return TickOutcome::Cancelled;
                    }
                    return TickOutcome::Dropped;
                }

                warn!("Detection failed (attempt {}/{}): {}", attempt, max_retries, e);
                StatsCounters::bump(&inner.stats.retries, 1);
                if !inner.transition(SessionState::Retrying { attempt }) {
                    return TickOutcome::Cancelled;
                }

                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => return TickOutcome::Cancelled,
                    _ = tokio::time::sleep(inner.config.retry_backoff()) => {}
                }
            }
        }
    }
}

/// Pull a frame and run every model on it concurrently
async fn capture_and_detect(resources: &Resources) -> Result<(Frame, DetectionResult), MonitorError> {
    let source = &resources.frame_source;
    let frame = source
        .current_frame()
        .await
        .map_err(|e| as_detection_failure(source.name(), e))?;

    let fragments = try_join_all(resources.models.iter().map(|model| {
        let frame = &frame;
        async move {
            model
                .detect(frame)
                .await
                .map_err(|e| as_detection_failure(model.name(), e))
        }
    }))
    .await?;

    let mut detection = DetectionResult::default();
    for fragment in fragments {
        detection.absorb(fragment);
    }
    Ok((frame, detection))
}

fn as_detection_failure(origin: &str, err: MonitorError) -> MonitorError {
    match err {
        MonitorError::DetectionFailure(msg) => MonitorError::DetectionFailure(format!("{}: {}", origin, msg)),
        other => MonitorError::DetectionFailure(format!("{}: {}", origin, other)),
    }
}
