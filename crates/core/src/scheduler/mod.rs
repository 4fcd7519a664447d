//! Throttled, serialized dispatch of frame analyses.
//!
//! Requests that arrive inside the throttle window are queued and drained by a
//! single background task, so the pose source never sees two requests at once
//! and queued requests are dispatched strictly in arrival order.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    AnalysisResult, CacheKey, CacheStats, ContentionPolicy, ExerciseAnalyzer, ExerciseKind,
    PipelineConfig, PoseCoachError, PoseSource, Result, ResultCache,
};

/// Cache check, detection, scoring and cache store for one frame.
#[derive(Debug)]
pub struct FramePipeline {
    source: PoseSource,
    analyzer: ExerciseAnalyzer,
    cache: ResultCache,
    caching_enabled: bool,
}

impl FramePipeline {
    pub fn new(source: PoseSource, config: &PipelineConfig) -> Self {
        Self {
            source,
            analyzer: ExerciseAnalyzer::new(),
            cache: ResultCache::new(config.cache_capacity),
            caching_enabled: config.caching_enabled,
        }
    }

    /// Runs one frame through the pipeline. Frames without a usable pose
    /// yield `Ok(None)`.
    pub fn run(
        &mut self,
        frame_identity: &str,
        exercise_type: ExerciseKind,
        timestamp_ms: u64,
    ) -> Result<Option<AnalysisResult>> {
        let key = CacheKey::new(frame_identity, exercise_type);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!(frame = frame_identity, %exercise_type, "cache hit");
            return Ok(Some(hit));
        }

        let landmarks = match self.source.detect(frame_identity, timestamp_ms) {
            Ok(landmarks) => landmarks,
            Err(err) if err.is_empty_result() => {
                tracing::debug!(frame = frame_identity, reason = %err, "no analysis for frame");
                return Ok(None);
            }
            Err(err) => {
                return Err(PoseCoachError::FrameAnalysis {
                    frame: frame_identity.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        let assessment = self.analyzer.assess(&landmarks, exercise_type);
        let result = AnalysisResult {
            landmarks,
            confidence: assessment.confidence,
            timestamp: timestamp_ms,
            exercise_type,
            feedback: assessment.feedback,
            score: assessment.score,
        };

        if self.caching_enabled {
            self.cache.put(key, result.clone());
        }
        Ok(Some(result))
    }

    fn cached(&mut self, key: &CacheKey) -> Option<AnalysisResult> {
        if self.caching_enabled {
            self.cache.get(key)
        } else {
            None
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// Counters describing how requests were admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Dispatched on arrival.
    pub immediate: u64,
    /// Served by the drain task.
    pub queued: u64,
    /// Answered without dispatch under [`ContentionPolicy::DropOnContention`].
    pub dropped: u64,
    /// Refused because the queue was full.
    pub rejected: u64,
}

type Completion = oneshot::Sender<Result<Option<AnalysisResult>>>;

/// A request waiting in the scheduler queue.
#[derive(Debug)]
pub struct ScheduledRequest {
    pub frame_identity: String,
    pub exercise_type: ExerciseKind,
    pub timestamp_ms: u64,
    completion: Completion,
}

/// Handle returned by [`FrameScheduler::schedule`].
#[derive(Debug)]
pub enum FrameTicket {
    Ready(Result<Option<AnalysisResult>>),
    Queued(oneshot::Receiver<Result<Option<AnalysisResult>>>),
}

impl FrameTicket {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    pub async fn wait(self) -> Result<Option<AnalysisResult>> {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Queued(receiver) => receiver
                .await
                .map_err(|_| PoseCoachError::SchedulerClosed)?,
        }
    }
}

#[derive(Debug)]
struct Dispatcher {
    pipeline: FramePipeline,
    last_dispatch: Option<Instant>,
    pending: usize,
    stats: SchedulerStats,
}

impl Dispatcher {
    fn wait_time(&self, now: Instant, window: Duration) -> Duration {
        match self.last_dispatch {
            Some(last) => window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    fn dispatch(
        &mut self,
        now: Instant,
        frame_identity: &str,
        exercise_type: ExerciseKind,
        timestamp_ms: u64,
    ) -> Result<Option<AnalysisResult>> {
        self.last_dispatch = Some(now);
        self.pipeline.run(frame_identity, exercise_type, timestamp_ms)
    }
}

/// Rate-limits access to the frame pipeline and serializes bursts.
///
/// The drain task is spawned on the current Tokio runtime at construction and
/// exits once the scheduler is dropped and its queue is empty.
#[derive(Debug)]
pub struct FrameScheduler {
    shared: Arc<Mutex<Dispatcher>>,
    queue: mpsc::UnboundedSender<ScheduledRequest>,
    window: Duration,
    policy: ContentionPolicy,
    max_queue_depth: Option<usize>,
}

impl FrameScheduler {
    /// Fails with [`PoseCoachError::NoRuntime`] when called outside a Tokio
    /// runtime.
    pub fn new(pipeline: FramePipeline, config: &PipelineConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| PoseCoachError::NoRuntime(err.to_string()))?;
        let window = Duration::from_millis(config.throttle_window_ms);
        let shared = Arc::new(Mutex::new(Dispatcher {
            pipeline,
            last_dispatch: None,
            pending: 0,
            stats: SchedulerStats::default(),
        }));
        let (queue, receiver) = mpsc::unbounded_channel();

        runtime.spawn(drain(shared.clone(), receiver, window));

        Ok(Self {
            shared,
            queue,
            window,
            policy: config.contention_policy,
            max_queue_depth: config.max_queue_depth,
        })
    }

    /// Admits a request. It is dispatched on the spot when the throttle window
    /// has elapsed and nothing is queued ahead of it; otherwise it is queued
    /// (or dropped, depending on the contention policy).
    pub fn schedule(
        &self,
        frame_identity: &str,
        exercise_type: ExerciseKind,
        timestamp_ms: u64,
    ) -> Result<FrameTicket> {
        let mut dispatcher = self.shared.lock();
        let now = Instant::now();

        if dispatcher.pending == 0 && dispatcher.wait_time(now, self.window).is_zero() {
            dispatcher.stats.immediate += 1;
            let outcome = dispatcher.dispatch(now, frame_identity, exercise_type, timestamp_ms);
            return Ok(FrameTicket::Ready(outcome));
        }

        if self.policy == ContentionPolicy::DropOnContention {
            dispatcher.stats.dropped += 1;
            let cached = dispatcher
                .pipeline
                .cached(&CacheKey::new(frame_identity, exercise_type));
            tracing::debug!(
                frame = frame_identity,
                served_from_cache = cached.is_some(),
                "request inside throttle window not queued"
            );
            return Ok(FrameTicket::Ready(Ok(cached)));
        }

        if let Some(depth) = self.max_queue_depth {
            if dispatcher.pending >= depth {
                dispatcher.stats.rejected += 1;
                tracing::warn!(frame = frame_identity, depth, "frame queue full");
                return Err(PoseCoachError::QueueFull { depth });
            }
        }

        let (completion, receiver) = oneshot::channel();
        self.queue
            .send(ScheduledRequest {
                frame_identity: frame_identity.to_string(),
                exercise_type,
                timestamp_ms,
                completion,
            })
            .map_err(|_| PoseCoachError::SchedulerClosed)?;
        dispatcher.pending += 1;
        dispatcher.stats.queued += 1;

        Ok(FrameTicket::Queued(receiver))
    }

    /// Schedules a request and waits for its outcome.
    pub async fn submit(
        &self,
        frame_identity: &str,
        exercise_type: ExerciseKind,
        timestamp_ms: u64,
    ) -> Result<Option<AnalysisResult>> {
        self.schedule(frame_identity, exercise_type, timestamp_ms)?
            .wait()
            .await
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock().stats
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    pub fn cache_len(&self) -> usize {
        self.shared.lock().pipeline.cache().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.lock().pipeline.cache().stats()
    }

    /// Checks for a cached result without refreshing its recency.
    pub fn is_cached(&self, frame_identity: &str, exercise_type: ExerciseKind) -> bool {
        self.shared
            .lock()
            .pipeline
            .cache()
            .contains(&CacheKey::new(frame_identity, exercise_type))
    }

    pub fn clear_cache(&self) {
        self.shared.lock().pipeline.clear_cache();
    }
}

async fn drain(
    shared: Arc<Mutex<Dispatcher>>,
    mut queue: mpsc::UnboundedReceiver<ScheduledRequest>,
    window: Duration,
) {
    while let Some(request) = queue.recv().await {
        loop {
            let wait = shared.lock().wait_time(Instant::now(), window);
            if wait.is_zero() {
                break;
            }
            tokio::time::sleep(wait).await;
        }

        let outcome = {
            let mut dispatcher = shared.lock();
            dispatcher.pending = dispatcher.pending.saturating_sub(1);
            dispatcher.dispatch(
                Instant::now(),
                &request.frame_identity,
                request.exercise_type,
                request.timestamp_ms,
            )
        };

        if request.completion.send(outcome).is_err() {
            tracing::debug!(frame = %request.frame_identity, "caller stopped waiting for frame");
        }
    }

    tracing::debug!("frame scheduler drained");
}
