use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

use crate::{
    AnalysisResult, AppConfig, CacheStats, ExerciseKind, FramePipeline, FrameScheduler,
    PoseBackend, PoseMode, PoseSource, Result, SchedulerStats, SimulatedVideoProbe,
    VideoAggregator, VideoMetrics, VideoProbe,
};

/// Application-facing entry point owning the whole frame-analysis pipeline.
///
/// Built once per process inside a Tokio runtime and shared by reference.
#[derive(Debug)]
pub struct PoseCoachService {
    scheduler: Arc<FrameScheduler>,
    aggregator: VideoAggregator,
    history: Mutex<Vec<AnalysisResult>>,
    mode: PoseMode,
}

impl PoseCoachService {
    /// Initializes the pose source (falling back to simulation when `backend`
    /// is missing or fails) and uses the simulated video probe.
    ///
    /// Must be called from within a Tokio runtime; otherwise it returns
    /// [`crate::PoseCoachError::NoRuntime`].
    pub fn new(config: AppConfig, backend: Option<PoseBackend>) -> Result<Self> {
        let probe = SimulatedVideoProbe::new(config.pose.simulation_seed);
        Self::with_probe(config, backend, Box::new(probe))
    }

    pub fn with_probe(
        config: AppConfig,
        backend: Option<PoseBackend>,
        probe: Box<dyn VideoProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let (source, mode) = PoseSource::initialize(&config.pose, backend);
        let pipeline = FramePipeline::new(source, &config.pipeline);
        let scheduler = Arc::new(FrameScheduler::new(pipeline, &config.pipeline)?);
        let aggregator = VideoAggregator::new(scheduler.clone(), probe, config.video);

        Ok(Self {
            scheduler,
            aggregator,
            history: Mutex::new(Vec::new()),
            mode,
        })
    }

    /// Analyses one frame. `Ok(None)` means no pose was found or the
    /// reference was unusable.
    pub async fn analyze_frame(
        &self,
        frame_uri: &str,
        exercise: ExerciseKind,
    ) -> Result<Option<AnalysisResult>> {
        let result = self
            .scheduler
            .submit(frame_uri, exercise, now_millis())
            .await?;

        if let Some(result) = &result {
            self.history.lock().push(result.clone());
        }
        Ok(result)
    }

    /// String-typed variant of [`Self::analyze_frame`] for callers holding raw
    /// exercise names.
    pub async fn analyze_frame_named(
        &self,
        frame_uri: &str,
        exercise: &str,
    ) -> Result<Option<AnalysisResult>> {
        self.analyze_frame(frame_uri, exercise.parse()?).await
    }

    pub async fn analyze_video(&self, video_uri: &str, exercise: ExerciseKind) -> VideoMetrics {
        self.aggregator.analyze_video(video_uri, exercise).await
    }

    pub async fn analyze_video_named(&self, video_uri: &str, exercise: &str) -> Result<VideoMetrics> {
        Ok(self.analyze_video(video_uri, exercise.parse()?).await)
    }

    /// Frame results in the order they were produced.
    pub fn history(&self) -> Vec<AnalysisResult> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn clear_cache(&self) {
        self.scheduler.clear_cache();
    }

    pub fn supported_exercises(&self) -> Vec<&'static str> {
        ExerciseKind::ALL.iter().map(|kind| kind.as_str()).collect()
    }

    pub fn pose_mode(&self) -> PoseMode {
        self.mode
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.scheduler.cache_stats()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
