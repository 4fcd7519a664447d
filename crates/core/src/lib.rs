//! Core library for the Pose Coach application.
//!
//! The crate turns exercise-video frames into per-frame pose feedback and
//! per-video metrics. Each module owns one stage of the pipeline: landmark
//! detection (real engine or simulator), result caching, throttled frame
//! scheduling, per-exercise scoring and whole-video aggregation. The
//! [`PoseCoachService`] ties them together for the application layer.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod landmarks;
pub mod pose;
pub mod scheduler;
pub mod service;
pub mod video;

pub use analysis::{ExerciseAnalyzer, FrameAssessment};
pub use cache::{CacheEntry, CacheKey, CacheStats, ResultCache};
pub use config::{
    AppConfig, ContentionPolicy, EngineConfig, PipelineConfig, PoseSourceConfig, VideoConfig,
};
pub use error::{DetectionError, EngineError, PoseCoachError, Result};
pub use landmarks::{
    find_landmark, AnalysisResult, ExerciseKind, LandmarkKind, PoseLandmark, PosePoint,
    VideoMetrics,
};
pub use pose::{
    DecodedImage, DetectionOutput, FrameDecoder, PoseBackend, PoseEngine, PoseMode, PoseSource,
    SimulatedPoseSource,
};
pub use scheduler::{FramePipeline, FrameScheduler, FrameTicket, SchedulerStats, ScheduledRequest};
pub use service::PoseCoachService;
pub use video::{
    RepPhase, RepetitionDetector, SimulatedVideoProbe, VideoAggregator, VideoProbe,
    FALLBACK_MARKER,
};
