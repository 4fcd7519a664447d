use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use pose_coach_core::{
    AppConfig, DecodedImage, DetectionOutput, EngineConfig, EngineError, ExerciseKind,
    FrameDecoder, LandmarkKind, PoseBackend, PoseCoachService, PoseEngine, PoseMode, PosePoint,
    FALLBACK_MARKER,
};
use tokio::task::JoinSet;

fn simulated_service(config: AppConfig) -> PoseCoachService {
    PoseCoachService::new(config, None).expect("valid configuration")
}

struct PassthroughDecoder;

impl FrameDecoder for PassthroughDecoder {
    fn decode(&self, _frame_uri: &str) -> Result<DecodedImage, EngineError> {
        Ok(DecodedImage::default())
    }
}

/// Engine that serves `healthy_frames` detections and then fails.
struct FlakyEngine {
    healthy_frames: usize,
    calls: Arc<AtomicUsize>,
}

impl PoseEngine for FlakyEngine {
    fn initialize(&mut self, _config: &EngineConfig) -> Result<(), EngineError> {
        Ok(())
    }

    fn detect_for_frame(
        &mut self,
        _image: &DecodedImage,
        _timestamp_ms: u64,
    ) -> Result<DetectionOutput, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.healthy_frames {
            return Err(EngineError::new("inference backend crashed"));
        }
        Ok(DetectionOutput {
            landmarks: vec![vec![PosePoint::new(0.0, 0.0, 0.95); LandmarkKind::COUNT]],
            world_landmarks: Vec::new(),
        })
    }
}

/// Engine that never finds a body.
struct EmptyEngine;

impl PoseEngine for EmptyEngine {
    fn initialize(&mut self, _config: &EngineConfig) -> Result<(), EngineError> {
        Ok(())
    }

    fn detect_for_frame(
        &mut self,
        _image: &DecodedImage,
        _timestamp_ms: u64,
    ) -> Result<DetectionOutput, EngineError> {
        Ok(DetectionOutput::default())
    }
}

#[tokio::test(start_paused = true)]
async fn simulated_frame_analysis_returns_a_full_pose() {
    let service = simulated_service(AppConfig::default());

    let result = service
        .analyze_frame_named("frame_1", "squat")
        .await
        .unwrap()
        .expect("simulated source always finds a pose");

    assert_eq!(result.exercise_type, ExerciseKind::Squat);
    assert_eq!(result.landmarks.len(), 33);
    assert!((0.7..=1.0).contains(&result.confidence));
    assert!(result.score <= 100);
    assert!(!result.feedback.is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_frames_are_identical_until_the_cache_is_cleared() {
    let service = simulated_service(AppConfig::default());

    let first = service.analyze_frame("frame_1", ExerciseKind::Pushup).await.unwrap();
    let second = service.analyze_frame("frame_1", ExerciseKind::Pushup).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(service.cache_stats().hits, 1);

    service.clear_cache();
    let recomputed = service
        .analyze_frame("frame_1", ExerciseKind::Pushup)
        .await
        .unwrap()
        .unwrap();
    let first = first.unwrap();
    assert_eq!(recomputed.landmarks, first.landmarks);
    assert_eq!(recomputed.score, first.score);
    assert_eq!(recomputed.feedback, first.feedback);
}

#[tokio::test(start_paused = true)]
async fn cache_keeps_the_most_recent_analyses() {
    let mut config = AppConfig::default();
    config.pipeline.cache_capacity = 10;
    let service = simulated_service(config);

    for index in 0..15 {
        service
            .analyze_frame(&format!("frame_{index}"), ExerciseKind::General)
            .await
            .unwrap();
    }

    let scheduler = service.scheduler();
    assert_eq!(scheduler.cache_len(), 10);
    for index in 0..5 {
        assert!(!scheduler.is_cached(&format!("frame_{index}"), ExerciseKind::General));
    }
    for index in 5..15 {
        assert!(scheduler.is_cached(&format!("frame_{index}"), ExerciseKind::General));
    }
}

#[tokio::test(start_paused = true)]
async fn plank_video_reports_one_repetition() {
    let service = simulated_service(AppConfig::default());

    let metrics = service.analyze_video("video_1", ExerciseKind::Plank).await;

    assert_eq!(metrics.repetitions, 1);
    assert!(metrics.calories_burned > 0);
    assert!(metrics.duration_seconds > 0);
    assert!(metrics.form_score <= 100);
}

#[tokio::test(start_paused = true)]
async fn plank_is_always_one_repetition() {
    let service = simulated_service(AppConfig::default());

    for video in ["video_1", "video_2", "", "clip.mp4"] {
        let metrics = service.analyze_video(video, ExerciseKind::Plank).await;
        assert_eq!(metrics.repetitions, 1, "video `{video}`");
    }
}

#[tokio::test(start_paused = true)]
async fn bursts_are_queued_and_all_resolve() {
    let service = Arc::new(simulated_service(AppConfig::default()));

    let mut tasks = JoinSet::new();
    for index in 0..10 {
        let service = service.clone();
        tasks.spawn(async move {
            service
                .analyze_frame(&format!("burst_{index}"), ExerciseKind::Squat)
                .await
        });
    }

    while let Some(outcome) = tasks.join_next().await {
        let result = outcome.expect("task panicked").expect("analysis succeeds");
        assert!(result.is_some());
    }

    let stats = service.scheduler_stats();
    assert!(stats.immediate < 10);
    assert_eq!(stats.immediate + stats.queued, 10);
    assert_eq!(service.history().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn engine_failure_mid_video_falls_back() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = PoseBackend::new(
        PassthroughDecoder,
        FlakyEngine {
            healthy_frames: 3,
            calls: calls.clone(),
        },
    );
    let service = PoseCoachService::new(AppConfig::default(), Some(backend)).unwrap();
    assert_eq!(service.pose_mode(), PoseMode::Real);

    let metrics = service.analyze_video("video_1", ExerciseKind::Squat).await;

    assert_eq!(metrics.feedback[0], FALLBACK_MARKER);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!((1..=15).contains(&metrics.repetitions));
    assert!(metrics.form_score <= 100);
    assert!(metrics.duration_seconds > 0);
}

#[tokio::test(start_paused = true)]
async fn video_without_any_pose_falls_back() {
    let backend = PoseBackend::new(PassthroughDecoder, EmptyEngine);
    let service = PoseCoachService::new(AppConfig::default(), Some(backend)).unwrap();

    assert!(service
        .analyze_frame("frame_1", ExerciseKind::General)
        .await
        .unwrap()
        .is_none());

    let metrics = service.analyze_video("video_1", ExerciseKind::Pushup).await;
    assert_eq!(metrics.feedback[0], FALLBACK_MARKER);
    assert!(metrics.duration_seconds > 0);
}
