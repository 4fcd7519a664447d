use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    find_landmark, pose::stable_hash, AnalysisResult, ExerciseKind, FrameScheduler, LandmarkKind,
    PoseCoachError, PoseLandmark, Result, VideoConfig, VideoMetrics,
};

/// First feedback line of metrics produced without frame analysis.
pub const FALLBACK_MARKER: &str = "Analysis completed using alternate method";
pub const ENCOURAGEMENT: &str = "Keep up the consistent training to see continued improvement!";

const FALLBACK_ADVICE: &str = "Record with your full body in frame for detailed form feedback";
const SUMMARY_EXCELLENT: &str = "Excellent form! Your technique is consistently strong.";
const SUMMARY_GOOD: &str = "Good form overall with minor areas to improve.";
const SUMMARY_ACCEPTABLE: &str = "Acceptable form, but focus on the points below.";
const SUMMARY_NEEDS_ATTENTION: &str = "Your form needs attention; review the points below.";

const MAX_RECURRING_FEEDBACK: usize = 3;
/// A feedback line must appear in at least 3 of every 10 sampled frames.
const RECURRENCE_NUMERATOR: usize = 3;
const RECURRENCE_DENOMINATOR: usize = 10;

const SIMULATED_MIN_DURATION_MS: u64 = 15_000;
const SIMULATED_MAX_DURATION_MS: u64 = 60_000;

/// Reports the length of a video. Implemented by the host's media layer.
pub trait VideoProbe: Send + Sync {
    fn duration_ms(&self, video_uri: &str) -> Result<u64>;
}

/// Probe that invents a stable 15-60 s duration for any non-empty URI.
#[derive(Debug, Clone)]
pub struct SimulatedVideoProbe {
    seed: u64,
}

impl SimulatedVideoProbe {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl VideoProbe for SimulatedVideoProbe {
    fn duration_ms(&self, video_uri: &str) -> Result<u64> {
        if video_uri.trim().is_empty() {
            return Err(PoseCoachError::msg("empty video reference"));
        }
        let mut rng = StdRng::seed_from_u64(self.seed ^ stable_hash(video_uri));
        Ok(rng.gen_range(SIMULATED_MIN_DURATION_MS..=SIMULATED_MAX_DURATION_MS))
    }
}

/// Turns a whole video into [`VideoMetrics`] by sampling frames through the
/// scheduler.
pub struct VideoAggregator {
    scheduler: Arc<FrameScheduler>,
    probe: Box<dyn VideoProbe>,
    config: VideoConfig,
    fallback_rng: Mutex<StdRng>,
}

impl VideoAggregator {
    pub fn new(
        scheduler: Arc<FrameScheduler>,
        probe: Box<dyn VideoProbe>,
        config: VideoConfig,
    ) -> Self {
        let fallback_rng = Mutex::new(StdRng::seed_from_u64(config.fallback_seed));
        Self {
            scheduler,
            probe,
            config,
            fallback_rng,
        }
    }

    /// Never fails: when frames cannot be analysed the result comes from the
    /// fallback generator and its feedback starts with [`FALLBACK_MARKER`].
    pub async fn analyze_video(&self, video_uri: &str, exercise: ExerciseKind) -> VideoMetrics {
        let duration_ms = match self.probe.duration_ms(video_uri) {
            Ok(duration_ms) if duration_ms > 0 => duration_ms,
            Ok(_) => {
                tracing::warn!(video = video_uri, "video has no duration");
                return self.fallback_metrics(exercise, None);
            }
            Err(err) => {
                tracing::warn!(video = video_uri, error = %err, "could not probe video");
                return self.fallback_metrics(exercise, None);
            }
        };

        let offsets = sample_offsets(duration_ms, self.config.max_samples);
        let mut frames = Vec::with_capacity(offsets.len());

        for offset_ms in offsets {
            let frame_identity = sample_frame_identity(video_uri, offset_ms);
            match self.scheduler.submit(&frame_identity, exercise, offset_ms).await {
                Ok(Some(result)) => frames.push(result),
                Ok(None) => tracing::debug!(frame = %frame_identity, "no pose in sampled frame"),
                Err(err) => {
                    tracing::warn!(
                        frame = %frame_identity,
                        error = %err,
                        "frame analysis failed, using alternate method"
                    );
                    return self.fallback_metrics(exercise, Some(duration_ms));
                }
            }
        }

        if frames.is_empty() {
            tracing::warn!(video = video_uri, "no usable frames, using alternate method");
            return self.fallback_metrics(exercise, Some(duration_ms));
        }

        let metrics = summarize(&frames, exercise, duration_ms, self.config.body_weight_kg);
        tracing::info!(
            video = video_uri,
            %exercise,
            samples = frames.len(),
            repetitions = metrics.repetitions,
            form_score = metrics.form_score,
            "video analysed"
        );
        metrics
    }

    fn fallback_metrics(&self, exercise: ExerciseKind, duration_ms: Option<u64>) -> VideoMetrics {
        let mut rng = self.fallback_rng.lock();
        let duration_seconds = match duration_ms {
            Some(duration_ms) => duration_seconds(duration_ms),
            None => rng.gen_range(30..=60),
        };
        let repetitions = match exercise {
            ExerciseKind::Plank => 1,
            _ => rng.gen_range(5..=15),
        };

        VideoMetrics {
            repetitions,
            form_score: rng.gen_range(60..=85),
            duration_seconds,
            calories_burned: calories_burned(exercise, self.config.body_weight_kg, duration_seconds),
            feedback: vec![
                FALLBACK_MARKER.to_string(),
                FALLBACK_ADVICE.to_string(),
                ENCOURAGEMENT.to_string(),
            ],
        }
    }
}

impl fmt::Debug for VideoAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Evenly spaced, centred sample offsets; at most one per second of video.
pub fn sample_offsets(duration_ms: u64, max_samples: usize) -> Vec<u64> {
    let count = (duration_ms / 1000).clamp(1, max_samples.max(1) as u64);
    (0..count)
        .map(|index| {
            let offset = u128::from(duration_ms) * u128::from(2 * index + 1) / u128::from(2 * count);
            // Always below duration_ms.
            offset as u64
        })
        .collect()
}

pub fn sample_frame_identity(video_uri: &str, offset_ms: u64) -> String {
    format!("{video_uri}#t={offset_ms}")
}

pub fn duration_seconds(duration_ms: u64) -> u32 {
    duration_ms.div_ceil(1000).clamp(1, u64::from(u32::MAX)) as u32
}

/// `MET * weight / 60` kcal per minute, times minutes exercised.
pub fn calories_burned(exercise: ExerciseKind, body_weight_kg: f64, duration_seconds: u32) -> u32 {
    let per_minute = exercise.met() * body_weight_kg / 60.0;
    (per_minute * (f64::from(duration_seconds) / 60.0)).round().max(0.0) as u32
}

fn summarize(
    frames: &[AnalysisResult],
    exercise: ExerciseKind,
    duration_ms: u64,
    body_weight_kg: f64,
) -> VideoMetrics {
    let average_score =
        frames.iter().map(|frame| f64::from(frame.score)).sum::<f64>() / frames.len() as f64;
    let duration_seconds = duration_seconds(duration_ms);

    VideoMetrics {
        repetitions: count_repetitions(exercise, frames),
        form_score: average_score.round().clamp(0.0, 100.0) as u8,
        duration_seconds,
        calories_burned: calories_burned(exercise, body_weight_kg, duration_seconds),
        feedback: consolidate_feedback(frames, average_score),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPhase {
    Up,
    Down,
}

/// Two-state repetition counter over the vertical distance between two
/// landmarks. Entering `Down` needs the distance to drop below `down_below`;
/// a repetition completes when it then rises above `up_above`.
#[derive(Debug, Clone)]
pub struct RepetitionDetector {
    upper: LandmarkKind,
    lower: LandmarkKind,
    down_below: f32,
    up_above: f32,
    phase: RepPhase,
    count: u32,
}

impl RepetitionDetector {
    pub fn new(upper: LandmarkKind, lower: LandmarkKind, down_below: f32, up_above: f32) -> Self {
        Self {
            upper,
            lower,
            down_below,
            up_above,
            phase: RepPhase::Up,
            count: 0,
        }
    }

    /// Detector for exercises with a movement cycle; `None` for the rest.
    pub fn for_exercise(exercise: ExerciseKind) -> Option<Self> {
        match exercise {
            ExerciseKind::Squat => Some(Self::new(
                LandmarkKind::LeftHip,
                LandmarkKind::LeftKnee,
                60.0,
                80.0,
            )),
            ExerciseKind::Pushup => Some(Self::new(
                LandmarkKind::LeftShoulder,
                LandmarkKind::LeftElbow,
                30.0,
                50.0,
            )),
            ExerciseKind::Plank | ExerciseKind::General => None,
        }
    }

    /// Feeds one frame; returns `true` when it completed a repetition.
    pub fn observe(&mut self, landmarks: &[PoseLandmark]) -> bool {
        let (Some(upper), Some(lower)) = (
            find_landmark(landmarks, self.upper),
            find_landmark(landmarks, self.lower),
        ) else {
            return false;
        };
        let distance = (upper.y - lower.y).abs();

        match self.phase {
            RepPhase::Up if distance < self.down_below => {
                self.phase = RepPhase::Down;
                false
            }
            RepPhase::Down if distance > self.up_above => {
                self.phase = RepPhase::Up;
                self.count += 1;
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Repetitions across analysed frames, at least one when any frame exists.
pub fn count_repetitions(exercise: ExerciseKind, frames: &[AnalysisResult]) -> u32 {
    if frames.is_empty() {
        return 0;
    }

    let counted = match exercise {
        ExerciseKind::Plank => return 1,
        ExerciseKind::General => (frames.len() / 3 + 1) as u32,
        ExerciseKind::Squat | ExerciseKind::Pushup => {
            match RepetitionDetector::for_exercise(exercise) {
                Some(mut detector) => {
                    for frame in frames {
                        detector.observe(&frame.landmarks);
                    }
                    detector.count()
                }
                None => 0,
            }
        }
    };
    counted.max(1)
}

fn summary_line(average_score: f64) -> &'static str {
    if average_score >= 90.0 {
        SUMMARY_EXCELLENT
    } else if average_score >= 80.0 {
        SUMMARY_GOOD
    } else if average_score >= 70.0 {
        SUMMARY_ACCEPTABLE
    } else {
        SUMMARY_NEEDS_ATTENTION
    }
}

/// Summary line, then up to three lines recurring in at least 30% of frames
/// (most frequent first, earliest seen breaks ties), then the encouragement.
pub fn consolidate_feedback(frames: &[AnalysisResult], average_score: f64) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for frame in frames {
        let mut seen_in_frame: Vec<&str> = Vec::new();
        for line in &frame.feedback {
            if seen_in_frame.contains(&line.as_str()) {
                continue;
            }
            seen_in_frame.push(line.as_str());
            let discovered = counts.len();
            counts.entry(line.as_str()).or_insert((0, discovered)).0 += 1;
        }
    }

    let mut recurring: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| {
            count * RECURRENCE_DENOMINATOR >= frames.len() * RECURRENCE_NUMERATOR
        })
        .map(|(line, (count, discovered))| (line, count, discovered))
        .collect();
    recurring.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut feedback = Vec::with_capacity(MAX_RECURRING_FEEDBACK + 2);
    feedback.push(summary_line(average_score).to_string());
    feedback.extend(
        recurring
            .into_iter()
            .take(MAX_RECURRING_FEEDBACK)
            .map(|(line, _, _)| line.to_string()),
    );
    feedback.push(ENCOURAGEMENT.to_string());
    feedback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FramePipeline, PipelineConfig, PosePoint, PoseSource, PoseSourceConfig};

    fn frame(score: u8, feedback: &[&str], points: &[(LandmarkKind, f32)]) -> AnalysisResult {
        AnalysisResult {
            landmarks: points
                .iter()
                .map(|&(kind, y)| PoseLandmark {
                    kind,
                    position: PosePoint::new(0.0, y, 0.9),
                })
                .collect(),
            confidence: 0.9,
            timestamp: 0,
            exercise_type: ExerciseKind::Squat,
            feedback: feedback.iter().map(|line| line.to_string()).collect(),
            score,
        }
    }

    fn squat_frame(hip_knee_distance: f32) -> AnalysisResult {
        frame(
            80,
            &[],
            &[
                (LandmarkKind::LeftHip, 300.0 - hip_knee_distance),
                (LandmarkKind::LeftKnee, 300.0),
            ],
        )
    }

    fn aggregator(config: VideoConfig) -> VideoAggregator {
        let pipeline_config = PipelineConfig::default();
        let source = PoseSource::simulated(&PoseSourceConfig::default());
        let pipeline = FramePipeline::new(source, &pipeline_config);
        let scheduler = Arc::new(FrameScheduler::new(pipeline, &pipeline_config).unwrap());
        VideoAggregator::new(scheduler, Box::new(SimulatedVideoProbe::new(1)), config)
    }

    #[test]
    fn samples_are_evenly_spaced_and_bounded() {
        assert_eq!(
            sample_offsets(10_000, 5),
            vec![1_000, 3_000, 5_000, 7_000, 9_000]
        );
        assert_eq!(sample_offsets(120_000, 10).len(), 10);
        assert_eq!(sample_offsets(3_500, 10), vec![583, 1_750, 2_916]);
        assert_eq!(sample_offsets(400, 10), vec![200]);
    }

    #[test]
    fn sample_offsets_handle_huge_durations() {
        let offsets = sample_offsets(u64::MAX, 10);
        assert_eq!(offsets.len(), 10);
        assert_eq!(offsets[0], u64::MAX / 20);
        assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(offsets.iter().all(|&offset| offset < u64::MAX));
    }

    #[test]
    fn squat_detector_counts_down_up_cycles() {
        let frames: Vec<AnalysisResult> = [100.0, 55.0, 70.0, 85.0, 50.0, 90.0, 40.0]
            .into_iter()
            .map(squat_frame)
            .collect();

        assert_eq!(count_repetitions(ExerciseKind::Squat, &frames), 2);
    }

    #[test]
    fn detector_tracks_phase() {
        let mut detector = RepetitionDetector::for_exercise(ExerciseKind::Pushup).unwrap();
        let at = |distance: f32| {
            vec![
                PoseLandmark {
                    kind: LandmarkKind::LeftShoulder,
                    position: PosePoint::new(0.0, 100.0, 1.0),
                },
                PoseLandmark {
                    kind: LandmarkKind::LeftElbow,
                    position: PosePoint::new(0.0, 100.0 + distance, 1.0),
                },
            ]
        };

        assert!(!detector.observe(&at(25.0)));
        assert_eq!(detector.phase(), RepPhase::Down);
        assert!(!detector.observe(&at(45.0)));
        assert!(detector.observe(&at(55.0)));
        assert_eq!(detector.phase(), RepPhase::Up);
        assert_eq!(detector.count(), 1);
    }

    #[test]
    fn repetitions_are_floored_at_one() {
        let frames = vec![squat_frame(100.0); 4];
        assert_eq!(count_repetitions(ExerciseKind::Squat, &frames), 1);
        assert_eq!(count_repetitions(ExerciseKind::Squat, &[]), 0);
    }

    #[test]
    fn plank_and_general_use_fixed_rules() {
        let frames = vec![squat_frame(100.0); 10];
        assert_eq!(count_repetitions(ExerciseKind::Plank, &frames), 1);
        assert_eq!(count_repetitions(ExerciseKind::General, &frames), 4);
    }

    #[test]
    fn calories_follow_met_formula() {
        assert_eq!(calories_burned(ExerciseKind::Squat, 70.0, 60), 6);
        assert_eq!(calories_burned(ExerciseKind::Plank, 70.0, 30), 2);
        assert_eq!(calories_burned(ExerciseKind::General, 70.0, 0), 0);
    }

    #[test]
    fn consolidates_recurring_feedback_by_frequency_then_discovery() {
        let frames = vec![
            frame(95, &["rare", "b", "a"], &[]),
            frame(95, &["a", "b"], &[]),
            frame(95, &["a", "c"], &[]),
            frame(95, &["c", "b", "d"], &[]),
            frame(95, &["d", "d"], &[]),
            frame(95, &["e"], &[]),
            frame(95, &["c"], &[]),
            frame(95, &["a"], &[]),
            frame(95, &["d"], &[]),
            frame(95, &[], &[]),
        ];

        // a: 4 frames; b, c, d: 3 each (d discovered last); rare, e: below 30%.
        let feedback = consolidate_feedback(&frames, 91.0);
        assert_eq!(
            feedback,
            vec![SUMMARY_EXCELLENT, "a", "b", "c", ENCOURAGEMENT]
        );
    }

    #[test]
    fn summary_tracks_score_buckets() {
        assert_eq!(summary_line(90.0), SUMMARY_EXCELLENT);
        assert_eq!(summary_line(85.0), SUMMARY_GOOD);
        assert_eq!(summary_line(70.0), SUMMARY_ACCEPTABLE);
        assert_eq!(summary_line(69.9), SUMMARY_NEEDS_ATTENTION);
    }

    #[test]
    fn simulated_probe_is_stable() {
        let probe = SimulatedVideoProbe::new(3);
        let duration = probe.duration_ms("video_1").unwrap();
        assert_eq!(duration, probe.duration_ms("video_1").unwrap());
        assert!((SIMULATED_MIN_DURATION_MS..=SIMULATED_MAX_DURATION_MS).contains(&duration));
        assert!(probe.duration_ms("").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn plank_video_counts_one_repetition() {
        let metrics = aggregator(VideoConfig::default())
            .analyze_video("video_1", ExerciseKind::Plank)
            .await;

        assert_eq!(metrics.repetitions, 1);
        assert!(metrics.duration_seconds >= 15);
        assert!(metrics.calories_burned > 0);
        assert_eq!(metrics.feedback.last().map(String::as_str), Some(ENCOURAGEMENT));
        assert_ne!(metrics.feedback[0], FALLBACK_MARKER);
    }

    struct FixedProbe(u64);

    impl VideoProbe for FixedProbe {
        fn duration_ms(&self, _video_uri: &str) -> Result<u64> {
            Ok(self.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absurd_probe_durations_are_still_analysed() {
        let pipeline_config = PipelineConfig::default();
        let source = PoseSource::simulated(&PoseSourceConfig::default());
        let pipeline = FramePipeline::new(source, &pipeline_config);
        let scheduler = Arc::new(FrameScheduler::new(pipeline, &pipeline_config).unwrap());
        let aggregator = VideoAggregator::new(
            scheduler,
            Box::new(FixedProbe(u64::MAX)),
            VideoConfig::default(),
        );

        let metrics = aggregator.analyze_video("corrupt.mp4", ExerciseKind::Squat).await;

        assert_ne!(metrics.feedback[0], FALLBACK_MARKER);
        assert_eq!(metrics.duration_seconds, u32::MAX);
        assert!(metrics.form_score <= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_video_falls_back() {
        let aggregator = aggregator(VideoConfig::default());
        let metrics = aggregator.analyze_video("", ExerciseKind::Squat).await;

        assert_eq!(metrics.feedback[0], FALLBACK_MARKER);
        assert!((5..=15).contains(&metrics.repetitions));
        assert!((60..=85).contains(&metrics.form_score));
        assert!((30..=60).contains(&metrics.duration_seconds));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_values_are_reproducible_per_seed() {
        let first = aggregator(VideoConfig::default())
            .analyze_video("", ExerciseKind::Pushup)
            .await;
        let second = aggregator(VideoConfig::default())
            .analyze_video("", ExerciseKind::Pushup)
            .await;

        assert_eq!(first, second);
    }
}
