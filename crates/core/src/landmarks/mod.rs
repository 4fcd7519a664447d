use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::PoseCoachError;

/// Raw detected coordinate. `x`/`y` share the unit space of the pose source
/// (frame pixels for the simulator); `confidence` lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PosePoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl PosePoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// The 33 body points a pose source emits, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl LandmarkKind {
    pub const COUNT: usize = 33;

    /// Positional mapping used to label the pose source output.
    pub const ALL: [LandmarkKind; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmark {
    pub kind: LandmarkKind,
    pub position: PosePoint,
}

/// Looks up a landmark by kind. Sources may emit partial bodies, so the index
/// is only a hint.
pub fn find_landmark(landmarks: &[PoseLandmark], kind: LandmarkKind) -> Option<&PosePoint> {
    match landmarks.get(kind.index()) {
        Some(landmark) if landmark.kind == kind => Some(&landmark.position),
        _ => landmarks
            .iter()
            .find(|landmark| landmark.kind == kind)
            .map(|landmark| &landmark.position),
    }
}

/// Exercise being performed; selects analyzer rules and the repetition detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Squat,
    Pushup,
    Plank,
    #[default]
    General,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 4] = [Self::Squat, Self::Pushup, Self::Plank, Self::General];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Squat => "squat",
            Self::Pushup => "pushup",
            Self::Plank => "plank",
            Self::General => "general",
        }
    }

    /// Metabolic equivalent used for the calorie estimate.
    pub fn met(self) -> f64 {
        match self {
            Self::Squat => 5.0,
            Self::Pushup => 3.8,
            Self::Plank => 3.5,
            Self::General => 3.0,
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = PoseCoachError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalised)
            .ok_or_else(|| PoseCoachError::UnsupportedExercise(value.to_string()))
    }
}

/// Per-frame analysis outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub landmarks: Vec<PoseLandmark>,
    pub confidence: f32,
    /// Milliseconds; wall clock for single frames, media offset for video samples.
    pub timestamp: u64,
    pub exercise_type: ExerciseKind,
    pub feedback: Vec<String>,
    pub score: u8,
}

/// Per-video aggregate. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetrics {
    pub repetitions: u32,
    pub form_score: u8,
    pub duration_seconds: u32,
    pub calories_burned: u32,
    pub feedback: Vec<String>,
}
