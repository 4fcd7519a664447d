use crate::{find_landmark, pose::unit_confidence, ExerciseKind, LandmarkKind, PoseLandmark};

const GENERAL_FORM_MULTIPLIER: f32 = 1.0;
const EXERCISE_FORM_MULTIPLIER: f32 = 0.9;

const SQUAT_KNEE_LEVEL_TOLERANCE: f32 = 20.0;
const SQUAT_MIN_HIP_KNEE_DISTANCE: f32 = 50.0;
const PUSHUP_SHOULDER_LEVEL_TOLERANCE: f32 = 15.0;
const PUSHUP_ELBOW_FLARE_TOLERANCE: f32 = 30.0;
const PLANK_BODY_LINE_TOLERANCE: f32 = 40.0;

pub const SQUAT_KNEE_ALIGNMENT: &str = "Keep your knees aligned and level";
pub const SQUAT_DEPTH: &str = "Lower your hips further to reach proper squat depth";
pub const SQUAT_GOOD_FORM: &str = "Good squat form, keep your chest up";
pub const PUSHUP_BODY_ALIGNMENT: &str = "Keep your shoulders level and your body straight";
pub const PUSHUP_ELBOW_FLARE: &str = "Keep your elbows closer to your body";
pub const PUSHUP_GOOD_FORM: &str = "Good push-up form, keep your core tight";
pub const PLANK_BODY_LINE: &str = "Keep your body in a straight line from shoulders to hips";
pub const PLANK_GOOD_FORM: &str = "Great plank position, hold steady";
pub const GENERAL_POSTURE: &str = "Maintain good posture throughout the movement";
pub const GENERAL_CONTROL: &str = "Keep your movements slow and controlled";

/// Feedback and score for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAssessment {
    pub feedback: Vec<String>,
    /// 0..=100.
    pub score: u8,
    /// Mean landmark confidence, 0..=1.
    pub confidence: f32,
}

/// Stateless rule set turning landmarks into feedback and a form score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExerciseAnalyzer;

impl ExerciseAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, landmarks: &[PoseLandmark], exercise: ExerciseKind) -> FrameAssessment {
        let confidence = mean_confidence(landmarks);
        FrameAssessment {
            feedback: self.feedback(landmarks, exercise),
            score: form_score(confidence, exercise),
            confidence,
        }
    }

    /// Rule output for the exercise. Rules whose landmarks are missing are
    /// skipped.
    pub fn feedback(&self, landmarks: &[PoseLandmark], exercise: ExerciseKind) -> Vec<String> {
        let lines: Vec<&str> = match exercise {
            ExerciseKind::Squat => squat_feedback(landmarks),
            ExerciseKind::Pushup => pushup_feedback(landmarks),
            ExerciseKind::Plank => plank_feedback(landmarks),
            ExerciseKind::General => vec![GENERAL_POSTURE, GENERAL_CONTROL],
        };
        lines.into_iter().map(str::to_string).collect()
    }
}

fn squat_feedback(landmarks: &[PoseLandmark]) -> Vec<&'static str> {
    let y = |kind| find_landmark(landmarks, kind).map(|point| point.y);
    let mut feedback = Vec::new();

    if let (Some(left), Some(right)) = (y(LandmarkKind::LeftKnee), y(LandmarkKind::RightKnee)) {
        if (left - right).abs() > SQUAT_KNEE_LEVEL_TOLERANCE {
            feedback.push(SQUAT_KNEE_ALIGNMENT);
        }
    }

    if let (Some(hip), Some(knee)) = (y(LandmarkKind::LeftHip), y(LandmarkKind::LeftKnee)) {
        if (hip - knee).abs() < SQUAT_MIN_HIP_KNEE_DISTANCE {
            feedback.push(SQUAT_DEPTH);
        }
    }

    if feedback.is_empty() {
        feedback.push(SQUAT_GOOD_FORM);
    }
    feedback
}

fn pushup_feedback(landmarks: &[PoseLandmark]) -> Vec<&'static str> {
    let y = |kind| find_landmark(landmarks, kind).map(|point| point.y);
    let mut feedback = Vec::new();

    let shoulders = (y(LandmarkKind::LeftShoulder), y(LandmarkKind::RightShoulder));
    if let (Some(left), Some(right)) = shoulders {
        if (left - right).abs() > PUSHUP_SHOULDER_LEVEL_TOLERANCE {
            feedback.push(PUSHUP_BODY_ALIGNMENT);
        }
    }

    let elbows = (y(LandmarkKind::LeftElbow), y(LandmarkKind::RightElbow));
    if let ((Some(ls), Some(rs)), (Some(le), Some(re))) = (shoulders, elbows) {
        if (midpoint(le, re) - midpoint(ls, rs)).abs() > PUSHUP_ELBOW_FLARE_TOLERANCE {
            feedback.push(PUSHUP_ELBOW_FLARE);
        }
    }

    if feedback.is_empty() {
        feedback.push(PUSHUP_GOOD_FORM);
    }
    feedback
}

fn plank_feedback(landmarks: &[PoseLandmark]) -> Vec<&'static str> {
    let y = |kind| find_landmark(landmarks, kind).map(|point| point.y);

    let shoulders = (y(LandmarkKind::LeftShoulder), y(LandmarkKind::RightShoulder));
    let hips = (y(LandmarkKind::LeftHip), y(LandmarkKind::RightHip));

    match (shoulders, hips) {
        ((Some(ls), Some(rs)), (Some(lh), Some(rh)))
            if (midpoint(ls, rs) - midpoint(lh, rh)).abs() > PLANK_BODY_LINE_TOLERANCE =>
        {
            vec![PLANK_BODY_LINE]
        }
        _ => vec![PLANK_GOOD_FORM],
    }
}

fn midpoint(a: f32, b: f32) -> f32 {
    (a + b) * 0.5
}

fn mean_confidence(landmarks: &[PoseLandmark]) -> f32 {
    if landmarks.is_empty() {
        return 0.0;
    }
    let sum: f32 = landmarks
        .iter()
        .map(|l| unit_confidence(l.position.confidence))
        .sum();
    unit_confidence(sum / landmarks.len() as f32)
}

fn form_score(confidence: f32, exercise: ExerciseKind) -> u8 {
    let multiplier = match exercise {
        ExerciseKind::General => GENERAL_FORM_MULTIPLIER,
        ExerciseKind::Squat | ExerciseKind::Pushup | ExerciseKind::Plank => {
            EXERCISE_FORM_MULTIPLIER
        }
    };
    (confidence * multiplier * 100.0).round().clamp(0.0, 100.0) as u8
}
