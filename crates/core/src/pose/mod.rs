//! Pose sources: the external landmark engine and the deterministic simulator
//! used when that engine is unavailable.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    DetectionError, EngineConfig, EngineError, LandmarkKind, PoseCoachError, PoseLandmark,
    PosePoint, PoseSourceConfig,
};

/// Image handed to the pose engine after a frame reference has been decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 pixels.
    pub pixels: Vec<u8>,
}

/// Raw engine output: one landmark list per detected body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutput {
    pub landmarks: Vec<Vec<PosePoint>>,
    pub world_landmarks: Vec<Vec<PosePoint>>,
}

/// Turns a frame reference into pixels. Implemented by the host application.
pub trait FrameDecoder: Send {
    fn decode(&self, frame_uri: &str) -> Result<DecodedImage, EngineError>;
}

/// External landmark detection engine. Not safe for concurrent use; the
/// scheduler guarantees a single caller at a time.
pub trait PoseEngine: Send {
    fn initialize(&mut self, config: &EngineConfig) -> Result<(), EngineError>;

    fn detect_for_frame(
        &mut self,
        image: &DecodedImage,
        timestamp_ms: u64,
    ) -> Result<DetectionOutput, EngineError>;
}

/// Decoder and engine pair backing the real pose source.
pub struct PoseBackend {
    pub decoder: Box<dyn FrameDecoder>,
    pub engine: Box<dyn PoseEngine>,
}

impl PoseBackend {
    pub fn new(decoder: impl FrameDecoder + 'static, engine: impl PoseEngine + 'static) -> Self {
        Self {
            decoder: Box::new(decoder),
            engine: Box::new(engine),
        }
    }
}

impl fmt::Debug for PoseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseBackend").finish_non_exhaustive()
    }
}

/// Which variant was selected at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PoseMode {
    Real,
    /// `degraded` is set when the real engine was wanted but could not be used.
    Simulated { degraded: bool },
}

impl PoseMode {
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Simulated { degraded: true })
    }
}

/// Landmark producer for a single frame.
#[derive(Debug)]
pub enum PoseSource {
    Real(RealPoseSource),
    Simulated(SimulatedPoseSource),
}

impl PoseSource {
    /// Selects the variant used for the lifetime of the service. The real engine
    /// is tried first; any failure falls back to simulation.
    pub fn initialize(config: &PoseSourceConfig, backend: Option<PoseBackend>) -> (Self, PoseMode) {
        if !config.prefer_real {
            tracing::info!("pose source running in simulation mode");
            return (
                Self::Simulated(SimulatedPoseSource::from_config(config)),
                PoseMode::Simulated { degraded: false },
            );
        }

        match RealPoseSource::initialize(&config.engine, backend) {
            Ok(real) => {
                tracing::info!(model = %config.engine.model_path, "pose engine initialized");
                (Self::Real(real), PoseMode::Real)
            }
            Err(err) => {
                tracing::warn!(error = %err, "falling back to simulated pose source");
                (
                    Self::Simulated(SimulatedPoseSource::from_config(config)),
                    PoseMode::Simulated { degraded: true },
                )
            }
        }
    }

    pub fn simulated(config: &PoseSourceConfig) -> Self {
        Self::Simulated(SimulatedPoseSource::from_config(config))
    }

    pub fn detect(
        &mut self,
        frame_identity: &str,
        timestamp_ms: u64,
    ) -> Result<Vec<PoseLandmark>, DetectionError> {
        if frame_identity.trim().is_empty() {
            return Err(DetectionError::InvalidFrameReference(frame_identity.to_string()));
        }

        match self {
            Self::Real(real) => real.detect(frame_identity, timestamp_ms),
            Self::Simulated(simulated) => Ok(simulated.detect(frame_identity)),
        }
    }
}

/// Pose source backed by the external engine.
#[derive(Debug)]
pub struct RealPoseSource {
    backend: PoseBackend,
}

impl RealPoseSource {
    pub fn initialize(
        config: &EngineConfig,
        backend: Option<PoseBackend>,
    ) -> crate::Result<Self> {
        let mut backend = backend
            .ok_or_else(|| PoseCoachError::EngineUnavailable("no pose engine configured".into()))?;
        backend
            .engine
            .initialize(config)
            .map_err(|err| PoseCoachError::EngineUnavailable(err.to_string()))?;
        Ok(Self { backend })
    }

    fn detect(
        &mut self,
        frame_identity: &str,
        timestamp_ms: u64,
    ) -> Result<Vec<PoseLandmark>, DetectionError> {
        let image = self.backend.decoder.decode(frame_identity)?;
        let output = self.backend.engine.detect_for_frame(&image, timestamp_ms)?;

        let body = output
            .landmarks
            .into_iter()
            .next()
            .filter(|points| !points.is_empty())
            .ok_or(DetectionError::NoPoseDetected)?;

        Ok(label_points(body))
    }
}

/// Attaches landmark kinds to positional engine output, clamping confidence
/// into [0, 1]. Non-finite confidences count as 0.
fn label_points(points: Vec<PosePoint>) -> Vec<PoseLandmark> {
    points
        .into_iter()
        .zip(LandmarkKind::ALL)
        .map(|(point, kind)| PoseLandmark {
            kind,
            position: PosePoint {
                confidence: unit_confidence(point.confidence),
                ..point
            },
        })
        .collect()
}

pub(crate) fn unit_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

const REFERENCE_WIDTH: f32 = 640.0;
const REFERENCE_HEIGHT: f32 = 480.0;
const MAX_JITTER: f32 = 6.0;
const MAX_TILT: f32 = 18.0;
const MIN_CONFIDENCE: f32 = 0.7;

/// Standing skeleton in a 640x480 reference frame: (x, y, how far the point
/// sinks at the bottom of a dip).
const BASE_SKELETON: [(f32, f32, f32); LandmarkKind::COUNT] = [
    (320.0, 80.0, 50.0),  // nose
    (312.0, 72.0, 50.0),  // left eye inner
    (306.0, 72.0, 50.0),  // left eye
    (300.0, 72.0, 50.0),  // left eye outer
    (328.0, 72.0, 50.0),  // right eye inner
    (334.0, 72.0, 50.0),  // right eye
    (340.0, 72.0, 50.0),  // right eye outer
    (292.0, 78.0, 50.0),  // left ear
    (348.0, 78.0, 50.0),  // right ear
    (312.0, 92.0, 50.0),  // mouth left
    (328.0, 92.0, 50.0),  // mouth right
    (280.0, 140.0, 50.0), // left shoulder
    (360.0, 140.0, 50.0), // right shoulder
    (265.0, 200.0, 10.0), // left elbow
    (375.0, 200.0, 10.0), // right elbow
    (260.0, 250.0, 10.0), // left wrist
    (380.0, 250.0, 10.0), // right wrist
    (258.0, 262.0, 10.0), // left pinky
    (382.0, 262.0, 10.0), // right pinky
    (262.0, 265.0, 10.0), // left index
    (378.0, 265.0, 10.0), // right index
    (266.0, 258.0, 10.0), // left thumb
    (374.0, 258.0, 10.0), // right thumb
    (295.0, 240.0, 50.0), // left hip
    (345.0, 240.0, 50.0), // right hip
    (293.0, 340.0, 0.0),  // left knee
    (347.0, 340.0, 0.0),  // right knee
    (292.0, 432.0, 0.0),  // left ankle
    (348.0, 432.0, 0.0),  // right ankle
    (288.0, 445.0, 0.0),  // left heel
    (352.0, 445.0, 0.0),  // right heel
    (302.0, 450.0, 0.0),  // left foot index
    (338.0, 450.0, 0.0),  // right foot index
];

/// Deterministic landmark generator. Output depends only on the seed and the
/// frame identity, so recomputing a frame always yields the same pose.
#[derive(Debug, Clone)]
pub struct SimulatedPoseSource {
    seed: u64,
    scale_x: f32,
    scale_y: f32,
}

impl SimulatedPoseSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn from_config(config: &PoseSourceConfig) -> Self {
        Self {
            seed: config.simulation_seed,
            scale_x: config.frame_width / REFERENCE_WIDTH,
            scale_y: config.frame_height / REFERENCE_HEIGHT,
        }
    }

    pub fn detect(&self, frame_identity: &str) -> Vec<PoseLandmark> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ stable_hash(frame_identity));
        let dip: f32 = rng.gen_range(0.0..=1.0);
        let tilt: f32 = rng.gen_range(-MAX_TILT..=MAX_TILT);

        LandmarkKind::ALL
            .iter()
            .zip(BASE_SKELETON)
            .map(|(&kind, (x, y, sink))| {
                let side = match side_of(kind) {
                    Side::Left => 0.5,
                    Side::Right => -0.5,
                    Side::Centre => 0.0,
                };
                let jitter_x: f32 = rng.gen_range(-MAX_JITTER..=MAX_JITTER);
                let jitter_y: f32 = rng.gen_range(-MAX_JITTER..=MAX_JITTER);
                let confidence: f32 = rng.gen_range(MIN_CONFIDENCE..=1.0);

                PoseLandmark {
                    kind,
                    position: PosePoint {
                        x: (x + jitter_x) * self.scale_x,
                        y: (y + sink * dip + tilt * side + jitter_y) * self.scale_y,
                        confidence,
                    },
                }
            })
            .collect()
    }
}

enum Side {
    Left,
    Right,
    Centre,
}

fn side_of(kind: LandmarkKind) -> Side {
    match kind.index() {
        0 | 9 | 10 => Side::Centre,
        1..=3 | 7 => Side::Left,
        4..=6 | 8 => Side::Right,
        index if index % 2 == 1 => Side::Left,
        _ => Side::Right,
    }
}

/// FNV-1a, stable across runs and platforms.
pub(crate) fn stable_hash(value: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    value
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}
