use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PoseCoachError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub pose: PoseSourceConfig,
    pub video: VideoConfig,
}

impl AppConfig {
    /// Parses a (possibly partial) JSON document. Missing fields keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.cache_capacity == 0 {
            return Err(PoseCoachError::msg("pipeline.cache_capacity must be at least 1"));
        }
        if self.pipeline.max_queue_depth == Some(0) {
            return Err(PoseCoachError::msg("pipeline.max_queue_depth must be at least 1"));
        }
        if self.video.max_samples == 0 {
            return Err(PoseCoachError::msg("video.max_samples must be at least 1"));
        }
        if self.video.body_weight_kg.is_nan() || self.video.body_weight_kg <= 0.0 {
            return Err(PoseCoachError::msg("video.body_weight_kg must be positive"));
        }
        Ok(())
    }
}

/// What the scheduler does with a request that arrives inside the throttle
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentionPolicy {
    /// Queue the request and serve it once the window has elapsed.
    #[default]
    Queue,
    /// Answer from the cache when possible, otherwise return no result.
    DropOnContention,
}

/// Settings for the cache and the frame scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache_capacity: usize,
    pub throttle_window_ms: u64,
    pub caching_enabled: bool,
    pub contention_policy: ContentionPolicy,
    pub max_queue_depth: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 50,
            throttle_window_ms: 100,
            caching_enabled: true,
            contention_policy: ContentionPolicy::Queue,
            max_queue_depth: None,
        }
    }
}

/// Settings for pose source selection and the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSourceConfig {
    /// Try the external engine before falling back to simulation.
    pub prefer_real: bool,
    pub simulation_seed: u64,
    pub frame_width: f32,
    pub frame_height: f32,
    pub engine: EngineConfig,
}

impl Default for PoseSourceConfig {
    fn default() -> Self {
        Self {
            prefer_real: true,
            simulation_seed: 42,
            frame_width: 640.0,
            frame_height: 480.0,
            engine: EngineConfig::default(),
        }
    }
}

/// Options handed to the external pose engine on initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model_path: String,
    pub num_poses: u32,
    pub min_detection_confidence: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: "models/pose_landmarker.task".to_string(),
            num_poses: 1,
            min_detection_confidence: 0.5,
        }
    }
}

/// Settings for whole-video aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub max_samples: usize,
    pub body_weight_kg: f64,
    pub fallback_seed: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_samples: 10,
            body_weight_kg: 70.0,
            fallback_seed: 7,
        }
    }
}
