/// Result alias that carries the custom [`PoseCoachError`] type.
pub type Result<T> = std::result::Result<T, PoseCoachError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PoseCoachError {
    /// The external pose engine could not be reached or loaded.
    #[error("pose engine unavailable: {0}")]
    EngineUnavailable(String),
    /// A frame was dispatched but the pose source failed while processing it.
    #[error("analysis of frame `{frame}` failed: {reason}")]
    FrameAnalysis { frame: String, reason: String },
    /// The scheduler queue reached its configured depth.
    #[error("frame queue is full ({depth} pending requests)")]
    QueueFull { depth: usize },
    /// The drain task stopped before the request completed.
    #[error("frame scheduler has shut down")]
    SchedulerClosed,
    /// The scheduler was built outside a Tokio runtime.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
    #[error("unsupported exercise type `{0}`")]
    UnsupportedExercise(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl PoseCoachError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

/// Failure reported by the external pose engine or the frame decoder feeding it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }
}

/// Outcome of a single [`crate::PoseSource::detect`] call that did not yield
/// landmarks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    /// The frame was readable but contained no body.
    #[error("no pose detected")]
    NoPoseDetected,
    #[error("invalid frame reference `{0}`")]
    InvalidFrameReference(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl DetectionError {
    /// Returns `true` for the outcomes callers treat as an empty result rather
    /// than a failure.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::NoPoseDetected | Self::InvalidFrameReference(_))
    }
}
