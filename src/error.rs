use thiserror::Error;

#[derive(Debug, Error)]
pub enum GazeError {
    /// A feature vector does not match the length the session was built for.
    /// Usually means the tracked-eye mode or resize resolution changed mid-session.
    #[error("feature length mismatch: expected {expected}, found {found}")]
    ConfigMismatch { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid eye patch: {width}x{height} needs {expected} bytes, got {found}")]
    InvalidPatch {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },

    #[error("ridge regression did not converge after {attempts} attempts (last ridge {ridge:e})")]
    DegenerateFit { attempts: usize, ridge: f64 },

    #[error("training worker is no longer running")]
    WorkerDisconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GazeError>;
