pub mod config;
pub mod error;
pub mod estimator;
pub mod features;
pub mod kalman;
pub mod pipeline;
pub mod regression;
pub mod ring_buffer;
pub mod sample_store;
pub mod scheduler;
pub mod types;

pub use config::{EstimatorConfig, KalmanConfig, TrackedEye, Viewport};
pub use error::{GazeError, Result};
pub use estimator::{GazeEstimator, InlineEstimator};
pub use pipeline::GazeRegressor;
pub use types::{EyePatch, EyePatches, GazeEvent, GazePrediction, Sample, SampleKind, ScreenPoint};
