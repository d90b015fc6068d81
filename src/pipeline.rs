use std::time::Duration;

use crate::config::{EstimatorConfig, Viewport};
use crate::error::Result;
use crate::kalman::KalmanSmoother;
use crate::types::{EyePatches, GazeEvent, GazePrediction, Sample, ScreenPoint};

/// Common surface of the gaze regressors.
pub trait GazeRegressor {
    fn name(&self) -> String;

    /// Records a click or move event. Returns `Ok(false)` when the event was
    /// dropped because the tracked eye data is missing.
    fn add_event(&mut self, event: &GazeEvent) -> Result<bool>;

    /// Bulk-loads samples from an earlier session, in order.
    fn add_samples(&mut self, samples: &[Sample]) -> Result<()>;

    /// Surviving stored samples, clicks then trail.
    fn samples(&self) -> Result<Vec<Sample>>;

    /// Fits on everything added so far before returning, waiting at most
    /// `timeout` when training happens elsewhere. Returns whether a model
    /// is available afterwards.
    fn train_now(&mut self, timeout: Duration) -> Result<bool>;

    /// `Ok(None)` until a model exists, or when the tracked eyes are missing.
    fn predict(&mut self, eyes: &EyePatches) -> Result<Option<GazePrediction>>;

    /// Restarts the smoother from its initial state. Call after tracking was
    /// lost so the filter does not glide in from the last known position.
    fn reset_smoothing(&mut self);
}

/// Post-processing of raw model output: Kalman smoothing, then viewport clamp.
pub struct OutputStage {
    kalman: Option<KalmanSmoother>,
    viewport: Option<Viewport>,
}

impl OutputStage {
    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self {
            kalman: config.kalman.enabled.then(|| KalmanSmoother::new(&config.kalman)),
            viewport: config.viewport,
        }
    }

    pub fn apply(&mut self, raw: ScreenPoint) -> GazePrediction {
        let smoothed = match self.kalman.as_mut() {
            Some(kf) => kf.update(raw),
            None => raw,
        };
        let smoothed = match &self.viewport {
            Some(vp) => bound(smoothed, vp),
            None => smoothed,
        };
        GazePrediction { raw, smoothed }
    }

    pub fn reset(&mut self) {
        if let Some(kf) = self.kalman.as_mut() {
            kf.reset();
        }
    }
}

/// Clamps a point into `[0, width] x [0, height]`.
pub fn bound(point: ScreenPoint, viewport: &Viewport) -> ScreenPoint {
    ScreenPoint::new(
        point.x.clamp(0.0, viewport.width),
        point.y.clamp(0.0, viewport.height),
    )
}
