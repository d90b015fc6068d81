use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{GazeError, Result};

/// Which eye patches feed the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedEye {
    Left,
    Right,
    Both,
}

impl TrackedEye {
    pub fn eye_count(&self) -> usize {
        match self {
            TrackedEye::Both => 2,
            _ => 1,
        }
    }
}

/// Session configuration. Fixed for the lifetime of a session; changing it
/// means building a new session (see `GazeEstimator::reconfigure`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub track_eye: TrackedEye,
    pub click_capacity: usize,
    pub trail_capacity: usize,
    pub resize_width: u32,
    pub resize_height: u32,
    pub equalize_stride: usize,
    pub train_interval_ms: u64,
    pub ridge_parameter: f64,
    pub max_ridge_retries: usize,
    pub kalman: KalmanConfig,
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub enabled: bool,
    /// Time between frames, scales the process noise
    pub delta_t: f64,
    /// Expected measurement error in pixels
    pub pixel_error: f64,
    pub initial_covariance: f64,
    pub initial_x: f64,
    pub initial_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            track_eye: TrackedEye::Both,
            click_capacity: 700,
            trail_capacity: 10,
            resize_width: 10,
            resize_height: 6,
            equalize_stride: 5,
            train_interval_ms: 500,
            ridge_parameter: 1e-5,
            max_ridge_retries: 8,
            kalman: KalmanConfig::default(),
            viewport: None,
        }
    }
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delta_t: 0.1,
            pixel_error: 47.0,
            initial_covariance: 1e-4,
            initial_x: 500.0,
            initial_y: 500.0,
        }
    }
}

impl EstimatorConfig {
    pub const DEFAULT_PATH: &'static str = "gaze_config.json";

    /// Loads a config file. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            // Missing fields fall back to Default via #[serde(default)]
            let config: EstimatorConfig = serde_json::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!("Configuration file {} not found, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Length of the feature vector this configuration produces.
    pub fn feature_len(&self) -> usize {
        self.resize_width as usize * self.resize_height as usize * self.track_eye.eye_count()
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| -> Result<()> { Err(GazeError::InvalidConfig(msg.to_string())) };

        if self.click_capacity == 0 || self.trail_capacity == 0 {
            return fail("buffer capacities must be non-zero");
        }
        if self.resize_width == 0 || self.resize_height == 0 {
            return fail("resize resolution must be non-zero");
        }
        if self.equalize_stride == 0 {
            return fail("equalize_stride must be non-zero");
        }
        if self.train_interval_ms == 0 {
            return fail("train_interval_ms must be non-zero");
        }
        if !(self.ridge_parameter > 0.0 && self.ridge_parameter.is_finite()) {
            return fail("ridge_parameter must be positive");
        }
        let k = &self.kalman;
        if !(k.delta_t > 0.0 && k.pixel_error > 0.0 && k.initial_covariance > 0.0) {
            return fail("kalman noise parameters must be positive");
        }
        if let Some(vp) = &self.viewport {
            if !(vp.width > 0.0 && vp.height > 0.0) {
                return fail("viewport dimensions must be positive");
            }
        }
        Ok(())
    }
}
