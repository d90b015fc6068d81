use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{GazeError, Result};

/// A point in screen pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &ScreenPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Where a sample's label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Ground truth: the user clicked here while looking at it.
    Click,
    /// Assumed label from ordinary cursor movement.
    #[serde(alias = "move")]
    Trail,
}

/// A located eye image, RGBA at its native resolution.
#[derive(Debug, Clone)]
pub struct EyePatch {
    pub image: RgbaImage,
}

impl EyePatch {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Builds a patch from a raw RGBA buffer (4 bytes per pixel, row-major).
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let found = data.len();
        if width == 0 || height == 0 || found != expected {
            return Err(GazeError::InvalidPatch { width, height, expected, found });
        }
        RgbaImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or(GazeError::InvalidPatch { width, height, expected, found })
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Eye patches as delivered by the detector; either may be missing.
#[derive(Debug, Clone, Default)]
pub struct EyePatches {
    pub left: Option<EyePatch>,
    pub right: Option<EyePatch>,
}

impl EyePatches {
    pub fn both(left: EyePatch, right: EyePatch) -> Self {
        Self { left: Some(left), right: Some(right) }
    }
}

/// A click or move event from the ingestion side.
#[derive(Debug, Clone)]
pub struct GazeEvent {
    pub kind: SampleKind,
    pub screen: ScreenPoint,
    pub eyes: Option<EyePatches>,
}

impl GazeEvent {
    pub fn click(screen: ScreenPoint, eyes: EyePatches) -> Self {
        Self { kind: SampleKind::Click, screen, eyes: Some(eyes) }
    }

    pub fn movement(screen: ScreenPoint, eyes: EyePatches) -> Self {
        Self { kind: SampleKind::Trail, screen, eyes: Some(eyes) }
    }
}

/// One labeled training sample. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: ScreenPoint,
    pub kind: SampleKind,
}

impl Sample {
    pub fn new(features: Vec<f64>, label: ScreenPoint, kind: SampleKind) -> Self {
        Self { features, label, kind }
    }
}

/// Model output before and after temporal smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePrediction {
    pub raw: ScreenPoint,
    pub smoothed: ScreenPoint,
}
