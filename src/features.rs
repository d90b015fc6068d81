use image::{imageops::FilterType, RgbaImage};

use crate::config::{EstimatorConfig, TrackedEye};
use crate::types::{EyePatch, EyePatches};

// =========================================================================
// Feature Extraction
// Eye patch -> resize -> grayscale -> histogram equalization -> flat vector
// =========================================================================

/// Turns eye patches into fixed-length feature vectors.
///
/// The output length depends only on the configuration, so every vector from
/// one extractor is comparable with every other. Regression coefficients are
/// sized to that length.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    track_eye: TrackedEye,
    width: u32,
    height: u32,
    stride: usize,
}

impl FeatureExtractor {
    pub fn new(track_eye: TrackedEye, width: u32, height: u32, stride: usize) -> Self {
        Self {
            track_eye,
            width,
            height,
            stride: stride.max(1),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(
            config.track_eye,
            config.resize_width,
            config.resize_height,
            config.equalize_stride,
        )
    }

    pub fn feature_len(&self) -> usize {
        self.width as usize * self.height as usize * self.track_eye.eye_count()
    }

    /// Returns `None` when a tracked eye is missing from `eyes`.
    pub fn extract(&self, eyes: &EyePatches) -> Option<Vec<f64>> {
        match self.track_eye {
            TrackedEye::Left => eyes.left.as_ref().map(|p| self.process_patch(p)),
            TrackedEye::Right => eyes.right.as_ref().map(|p| self.process_patch(p)),
            TrackedEye::Both => {
                let (left, right) = (eyes.left.as_ref()?, eyes.right.as_ref()?);
                let mut feats = self.process_patch(left);
                feats.extend(self.process_patch(right));
                Some(feats)
            }
        }
    }

    pub fn process_patch(&self, patch: &EyePatch) -> Vec<f64> {
        let resized = image::imageops::resize(&patch.image, self.width, self.height, FilterType::Triangle);
        let gray = grayscale(&resized);
        equalize_histogram(&gray, self.stride)
    }
}

/// Luma (0.299R + 0.587G + 0.114B) per pixel, row-major. Alpha is ignored.
pub fn grayscale(image: &RgbaImage) -> Vec<u8> {
    image
        .pixels()
        .map(|px| {
            let luma = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
            luma.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Cumulative-histogram lookup table, sampling every `stride`-th pixel.
///
/// Entries are scaled by `255 * stride / N` and clamped to 255, since the
/// sampled count can overshoot `N / stride` by one when N is not a multiple of
/// the stride.
pub fn equalization_lut(src: &[u8], stride: usize) -> [f64; 256] {
    let mut lut = [0.0; 256];
    if src.is_empty() {
        return lut;
    }
    let stride = stride.max(1);

    let mut hist = [0usize; 256];
    for &v in src.iter().step_by(stride) {
        hist[v as usize] += 1;
    }

    let norm = (255 * stride) as f64 / src.len() as f64;
    let mut cumulative = 0usize;
    for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *entry = (cumulative as f64 * norm).min(255.0);
    }
    lut
}

pub fn equalize_histogram(src: &[u8], stride: usize) -> Vec<f64> {
    let lut = equalization_lut(src, stride);
    src.iter().map(|&v| lut[v as usize]).collect()
}
