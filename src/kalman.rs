use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};
use tracing::debug;

use crate::config::KalmanConfig;
use crate::types::ScreenPoint;

// =========================================================================
// Kalman Smoothing
// Constant-velocity model over (x, y, vx, vy); observes position only.
// =========================================================================

pub struct KalmanSmoother {
    f: Matrix4<f64>,
    q: Matrix4<f64>,
    h: Matrix2x4<f64>,
    r: Matrix2<f64>,
    x: Vector4<f64>,
    p: Matrix4<f64>,
    gain: Matrix4x2<f64>,
    initial_x: Vector4<f64>,
    initial_p: Matrix4<f64>,
}

impl KalmanSmoother {
    pub fn new(config: &KalmanConfig) -> Self {
        #[rustfmt::skip]
        let f = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        // Discrete white-noise acceleration, scaled by the frame interval
        #[rustfmt::skip]
        let q = Matrix4::new(
            0.25, 0.0,  0.5, 0.0,
            0.0,  0.25, 0.0, 0.5,
            0.5,  0.0,  1.0, 0.0,
            0.0,  0.5,  0.0, 1.0,
        ) * config.delta_t;

        #[rustfmt::skip]
        let h = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        let r = Matrix2::identity() * config.pixel_error;
        let initial_p = Matrix4::identity() * config.initial_covariance;
        let initial_x = Vector4::new(config.initial_x, config.initial_y, 0.0, 0.0);

        Self {
            f,
            q,
            h,
            r,
            x: initial_x,
            p: initial_p,
            gain: Matrix4x2::zeros(),
            initial_x,
            initial_p,
        }
    }

    /// Folds one raw prediction into the filter and returns the smoothed position.
    ///
    /// If the innovation covariance cannot be inverted the tick is skipped:
    /// the state is left untouched and `z` is returned as is.
    pub fn update(&mut self, z: ScreenPoint) -> ScreenPoint {
        let z_vec = Vector2::new(z.x, z.y);

        // Predict
        let x_p = self.f * self.x;
        let p_p = self.f * self.p * self.f.transpose() + self.q;

        // Innovation
        let residual = z_vec - self.h * x_p;
        let s = self.h * p_p * self.h.transpose() + self.r;

        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => {
                debug!("innovation covariance not invertible, passing observation through");
                return z;
            }
        };

        // Gain and correction
        let k = p_p * self.h.transpose() * s_inv;
        self.x = x_p + k * residual;
        self.p = (Matrix4::identity() - k * self.h) * p_p;
        self.gain = k;

        self.position()
    }

    pub fn position(&self) -> ScreenPoint {
        let pos = self.h * self.x;
        ScreenPoint::new(pos[0], pos[1])
    }

    pub fn state(&self) -> &Vector4<f64> {
        &self.x
    }

    /// Gain from the most recent successful update (zero before the first).
    pub fn gain(&self) -> &Matrix4x2<f64> {
        &self.gain
    }

    pub fn reset(&mut self) {
        self.x = self.initial_x;
        self.p = self.initial_p;
        self.gain = Matrix4x2::zeros();
    }
}
