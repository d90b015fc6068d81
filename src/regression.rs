use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EstimatorConfig;
use crate::error::{GazeError, Result};
use crate::sample_store::TrainingBatch;
use crate::types::ScreenPoint;

/// Result of one ridge solve.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    pub coefficients: Vec<f64>,
    /// Ridge parameter that produced a solvable system
    pub ridge: f64,
    pub attempts: usize,
}

/// Ridge regression on the normal equations: `(XᵀX + kI) w = Xᵀy`.
///
/// Tries an LU solve first and falls back to QR. When both fail (singular or
/// non-finite), `k` is multiplied by 10 and the system is rebuilt, at most
/// `max_retries` times. Exhausting the retries is reported as
/// [`GazeError::DegenerateFit`] so the caller can keep its previous model.
pub fn ridge(y: &DVector<f64>, x: &DMatrix<f64>, k: f64, max_retries: usize) -> Result<RidgeFit> {
    NormalEquations::new(x).solve(y, k, max_retries)
}

/// `Xᵀ` and `XᵀX` of one design matrix, shared by every target solved against it.
pub struct NormalEquations {
    xt: DMatrix<f64>,
    gram: DMatrix<f64>,
}

impl NormalEquations {
    pub fn new(x: &DMatrix<f64>) -> Self {
        let xt = x.transpose();
        let gram = &xt * x;
        Self { xt, gram }
    }

    /// See [`ridge`].
    pub fn solve(&self, y: &DVector<f64>, k: f64, max_retries: usize) -> Result<RidgeFit> {
        if self.xt.ncols() != y.len() {
            return Err(GazeError::ConfigMismatch { expected: self.xt.ncols(), found: y.len() });
        }
        let b = &self.xt * y;

        let max_attempts = max_retries + 1;
        let mut k = k;
        for attempt in 1..=max_attempts {
            let mut s = self.gram.clone();
            for i in 0..s.nrows() {
                s[(i, i)] += k;
            }

            if let Some(solution) = solve_square(s, &b) {
                if attempt > 1 {
                    debug!("ridge solve succeeded after {} attempts (k = {:e})", attempt, k);
                }
                return Ok(RidgeFit {
                    coefficients: solution.iter().copied().collect(),
                    ridge: k,
                    attempts: attempt,
                });
            }

            debug!("ridge system not solvable with k = {:e}, escalating", k);
            if attempt < max_attempts {
                k *= 10.0;
            }
        }

        Err(GazeError::DegenerateFit { attempts: max_attempts, ridge: k })
    }
}

fn solve_square(s: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let finite = |v: &DVector<f64>| v.iter().all(|c| c.is_finite());

    if let Some(solution) = s.clone().lu().solve(b) {
        if finite(&solution) {
            return Some(solution);
        }
    }
    s.qr().solve(b).filter(finite)
}

/// A fitted screen-X / screen-Y model. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub coeff_x: Vec<f64>,
    pub coeff_y: Vec<f64>,
    pub ridge_x: f64,
    pub ridge_y: f64,
    pub sample_count: usize,
}

impl RegressionModel {
    pub fn feature_len(&self) -> usize {
        self.coeff_x.len()
    }

    pub fn predict(&self, features: &[f64]) -> Result<ScreenPoint> {
        if features.len() != self.feature_len() {
            return Err(GazeError::ConfigMismatch {
                expected: self.feature_len(),
                found: features.len(),
            });
        }
        let dot = |coeffs: &[f64]| coeffs.iter().zip(features).map(|(c, f)| c * f).sum::<f64>();
        Ok(ScreenPoint::new(dot(&self.coeff_x), dot(&self.coeff_y)))
    }
}

/// Fits a [`RegressionModel`] from a batch of click and trail samples.
#[derive(Debug, Clone)]
pub struct RegressionTrainer {
    pub ridge_parameter: f64,
    pub max_retries: usize,
}

impl RegressionTrainer {
    pub fn new(ridge_parameter: f64, max_retries: usize) -> Self {
        Self { ridge_parameter, max_retries }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(config.ridge_parameter, config.max_ridge_retries)
    }

    /// Returns `Ok(None)` when there is nothing to fit: no click samples yet.
    /// Trail labels are only assumed, so they never train a model on their own.
    pub fn train(&self, batch: &TrainingBatch) -> Result<Option<RegressionModel>> {
        if batch.click_count == 0 || batch.is_empty() {
            return Ok(None);
        }

        let normal = NormalEquations::new(&design_matrix(&batch.features)?);
        let fit_x = normal.solve(&DVector::from_column_slice(&batch.screen_x), self.ridge_parameter, self.max_retries);
        let fit_y = normal.solve(&DVector::from_column_slice(&batch.screen_y), self.ridge_parameter, self.max_retries);

        let (fit_x, fit_y) = match (fit_x, fit_y) {
            (Ok(fx), Ok(fy)) => (fx, fy),
            (Err(e), _) | (_, Err(e)) => {
                warn!("regression fit failed over {} samples: {}", batch.len(), e);
                return Err(e);
            }
        };

        debug!(
            "fitted model over {} samples ({} clicks), k = ({:e}, {:e})",
            batch.len(),
            batch.click_count,
            fit_x.ridge,
            fit_y.ridge
        );

        Ok(Some(RegressionModel {
            coeff_x: fit_x.coefficients,
            coeff_y: fit_y.coefficients,
            ridge_x: fit_x.ridge,
            ridge_y: fit_y.ridge,
            sample_count: batch.len(),
        }))
    }
}

/// Rows are samples. Ragged rows mean a configuration change leaked into the
/// batch and are refused rather than padded.
fn design_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
        return Err(GazeError::ConfigMismatch { expected: cols, found: bad.len() });
    }
    Ok(DMatrix::from_fn(rows.len(), cols, |r, c| rows[r][c]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_system(n: usize) -> (DMatrix<f64>, Vec<f64>) {
        let x = DMatrix::from_fn(n, 3, |r, c| match c {
            0 => 1.0,
            1 => (r as f64 * 0.37).sin(),
            _ => (r as f64 * 0.91).cos(),
        });
        (x, vec![3.0, -2.0, 0.5])
    }

    #[test]
    fn test_recovers_true_weights() {
        let (x, w_true) = synthetic_system(25);
        let y = &x * DVector::from_vec(w_true.clone());

        let fit = ridge(&y, &x, 1e-12, 8).unwrap();
        assert_eq!(fit.attempts, 1);
        for (w, t) in fit.coefficients.iter().zip(&w_true) {
            assert!((w - t).abs() < 1e-6, "coefficient {} vs {}", w, t);
        }
    }

    #[test]
    fn test_finite_for_any_positive_ridge() {
        let (x, w_true) = synthetic_system(10);
        let y = &x * DVector::from_vec(w_true);
        for k in [1e-5, 1e-1, 1.0, 1e3, 1e6] {
            let fit = ridge(&y, &x, k, 8).unwrap();
            assert!(fit.coefficients.iter().all(|c| c.is_finite()), "k = {}", k);
        }
    }

    #[test]
    fn test_rank_deficient_terminates_finite() {
        // Two identical columns and fewer rows than columns
        let x = DMatrix::from_row_slice(2, 4, &[
            1.0, 1.0, 2.0, 0.0,
            3.0, 3.0, 1.0, 0.0,
        ]);
        let y = DVector::from_vec(vec![10.0, 20.0]);

        let fit = ridge(&y, &x, 1e-5, 8).unwrap();
        assert!(fit.attempts <= 9);
        assert!(fit.coefficients.iter().all(|c| c.is_finite()));
        let pred = &x * DVector::from_vec(fit.coefficients);
        assert!((pred[0] - 10.0).abs() < 1e-2);
        assert!((pred[1] - 20.0).abs() < 1e-2);
    }

    #[test]
    fn test_unsolvable_system_is_bounded() {
        let x = DMatrix::from_row_slice(2, 2, &[f64::NAN, 1.0, 2.0, 3.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);

        match ridge(&y, &x, 1e-5, 4) {
            Err(GazeError::DegenerateFit { attempts, ridge }) => {
                assert_eq!(attempts, 5);
                assert!((ridge - 1e-1).abs() < 1e-12);
            }
            other => panic!("expected DegenerateFit, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_normal_equations_match_separate_solves() {
        let (x, w_true) = synthetic_system(12);
        let y1 = &x * DVector::from_vec(w_true);
        let y2 = &x * DVector::from_vec(vec![-1.0, 4.0, 2.5]);

        let normal = NormalEquations::new(&x);
        assert_eq!(normal.solve(&y1, 1e-5, 8).unwrap(), ridge(&y1, &x, 1e-5, 8).unwrap());
        assert_eq!(normal.solve(&y2, 1e-5, 8).unwrap(), ridge(&y2, &x, 1e-5, 8).unwrap());
        assert!(normal.solve(&DVector::from_vec(vec![1.0; 5]), 1e-5, 8).is_err());
    }

    #[test]
    fn test_identical_clicks_predict_their_label() {
        let features = vec![255.0; 60];
        let batch = TrainingBatch {
            screen_x: vec![50.0; 3],
            screen_y: vec![50.0; 3],
            features: vec![features.clone(); 3],
            click_count: 3,
        };

        let model = RegressionTrainer::new(1e-5, 8).train(&batch).unwrap().unwrap();
        let p = model.predict(&features).unwrap();
        assert!((p.x - 50.0).abs() < 1e-3, "x = {}", p.x);
        assert!((p.y - 50.0).abs() < 1e-3, "y = {}", p.y);
        assert_eq!(model.sample_count, 3);
    }

    #[test]
    fn test_trail_only_batch_is_skipped() {
        let batch = TrainingBatch {
            screen_x: vec![1.0],
            screen_y: vec![1.0],
            features: vec![vec![1.0, 2.0]],
            click_count: 0,
        };
        assert!(RegressionTrainer::new(1e-5, 8).train(&batch).unwrap().is_none());
        assert!(RegressionTrainer::new(1e-5, 8).train(&TrainingBatch::default()).unwrap().is_none());
    }

    #[test]
    fn test_ragged_batch_rejected() {
        let batch = TrainingBatch {
            screen_x: vec![1.0, 2.0],
            screen_y: vec![1.0, 2.0],
            features: vec![vec![1.0; 60], vec![1.0; 120]],
            click_count: 2,
        };
        let err = RegressionTrainer::new(1e-5, 8).train(&batch).unwrap_err();
        assert!(matches!(err, GazeError::ConfigMismatch { expected: 60, found: 120 }));
    }

    #[test]
    fn test_predict_rejects_wrong_length() {
        let model = RegressionModel {
            coeff_x: vec![1.0; 4],
            coeff_y: vec![2.0; 4],
            ridge_x: 1e-5,
            ridge_y: 1e-5,
            sample_count: 1,
        };
        assert_eq!(model.predict(&[1.0; 4]).unwrap(), ScreenPoint::new(4.0, 8.0));
        assert!(model.predict(&[1.0; 5]).is_err());
    }
}
