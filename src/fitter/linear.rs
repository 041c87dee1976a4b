use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{InvariantError, Result};

/// Straight-line parameters with their covariance, ordered (intercept, slope).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Parameters {
    pub slope: f64,
    pub intercept: f64,
    pub covariance: [[f64; 2]; 2],
}

impl Parameters {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn intercept_uncertainty(&self) -> f64 {
        self.covariance[0][0].max(0.0).sqrt()
    }

    pub fn slope_uncertainty(&self) -> f64 {
        self.covariance[1][1].max(0.0).sqrt()
    }

    /// Variance of `g · (intercept, slope)` for a gradient `g`.
    pub fn propagate(&self, gradient: [f64; 2]) -> f64 {
        let c = &self.covariance;
        gradient[0] * gradient[0] * c[0][0]
            + 2.0 * gradient[0] * gradient[1] * c[0][1]
            + gradient[1] * gradient[1] * c[1][1]
    }
}

/// Ordinary least squares on (x, y) with optional per-point y errors.
///
/// The errors never weight the estimate. When present they give the
/// covariance through the sandwich estimator; otherwise the residual
/// variance is used.
#[derive(Debug, Clone)]
pub struct LinearFitter {
    x_data: Vec<f64>,
    y_data: Vec<f64>,
    sigma: Vec<f64>,
}

impl LinearFitter {
    /// Creates a new LinearFitter with the given data. `sigma` may be empty.
    pub fn new(x_data: Vec<f64>, y_data: Vec<f64>, sigma: Vec<f64>) -> Self {
        LinearFitter {
            x_data,
            y_data,
            sigma,
        }
    }

    /// Fits slope and intercept together.
    pub fn perform_linear_fit(&self) -> Result<Parameters> {
        self.check_lengths()?;
        let n = self.x_data.len();
        if n < 2 {
            return Err(InvariantError::FitDegenerate(format!(
                "a line needs at least 2 points, got {n}"
            )));
        }
        if is_degenerate(&self.x_data) {
            return Err(InvariantError::FitDegenerate(
                "all x values are equal, the slope is undefined".to_owned(),
            ));
        }

        // Centering x keeps the normal matrix well conditioned for tiny q².
        let x_mean = self.x_data.iter().sum::<f64>() / n as f64;
        let design = DMatrix::from_fn(n, 2, |row, col| {
            if col == 0 { 1.0 } else { self.x_data[row] - x_mean }
        });
        let y = DVector::from_column_slice(&self.y_data);
        let design_t = design.transpose();

        let normal_inverse = (&design_t * &design).try_inverse().ok_or_else(|| {
            InvariantError::FitDegenerate("normal matrix is singular".to_owned())
        })?;
        let beta = &normal_inverse * &design_t * &y;

        let centered = if self.has_errors() {
            let weighted = DMatrix::from_fn(n, 2, |row, col| {
                design[(row, col)] * self.sigma[row] * self.sigma[row]
            });
            let meat = &design_t * weighted;
            &normal_inverse * meat * &normal_inverse
        } else if n > 2 {
            let residuals = &y - &design * &beta;
            let residual_variance = residuals.norm_squared() / (n - 2) as f64;
            normal_inverse * residual_variance
        } else {
            DMatrix::zeros(2, 2)
        };

        // Back to (intercept, slope) at x = 0: intercept = c0 - x_mean * slope.
        let (c00, c01, c11) = (centered[(0, 0)], centered[(0, 1)], centered[(1, 1)]);
        let params = Parameters {
            intercept: beta[0] - x_mean * beta[1],
            slope: beta[1],
            covariance: [
                [
                    c00 - 2.0 * x_mean * c01 + x_mean * x_mean * c11,
                    c01 - x_mean * c11,
                ],
                [c01 - x_mean * c11, c11],
            ],
        };
        debug!(
            "Linear fit over {} points: slope {} ± {}, intercept {} ± {}",
            n,
            params.slope,
            params.slope_uncertainty(),
            params.intercept,
            params.intercept_uncertainty()
        );
        Ok(params)
    }

    /// Fits only the intercept with the slope held at `slope`.
    pub fn perform_fixed_slope_fit(&self, slope: f64) -> Result<Parameters> {
        self.check_lengths()?;
        let n = self.x_data.len();
        if n == 0 {
            return Err(InvariantError::FitDegenerate(
                "no points left to fit".to_owned(),
            ));
        }
        if !slope.is_finite() {
            return Err(InvariantError::invalid(format!(
                "fixed slope must be finite, got {slope}"
            )));
        }

        let offsets: Vec<f64> = self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(x, y)| y - slope * x)
            .collect();
        let nf = n as f64;
        let intercept = offsets.iter().sum::<f64>() / nf;

        let variance = if self.has_errors() {
            self.sigma.iter().map(|s| s * s).sum::<f64>() / (nf * nf)
        } else if n > 1 {
            let ss: f64 = offsets.iter().map(|o| (o - intercept).powi(2)).sum();
            ss / (nf - 1.0) / nf
        } else {
            0.0
        };

        let params = Parameters {
            slope,
            intercept,
            covariance: [[variance, 0.0], [0.0, 0.0]],
        };
        debug!(
            "Fixed-slope fit over {} points: slope {}, intercept {} ± {}",
            n,
            slope,
            intercept,
            params.intercept_uncertainty()
        );
        Ok(params)
    }

    fn has_errors(&self) -> bool {
        self.sigma.len() == self.x_data.len() && self.sigma.iter().any(|&s| s > 0.0)
    }

    fn check_lengths(&self) -> Result<()> {
        if self.x_data.len() != self.y_data.len()
            || !(self.sigma.is_empty() || self.sigma.len() == self.x_data.len())
        {
            return Err(InvariantError::invalid(
                "x, y and sigma must have the same length",
            ));
        }
        Ok(())
    }
}

// True when the x values carry no spread to fit a slope against.
fn is_degenerate(x_data: &[f64]) -> bool {
    let n = x_data.len() as f64;
    let mean = x_data.iter().sum::<f64>() / n;
    let sxx: f64 = x_data.iter().map(|x| (x - mean).powi(2)).sum();
    sxx == 0.0 || sxx <= 1e-24 * n * mean * mean
}

// Unit tests for LinearFitter
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perform_linear_fit() {
        let x_data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_data = vec![2.0, 4.0, 5.0, 4.0, 5.0];
        let params = LinearFitter::new(x_data, y_data, vec![])
            .perform_linear_fit()
            .unwrap();
        assert!((params.slope - 0.6).abs() < 1e-6);
        assert!((params.intercept - 2.2).abs() < 1e-6);
        // residual variance 2.4 / 3 = 0.8, Sxx = 10
        assert!((params.covariance[1][1] - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_sandwich_covariance_with_constant_errors() {
        let fitter = LinearFitter::new(vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 5.0], vec![0.1; 3]);
        let params = fitter.perform_linear_fit().unwrap();
        assert!((params.slope - 2.0).abs() < 1e-12);
        assert!((params.intercept - 1.0).abs() < 1e-12);
        assert!((params.covariance[1][1] - 0.005).abs() < 1e-12);
        assert!((params.covariance[0][0] - 0.01 * 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_x() {
        let fitter = LinearFitter::new(vec![2.0, 2.0, 2.0], vec![1.0, 2.0, 3.0], vec![]);
        assert!(matches!(
            fitter.perform_linear_fit(),
            Err(InvariantError::FitDegenerate(_))
        ));
        let single = LinearFitter::new(vec![1.0], vec![1.0], vec![]);
        assert!(matches!(
            single.perform_linear_fit(),
            Err(InvariantError::FitDegenerate(_))
        ));
    }

    #[test]
    fn test_fixed_slope_fit() {
        let fitter = LinearFitter::new(vec![1.0, 2.0], vec![5.0, 3.0], vec![]);
        let params = fitter.perform_fixed_slope_fit(-2.0).unwrap();
        assert!((params.intercept - 7.0).abs() < 1e-12);
        assert_eq!(params.slope_uncertainty(), 0.0);
        assert!((params.evaluate(0.0) - 7.0).abs() < 1e-12);
        assert!((params.evaluate(3.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_lengths() {
        let fitter = LinearFitter::new(vec![1.0, 2.0], vec![5.0], vec![]);
        assert!(matches!(
            fitter.perform_linear_fit(),
            Err(InvariantError::InvalidParameter(_))
        ));
    }
}
