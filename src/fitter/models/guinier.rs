use crate::error::{InvariantError, Result};
use crate::fitter::common::Measurement;
use crate::fitter::linear::{LinearFitter, Parameters};

/// `I(q) = I0 * exp(-q² Rg² / 3)`, fitted as a line of ln I against q².
#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct GuinierFunction {
    pub line: Parameters,
    pub fitted_points: usize,
    pub integration_steps: usize,
}

impl GuinierFunction {
    pub fn i0(&self) -> f64 {
        self.line.intercept.exp()
    }

    pub fn radius_of_gyration(&self) -> Measurement {
        let rg = (-3.0 * self.line.slope).sqrt();
        // dRg/dslope = -3 / (2 Rg)
        Measurement::new(rg, 1.5 / rg * self.line.slope_uncertainty())
    }

    pub fn evaluate(&self, q: f64) -> f64 {
        self.line.evaluate(q * q).exp()
    }

    pub fn evaluate_uncertainty(&self, q: f64) -> f64 {
        let y = self.evaluate(q);
        self.line.propagate([y, y * q * q]).max(0.0).sqrt()
    }

    /// `∫ I(q) q² dq` over `[a, b]` by composite Simpson, with its uncertainty.
    pub fn integrate_q2(&self, a: f64, b: f64) -> Measurement {
        let value = simpson(|q| q * q * self.evaluate(q), a, b, self.integration_steps);
        // d/dslope of the integrand brings down a factor q²
        let d_slope = simpson(
            |q| q.powi(4) * self.evaluate(q),
            a,
            b,
            self.integration_steps,
        );
        let variance = self.line.propagate([value, d_slope]);
        Measurement::new(value, variance.max(0.0).sqrt())
    }
}

/// Fits a Guinier law to the given points. Points with I <= 0 are dropped.
pub struct GuinierFitter;

impl GuinierFitter {
    pub fn fit(
        q: &[f64],
        i: &[f64],
        di: &[f64],
        integration_steps: usize,
    ) -> Result<GuinierFunction> {
        let mut x_data = Vec::with_capacity(q.len());
        let mut y_data = Vec::with_capacity(q.len());
        let mut sigma = Vec::with_capacity(q.len());
        for ((&q, &y), &dy) in q.iter().zip(i).zip(di) {
            if y > 0.0 && y.is_finite() {
                x_data.push(q * q);
                y_data.push(y.ln());
                sigma.push(dy / y);
            }
        }

        if x_data.len() < 2 {
            return Err(InvariantError::FitDegenerate(format!(
                "Guinier fit needs 2 points with positive intensity, {} left",
                x_data.len()
            )));
        }

        let span = x_data[x_data.len() - 1] - x_data[0];
        let fitted_points = x_data.len();
        let fitter = LinearFitter::new(x_data, y_data, sigma);
        let line = fitter.perform_linear_fit()?;

        // ln I must fall across the fit range for Rg² to be positive
        let drop = -line.slope * span;
        if !(drop > 1e-9 * (1.0 + line.intercept.abs())) {
            return Err(InvariantError::FitDegenerate(format!(
                "Guinier slope {} gives no positive Rg²",
                line.slope
            )));
        }

        let function = GuinierFunction {
            line,
            fitted_points,
            integration_steps: integration_steps.max(2),
        };
        log::debug!(
            "Guinier fit: I0 = {}, Rg = {} ({} points)",
            function.i0(),
            function.radius_of_gyration().value,
            fitted_points
        );
        Ok(function)
    }
}

// Composite Simpson rule; the interval count is rounded up to an even number.
fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, steps: usize) -> f64 {
    let steps = (steps.max(2) + 1) & !1;
    let h = (b - a) / steps as f64;
    let mut sum = f(a) + f(b);
    for k in 1..steps {
        let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + k as f64 * h);
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guinier(q: &[f64], i0: f64, rg: f64) -> Vec<f64> {
        q.iter().map(|q| i0 * (-q * q * rg * rg / 3.0).exp()).collect()
    }

    #[test]
    fn test_recovers_radius_of_gyration() {
        let q = vec![0.01, 0.02, 0.03, 0.04];
        let i = guinier(&q, 50.0, 20.0);
        let f = GuinierFitter::fit(&q, &i, &[0.0; 4], 1000).unwrap();
        assert!((f.radius_of_gyration().value - 20.0).abs() < 1e-6);
        assert!((f.i0() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_intensity_is_degenerate() {
        let q = vec![0.01, 0.02, 0.05];
        let err = GuinierFitter::fit(&q, &[100.0; 3], &[1.0; 3], 1000).unwrap_err();
        assert!(matches!(err, InvariantError::FitDegenerate(_)));
    }

    #[test]
    fn test_rising_intensity_is_degenerate() {
        let q = vec![0.01, 0.02, 0.05];
        let err = GuinierFitter::fit(&q, &[1.0, 2.0, 3.0], &[0.0; 3], 1000).unwrap_err();
        assert!(matches!(err, InvariantError::FitDegenerate(_)));
    }

    #[test]
    fn test_simpson_is_exact_for_cubics() {
        let value = simpson(|x| x * x * x + x, 0.0, 2.0, 3);
        assert!((value - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_integral_of_small_argument_matches_cubic() {
        // Rg -> small: I ~ I0, so ∫ I0 q² dq = I0 (b³ - a³) / 3
        let q = vec![0.001, 0.002, 0.003];
        let i = guinier(&q, 10.0, 1.0);
        let f = GuinierFitter::fit(&q, &i, &[0.0; 3], 1000).unwrap();
        let integral = f.integrate_q2(1e-5, 0.001);
        let expected = 10.0 * (1e-9 - 1e-15) / 3.0;
        assert!((integral.value - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn test_evaluate_uncertainty_matches_finite_difference() {
        let f = GuinierFunction {
            line: Parameters {
                slope: -120.0,
                intercept: 3.9,
                covariance: [[2e-4, -0.05], [-0.05, 30.0]],
            },
            fitted_points: 6,
            integration_steps: 100,
        };
        let h = 1e-6;
        for q in [0.005, 0.02, 0.08] {
            let shifted = |d_intercept: f64, d_slope: f64| {
                let mut g = f.clone();
                g.line.intercept += d_intercept;
                g.line.slope += d_slope;
                g.evaluate(q)
            };
            let gradient = [
                (shifted(h, 0.0) - shifted(-h, 0.0)) / (2.0 * h),
                (shifted(0.0, h) - shifted(0.0, -h)) / (2.0 * h),
            ];
            let numeric = f.line.propagate(gradient).sqrt();
            let analytic = f.evaluate_uncertainty(q);
            assert!((analytic - numeric).abs() < 1e-6 * numeric);
        }
    }
}
