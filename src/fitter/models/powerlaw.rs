use crate::error::{InvariantError, Result};
use crate::fitter::common::Measurement;
use crate::fitter::linear::{LinearFitter, Parameters};

/// `I(q) = A * q^(-n)`, fitted as a line of ln I against ln q.
#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PowerLawFunction {
    pub line: Parameters,
    pub fitted_points: usize,
}

impl PowerLawFunction {
    pub fn amplitude(&self) -> f64 {
        self.line.intercept.exp()
    }

    pub fn exponent(&self) -> Measurement {
        Measurement::new(-self.line.slope, self.line.slope_uncertainty())
    }

    pub fn evaluate(&self, q: f64) -> f64 {
        self.line.evaluate(q.ln()).exp()
    }

    pub fn evaluate_uncertainty(&self, q: f64) -> f64 {
        let y = self.evaluate(q);
        self.line.propagate([y, y * q.ln()]).max(0.0).sqrt()
    }

    /// Closed form of `∫ A q^(2-n) dq` over `[a, b]`, with its uncertainty.
    pub fn integrate_q2(&self, a: f64, b: f64) -> Measurement {
        let amplitude = self.amplitude();
        let (j, dj) = power_integral(self.line.slope, a, b);
        let value = amplitude * j;
        let variance = self.line.propagate([value, amplitude * dj]);
        Measurement::new(value, variance.max(0.0).sqrt())
    }
}

/// Fits a power law to the given points. Points with I <= 0 are dropped.
pub struct PowerLawFitter;

impl PowerLawFitter {
    pub fn fit(
        q: &[f64],
        i: &[f64],
        di: &[f64],
        fixed_power: Option<f64>,
    ) -> Result<PowerLawFunction> {
        let mut x_data = Vec::with_capacity(q.len());
        let mut y_data = Vec::with_capacity(q.len());
        let mut sigma = Vec::with_capacity(q.len());
        for ((&q, &y), &dy) in q.iter().zip(i).zip(di) {
            if y > 0.0 && y.is_finite() {
                x_data.push(q.ln());
                y_data.push(y.ln());
                sigma.push(dy / y);
            }
        }

        let needed = if fixed_power.is_some() { 1 } else { 2 };
        if x_data.len() < needed {
            return Err(InvariantError::FitDegenerate(format!(
                "power law needs {} points with positive intensity, {} left",
                needed,
                x_data.len()
            )));
        }

        let fitted_points = x_data.len();
        let fitter = LinearFitter::new(x_data, y_data, sigma);
        let line = match fixed_power {
            Some(power) => fitter.perform_fixed_slope_fit(-power)?,
            None => fitter.perform_linear_fit()?,
        };

        log::debug!(
            "Power law fit: A = {}, n = {} ({} points)",
            line.intercept.exp(),
            -line.slope,
            fitted_points
        );
        Ok(PowerLawFunction {
            line,
            fitted_points,
        })
    }
}

// ∫ q^(2+s) dq over [a, b] and its derivative with respect to s.
fn power_integral(s: f64, a: f64, b: f64) -> (f64, f64) {
    let e = 3.0 + s;
    let (ln_a, ln_b) = (a.ln(), b.ln());
    if e.abs() < 1e-12 {
        return (ln_b - ln_a, 0.5 * (ln_b * ln_b - ln_a * ln_a));
    }
    let (pa, pb) = (a.powf(e), b.powf(e));
    let j = (pb - pa) / e;
    let dj = (pb * ln_b - pa * ln_a) / e - (pb - pa) / (e * e);
    (j, dj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn porod(q: &[f64], amplitude: f64, n: f64) -> Vec<f64> {
        q.iter().map(|q| amplitude * q.powf(-n)).collect()
    }

    #[test]
    fn test_recovers_exact_power_law() {
        let q = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        let i = porod(&q, 2.0, 4.0);
        let f = PowerLawFitter::fit(&q, &i, &[0.0; 5], None).unwrap();
        assert!((f.exponent().value - 4.0).abs() < 1e-9);
        assert!((f.amplitude() - 2.0).abs() < 1e-9);
        assert!((f.evaluate(0.25) - 2.0 * 0.25f64.powi(-4)).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_power_fits_amplitude_only() {
        let q = vec![1.0, 2.0];
        let i = porod(&q, 3.0, 4.0);
        let f = PowerLawFitter::fit(&q, &i, &[0.0, 0.0], Some(4.0)).unwrap();
        assert_eq!(f.exponent().value, 4.0);
        assert!((f.amplitude() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_drops_non_positive_points() {
        let q = vec![0.1, 0.2, 0.3];
        let i = vec![-1.0, 0.0, 5.0];
        let err = PowerLawFitter::fit(&q, &i, &[0.0; 3], None).unwrap_err();
        assert!(matches!(err, InvariantError::FitDegenerate(_)));
        let f = PowerLawFitter::fit(&q, &i, &[0.0; 3], Some(2.0)).unwrap();
        assert_eq!(f.fitted_points, 1);
    }

    #[test]
    fn test_closed_form_integral() {
        let q = vec![1.0, 2.0];
        // A = 1, n = 4: ∫ q^-2 dq over [1, 2] = 0.5
        let f = PowerLawFitter::fit(&q, &porod(&q, 1.0, 4.0), &[0.0, 0.0], Some(4.0)).unwrap();
        let integral = f.integrate_q2(1.0, 2.0);
        assert!((integral.value - 0.5).abs() < 1e-12);

        // n = 3 takes the logarithmic branch
        let f = PowerLawFitter::fit(&q, &porod(&q, 1.0, 3.0), &[0.0, 0.0], Some(3.0)).unwrap();
        assert!((f.integrate_q2(1.0, 2.0).value - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_integral_derivative_matches_finite_difference() {
        let (a, b, s) = (0.05, 0.4, -3.6);
        let h = 1e-6;
        let (_, dj) = power_integral(s, a, b);
        let numeric = (power_integral(s + h, a, b).0 - power_integral(s - h, a, b).0) / (2.0 * h);
        assert!((dj - numeric).abs() < 1e-5 * numeric.abs().max(1.0));
    }

    #[test]
    fn test_evaluate_uncertainty_matches_finite_difference() {
        let f = PowerLawFunction {
            line: Parameters {
                slope: -3.8,
                intercept: 0.7,
                covariance: [[4e-3, -1e-3], [-1e-3, 9e-4]],
            },
            fitted_points: 5,
        };
        let h = 1e-6;
        for q in [0.05, 0.3, 2.0] {
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
