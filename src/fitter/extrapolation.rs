use std::fmt;
use std::str::FromStr;

use crate::error::{InvariantError, Result};
use crate::fitter::common::Measurement;
use crate::fitter::models::guinier::{GuinierFitter, GuinierFunction};
use crate::fitter::models::powerlaw::{PowerLawFitter, PowerLawFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum ExtrapolationRange {
    Low,
    High,
}

impl fmt::Display for ExtrapolationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low-q"),
            Self::High => write!(f, "high-q"),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ExtrapolationModel {
    #[default]
    Guinier,
    PowerLaw,
}

impl fmt::Display for ExtrapolationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guinier => write!(f, "guinier"),
            Self::PowerLaw => write!(f, "power_law"),
        }
    }
}

impl FromStr for ExtrapolationModel {
    type Err = InvariantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guinier" => Ok(Self::Guinier),
            "power_law" | "powerlaw" | "power law" => Ok(Self::PowerLaw),
            other => Err(InvariantError::invalid(format!(
                "unknown extrapolation function '{other}'"
            ))),
        }
    }
}

/// Which extrapolated tails are added to the measured-range invariant.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ExtrapolationMode {
    #[default]
    None,
    Low,
    High,
    Both,
}

impl ExtrapolationMode {
    pub fn from_flags(low: bool, high: bool) -> Self {
        match (low, high) {
            (false, false) => Self::None,
            (true, false) => Self::Low,
            (false, true) => Self::High,
            (true, true) => Self::Both,
        }
    }

    pub fn includes(&self, range: ExtrapolationRange) -> bool {
        matches!(
            (self, range),
            (Self::Low | Self::Both, ExtrapolationRange::Low)
                | (Self::High | Self::Both, ExtrapolationRange::High)
        )
    }
}

/// How one tail of the curve is extrapolated.
///
/// `fixed_power: None` means the power is fitted from the `point_count`
/// points nearest the edge.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ExtrapolationSpec {
    pub function: ExtrapolationModel,
    pub fixed_power: Option<f64>,
    pub point_count: usize,
}

impl ExtrapolationSpec {
    pub fn guinier(point_count: usize) -> Self {
        Self {
            function: ExtrapolationModel::Guinier,
            fixed_power: None,
            point_count,
        }
    }

    pub fn power_law(point_count: usize, fixed_power: Option<f64>) -> Self {
        Self {
            function: ExtrapolationModel::PowerLaw,
            fixed_power,
            point_count,
        }
    }

    /// Checks this extrapolation against a range and the number of measured points.
    pub fn validate(&self, range: ExtrapolationRange, measured_points: usize) -> Result<()> {
        if range == ExtrapolationRange::High && self.function == ExtrapolationModel::Guinier {
            return Err(InvariantError::invalid(
                "Guinier extrapolation is only available at low q",
            ));
        }
        if self.function == ExtrapolationModel::Guinier && self.fixed_power.is_some() {
            return Err(InvariantError::invalid(
                "a Guinier extrapolation always fits its radius of gyration",
            ));
        }
        if let Some(power) = self.fixed_power {
            if !power.is_finite() {
                return Err(InvariantError::invalid(format!(
                    "fixed power must be finite, got {power}"
                )));
            }
        }
        if self.point_count < 1 || self.point_count > measured_points {
            return Err(InvariantError::invalid(format!(
                "{} point count must be between 1 and {}, got {}",
                range, measured_points, self.point_count
            )));
        }
        Ok(())
    }
}

/// A function fitted to one edge of a curve.
#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub enum FittedFunction {
    Guinier(GuinierFunction),
    PowerLaw(PowerLawFunction),
}

impl FittedFunction {
    pub fn fit(
        spec: &ExtrapolationSpec,
        q: &[f64],
        i: &[f64],
        di: &[f64],
        integration_steps: usize,
    ) -> Result<Self> {
        match spec.function {
            ExtrapolationModel::Guinier => {
                GuinierFitter::fit(q, i, di, integration_steps).map(Self::Guinier)
            }
            ExtrapolationModel::PowerLaw => {
                PowerLawFitter::fit(q, i, di, spec.fixed_power).map(Self::PowerLaw)
            }
        }
    }

    pub fn model(&self) -> ExtrapolationModel {
        match self {
            Self::Guinier(_) => ExtrapolationModel::Guinier,
            Self::PowerLaw(_) => ExtrapolationModel::PowerLaw,
        }
    }

    /// Power-law exponent n, or the Guinier radius of gyration.
    pub fn power(&self) -> Measurement {
        match self {
            Self::Guinier(f) => f.radius_of_gyration(),
            Self::PowerLaw(f) => f.exponent(),
        }
    }

    pub fn evaluate(&self, q: f64) -> f64 {
        match self {
            Self::Guinier(f) => f.evaluate(q),
            Self::PowerLaw(f) => f.evaluate(q),
        }
    }

    pub fn evaluate_uncertainty(&self, q: f64) -> f64 {
        match self {
            Self::Guinier(f) => f.evaluate_uncertainty(q),
            Self::PowerLaw(f) => f.evaluate_uncertainty(q),
        }
    }

    /// `∫ I(q) q² dq` over `[a, b]` with its propagated uncertainty.
    pub fn integrate_q2(&self, a: f64, b: f64) -> Result<Measurement> {
        let integral = match self {
            Self::Guinier(f) => f.integrate_q2(a, b),
            Self::PowerLaw(f) => f.integrate_q2(a, b),
        };
        if !integral.is_finite() {
            return Err(InvariantError::ExtrapolationFailed(format!(
                "{} integral over [{a}, {b}] is not finite",
                self.model()
            )));
        }
        Ok(integral)
    }

    /// `npts` evenly spaced (q, I, dI) points on `[start, end]` for plotting.
    /// dI is the fit uncertainty of I at that q.
    pub fn points(&self, start: f64, end: f64, npts: usize) -> Vec<[f64; 3]> {
        let npts = npts.max(2);
        let step = (end - start) / (npts - 1) as f64;
        (0..npts)
            .map(|k| {
                let q = start + k as f64 * step;
                [q, self.evaluate(q), self.evaluate_uncertainty(q)]
            })
            .collect()
    }

    pub(crate) fn parameters_are_finite(&self) -> bool {
        let line = match self {
            Self::Guinier(f) => &f.line,
            Self::PowerLaw(f) => &f.line,
        };
        line.slope.is_finite()
            && line.intercept.is_finite()
            && line.covariance.iter().flatten().all(|c| c.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guinier_only_at_low_q() {
        let spec = ExtrapolationSpec::guinier(3);
        assert!(spec.validate(ExtrapolationRange::Low, 10).is_ok());
        assert!(spec.validate(ExtrapolationRange::High, 10).is_err());
        let fixed = ExtrapolationSpec {
            fixed_power: Some(2.0),
            ..spec
        };
        assert!(fixed.validate(ExtrapolationRange::Low, 10).is_err());
    }

    #[test]
    fn test_point_count_bounds() {
        let spec = ExtrapolationSpec::power_law(0, Some(4.0));
        assert!(spec.validate(ExtrapolationRange::High, 5).is_err());
        let spec = ExtrapolationSpec::power_law(6, None);
        assert!(spec.validate(ExtrapolationRange::High, 5).is_err());
        let spec = ExtrapolationSpec::power_law(5, None);
        assert!(spec.validate(ExtrapolationRange::High, 5).is_ok());
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(ExtrapolationMode::from_flags(true, true), ExtrapolationMode::Both);
        assert!(ExtrapolationMode::High.includes(ExtrapolationRange::High));
        assert!(!ExtrapolationMode::High.includes(ExtrapolationRange::Low));
        assert!(!ExtrapolationMode::None.includes(ExtrapolationRange::Low));
    }

    #[test]
    fn test_model_names() {
        assert_eq!(
            "Power_Law".parse::<ExtrapolationModel>().unwrap(),
            ExtrapolationModel::PowerLaw
        );
        assert_eq!(
            "guinier".parse::<ExtrapolationModel>().unwrap(),
            ExtrapolationModel::Guinier
        );
        assert!("lorentz".parse::<ExtrapolationModel>().is_err());
    }

    #[test]
    fn test_points_span_range() {
        let q = [1.0, 2.0];
        let i = [1.0, 0.25];
        let spec = ExtrapolationSpec::power_law(2, None);
        let f = FittedFunction::fit(&spec, &q, &i, &[0.0, 0.0], 100).unwrap();
        let points = f.points(1.0, 3.0, 3);
        assert_eq!(points.len(), 3);
        assert_eq!(points[2][0], 3.0);
        assert!((points[1][1] - 0.25).abs() < 1e-12);
        // an exact two-point line carries no covariance
        assert!(points.iter().all(|p| p[2] == 0.0));
        assert!((f.power().value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_points_carry_fit_uncertainty() {
        let q = [0.1, 0.2, 0.3, 0.4];
        let i: Vec<f64> = q.iter().map(|q: &f64| q.powi(-4)).collect();
        let di: Vec<f64> = i.iter().map(|y| 0.05 * y).collect();
        let spec = ExtrapolationSpec::power_law(4, None);
        let f = FittedFunction::fit(&spec, &q, &i, &di, 100).unwrap();
        for [q, _, di] in f.points(0.4, 1.0, 7) {
            assert!(di > 0.0);
            assert!((di - f.evaluate_uncertainty(q)).abs() < 1e-15);
        }
    }
}
