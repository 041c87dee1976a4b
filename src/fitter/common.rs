use std::fmt;

/// A value with its one-sigma uncertainty.
#[derive(PartialEq, Debug, Clone, Copy, Default, serde::Deserialize, serde::Serialize)]
pub struct Measurement {
    pub value: f64,
    pub uncertainty: f64,
}

impl Measurement {
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self {
            value,
            uncertainty: uncertainty.abs(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.uncertainty.is_finite()
    }

    /// Sum of independent measurements, uncertainties added in quadrature.
    pub fn quadrature_sum<'a>(parts: impl IntoIterator<Item = &'a Measurement>) -> Self {
        let (value, variance) = parts.into_iter().fold((0.0, 0.0), |(v, var), m| {
            (v + m.value, var + m.uncertainty * m.uncertainty)
        });
        Self::new(value, variance.sqrt())
    }

    /// Uncertainty relative to the value, zero for a zero value.
    pub fn relative_uncertainty(&self) -> f64 {
        if self.value == 0.0 {
            0.0
        } else {
            (self.uncertainty / self.value).abs()
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6e} ± {:.6e}", self.value, self.uncertainty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrature_sum() {
        let parts = [Measurement::new(1.0, 3.0), Measurement::new(2.0, 4.0)];
        let total = Measurement::quadrature_sum(&parts);
        assert!((total.value - 3.0).abs() < 1e-12);
        assert!((total.uncertainty - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_uncertainty_is_folded() {
        let m = Measurement::new(2.0, -0.5);
        assert_eq!(m.uncertainty, 0.5);
        assert!((m.relative_uncertainty() - 0.25).abs() < 1e-12);
    }
}
