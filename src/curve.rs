use crate::error::{InvariantError, Result};

/// Measured scattering curve: q, I(q) and dI(q), q strictly increasing and
/// positive.
///
/// Built once by the loading collaborator and never mutated afterwards. An
/// empty `di` means the errors are unknown and they are treated as zero.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "CurveFields", into = "CurveFields")]
pub struct MeasuredCurve {
    name: String,
    q: Vec<f64>,
    i: Vec<f64>,
    di: Vec<f64>,
}

impl MeasuredCurve {
    pub fn new(name: impl Into<String>, q: Vec<f64>, i: Vec<f64>, di: Vec<f64>) -> Result<Self> {
        let di = if di.is_empty() { vec![0.0; q.len()] } else { di };

        if q.is_empty() {
            return Err(InvariantError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }
        if q.len() != i.len() || q.len() != di.len() {
            return Err(InvariantError::invalid(format!(
                "q, I and dI must have the same length (got {}, {}, {})",
                q.len(),
                i.len(),
                di.len()
            )));
        }
        if let Some(bad) = q.iter().find(|&&x| !(x.is_finite() && x > 0.0)) {
            return Err(InvariantError::invalid(format!(
                "q values must be finite and strictly positive, found {bad}"
            )));
        }
        if q.windows(2).any(|w| w[1] <= w[0]) {
            return Err(InvariantError::invalid(
                "q values must be strictly increasing",
            ));
        }
        if i.iter().any(|y| !y.is_finite()) {
            return Err(InvariantError::invalid("intensities must be finite"));
        }
        if di.iter().any(|e| !(e.is_finite() && *e >= 0.0)) {
            return Err(InvariantError::invalid(
                "intensity errors must be finite and non-negative",
            ));
        }

        Ok(Self {
            name: name.into(),
            q,
            i,
            di,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    pub fn i(&self) -> &[f64] {
        &self.i
    }

    pub fn di(&self) -> &[f64] {
        &self.di
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn q_min(&self) -> f64 {
        self.q[0]
    }

    pub fn q_max(&self) -> f64 {
        self.q[self.q.len() - 1]
    }

    /// Working copy with `I' = scale * (I - background)` and `dI' = scale * dI`.
    pub fn corrected(&self, background: f64, scale: f64) -> Self {
        Self {
            name: self.name.clone(),
            q: self.q.clone(),
            i: self.i.iter().map(|&y| scale * (y - background)).collect(),
            di: self.di.iter().map(|&e| scale * e).collect(),
        }
    }

    /// The first `n` points as a borrowed (q, I, dI) view.
    pub fn head(&self, n: usize) -> (&[f64], &[f64], &[f64]) {
        let n = n.min(self.len());
        (&self.q[..n], &self.i[..n], &self.di[..n])
    }

    /// The last `n` points as a borrowed (q, I, dI) view.
    pub fn tail(&self, n: usize) -> (&[f64], &[f64], &[f64]) {
        let start = self.len() - n.min(self.len());
        (&self.q[start..], &self.i[start..], &self.di[start..])
    }
}

// Serialized shape of a curve; deserializing goes back through the checks.
#[derive(serde::Deserialize, serde::Serialize)]
struct CurveFields {
    name: String,
    q: Vec<f64>,
    i: Vec<f64>,
    di: Vec<f64>,
}

impl TryFrom<CurveFields> for MeasuredCurve {
    type Error = InvariantError;

    fn try_from(fields: CurveFields) -> Result<Self> {
        Self::new(fields.name, fields.q, fields.i, fields.di)
    }
}

impl From<MeasuredCurve> for CurveFields {
    fn from(curve: MeasuredCurve) -> Self {
        Self {
            name: curve.name,
            q: curve.q,
            i: curve.i,
            di: curve.di,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MeasuredCurve {
        MeasuredCurve::new(
            "sample",
            vec![0.01, 0.02, 0.05, 0.1],
            vec![100.0, 80.0, 40.0, 10.0],
            vec![1.0, 1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_zero_q() {
        let err = MeasuredCurve::new("bad", vec![0.0, 0.1], vec![1.0, 1.0], vec![]).unwrap_err();
        assert!(matches!(err, InvariantError::InvalidParameter(_)));
    }

    #[test]
    fn test_rejects_unsorted_and_mismatched() {
        assert!(MeasuredCurve::new("x", vec![0.2, 0.1], vec![1.0, 1.0], vec![]).is_err());
        assert!(MeasuredCurve::new("x", vec![0.1, 0.2], vec![1.0], vec![]).is_err());
        assert!(MeasuredCurve::new("x", vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn test_missing_errors_become_zero() {
        let curve = MeasuredCurve::new("x", vec![0.1, 0.2], vec![1.0, 2.0], vec![]).unwrap();
        assert_eq!(curve.di(), &[0.0, 0.0]);
    }

    #[test]
    fn test_corrected_leaves_original_untouched() {
        let curve = sample();
        let corrected = curve.corrected(10.0, 2.0);
        assert_eq!(corrected.i(), &[180.0, 140.0, 60.0, 0.0]);
        assert_eq!(corrected.di(), &[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(curve.i(), &[100.0, 80.0, 40.0, 10.0]);
    }

    #[test]
    fn test_edges() {
        let curve = sample();
        assert_eq!(curve.head(2).0, &[0.01, 0.02]);
        assert_eq!(curve.tail(2).1, &[40.0, 10.0]);
        assert_eq!(curve.tail(10).0.len(), 4);
        assert_eq!(curve.q_min(), 0.01);
        assert_eq!(curve.q_max(), 0.1);
    }
}
