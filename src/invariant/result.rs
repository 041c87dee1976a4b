use std::fmt;

use crate::error::Result;
use crate::fitter::common::Measurement;
use crate::fitter::extrapolation::ExtrapolationMode;

/// One output of an invariant computation.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub enum Quantity {
    Value(Measurement),
    /// The sub-computation failed; the message says why.
    Error(String),
    #[default]
    NotComputed,
}

impl Quantity {
    pub fn from_result(result: Result<Measurement>) -> Self {
        match result {
            Ok(m) if m.is_finite() => Self::Value(m),
            Ok(m) => Self::Error(format!("non-finite result {m}")),
            Err(e) => Self::Error(e.to_string()),
        }
    }

    pub fn value(&self) -> Option<Measurement> {
        match self {
            Self::Value(m) => Some(*m),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(m) => write!(f, "{m}"),
            Self::Error(_) => write!(f, "ERROR"),
            Self::NotComputed => write!(f, "-"),
        }
    }
}

/// Share of the total invariant coming from each range, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Contributions {
    pub partial: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
}

/// Outcome of one compute. Never modified once built; a new compute
/// produces a new result.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct InvariantResult {
    pub mode: ExtrapolationMode,
    pub qstar_partial: Quantity,
    pub qstar_low: Quantity,
    pub qstar_high: Quantity,
    pub qstar_total: Quantity,
    pub volume_fraction: Quantity,
    pub specific_surface: Quantity,
    /// Fitted low-q power: exponent for a power law, Rg for Guinier.
    pub power_low: Option<Measurement>,
    pub power_high: Option<Measurement>,
}

impl InvariantResult {
    pub fn contributions(&self) -> Contributions {
        let Some(total) = self.qstar_total.value().filter(|t| t.value != 0.0) else {
            return Contributions::default();
        };
        let percent = |q: &Quantity| q.value().map(|m| 100.0 * m.value / total.value);
        Contributions {
            partial: percent(&self.qstar_partial),
            low: percent(&self.qstar_low),
            high: percent(&self.qstar_high),
        }
    }

    pub fn has_errors(&self) -> bool {
        [
            &self.qstar_partial,
            &self.qstar_low,
            &self.qstar_high,
            &self.qstar_total,
            &self.volume_fraction,
            &self.specific_surface,
        ]
        .iter()
        .any(|q| q.is_error())
    }
}

impl fmt::Display for InvariantResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extrapolation:     {:?}", self.mode)?;
        writeln!(f, "Q* (data range):   {}", self.qstar_partial)?;
        writeln!(f, "Q* (low q):        {}", self.qstar_low)?;
        writeln!(f, "Q* (high q):       {}", self.qstar_high)?;
        writeln!(f, "Q* (total):        {}", self.qstar_total)?;
        writeln!(f, "Volume fraction:   {}", self.volume_fraction)?;
        write!(f, "Specific surface:  {}", self.specific_surface)?;
        if let Some(power) = self.power_low {
            write!(f, "\nLow-q power:       {power}")?;
        }
        if let Some(power) = self.power_high {
            write!(f, "\nHigh-q power:      {power}")?;
        }
        Ok(())
    }
}
