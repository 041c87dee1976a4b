use std::f64::consts::PI;

use log::{debug, info, warn};

use crate::config::InvariantConfig;
use crate::curve::MeasuredCurve;
use crate::error::{InvariantError, Result};
use crate::fitter::common::Measurement;
use crate::fitter::extrapolation::{
    ExtrapolationMode, ExtrapolationRange, ExtrapolationSpec, FittedFunction,
};
use crate::invariant::result::{InvariantResult, Quantity};

// I(q) in cm⁻¹ with q in Å⁻¹ and contrast in Å⁻².
const UNIT_CONVERSION: f64 = 1.0e-8;

/// Partial invariant from one extrapolated tail.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrapolationOutcome {
    pub qstar: Measurement,
    /// Power-law exponent, or Guinier Rg.
    pub power: Measurement,
    pub function: FittedFunction,
    /// Integration limits used for this tail.
    pub q_range: (f64, f64),
}

/// What `evaluate` should compute besides the invariant itself.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComputeRequest {
    pub mode: ExtrapolationMode,
    pub contrast: Option<f64>,
    pub porod_constant: Option<f64>,
}

/// Computes the scattering invariant Q* = ∫ I(q) q² dq of a curve.
///
/// The calculator works on its own background/scale corrected copy of the
/// curve. Fits of the two tails are memoized until the matching
/// `set_extrapolation` call.
#[derive(Debug, Clone)]
pub struct InvariantCalculator {
    config: InvariantConfig,
    data: MeasuredCurve,
    background: f64,
    scale: f64,
    low: Option<ExtrapolationSpec>,
    high: Option<ExtrapolationSpec>,
    low_fit: Option<FittedFunction>,
    high_fit: Option<FittedFunction>,
    high_q_cap: Option<f64>,
}

impl InvariantCalculator {
    pub fn new(
        curve: &MeasuredCurve,
        background: f64,
        scale: f64,
        config: &InvariantConfig,
    ) -> Result<Self> {
        if !background.is_finite() {
            return Err(InvariantError::invalid(format!(
                "background must be finite, got {background}"
            )));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(InvariantError::invalid(format!(
                "scale must be finite and strictly positive, got {scale}"
            )));
        }
        config.validate()?;

        Ok(Self {
            config: config.clone(),
            data: curve.corrected(background, scale),
            background,
            scale,
            low: None,
            high: None,
            low_fit: None,
            high_fit: None,
            high_q_cap: None,
        })
    }

    /// Corrected working copy of the curve.
    pub fn data(&self) -> &MeasuredCurve {
        &self.data
    }

    pub fn background(&self) -> f64 {
        self.background
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn extrapolation(&self, range: ExtrapolationRange) -> Option<&ExtrapolationSpec> {
        match range {
            ExtrapolationRange::Low => self.low.as_ref(),
            ExtrapolationRange::High => self.high.as_ref(),
        }
    }

    pub fn set_extrapolation(
        &mut self,
        range: ExtrapolationRange,
        spec: ExtrapolationSpec,
    ) -> Result<()> {
        spec.validate(range, self.data.len())?;
        match range {
            ExtrapolationRange::Low => self.low = Some(spec),
            ExtrapolationRange::High => self.high = Some(spec),
        }
        *self.fit_slot(range) = None;
        Ok(())
    }

    pub fn clear_extrapolation(&mut self, range: ExtrapolationRange) {
        match range {
            ExtrapolationRange::Low => self.low = None,
            ExtrapolationRange::High => self.high = None,
        }
        *self.fit_slot(range) = None;
    }

    /// Overrides the upper limit of the high-q extrapolation; `None` restores
    /// the configured `q_maximum`.
    pub fn set_high_q_cap(&mut self, cap: Option<f64>) -> Result<()> {
        if let Some(cap) = cap {
            if !(cap.is_finite() && cap > self.data.q_max()) {
                return Err(InvariantError::invalid(format!(
                    "high-q cap {} must lie above the last measured q {}",
                    cap,
                    self.data.q_max()
                )));
            }
        }
        self.high_q_cap = cap;
        Ok(())
    }

    /// Lower integration limit of the low-q tail.
    pub fn low_q_limit(&self) -> f64 {
        let q_min = self.data.q_min();
        if self.config.q_minimum < q_min {
            self.config.q_minimum
        } else {
            q_min / 10.0
        }
    }

    /// Upper integration limit of the high-q tail.
    pub fn high_q_limit(&self) -> f64 {
        self.high_q_cap.unwrap_or(self.config.q_maximum)
    }

    /// Invariant over the measured range, composite trapezoid on the q grid.
    pub fn compute_qstar(&self) -> Result<Measurement> {
        let q = self.data.q();
        let i = self.data.i();
        let di = self.data.di();
        let n = q.len();
        if n < 2 {
            return Err(InvariantError::InsufficientData {
                needed: 2,
                found: n,
            });
        }

        let mut value = 0.0;
        let mut variance = 0.0;
        for k in 0..n {
            let dq = if k == 0 {
                0.5 * (q[1] - q[0])
            } else if k == n - 1 {
                0.5 * (q[n - 1] - q[n - 2])
            } else {
                0.5 * (q[k + 1] - q[k - 1])
            };
            // dQ*/dI_k
            let weight = q[k] * q[k] * dq;
            value += weight * i[k];
            variance += (weight * di[k]).powi(2);
        }

        Ok(Measurement::new(value, variance.sqrt()))
    }

    /// Invariant of the low-q tail, from `low_q_limit` to the first measured q.
    /// See `compute_high_q_extrapolation` for the errors.
    pub fn compute_low_q_extrapolation(&mut self) -> Result<ExtrapolationOutcome> {
        self.compute_extrapolation(ExtrapolationRange::Low)
    }

    /// Invariant of the high-q tail, from the last measured q to
    /// `high_q_limit`.
    ///
    /// Fails with `InvalidParameter` when no extrapolation is set for the
    /// tail or its integration range is empty. A tail whose corrected
    /// intensities are all zero or negative leaves nothing to fit and fails
    /// with `FitDegenerate`, as does a fit with too few positive points.
    /// Non-finite fit parameters or integrals are `ExtrapolationFailed`.
    pub fn compute_high_q_extrapolation(&mut self) -> Result<ExtrapolationOutcome> {
        self.compute_extrapolation(ExtrapolationRange::High)
    }

    fn compute_extrapolation(&mut self, range: ExtrapolationRange) -> Result<ExtrapolationOutcome> {
        let (start, end) = match range {
            ExtrapolationRange::Low => (self.low_q_limit(), self.data.q_min()),
            ExtrapolationRange::High => (self.data.q_max(), self.high_q_limit()),
        };
        check_range(range, start, end)?;

        let function = self.fitted(range)?.clone();
        let qstar = function.integrate_q2(start, end)?;
        debug!("{range} extrapolation over [{start}, {end}]: Q* = {qstar}");

        Ok(ExtrapolationOutcome {
            qstar,
            power: function.power(),
            function,
            q_range: (start, end),
        })
    }

    /// (q, I, dI) points of the fitted tail for plotting, dI being the fit
    /// uncertainty. They run from the low-q limit to the last fitted point,
    /// or from the first fitted point to
    /// `min(q_maximum_plot * q_max, q_maximum)`. An empty span is
    /// `InvalidParameter`.
    pub fn extrapolated_points(
        &mut self,
        range: ExtrapolationRange,
        npts: usize,
    ) -> Result<Vec<[f64; 3]>> {
        let point_count = self
            .extrapolation(range)
            .map(|spec| spec.point_count)
            .ok_or_else(|| missing_spec(range))?;
        let (start, end) = match range {
            ExtrapolationRange::Low => {
                let last_fitted = self.data.head(point_count).0[point_count - 1];
                (self.low_q_limit(), last_fitted)
            }
            ExtrapolationRange::High => {
                let first_fitted = self.data.tail(point_count).0[0];
                let plot_max = self.config.q_maximum_plot * self.data.q_max();
                (first_fitted, plot_max.min(self.config.q_maximum))
            }
        };
        check_range(range, start, end)?;
        let function = self.fitted(range)?;
        Ok(function.points(start, end, npts))
    }

    /// Measured-range invariant plus whichever tails `mode` asks for.
    pub fn get_qstar_total(&mut self, mode: ExtrapolationMode) -> Result<Measurement> {
        let mut parts = vec![self.compute_qstar()?];
        if mode.includes(ExtrapolationRange::Low) {
            parts.push(self.compute_low_q_extrapolation()?.qstar);
        }
        if mode.includes(ExtrapolationRange::High) {
            parts.push(self.compute_high_q_extrapolation()?.qstar);
        }
        Ok(Measurement::quadrature_sum(&parts))
    }

    pub fn get_volume_fraction(
        &mut self,
        contrast: f64,
        mode: ExtrapolationMode,
    ) -> Result<Measurement> {
        check_contrast(contrast)?;
        let qstar = self.get_qstar_total(mode)?;
        volume_fraction(qstar, contrast)
    }

    pub fn get_surface(
        &mut self,
        contrast: f64,
        porod_constant: f64,
        mode: ExtrapolationMode,
    ) -> Result<Measurement> {
        check_contrast(contrast)?;
        check_porod_constant(porod_constant)?;
        let qstar = self.get_qstar_total(mode)?;
        specific_surface(qstar, contrast, porod_constant)
    }

    /// Computes every quantity independently. A failing part becomes an
    /// ERROR marker and the total sums whatever succeeded.
    pub fn evaluate(&mut self, request: &ComputeRequest) -> InvariantResult {
        let partial = self.compute_qstar();
        let low = request
            .mode
            .includes(ExtrapolationRange::Low)
            .then(|| self.compute_low_q_extrapolation());
        let high = request
            .mode
            .includes(ExtrapolationRange::High)
            .then(|| self.compute_high_q_extrapolation());

        let power_low = low.as_ref().and_then(|r| r.as_ref().ok()).map(|o| o.power);
        let power_high = high.as_ref().and_then(|r| r.as_ref().ok()).map(|o| o.power);

        let qstar_partial = Quantity::from_result(partial);
        let qstar_low = tail_quantity(ExtrapolationRange::Low, low);
        let qstar_high = tail_quantity(ExtrapolationRange::High, high);

        let qstar_total = match qstar_partial.value() {
            Some(measured) => {
                let parts: Vec<Measurement> =
                    [Some(measured), qstar_low.value(), qstar_high.value()]
                        .into_iter()
                        .flatten()
                        .collect();
                Quantity::Value(Measurement::quadrature_sum(&parts))
            }
            None => {
                Quantity::Error("invariant over the measured range is unavailable".to_owned())
            }
        };

        let phi = match (qstar_total.value(), request.contrast) {
            (_, None) => Quantity::NotComputed,
            (Some(total), Some(contrast)) => {
                Quantity::from_result(volume_fraction(total, contrast))
            }
            (None, Some(_)) => Quantity::Error("total invariant is unavailable".to_owned()),
        };
        let surface = match (qstar_total.value(), request.contrast, request.porod_constant) {
            (_, None, _) | (_, _, None) => Quantity::NotComputed,
            (Some(total), Some(contrast), Some(porod)) => {
                Quantity::from_result(specific_surface(total, contrast, porod))
            }
            (None, Some(_), Some(_)) => {
                Quantity::Error("total invariant is unavailable".to_owned())
            }
        };

        if let Quantity::Error(msg) = &phi {
            warn!("Error occurred computing volume fraction: {msg}");
        }
        if let Quantity::Error(msg) = &surface {
            warn!("Error occurred computing specific surface: {msg}");
        }

        let result = InvariantResult {
            mode: request.mode,
            qstar_partial,
            qstar_low,
            qstar_high,
            qstar_total,
            volume_fraction: phi,
            specific_surface: surface,
            power_low,
            power_high,
        };
        info!(
            "Invariant computed for {} ({:?}): Q* total = {}",
            self.data.name(),
            request.mode,
            result.qstar_total
        );
        result
    }

    fn fit_slot(&mut self, range: ExtrapolationRange) -> &mut Option<FittedFunction> {
        match range {
            ExtrapolationRange::Low => &mut self.low_fit,
            ExtrapolationRange::High => &mut self.high_fit,
        }
    }

    fn fitted(&mut self, range: ExtrapolationRange) -> Result<&FittedFunction> {
        if self.fit_slot(range).is_none() {
            let function = self.fit_edge(range)?;
            *self.fit_slot(range) = Some(function);
        }
        self.fit_slot(range).as_ref().ok_or_else(|| {
            InvariantError::ExtrapolationFailed(format!("{range} fit was not stored"))
        })
    }

    fn fit_edge(&self, range: ExtrapolationRange) -> Result<FittedFunction> {
        let spec = *self.extrapolation(range).ok_or_else(|| missing_spec(range))?;
        let (q, i, di) = match range {
            ExtrapolationRange::Low => self.data.head(spec.point_count),
            ExtrapolationRange::High => self.data.tail(spec.point_count),
        };
        let function = FittedFunction::fit(&spec, q, i, di, self.config.integration_steps)?;
        if !function.parameters_are_finite() {
            return Err(InvariantError::ExtrapolationFailed(format!(
                "{} fit at {} produced non-finite parameters",
                spec.function, range
            )));
        }
        debug!(
            "Fitted {} at {} over {} points: power = {}",
            spec.function,
            range,
            q.len(),
            function.power()
        );
        Ok(function)
    }
}

/// Volume fraction φ from φ(1 - φ) = Q* / (2π² Δρ²), taking the root in
/// [0, 1/2].
pub fn volume_fraction(qstar: Measurement, contrast: f64) -> Result<Measurement> {
    check_contrast(contrast)?;
    if !(qstar.value > 0.0) {
        return Err(InvariantError::invalid(format!(
            "invariant must be positive to get a volume fraction, got {}",
            qstar.value
        )));
    }
    let k = UNIT_CONVERSION * qstar.value / (2.0 * (PI * contrast).powi(2));
    let discriminant = 1.0 - 4.0 * k;
    if !(discriminant > 0.0) {
        return Err(InvariantError::invalid(format!(
            "invariant {} is too large for contrast {}",
            qstar.value, contrast
        )));
    }
    let root = discriminant.sqrt();
    let phi = 0.5 * (1.0 - root);
    // dφ/dk = 1 / root and dk = k dQ*/Q*
    let uncertainty = k * qstar.relative_uncertainty() / root;
    Ok(Measurement::new(phi, uncertainty))
}

/// Specific surface S = 2π C φ(1 - φ) / Q* for a Porod constant C.
pub fn specific_surface(
    qstar: Measurement,
    contrast: f64,
    porod_constant: f64,
) -> Result<Measurement> {
    check_porod_constant(porod_constant)?;
    let phi = volume_fraction(qstar, contrast)?;
    let v = phi.value;
    let prefactor = 2.0 * PI * porod_constant / qstar.value;
    let value = prefactor * v * (1.0 - v);
    let uncertainty = prefactor
        * ((phi.uncertainty * (1.0 - 2.0 * v)).powi(2)
            + (v * (1.0 - v) * qstar.relative_uncertainty()).powi(2))
        .sqrt();
    Ok(Measurement::new(value, uncertainty))
}

fn check_contrast(contrast: f64) -> Result<()> {
    if !(contrast.is_finite() && contrast > 0.0) {
        return Err(InvariantError::invalid(format!(
            "contrast must be strictly positive, got {contrast}"
        )));
    }
    Ok(())
}

fn check_porod_constant(porod_constant: f64) -> Result<()> {
    if !(porod_constant.is_finite() && porod_constant > 0.0) {
        return Err(InvariantError::invalid(format!(
            "Porod constant must be strictly positive, got {porod_constant}"
        )));
    }
    Ok(())
}

fn check_range(range: ExtrapolationRange, start: f64, end: f64) -> Result<()> {
    if !(end > start) {
        return Err(InvariantError::invalid(format!(
            "{range} extrapolation range [{start}, {end}] is empty"
        )));
    }
    Ok(())
}

fn missing_spec(range: ExtrapolationRange) -> InvariantError {
    InvariantError::invalid(format!("no {range} extrapolation has been set"))
}

fn tail_quantity(
    range: ExtrapolationRange,
    outcome: Option<Result<ExtrapolationOutcome>>,
) -> Quantity {
    match outcome {
        None => Quantity::NotComputed,
        Some(Ok(o)) => Quantity::from_result(Ok(o.qstar)),
        Some(Err(e)) => {
            warn!("Error occurred computing {range} invariant: {e}");
            Quantity::Error(e.to_string())
        }
    }
}
