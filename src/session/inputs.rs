use std::fmt;
use std::str::FromStr;

use crate::config::InvariantConfig;
use crate::error::{InvariantError, Result};
use crate::fitter::extrapolation::{
    ExtrapolationMode, ExtrapolationModel, ExtrapolationRange, ExtrapolationSpec,
};
use crate::invariant::calculator::ComputeRequest;

/// Everything a user can set before computing the invariant.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct InvariantInputs {
    pub background: f64,
    pub scale: f64,
    pub contrast: Option<f64>,
    pub porod_constant: Option<f64>,

    pub low_enabled: bool,
    pub low_function: ExtrapolationModel,
    /// Fit the low-q power instead of holding it at `low_power`.
    pub low_fit_power: bool,
    pub low_power: f64,
    pub low_point_count: usize,

    pub high_enabled: bool,
    pub high_fit_power: bool,
    pub high_power: f64,
    pub high_point_count: usize,
}

impl InvariantInputs {
    pub fn from_config(config: &InvariantConfig) -> Self {
        Self {
            background: config.background,
            scale: config.scale,
            contrast: Some(config.contrast),
            porod_constant: None,
            low_enabled: false,
            low_function: ExtrapolationModel::Guinier,
            low_fit_power: true,
            low_power: config.power,
            low_point_count: config.point_count,
            high_enabled: false,
            high_fit_power: true,
            high_power: config.power,
            high_point_count: config.point_count,
        }
    }

    pub fn get(&self, field: InputField) -> FieldValue {
        let optional = |v: Option<f64>| v.map_or(FieldValue::Cleared, FieldValue::Number);
        match field {
            InputField::Background => FieldValue::Number(self.background),
            InputField::Scale => FieldValue::Number(self.scale),
            InputField::Contrast => optional(self.contrast),
            InputField::PorodConstant => optional(self.porod_constant),
            InputField::LowEnabled => FieldValue::Flag(self.low_enabled),
            InputField::LowFunction => FieldValue::Model(self.low_function),
            InputField::LowFitPower => FieldValue::Flag(self.low_fit_power),
            InputField::LowPower => FieldValue::Number(self.low_power),
            InputField::LowPointCount => FieldValue::Count(self.low_point_count),
            InputField::HighEnabled => FieldValue::Flag(self.high_enabled),
            InputField::HighFitPower => FieldValue::Flag(self.high_fit_power),
            InputField::HighPower => FieldValue::Number(self.high_power),
            InputField::HighPointCount => FieldValue::Count(self.high_point_count),
        }
    }

    /// Overwrites one field. The value must have the field's type, numbers
    /// must be finite and point counts at least 1.
    pub fn set(&mut self, field: InputField, value: FieldValue) -> Result<()> {
        let mismatch = || {
            InvariantError::invalid(format!("{value} is not a valid value for {field}"))
        };
        if let FieldValue::Number(x) = value {
            if !x.is_finite() {
                return Err(InvariantError::invalid(format!(
                    "{field} must be finite, got {x}"
                )));
            }
        }

        match (field, value) {
            (InputField::Background, FieldValue::Number(x)) => self.background = x,
            (InputField::Scale, FieldValue::Number(x)) => self.scale = x,
            (InputField::Contrast, FieldValue::Number(x)) => self.contrast = Some(x),
            (InputField::Contrast, FieldValue::Cleared) => self.contrast = None,
            (InputField::PorodConstant, FieldValue::Number(x)) => self.porod_constant = Some(x),
            (InputField::PorodConstant, FieldValue::Cleared) => self.porod_constant = None,
            (InputField::LowEnabled, FieldValue::Flag(b)) => self.low_enabled = b,
            (InputField::LowFunction, FieldValue::Model(m)) => self.low_function = m,
            (InputField::LowFitPower, FieldValue::Flag(b)) => self.low_fit_power = b,
            (InputField::LowPower, FieldValue::Number(x)) => self.low_power = x,
            (InputField::HighEnabled, FieldValue::Flag(b)) => self.high_enabled = b,
            (InputField::HighFitPower, FieldValue::Flag(b)) => self.high_fit_power = b,
            (InputField::HighPower, FieldValue::Number(x)) => self.high_power = x,
            (InputField::LowPointCount | InputField::HighPointCount, FieldValue::Count(0)) => {
                return Err(InvariantError::invalid(format!(
                    "{field} must be at least 1"
                )));
            }
            (InputField::LowPointCount, FieldValue::Count(n)) => self.low_point_count = n,
            (InputField::HighPointCount, FieldValue::Count(n)) => self.high_point_count = n,
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    pub fn mode(&self) -> ExtrapolationMode {
        ExtrapolationMode::from_flags(self.low_enabled, self.high_enabled)
    }

    /// The extrapolation requested for `range`, if that tail is enabled.
    pub fn extrapolation_spec(&self, range: ExtrapolationRange) -> Option<ExtrapolationSpec> {
        match range {
            ExtrapolationRange::Low if self.low_enabled => Some(match self.low_function {
                ExtrapolationModel::Guinier => ExtrapolationSpec::guinier(self.low_point_count),
                ExtrapolationModel::PowerLaw => ExtrapolationSpec::power_law(
                    self.low_point_count,
                    (!self.low_fit_power).then_some(self.low_power),
                ),
            }),
            ExtrapolationRange::High if self.high_enabled => Some(ExtrapolationSpec::power_law(
                self.high_point_count,
                (!self.high_fit_power).then_some(self.high_power),
            )),
            _ => None,
        }
    }

    pub fn compute_request(&self) -> ComputeRequest {
        ComputeRequest {
            mode: self.mode(),
            contrast: self.contrast,
            porod_constant: self.porod_constant,
        }
    }
}

impl Default for InvariantInputs {
    fn default() -> Self {
        Self::from_config(&InvariantConfig::default())
    }
}

/// Identifies one editable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum InputField {
    Background,
    Scale,
    Contrast,
    PorodConstant,
    LowEnabled,
    LowFunction,
    LowFitPower,
    LowPower,
    LowPointCount,
    HighEnabled,
    HighFitPower,
    HighPower,
    HighPointCount,
}

impl InputField {
    pub const ALL: [InputField; 13] = [
        Self::Background,
        Self::Scale,
        Self::Contrast,
        Self::PorodConstant,
        Self::LowEnabled,
        Self::LowFunction,
        Self::LowFitPower,
        Self::LowPower,
        Self::LowPointCount,
        Self::HighEnabled,
        Self::HighFitPower,
        Self::HighPower,
        Self::HighPointCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Scale => "scale",
            Self::Contrast => "contrast",
            Self::PorodConstant => "porod_constant",
            Self::LowEnabled => "low_enabled",
            Self::LowFunction => "low_function",
            Self::LowFitPower => "low_fit_power",
            Self::LowPower => "low_power",
            Self::LowPointCount => "low_point_count",
            Self::HighEnabled => "high_enabled",
            Self::HighFitPower => "high_fit_power",
            Self::HighPower => "high_power",
            Self::HighPointCount => "high_point_count",
        }
    }
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for InputField {
    type Err = InvariantError;

    /// Accepts the field names and the widget names used by the panel.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let field = match name {
            "background_tcl" => Self::Background,
            "scale_tcl" => Self::Scale,
            "contrast_tcl" => Self::Contrast,
            "porod_constant_tcl" => Self::PorodConstant,
            "enable_low_cbox" => Self::LowEnabled,
            "guinier" => Self::LowFunction,
            "fit_enable_low" => Self::LowFitPower,
            "power_low_tcl" => Self::LowPower,
            "npts_low_tcl" => Self::LowPointCount,
            "enable_high_cbox" => Self::HighEnabled,
            "fit_enable_high" => Self::HighFitPower,
            "power_high_tcl" => Self::HighPower,
            "npts_high_tcl" => Self::HighPointCount,
            _ => {
                return Self::ALL
                    .into_iter()
                    .find(|f| f.name() == name)
                    .ok_or_else(|| {
                        InvariantError::invalid(format!("unknown input field '{name}'"))
                    });
            }
        };
        Ok(field)
    }
}

/// A value for `InvariantInputs::set`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Count(usize),
    Model(ExtrapolationModel),
    /// Unsets an optional number.
    Cleared,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(x) => write!(f, "{x}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Model(m) => write!(f, "{m}"),
            Self::Cleared => write!(f, "<cleared>"),
        }
    }
}
