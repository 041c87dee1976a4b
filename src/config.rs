use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{InvariantError, Result};

/// Limits and defaults used by the invariant calculator and the session.
///
/// Every key is optional in a YAML file; anything missing falls back to the
/// value from `Default`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct InvariantConfig {
    /// Smallest q used when extrapolating towards zero.
    pub q_minimum: f64,
    /// Largest q used when extrapolating towards infinity.
    pub q_maximum: f64,
    /// Ratio of the high-q plot end to the largest measured q.
    pub q_maximum_plot: f64,
    /// Number of edge points used for an extrapolation fit.
    pub point_count: usize,
    pub background: f64,
    pub scale: f64,
    pub contrast: f64,
    /// Power-law exponent used when the power is fixed.
    pub power: f64,
    /// Simpson intervals for integrals without a closed form.
    pub integration_steps: usize,
    /// Points generated for extrapolated plot curves.
    pub plot_points: usize,
}

impl Default for InvariantConfig {
    fn default() -> Self {
        Self {
            q_minimum: 1e-5,
            q_maximum: 10.0,
            q_maximum_plot: 3.0,
            point_count: 10,
            background: 0.0,
            scale: 1.0,
            contrast: 1.0,
            power: 4.0,
            integration_steps: 1000,
            plot_points: 500,
        }
    }
}

impl InvariantConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.q_minimum.is_finite() && self.q_minimum > 0.0) {
            return Err(InvariantError::invalid(format!(
                "q_minimum must be positive, got {}",
                self.q_minimum
            )));
        }
        if !(self.q_maximum.is_finite() && self.q_maximum > self.q_minimum) {
            return Err(InvariantError::invalid(format!(
                "q_maximum ({}) must be larger than q_minimum ({})",
                self.q_maximum, self.q_minimum
            )));
        }
        if !(self.q_maximum_plot.is_finite() && self.q_maximum_plot >= 1.0) {
            return Err(InvariantError::invalid(
                "q_maximum_plot must be at least 1",
            ));
        }
        if self.point_count == 0 || self.integration_steps == 0 || self.plot_points < 2 {
            return Err(InvariantError::invalid(
                "point_count and integration_steps must be non-zero, plot_points at least 2",
            ));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(InvariantError::invalid("default scale must be positive"));
        }
        Ok(())
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_yaml(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        log::info!("Loaded invariant configuration from {}", path.display());
        Ok(config)
    }
}
