use std::fmt;

use crate::fitter::extrapolation::ExtrapolationModel;
use crate::session::state::{InvariantSession, SessionPhase};

/// Plain-text summary of a session: the curve, the inputs, the visible result
/// and the bookmark ledger.
pub struct SessionReport<'a> {
    session: &'a InvariantSession,
}

impl InvariantSession {
    pub fn report(&self) -> SessionReport<'_> {
        SessionReport { session: self }
    }
}

impl fmt::Display for SessionReport<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session;
        let (Some(curve), Some(inputs)) = (session.curve(), session.inputs()) else {
            return writeln!(out, "No curve loaded");
        };

        writeln!(out, "Invariant report: {}", curve.name())?;
        writeln!(
            out,
            "Data: {} points, q from {} to {}",
            curve.len(),
            curve.q_min(),
            curve.q_max()
        )?;
        writeln!(
            out,
            "State {} of {}",
            session.current_state_num().unwrap_or(0),
            session.max_state_num().unwrap_or(0)
        )?;
        writeln!(out)?;

        writeln!(out, "Background:        {}", inputs.background)?;
        writeln!(out, "Scale:             {}", inputs.scale)?;
        writeln!(out, "Contrast:          {}", optional(inputs.contrast))?;
        writeln!(out, "Porod constant:    {}", optional(inputs.porod_constant))?;
        if inputs.low_enabled {
            let power = match inputs.low_function {
                ExtrapolationModel::Guinier => String::new(),
                ExtrapolationModel::PowerLaw if inputs.low_fit_power => {
                    ", fitted power".to_owned()
                }
                ExtrapolationModel::PowerLaw => format!(", power {}", inputs.low_power),
            };
            writeln!(
                out,
                "Low-q:             {} on {} points{}",
                inputs.low_function, inputs.low_point_count, power
            )?;
        }
        if inputs.high_enabled {
            let power = if inputs.high_fit_power {
                "fitted power".to_owned()
            } else {
                format!("power {}", inputs.high_power)
            };
            writeln!(
                out,
                "High-q:            power_law on {} points, {}",
                inputs.high_point_count, power
            )?;
        }
        writeln!(out)?;

        match (session.phase(), session.current_result()) {
            (SessionPhase::Computed, Some(result)) => {
                writeln!(out, "{result}")?;
                let c = result.contributions();
                writeln!(
                    out,
                    "Contributions:     data {}, low-q {}, high-q {}",
                    percent(c.partial),
                    percent(c.low),
                    percent(c.high)
                )?;
            }
            _ => writeln!(out, "Not computed")?,
        }

        if !session.bookmarks().is_empty() {
            writeln!(out)?;
            writeln!(out, "Bookmarks:")?;
            for bookmark in session.bookmarks() {
                let status = if bookmark.computed.is_some() {
                    "computed"
                } else {
                    "inputs only"
                };
                writeln!(
                    out,
                    "  {:>3}  {}  {}",
                    bookmark.id,
                    bookmark.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    status
                )?;
            }
        }
        Ok(())
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| format!("{v:.1}%"))
}
