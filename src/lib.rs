//! Scattering invariant of small-angle scattering curves, with low- and
//! high-q extrapolation and an undo/redo analysis session.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod curve;
pub mod error;
pub mod fit_problem;
pub mod fitter;
pub mod invariant;
pub mod session;

pub use config::InvariantConfig;
pub use curve::MeasuredCurve;
pub use error::{InvariantError, Result};
pub use fitter::common::Measurement;
pub use fitter::extrapolation::{
    ExtrapolationMode, ExtrapolationModel, ExtrapolationRange, ExtrapolationSpec,
};
pub use invariant::calculator::{ComputeRequest, InvariantCalculator};
pub use invariant::result::{InvariantResult, Quantity};
pub use session::inputs::{FieldValue, InputField, InvariantInputs};
pub use session::persist::SessionDocument;
pub use session::report::SessionReport;
pub use session::state::{InvariantSession, SessionPhase};
