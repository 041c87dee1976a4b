use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::InvariantConfig;
use crate::curve::MeasuredCurve;
use crate::error::{InvariantError, Result};
use crate::fitter::extrapolation::ExtrapolationRange;
use crate::invariant::calculator::InvariantCalculator;
use crate::invariant::result::{InvariantResult, Quantity};
use crate::session::inputs::{FieldValue, InputField, InvariantInputs};

/// The inputs a compute ran with and what it produced.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ComputeRecord {
    pub inputs: InvariantInputs,
    pub result: InvariantResult,
    pub timestamp: DateTime<Utc>,
}

/// One numbered state of the history.
///
/// `compute_num` is the state whose compute produced the result visible
/// here. Only entries created by a compute (or a recalled computed bookmark)
/// carry a record, and for those `compute_num` is their own number.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HistoryEntry {
    pub inputs: InvariantInputs,
    pub compute_num: usize,
    pub computed: Option<ComputeRecord>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Bookmark {
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    pub inputs: InvariantInputs,
    pub computed: Option<ComputeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Empty,
    Ready,
    Computed,
}

/// Invariant analysis of one curve with undo/redo and bookmarks.
///
/// The history is dense: state numbers are the indices of `history`. Any
/// change made while the pointer is below the last state drops the states
/// above it first. Bookmarks live outside the history and survive that.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantSession {
    pub(super) config: InvariantConfig,
    pub(super) curve: Option<MeasuredCurve>,
    pub(super) history: Vec<HistoryEntry>,
    pub(super) current: usize,
    pub(super) bookmarks: Vec<Bookmark>,
    pub(super) next_bookmark_id: u32,
}

impl InvariantSession {
    pub fn new(config: InvariantConfig) -> Self {
        Self {
            config,
            curve: None,
            history: Vec::new(),
            current: 0,
            bookmarks: Vec::new(),
            next_bookmark_id: 1,
        }
    }

    pub fn config(&self) -> &InvariantConfig {
        &self.config
    }

    /// Starts a fresh history for `curve` with default inputs.
    pub fn load_curve(&mut self, curve: MeasuredCurve) {
        info!(
            "Loaded curve '{}' ({} points, q {} to {})",
            curve.name(),
            curve.len(),
            curve.q_min(),
            curve.q_max()
        );
        let inputs = InvariantInputs::from_config(&self.config);
        self.curve = Some(curve);
        self.history = vec![HistoryEntry {
            inputs,
            compute_num: 0,
            computed: None,
        }];
        self.current = 0;
        self.bookmarks.clear();
        self.next_bookmark_id = 1;
    }

    pub fn clear(&mut self) {
        info!("Session cleared");
        self.curve = None;
        self.history.clear();
        self.current = 0;
        self.bookmarks.clear();
        self.next_bookmark_id = 1;
    }

    /// Records a new state with one input changed. Does not compute.
    pub fn edit(&mut self, field: InputField, value: FieldValue) -> Result<()> {
        let entry = self.current_entry()?;
        let mut inputs = entry.inputs.clone();
        inputs.set(field, value)?;
        let compute_num = entry.compute_num;

        self.push_state(HistoryEntry {
            inputs,
            compute_num,
            computed: None,
        });
        debug!("Edited {field} = {value} (state {})", self.current);
        Ok(())
    }

    pub fn edit_by_name(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let field: InputField = name.parse()?;
        self.edit(field, value)
    }

    /// Runs the calculator on the current inputs and records the result as
    /// a new state.
    pub fn compute(&mut self) -> Result<InvariantResult> {
        let inputs = self.current_entry()?.inputs.clone();
        let mut calculator = self.calculator(&inputs)?;

        let mut rejected = Vec::new();
        for range in [ExtrapolationRange::Low, ExtrapolationRange::High] {
            if let Some(spec) = inputs.extrapolation_spec(range) {
                if let Err(e) = calculator.set_extrapolation(range, spec) {
                    warn!("Rejected {range} extrapolation: {e}");
                    rejected.push((range, e.to_string()));
                }
            }
        }

        let mut result = calculator.evaluate(&inputs.compute_request());
        for (range, msg) in rejected {
            match range {
                ExtrapolationRange::Low => result.qstar_low = Quantity::Error(msg),
                ExtrapolationRange::High => result.qstar_high = Quantity::Error(msg),
            }
        }

        let state = self.current + 1;
        self.push_state(HistoryEntry {
            inputs: inputs.clone(),
            compute_num: state,
            computed: Some(ComputeRecord {
                inputs,
                result: result.clone(),
                timestamp: Utc::now(),
            }),
        });
        info!("Computed state {}", self.current);
        Ok(result)
    }

    pub fn undo(&mut self) -> Result<()> {
        self.current_entry()?;
        if self.current == 0 {
            return Err(InvariantError::AtHistoryStart);
        }
        self.current -= 1;
        debug!("Undo to state {}", self.current);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.current_entry()?;
        if self.current + 1 >= self.history.len() {
            return Err(InvariantError::AtHistoryEnd);
        }
        self.current += 1;
        debug!("Redo to state {}", self.current);
        Ok(())
    }

    /// Stores the current inputs and visible result in the ledger and
    /// returns the new bookmark id.
    pub fn bookmark(&mut self) -> Result<u32> {
        let entry = self.current_entry()?;
        let computed = self.history[entry.compute_num].computed.clone();
        let bookmark = Bookmark {
            id: self.next_bookmark_id,
            timestamp: Utc::now(),
            inputs: entry.inputs.clone(),
            computed,
        };
        let id = bookmark.id;
        self.bookmarks.push(bookmark);
        self.next_bookmark_id += 1;
        info!("Bookmark {id} saved at state {}", self.current);
        Ok(id)
    }

    /// Makes a bookmarked state current by appending it to the history.
    pub fn recall_bookmark(&mut self, id: u32) -> Result<()> {
        let inherited = self.current_entry()?.compute_num;
        let bookmark = self
            .bookmarks
            .iter()
            .find(|b| b.id == id)
            .ok_or(InvariantError::UnknownBookmark(id))?;

        let state = self.current + 1;
        let entry = HistoryEntry {
            inputs: bookmark.inputs.clone(),
            compute_num: if bookmark.computed.is_some() { state } else { inherited },
            computed: bookmark.computed.clone(),
        };
        self.push_state(entry);
        info!("Bookmark {id} recalled as state {}", self.current);
        Ok(())
    }

    /// Plot points of one extrapolated tail for the current inputs.
    pub fn extrapolation_points(&self, range: ExtrapolationRange) -> Result<Vec<[f64; 3]>> {
        let inputs = &self.current_entry()?.inputs;
        let spec = inputs.extrapolation_spec(range).ok_or_else(|| {
            InvariantError::invalid(format!("{range} extrapolation is not enabled"))
        })?;
        let mut calculator = self.calculator(inputs)?;
        calculator.set_extrapolation(range, spec)?;
        calculator.extrapolated_points(range, self.config.plot_points)
    }

    pub fn phase(&self) -> SessionPhase {
        match self.current_entry() {
            Err(_) => SessionPhase::Empty,
            Ok(entry) if self.history[entry.compute_num].computed.is_some() => {
                SessionPhase::Computed
            }
            Ok(_) => SessionPhase::Ready,
        }
    }

    pub fn current_state_num(&self) -> Option<usize> {
        self.curve.as_ref().map(|_| self.current)
    }

    pub fn max_state_num(&self) -> Option<usize> {
        self.history.len().checked_sub(1)
    }

    pub fn inputs(&self) -> Option<&InvariantInputs> {
        self.current_entry().ok().map(|e| &e.inputs)
    }

    /// Result visible at the current state.
    pub fn current_result(&self) -> Option<&InvariantResult> {
        let entry = self.current_entry().ok()?;
        self.history[entry.compute_num].computed.as_ref().map(|c| &c.result)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn can_undo(&self) -> bool {
        self.curve.is_some() && self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.curve.is_some() && self.current + 1 < self.history.len()
    }

    pub fn curve(&self) -> Option<&MeasuredCurve> {
        self.curve.as_ref()
    }

    fn current_entry(&self) -> Result<&HistoryEntry> {
        if self.curve.is_none() {
            return Err(InvariantError::NoCurveLoaded);
        }
        self.history
            .get(self.current)
            .ok_or(InvariantError::NoCurveLoaded)
    }

    fn calculator(&self, inputs: &InvariantInputs) -> Result<InvariantCalculator> {
        let curve = self.curve.as_ref().ok_or(InvariantError::NoCurveLoaded)?;
        InvariantCalculator::new(curve, inputs.background, inputs.scale, &self.config)
    }

    // Drops every state above the pointer, then appends `entry` as current.
    fn push_state(&mut self, entry: HistoryEntry) {
        let dropped = self.history.len().saturating_sub(self.current + 1);
        if dropped > 0 {
            debug!("Discarding {dropped} states above state {}", self.current);
        }
        self.history.truncate(self.current + 1);
        self.history.push(entry);
        self.current = self.history.len() - 1;
    }
}
