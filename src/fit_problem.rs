use std::collections::BTreeMap;

use log::debug;

use crate::curve::MeasuredCurve;
use crate::error::{InvariantError, Result};

/// How the uncertainties of the fit data are chosen.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum FitWeighting {
    /// Every point weighted equally.
    None,
    /// The measured dI.
    #[default]
    Measured,
    SqrtIntensity,
    AbsIntensity,
}

impl FitWeighting {
    pub fn weights(&self, curve: &MeasuredCurve) -> Vec<f64> {
        match self {
            Self::None => vec![1.0; curve.len()],
            Self::Measured => curve.di().to_vec(),
            Self::SqrtIntensity => curve.i().iter().map(|i| i.abs().sqrt()).collect(),
            Self::AbsIntensity => curve.i().iter().map(|i| i.abs()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ModelParameter {
    pub name: String,
    pub value: Option<f64>,
}

/// Parameters and goodness of fit reported by the optimizer.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitOutcome {
    pub parameters: Vec<ModelParameter>,
    pub chi2: Option<f64>,
}

/// Settings shared by a single fit problem and a set of them.
pub trait FitProblemComponent {
    fn enable_smearing(&mut self, enabled: bool);
    fn set_model(&mut self, model: Option<String>);
    fn set_model_param(&mut self, name: &str, value: Option<f64>);
    fn clear_model_param(&mut self);
    fn set_param_to_fit(&mut self, names: Vec<String>);
    fn param_to_fit(&self) -> &[String];
    fn schedule_to_fit(&mut self, scheduled: bool);
    fn is_scheduled(&self) -> bool;
    fn set_range(&mut self, q_min: Option<f64>, q_max: Option<f64>) -> Result<()>;
    fn set_weighting(&mut self, weighting: FitWeighting) -> Result<()>;
    fn set_graph_id(&mut self, id: Option<u64>);
    fn graph_id(&self) -> Option<u64>;
    fn set_fit_tab_caption(&mut self, caption: &str);
    fn fit_tab_caption(&self) -> &str;
}

/// Links one data set with the model fitted to it.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitProblem {
    /// Data as given; weighting always starts from this copy.
    original_data: Option<MeasuredCurve>,
    fit_data: Option<MeasuredCurve>,
    pub theory_data: Option<MeasuredCurve>,
    pub residuals: Option<MeasuredCurve>,
    model: Option<String>,
    pub model_name: String,
    params: Vec<ModelParameter>,
    param_to_fit: Vec<String>,
    scheduled: bool,
    smearing_enabled: bool,
    q_range: (Option<f64>, Option<f64>),
    weighting: FitWeighting,
    graph_id: Option<u64>,
    caption: String,
    pub result: Option<FitOutcome>,
}

impl FitProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fit_data(&mut self, data: MeasuredCurve) -> Result<()> {
        self.original_data = Some(data);
        self.apply_weighting()
    }

    pub fn fit_data(&self) -> Option<&MeasuredCurve> {
        self.fit_data.as_ref()
    }

    pub fn original_data(&self) -> Option<&MeasuredCurve> {
        self.original_data.as_ref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn model_params(&self) -> &[ModelParameter] {
        &self.params
    }

    pub fn smearing_enabled(&self) -> bool {
        self.smearing_enabled
    }

    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        self.q_range
    }

    pub fn weighting(&self) -> FitWeighting {
        self.weighting
    }

    /// Number of fit points inside the current q range.
    pub fn points_in_range(&self) -> usize {
        let Some(data) = &self.fit_data else {
            return 0;
        };
        let (q_min, q_max) = self.q_range;
        data.q()
            .iter()
            .filter(|&&q| q_min.is_none_or(|lo| q >= lo) && q_max.is_none_or(|hi| q <= hi))
            .count()
    }

    fn apply_weighting(&mut self) -> Result<()> {
        self.fit_data = match &self.original_data {
            Some(data) => Some(MeasuredCurve::new(
                data.name(),
                data.q().to_vec(),
                data.i().to_vec(),
                self.weighting.weights(data),
            )?),
            None => None,
        };
        Ok(())
    }
}

impl FitProblemComponent for FitProblem {
    fn enable_smearing(&mut self, enabled: bool) {
        self.smearing_enabled = enabled;
    }

    fn set_model(&mut self, model: Option<String>) {
        self.model = model;
    }

    fn set_model_param(&mut self, name: &str, value: Option<f64>) {
        self.params.push(ModelParameter {
            name: name.to_owned(),
            value,
        });
    }

    fn clear_model_param(&mut self) {
        self.params.clear();
    }

    fn set_param_to_fit(&mut self, names: Vec<String>) {
        self.param_to_fit = names;
    }

    fn param_to_fit(&self) -> &[String] {
        &self.param_to_fit
    }

    fn schedule_to_fit(&mut self, scheduled: bool) {
        self.scheduled = scheduled;
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    fn set_range(&mut self, q_min: Option<f64>, q_max: Option<f64>) -> Result<()> {
        check_range(q_min, q_max)?;
        self.q_range = (q_min, q_max);
        Ok(())
    }

    fn set_weighting(&mut self, weighting: FitWeighting) -> Result<()> {
        let previous = self.weighting;
        self.weighting = weighting;
        if let Err(e) = self.apply_weighting() {
            self.weighting = previous;
            return Err(e);
        }
        Ok(())
    }

    fn set_graph_id(&mut self, id: Option<u64>) {
        self.graph_id = id;
    }

    fn graph_id(&self) -> Option<u64> {
        self.graph_id
    }

    fn set_fit_tab_caption(&mut self, caption: &str) {
        self.caption = caption.to_owned();
    }

    fn fit_tab_caption(&self) -> &str {
        &self.caption
    }
}

/// Fit problems keyed by data id (the curve name). Component calls apply to
/// every problem; use `problem_mut` to address a single one.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitProblemDictionary {
    problems: BTreeMap<String, FitProblem>,
    model: Option<String>,
    param_to_fit: Vec<String>,
    scheduled: bool,
    q_range: (Option<f64>, Option<f64>),
    graph_id: Option<u64>,
    caption: String,
    pub result: Option<Vec<FitOutcome>>,
}

impl FitProblemDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `data`, creating its problem if the id is new. Only the data of
    /// an existing problem changes.
    pub fn add_data(&mut self, data: MeasuredCurve) -> Result<()> {
        let id = data.name().to_owned();
        debug!("Adding fit data '{id}'");
        self.problems.entry(id).or_default().set_fit_data(data)
    }

    /// Replaces every problem with one per data set, each using the
    /// dictionary's model and range.
    pub fn set_fit_data(&mut self, data: Vec<MeasuredCurve>) -> Result<()> {
        self.problems.clear();
        for curve in data {
            let id = curve.name().to_owned();
            let problem = self.problems.entry(id).or_default();
            problem.set_fit_data(curve)?;
            problem.set_model(self.model.clone());
            problem.set_range(self.q_range.0, self.q_range.1)?;
        }
        debug!("Fit data replaced, {} problems", self.problems.len());
        Ok(())
    }

    pub fn problem(&self, id: &str) -> Option<&FitProblem> {
        self.problems.get(id)
    }

    pub fn problem_mut(&mut self, id: &str) -> Result<&mut FitProblem> {
        self.problems
            .get_mut(id)
            .ok_or_else(|| InvariantError::invalid(format!("no fit problem for data '{id}'")))
    }

    pub fn problems(&self) -> impl Iterator<Item = (&String, &FitProblem)> {
        self.problems.iter()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl FitProblemComponent for FitProblemDictionary {
    fn enable_smearing(&mut self, enabled: bool) {
        for problem in self.problems.values_mut() {
            problem.enable_smearing(enabled);
        }
    }

    fn set_model(&mut self, model: Option<String>) {
        for problem in self.problems.values_mut() {
            problem.set_model(model.clone());
        }
        self.model = model;
    }

    fn set_model_param(&mut self, name: &str, value: Option<f64>) {
        for problem in self.problems.values_mut() {
            problem.set_model_param(name, value);
        }
    }

    fn clear_model_param(&mut self) {
        for problem in self.problems.values_mut() {
            problem.clear_model_param();
        }
    }

    fn set_param_to_fit(&mut self, names: Vec<String>) {
        self.param_to_fit = names;
    }

    fn param_to_fit(&self) -> &[String] {
        &self.param_to_fit
    }

    fn schedule_to_fit(&mut self, scheduled: bool) {
        self.scheduled = scheduled;
        for problem in self.problems.values_mut() {
            problem.schedule_to_fit(scheduled);
        }
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    fn set_range(&mut self, q_min: Option<f64>, q_max: Option<f64>) -> Result<()> {
        check_range(q_min, q_max)?;
        self.q_range = (q_min, q_max);
        for problem in self.problems.values_mut() {
            problem.set_range(q_min, q_max)?;
        }
        Ok(())
    }

    fn set_weighting(&mut self, weighting: FitWeighting) -> Result<()> {
        for problem in self.problems.values_mut() {
            problem.set_weighting(weighting)?;
        }
        Ok(())
    }

    fn set_graph_id(&mut self, id: Option<u64>) {
        self.graph_id = id;
    }

    fn graph_id(&self) -> Option<u64> {
        self.graph_id
    }

    fn set_fit_tab_caption(&mut self, caption: &str) {
        self.caption = caption.to_owned();
    }

    fn fit_tab_caption(&self) -> &str {
        &self.caption
    }
}

fn check_range(q_min: Option<f64>, q_max: Option<f64>) -> Result<()> {
    for q in [q_min, q_max].into_iter().flatten() {
        if !q.is_finite() {
            return Err(InvariantError::invalid(format!(
                "fit range limits must be finite, got {q}"
            )));
        }
    }
    if let (Some(lo), Some(hi)) = (q_min, q_max) {
        if lo >= hi {
            return Err(InvariantError::invalid(format!(
                "fit range [{lo}, {hi}] is empty"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(name: &str) -> MeasuredCurve {
        MeasuredCurve::new(
            name,
            vec![0.01, 0.02, 0.05, 0.1],
            vec![100.0, 81.0, 40.0, -4.0],
            vec![1.0, 0.5, 0.25, 0.5],
        )
        .unwrap()
    }

    #[test]
    fn test_weighting_replaces_fit_errors() {
        let mut problem = FitProblem::new();
        problem.set_fit_data(curve("a")).unwrap();
        assert_eq!(problem.fit_data().unwrap().di(), &[1.0, 0.5, 0.25, 0.5]);

        problem.set_weighting(FitWeighting::SqrtIntensity).unwrap();
        assert_eq!(problem.fit_data().unwrap().di(), &[10.0, 9.0, 40f64.sqrt(), 2.0]);
        assert_eq!(problem.original_data().unwrap().di(), &[1.0, 0.5, 0.25, 0.5]);

        problem.set_weighting(FitWeighting::None).unwrap();
        assert_eq!(problem.fit_data().unwrap().di(), &[1.0; 4]);
    }

    #[test]
    fn test_model_params_accumulate_until_cleared() {
        let mut problem = FitProblem::new();
        problem.set_model_param("radius", Some(20.0));
        problem.set_model_param("scale", None);
        assert_eq!(problem.model_params().len(), 2);
        assert_eq!(problem.model_params()[0].name, "radius");
        problem.clear_model_param();
        assert!(problem.model_params().is_empty());
    }

    #[test]
    fn test_range() {
        let mut problem = FitProblem::new();
        problem.set_fit_data(curve("a")).unwrap();
        assert_eq!(problem.points_in_range(), 4);
        problem.set_range(Some(0.015), None).unwrap();
        assert_eq!(problem.points_in_range(), 3);
        problem.set_range(Some(0.015), Some(0.06)).unwrap();
        assert_eq!(problem.points_in_range(), 2);
        assert!(problem.set_range(Some(0.1), Some(0.05)).is_err());
        assert_eq!(problem.range(), (Some(0.015), Some(0.06)));
    }

    #[test]
    fn test_add_data_keeps_problem_settings() {
        let mut dict = FitProblemDictionary::new();
        dict.add_data(curve("a")).unwrap();
        dict.problem_mut("a").unwrap().set_fit_tab_caption("page 1");
        dict.add_data(curve("a")).unwrap();
        dict.add_data(curve("b")).unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.problem("a").unwrap().fit_tab_caption(), "page 1");
        assert!(dict.problem_mut("c").is_err());
    }

    #[test]
    fn test_set_fit_data_applies_dictionary_settings() {
        let mut dict = FitProblemDictionary::new();
        dict.add_data(curve("old")).unwrap();
        dict.set_model(Some("sphere".to_owned()));
        dict.set_range(Some(0.02), Some(0.1)).unwrap();

        dict.set_fit_data(vec![curve("a"), curve("b")]).unwrap();
        assert!(dict.problem("old").is_none());
        for (_, problem) in dict.problems() {
            assert_eq!(problem.model(), Some("sphere"));
            assert_eq!(problem.range(), (Some(0.02), Some(0.1)));
        }
    }

    #[test]
    fn test_broadcast() {
        let mut dict = FitProblemDictionary::new();
        dict.set_fit_data(vec![curve("a"), curve("b")]).unwrap();
        dict.schedule_to_fit(true);
        dict.enable_smearing(true);
        dict.set_model_param("radius", Some(5.0));
        dict.set_weighting(FitWeighting::AbsIntensity).unwrap();

        assert!(dict.is_scheduled());
        for (_, problem) in dict.problems() {
            assert!(problem.is_scheduled());
            assert!(problem.smearing_enabled());
            assert_eq!(problem.model_params().len(), 1);
            assert_eq!(problem.fit_data().unwrap().di()[3], 4.0);
        }

        dict.problem_mut("b").unwrap().schedule_to_fit(false);
        assert!(dict.problem("a").unwrap().is_scheduled());
        assert!(!dict.problem("b").unwrap().is_scheduled());
    }
}
