//! # Trajectory classification
//!
//! Every class state is a competing hypothesis. The classifier streams a
//! trajectory through a model with fixed CIMs, keeping one running
//! log-likelihood per hypothesis and a posterior over class states.
//!
//! ## Scoring
//!
//! At the first time point each hypothesis starts from the log-priors of the
//! static nodes, with the class node pinned to the hypothesis. At every
//! later point, for each non-class continuous node in state `s`:
//!
//! - stay term `cim[s][s] · Δt` (the diagonal is already a negative rate,
//!   so this is the log of the survival probability)
//! - jump term `ln cim[s][s']` when the node changed to `s'`
//!
//! ## Posterior
//!
//! The posterior is a sequential Bayes filter over the per-point increments:
//! `p_t ∝ p_{t-1} ⊙ exp(incr_t − max incr_t)`. Working from increments keeps
//! magnitudes bounded on long trajectories where the raw cumulative
//! log-likelihoods would underflow a softmax.
//!
//! ## Query times
//!
//! Results can be produced at the trajectory's own transitions only, on a
//! uniform grid, or at explicit times. Query times are merged into the
//! transition times; a query time coinciding exactly with a transition time
//! or with another query time is dropped.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::engine::errors::CtbnError;
use crate::engine::evidence::EvidenceContext;
use crate::engine::indexing::NodeId;
use crate::engine::model::CtbnModel;
use crate::engine::node::{CtNode, NodeKind};
use crate::engine::trajectory::{DenseTrajectory, Trajectory, Transition};

/// Classifier configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClassifierConfig {
    /// Keep the class distribution of every time point in the result.
    pub emit_probabilities: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            emit_probabilities: true,
        }
    }
}

/// Picks a class state from a final posterior distribution.
pub trait DecisionRule: fmt::Debug + Send + Sync {
    fn decide(&self, probabilities: &[f64]) -> Result<usize, CtbnError>;
}

/// Binary-style decider: predicts `positive` once its probability reaches
/// `threshold`, otherwise the most probable of the remaining states.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdDecider {
    positive: usize,
    threshold: f64,
}

impl ThresholdDecider {
    pub const DEFAULT_THRESHOLD: f64 = 0.5;

    pub fn new(positive: usize, threshold: f64) -> Result<Self, CtbnError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CtbnError::Construction(format!(
                "decision threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self {
            positive,
            threshold,
        })
    }

    pub fn with_default_threshold(positive: usize) -> Self {
        Self {
            positive,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    pub fn positive(&self) -> usize {
        self.positive
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl DecisionRule for ThresholdDecider {
    fn decide(&self, probabilities: &[f64]) -> Result<usize, CtbnError> {
        let p = probabilities.get(self.positive).copied().ok_or_else(|| {
            CtbnError::Invariant(format!(
                "positive class {} out of range for {} class states",
                self.positive,
                probabilities.len()
            ))
        })?;
        if p >= self.threshold {
            return Ok(self.positive);
        }
        let rest = probabilities
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.positive)
            .map(|(i, &v)| (i, v));
        // Single-class models have nothing else to pick.
        Ok(argmax(rest).unwrap_or(self.positive))
    }
}

/// Upper bound on the points one interval grid may insert.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Which time points a classification reports on.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryTimes {
    /// The trajectory's own transition times.
    #[default]
    Transitions,
    /// `start + k·interval` for every `k ≥ 0` up to the end time, at most
    /// [`MAX_GRID_POINTS`] of them.
    Interval(f64),
    /// Explicit times inside `[start, end]`.
    Explicit(Vec<f64>),
}

/// Output of one classification run.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    trajectory: Trajectory,
    probabilities: Option<Vec<Vec<f64>>>,
    final_probabilities: Vec<f64>,
    log_likelihoods: Vec<f64>,
    class_state: usize,
    class_label: String,
}

impl ClassificationResult {
    /// Query timeline: the observed transitions plus an all-unset
    /// transition at every inserted query time.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.trajectory.times().collect()
    }

    /// Per-point class distributions, if the classifier emitted them.
    pub fn probabilities(&self) -> Option<&[Vec<f64>]> {
        self.probabilities.as_deref()
    }

    pub fn probabilities_at(&self, point: usize) -> Option<&[f64]> {
        self.probabilities
            .as_ref()
            .and_then(|p| p.get(point))
            .map(Vec::as_slice)
    }

    pub fn final_probabilities(&self) -> &[f64] {
        &self.final_probabilities
    }

    /// Final cumulative log-likelihood per class state.
    pub fn log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    pub fn class_state(&self) -> usize {
        self.class_state
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }
}

/// Streams trajectories through a model with validated CIMs.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
    decision: Option<Arc<dyn DecisionRule>>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            decision: None,
        }
    }

    /// Replaces the default arg-max label with `rule`.
    pub fn with_decision_rule(mut self, rule: Arc<dyn DecisionRule>) -> Self {
        self.decision = Some(rule);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn decision_rule(&self) -> Option<&Arc<dyn DecisionRule>> {
        self.decision.as_ref()
    }

    /// Classifies at the trajectory's transition times.
    pub fn classify(
        &self,
        model: &CtbnModel,
        trajectory: &Trajectory,
    ) -> Result<ClassificationResult, CtbnError> {
        self.classify_query(model, trajectory, &QueryTimes::Transitions)
    }

    /// Classifies at the transition times plus a uniform grid.
    pub fn classify_with_interval(
        &self,
        model: &CtbnModel,
        trajectory: &Trajectory,
        interval: f64,
    ) -> Result<ClassificationResult, CtbnError> {
        self.classify_query(model, trajectory, &QueryTimes::Interval(interval))
    }

    /// Classifies at the transition times plus `times`.
    pub fn classify_at_times(
        &self,
        model: &CtbnModel,
        trajectory: &Trajectory,
        times: &[f64],
    ) -> Result<ClassificationResult, CtbnError> {
        self.classify_query(model, trajectory, &QueryTimes::Explicit(times.to_vec()))
    }

    /// Classifies a batch; each trajectory gets its own evidence context.
    ///
    /// With the `parallel` feature the batch is spread over rayon's pool.
    /// Results keep the input order.
    pub fn classify_all(
        &self,
        model: &CtbnModel,
        trajectories: &[Trajectory],
        query: &QueryTimes,
    ) -> Result<Vec<ClassificationResult>, CtbnError> {
        #[cfg(feature = "parallel")]
        {
            trajectories
                .par_iter()
                .map(|t| self.classify_query(model, t, query))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            trajectories
                .iter()
                .map(|t| self.classify_query(model, t, query))
                .collect()
        }
    }

    pub fn classify_query(
        &self,
        model: &CtbnModel,
        trajectory: &Trajectory,
        query: &QueryTimes,
    ) -> Result<ClassificationResult, CtbnError> {
        model.require_validated()?;
        if trajectory.indexing() != model.indexing() {
            return Err(CtbnError::Construction(format!(
                "trajectory uses indexing '{}', model '{}' uses '{}'",
                trajectory.indexing().name(),
                model.name(),
                model.indexing().name()
            )));
        }
        let class = model.class_node()?;
        if class.kind() != NodeKind::Static {
            return Err(CtbnError::Invariant(format!(
                "class node '{}' must be static",
                class.name()
            )));
        }

        let dense = trajectory.decode();
        let timeline = merge_query_times(&dense, query)?;
        let scorer = Scorer::new(model, class);
        let hypotheses = class.cardinality();

        let mut ctx = EvidenceContext::new(model.indexing());
        let mut cumulative = vec![0.0; hypotheses];
        let mut incr = vec![0.0; hypotheses];
        let mut posterior: Vec<f64> = Vec::new();
        let mut history = self
            .config
            .emit_probabilities
            .then(|| Vec::with_capacity(timeline.len()));

        let mut prev_row = 0usize;
        for (point, &(time, source)) in timeline.iter().enumerate() {
            if point == 0 {
                scorer.initial(&dense, &mut ctx, &mut incr)?;
            } else {
                let dt = time - timeline[point - 1].0;
                // Inserted query points carry no new observations.
                let next_row = source.unwrap_or(prev_row);
                scorer.step(&dense, prev_row, next_row, dt, &mut ctx, &mut incr)?;
                prev_row = next_row;
            }

            for (total, delta) in cumulative.iter_mut().zip(&incr) {
                *total += delta;
            }
            posterior = update_posterior(&posterior, &incr).map_err(|reason| {
                CtbnError::Numerical(format!("posterior at time {}: {}", time, reason))
            })?;
            trace!(point, time, ?posterior, "classification step");
            if let Some(history) = history.as_mut() {
                history.push(posterior.clone());
            }
        }

        let class_state = match &self.decision {
            Some(rule) => rule.decide(&posterior)?,
            None => argmax(cumulative.iter().copied().enumerate()).ok_or_else(|| {
                CtbnError::Invariant(format!("class node '{}' has no states", class.name()))
            })?,
        };
        let class_label = class
            .state_name(class_state)
            .ok_or_else(|| {
                CtbnError::Invariant(format!(
                    "decision rule picked state {} of class '{}' with {} states",
                    class_state,
                    class.name(),
                    hypotheses
                ))
            })?
            .to_string();

        let transitions = timeline
            .iter()
            .map(|&(time, source)| match source {
                Some(row) => trajectory.transitions()[row].clone(),
                None => Transition::unchanged(time, dense.width()),
            })
            .collect();
        let result_trajectory =
            Trajectory::from_transitions(Arc::clone(trajectory.indexing()), transitions)?;

        debug!(
            model = model.name(),
            points = timeline.len(),
            label = class_label.as_str(),
            "classified trajectory"
        );

        Ok(ClassificationResult {
            trajectory: result_trajectory,
            probabilities: history,
            final_probabilities: posterior,
            log_likelihoods: cumulative,
            class_state,
            class_label,
        })
    }
}

/// Per-model scoring state: the class node and the nodes that contribute
/// to each hypothesis.
struct Scorer<'a> {
    class: &'a CtNode,
    statics: Vec<&'a CtNode>,
    continuous: Vec<&'a CtNode>,
}

impl<'a> Scorer<'a> {
    fn new(model: &'a CtbnModel, class: &'a CtNode) -> Self {
        let (statics, continuous): (Vec<&CtNode>, Vec<&CtNode>) = model
            .nodes()
            .iter()
            .filter(|n| n.id() != class.id())
            .partition(|n| n.is_static());
        Self {
            class,
            statics,
            continuous,
        }
    }

    fn class_id(&self) -> NodeId {
        self.class.id()
    }

    /// Rejects recorded states outside a modelled node's state space.
    fn check_row(&self, dense: &DenseTrajectory, row: usize) -> Result<(), CtbnError> {
        let nodes = std::iter::once(self.class)
            .chain(self.statics.iter().copied())
            .chain(self.continuous.iter().copied());
        for node in nodes {
            if let Some(state) = dense.state(row, node.id()) {
                if state >= node.cardinality() {
                    return Err(CtbnError::DataConsistency(format!(
                        "node '{}' has state {} at time {}, but only {} states",
                        node.name(),
                        state,
                        dense.time(row),
                        node.cardinality()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Log-prior of every static node under each hypothesis, from the first
    /// row with the class slot overwritten per hypothesis.
    fn initial(
        &self,
        dense: &DenseTrajectory,
        ctx: &mut EvidenceContext,
        incr: &mut [f64],
    ) -> Result<(), CtbnError> {
        self.check_row(dense, 0)?;
        ctx.load_row(dense.row(0));
        for (h, slot) in incr.iter_mut().enumerate() {
            ctx.set(self.class_id(), h)?;
            let entry = self.class.parent_entry(ctx)?;
            let mut total = log_prior(self.class, entry, h)?;
            for node in &self.statics {
                let state = ctx.require(node.id())?;
                total += log_prior(node, node.parent_entry(ctx)?, state)?;
            }
            *slot = total;
        }
        Ok(())
    }

    /// Increment from `prev` to `next` over `dt`, evaluated with parents in
    /// their `prev` states.
    fn step(
        &self,
        dense: &DenseTrajectory,
        prev: usize,
        next: usize,
        dt: f64,
        ctx: &mut EvidenceContext,
        incr: &mut [f64],
    ) -> Result<(), CtbnError> {
        self.check_row(dense, next)?;
        for node in &self.statics {
            let before = dense.require_state(prev, node.id())?;
            let after = dense.require_state(next, node.id())?;
            if before != after {
                return Err(CtbnError::DataConsistency(format!(
                    "static node '{}' changes value at time {}",
                    node.name(),
                    dense.time(next)
                )));
            }
        }

        ctx.load_row(dense.row(prev));
        for (h, slot) in incr.iter_mut().enumerate() {
            ctx.set(self.class_id(), h)?;
            let mut total = 0.0;
            for node in &self.continuous {
                let from = dense.require_state(prev, node.id())?;
                let to = dense.require_state(next, node.id())?;
                let entry = node.parent_entry(ctx)?;
                let cim = node.cim(entry).ok_or_else(|| missing_cim(node, entry))?;
                total += cim.get(from, from) * dt;
                if to != from {
                    total += cim.get(from, to).ln();
                }
            }
            *slot = total;
        }
        Ok(())
    }
}

fn log_prior(node: &CtNode, entry: usize, state: usize) -> Result<f64, CtbnError> {
    let cim = node.cim(entry).ok_or_else(|| missing_cim(node, entry))?;
    Ok(cim.get(0, state).ln())
}

fn missing_cim(node: &CtNode, entry: usize) -> CtbnError {
    CtbnError::Invariant(format!(
        "node '{}' has no CIM for parent entry {}",
        node.name(),
        entry
    ))
}

/// One filter step. `prev` empty means first point.
fn update_posterior(prev: &[f64], incr: &[f64]) -> Result<Vec<f64>, String> {
    let max = incr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY || max.is_nan() {
        return Err("every class state has zero likelihood".into());
    }
    let mut p: Vec<f64> = incr.iter().map(|&v| (v - max).exp()).collect();
    if !prev.is_empty() {
        for (w, &q) in p.iter_mut().zip(prev) {
            *w *= q;
        }
    }
    let sum: f64 = p.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(format!("posterior mass is {}", sum));
    }
    p.iter_mut().for_each(|v| *v /= sum);
    Ok(p)
}

/// First index holding the maximum; NaN never wins.
fn argmax(values: impl Iterator<Item = (usize, f64)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            None if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Merged timeline of `(time, Some(transition row) | None for inserted)`.
fn merge_query_times(
    dense: &DenseTrajectory,
    query: &QueryTimes,
) -> Result<Vec<(f64, Option<usize>)>, CtbnError> {
    let times = dense.times();
    let start = times[0];
    let end = times[times.len() - 1];

    let mut extra: Vec<f64> = match query {
        QueryTimes::Transitions => Vec::new(),
        QueryTimes::Interval(interval) => {
            if !interval.is_finite() || *interval <= 0.0 {
                return Err(CtbnError::Construction(format!(
                    "sampling interval must be finite and > 0, got {}",
                    interval
                )));
            }
            let points = ((end - start) / interval).floor() + 1.0;
            if points > MAX_GRID_POINTS as f64 {
                return Err(CtbnError::Construction(format!(
                    "interval {} over [{}, {}] needs {} grid points, limit is {}",
                    interval, start, end, points, MAX_GRID_POINTS
                )));
            }
            (0u64..)
                .map(|k| start + k as f64 * interval)
                .take_while(|&t| t <= end)
                .collect()
        }
        QueryTimes::Explicit(requested) => {
            if let Some(&bad) = requested
                .iter()
                .find(|t| !t.is_finite() || **t < start || **t > end)
            {
                return Err(CtbnError::Construction(format!(
                    "query time {} outside trajectory span [{}, {}]",
                    bad, start, end
                )));
            }
            requested.clone()
        }
    };
    extra.sort_by(f64::total_cmp);
    extra.dedup();
    extra.retain(|t| times.binary_search_by(|probe| probe.total_cmp(t)).is_err());

    let mut merged = Vec::with_capacity(times.len() + extra.len());
    let mut queries = extra.into_iter().peekable();
    for (row, &time) in times.iter().enumerate() {
        while let Some(q) = queries.next_if(|&q| q < time) {
            merged.push((q, None));
        }
        merged.push((time, Some(row)));
    }
    merged.extend(queries.map(|q| (q, None)));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cim::Cim;
    use crate::engine::indexing::NodeIndexing;

    fn assert_close(a: f64, b: f64, label: &str) {
        assert!((a - b).abs() < 1e-9, "{}: {} vs {}", label, a, b);
    }

    fn model() -> (Arc<NodeIndexing>, CtbnModel) {
        let indexing =
            Arc::new(NodeIndexing::new("cls", ["class", "x"], Some("class")).expect("indexing"));
        let states = vec![
            vec!["slow".to_string(), "fast".to_string()],
            vec!["0".to_string(), "1".to_string()],
        ];
        let mut model =
            CtbnModel::naive_bayes(Arc::clone(&indexing), "nb", &states).expect("model");
        let class = model.require_node_mut(NodeId(0)).expect("class");
        class
            .set_cims(vec![Cim::from_rows(vec![vec![0.5, 0.5]]).expect("prior")])
            .expect("set");
        let x = model.require_node_mut(NodeId(1)).expect("x");
        x.set_cims(vec![
            Cim::from_rows(vec![vec![-1.0, 1.0], vec![1.0, -1.0]]).expect("slow"),
            Cim::from_rows(vec![vec![-4.0, 4.0], vec![4.0, -4.0]]).expect("fast"),
        ])
        .expect("set");
        model.validate().expect("validate");
        (indexing, model)
    }

    fn trajectory(indexing: Arc<NodeIndexing>) -> Trajectory {
        Trajectory::new(
            indexing,
            vec![0.0, 0.2, 0.4, 0.6],
            vec![
                vec![None, Some(0)],
                vec![None, Some(1)],
                vec![None, Some(0)],
                vec![None, Some(1)],
            ],
        )
        .expect("trajectory")
    }

    #[test]
    fn fast_switching_favours_fast_class() {
        let (indexing, model) = model();
        let result = Classifier::default()
            .classify(&model, &trajectory(indexing))
            .expect("classify");
        assert_eq!(result.class_label(), "fast");
        // slow: 3·ln1 − 0.6, fast: 3·ln4 − 2.4 (plus ln 0.5 each)
        let ll = result.log_likelihoods();
        assert_close(ll[0], 0.5f64.ln() - 0.6, "slow");
        assert_close(ll[1], 0.5f64.ln() + 3.0 * 4f64.ln() - 2.4, "fast");
        for p in result.probabilities().expect("emitted") {
            assert_close(p.iter().sum::<f64>(), 1.0, "sum");
        }
    }

    #[test]
    fn filter_matches_softmax_of_cumulative() {
        let (indexing, model) = model();
        let result = Classifier::default()
            .classify(&model, &trajectory(indexing))
            .expect("classify");
        let ll = result.log_likelihoods();
        let m = ll[0].max(ll[1]);
        let z = (ll[0] - m).exp() + (ll[1] - m).exp();
        assert_close(result.final_probabilities()[1], (ll[1] - m).exp() / z, "p(fast)");
    }

    #[test]
    fn explicit_times_are_merged_and_deduplicated() {
        let (indexing, model) = model();
        let result = Classifier::default()
            .classify_at_times(&model, &trajectory(indexing), &[0.1, 0.2, 0.1, 0.5])
            .expect("classify");
        assert_eq!(result.times(), vec![0.0, 0.1, 0.2, 0.4, 0.5, 0.6]);
        assert_eq!(result.trajectory().transitions()[1].values(), &[None, None]);
        assert_eq!(result.probabilities().expect("emitted").len(), 6);
    }

    #[test]
    fn inserted_points_do_not_change_the_total() {
        let (indexing, model) = model();
        let traj = trajectory(indexing);
        let plain = Classifier::default().classify(&model, &traj).expect("plain");
        let gridded = Classifier::default()
            .classify_with_interval(&model, &traj, 0.05)
            .expect("grid");
        for (a, b) in plain.log_likelihoods().iter().zip(gridded.log_likelihoods()) {
            assert_close(*a, *b, "cumulative");
        }
        assert!(gridded.len() > plain.len());
    }

    #[test]
    fn threshold_decider_overrides_argmax() {
        let (indexing, model) = model();
        let classifier = Classifier::default()
            .with_decision_rule(Arc::new(ThresholdDecider::new(0, 0.0).expect("decider")));
        let result = classifier.classify(&model, &trajectory(indexing)).expect("classify");
        assert_eq!(result.class_state(), 0);
    }

    #[test]
    fn threshold_decider_falls_back_to_rest() {
        let decider = ThresholdDecider::with_default_threshold(1);
        assert_eq!(decider.decide(&[0.3, 0.4, 0.3]).expect("decide"), 0);
        assert_eq!(decider.decide(&[0.2, 0.5, 0.3]).expect("decide"), 1);
        assert!(ThresholdDecider::new(0, 1.5).is_err());
    }

    #[test]
    fn unvalidated_model_is_refused() {
        let (indexing, model) = model();
        let skeleton = model.clone_skeleton();
        let err = Classifier::default()
            .classify(&skeleton, &trajectory(indexing))
            .expect_err("unvalidated");
        assert!(matches!(err, CtbnError::Invariant(_)));
    }

    #[test]
    fn query_times_outside_span_are_rejected() {
        let (indexing, model) = model();
        let traj = trajectory(indexing);
        let classifier = Classifier::default();
        assert!(classifier.classify_at_times(&model, &traj, &[0.7]).is_err());
        assert!(classifier.classify_with_interval(&model, &traj, 0.0).is_err());
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let (indexing, model) = model();
        let traj = trajectory(indexing);
        let err = Classifier::default()
            .classify_with_interval(&model, &traj, 1e-12)
            .expect_err("too many points");
        assert!(matches!(err, CtbnError::Construction(_)));
        // a fine but bounded grid is fine
        assert!(Classifier::default()
            .classify_with_interval(&model, &traj, 1e-4)
            .is_ok());
    }

    /// class → x (continuous), class → site (static, prior depends on class).
    fn model_with_static_feature() -> (Arc<NodeIndexing>, CtbnModel) {
        let indexing = Arc::new(
            NodeIndexing::new("cls-site", ["class", "x", "site"], Some("class"))
                .expect("indexing"),
        );
        let mut model = CtbnModel::new(Arc::clone(&indexing), "site");
        for (name, kind) in [
            ("class", NodeKind::Static),
            ("x", NodeKind::Continuous),
            ("site", NodeKind::Static),
        ] {
            let states = if name == "class" { ["slow", "fast"] } else { ["0", "1"] };
            let node = CtNode::new(&indexing, name, states, kind).expect("node");
            model.add_node(node).expect("add");
        }
        model.add_edge(NodeId(0), NodeId(1)).expect("edge");
        model.add_edge(NodeId(0), NodeId(2)).expect("edge");

        model
            .require_node_mut(NodeId(0))
            .expect("class")
            .set_cims(vec![Cim::from_rows(vec![vec![0.5, 0.5]]).expect("prior")])
            .expect("set");
        model
            .require_node_mut(NodeId(1))
            .expect("x")
            .set_cims(vec![
                Cim::from_rows(vec![vec![-1.0, 1.0], vec![1.0, -1.0]]).expect("slow"),
                Cim::from_rows(vec![vec![-4.0, 4.0], vec![4.0, -4.0]]).expect("fast"),
            ])
            .expect("set");
        model
            .require_node_mut(NodeId(2))
            .expect("site")
            .set_cims(vec![
                Cim::from_rows(vec![vec![0.8, 0.2]]).expect("slow"),
                Cim::from_rows(vec![vec![0.3, 0.7]]).expect("fast"),
            ])
            .expect("set");
        model.validate().expect("validate");
        (indexing, model)
    }

    #[test]
    fn static_features_add_their_prior_under_each_hypothesis() {
        let (indexing, model) = model_with_static_feature();
        let traj = Trajectory::new(
            indexing,
            vec![0.0, 0.2, 0.4, 0.6],
            vec![
                vec![None, Some(0), Some(1)],
                vec![None, Some(1), None],
                vec![None, Some(0), None],
                vec![None, Some(1), None],
            ],
        )
        .expect("trajectory");
        let result = Classifier::default().classify(&model, &traj).expect("classify");

        let first = result.probabilities().expect("emitted")[0].clone();
        // at t=0 only the priors count: 0.5·0.2 against 0.5·0.7
        assert_close(first[1], 0.7 / 0.9, "initial p(fast)");
        let ll = result.log_likelihoods();
        assert_close(ll[0], 0.5f64.ln() + 0.2f64.ln() - 0.6, "slow");
        assert_close(
            ll[1],
            0.5f64.ln() + 0.7f64.ln() + 3.0 * 4f64.ln() - 2.4,
            "fast",
        );
    }

    #[test]
    fn static_feature_changing_value_is_a_data_error() {
        let (indexing, model) = model_with_static_feature();
        let traj = Trajectory::new(
            indexing,
            vec![0.0, 0.2, 0.4],
            vec![
                vec![None, Some(0), Some(1)],
                vec![None, Some(1), None],
                vec![None, None, Some(0)],
            ],
        )
        .expect("trajectory");
        let err = Classifier::default()
            .classify(&model, &traj)
            .expect_err("site changes");
        match err {
            CtbnError::DataConsistency(msg) => assert!(msg.contains("site"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn states_outside_the_node_are_rejected() {
        let (indexing, model) = model();
        // x has two states: 2 would otherwise read another cell of the CIM
        let aliasing = Trajectory::new(
            Arc::clone(&indexing),
            vec![0.0, 0.5],
            vec![vec![None, Some(0)], vec![None, Some(2)]],
        )
        .expect("trajectory");
        let far = Trajectory::new(
            indexing,
            vec![0.0, 0.5],
            vec![vec![None, Some(5)], vec![None, Some(1)]],
        )
        .expect("trajectory");

        for traj in [&aliasing, &far] {
            let err = Classifier::default()
                .classify(&model, traj)
                .expect_err("out of range");
            match err {
                CtbnError::DataConsistency(msg) => assert!(msg.contains("'x'"), "{}", msg),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn probabilities_can_be_suppressed() {
        let (indexing, model) = model();
        let result = Classifier::new(ClassifierConfig {
            emit_probabilities: false,
        })
        .classify(&model, &trajectory(indexing))
        .expect("classify");
        assert!(result.probabilities().is_none());
        assert_eq!(result.final_probabilities().len(), 2);
    }
}
