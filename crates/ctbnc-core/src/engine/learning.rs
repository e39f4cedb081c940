//! # Parameter learning
//!
//! [`MleLearner`] turns a model skeleton and a set of trajectories into
//! populated CIMs:
//!
//! 1. every trajectory is decoded once to its dense view;
//! 2. per-node [`SufficientStatistics`] are accumulated in a caller-owned
//!    [`EvidenceContext`];
//! 3. closed-form MLE derives one CIM per parent entry;
//! 4. every derived CIM is checked before any is installed, so a failure
//!    publishes no learned parameters.
//!
//! A configured structure is installed before step 1 and stays in place
//! when learning fails; the model is then left with that structure and
//! reset, unvalidated CIMs.
//!
//! [`ParameterLearner`] is the seam external structure search plugs into.

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::engine::cim::Cim;
use crate::engine::errors::CtbnError;
use crate::engine::evidence::EvidenceContext;
use crate::engine::indexing::NodeId;
use crate::engine::model::{AdjacencyMatrix, CtbnModel};
use crate::engine::node::{check_cim_table, NodeKind};
use crate::engine::sufficient_stats::{StatisticsPriors, SufficientStatistics};
use crate::engine::trajectory::{DenseTrajectory, Trajectory};

/// Configuration for maximum-likelihood parameter learning.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LearningConfig {
    /// Pseudo-count added to every off-diagonal transition count.
    pub mxx_prior: f64,
    /// Pseudo-time added to every residence-time cell.
    pub tx_prior: f64,
    /// Pseudo-count added to every static occurrence cell.
    pub px_prior: f64,
    /// Structure installed before learning, as an `N×N` adjacency matrix.
    pub structure: Option<AdjacencyMatrix>,
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), CtbnError> {
        for (name, value) in [
            ("mxx_prior", self.mxx_prior),
            ("tx_prior", self.tx_prior),
            ("px_prior", self.px_prior),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CtbnError::Construction(format!(
                    "learning: {} must be finite and >= 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn priors(&self) -> StatisticsPriors {
        StatisticsPriors {
            mxx: self.mxx_prior,
            tx: self.tx_prior,
            px: self.px_prior,
        }
    }
}

/// Outcome of a learning run: the statistics each node's CIMs came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningResult {
    statistics: FxHashMap<NodeId, SufficientStatistics>,
    transitions_observed: usize,
    trajectories_used: usize,
}

impl LearningResult {
    pub fn statistics(&self, id: NodeId) -> Option<&SufficientStatistics> {
        self.statistics.get(&id)
    }

    /// All statistics in increasing node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SufficientStatistics)> {
        let mut ids: Vec<NodeId> = self.statistics.keys().copied().collect();
        ids.sort();
        ids.into_iter().map(move |id| (id, &self.statistics[&id]))
    }

    /// Total number of transitions in the training set.
    pub fn transitions_observed(&self) -> usize {
        self.transitions_observed
    }

    pub fn trajectories_used(&self) -> usize {
        self.trajectories_used
    }
}

/// Learns CIMs for a model from trajectories.
pub trait ParameterLearner: Send + Sync {
    fn learn(
        &self,
        model: &mut CtbnModel,
        trajectories: &[Trajectory],
    ) -> Result<LearningResult, CtbnError>;
}

/// Closed-form maximum-likelihood learner with pseudo-count priors.
#[derive(Debug, Clone, Default)]
pub struct MleLearner {
    config: LearningConfig,
}

impl MleLearner {
    pub fn new(config: LearningConfig) -> Result<Self, CtbnError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Accumulates statistics for every model node without touching CIMs.
    pub fn accumulate(
        &self,
        model: &CtbnModel,
        trajectories: &[Trajectory],
    ) -> Result<LearningResult, CtbnError> {
        if trajectories.is_empty() {
            return Err(CtbnError::DataConsistency(format!(
                "cannot learn model '{}' from an empty training set",
                model.name()
            )));
        }

        let priors = self.config.priors();
        let mut statistics: FxHashMap<NodeId, SufficientStatistics> = model
            .nodes()
            .iter()
            .map(|node| (node.id(), SufficientStatistics::for_node(node, priors)))
            .collect();

        let mut ctx = EvidenceContext::new(model.indexing());
        let mut transitions_observed = 0;
        for (t_idx, trajectory) in trajectories.iter().enumerate() {
            if trajectory.indexing() != model.indexing() {
                return Err(CtbnError::Construction(format!(
                    "trajectory {} uses indexing '{}', model '{}' uses '{}'",
                    t_idx,
                    trajectory.indexing().name(),
                    model.name(),
                    model.indexing().name()
                )));
            }
            if trajectory.duration() == 0.0 {
                warn!(
                    model = model.name(),
                    trajectory = t_idx,
                    "trajectory has zero duration; only its initial record is counted"
                );
            }
            let dense = trajectory.decode();
            accumulate_trajectory(model, &dense, &mut ctx, &mut statistics)
                .map_err(|err| annotate_trajectory(err, t_idx))?;
            ctx.retract_all();
            transitions_observed += dense.len();
        }

        debug!(
            model = model.name(),
            trajectories = trajectories.len(),
            transitions = transitions_observed,
            "accumulated sufficient statistics"
        );

        Ok(LearningResult {
            statistics,
            transitions_observed,
            trajectories_used: trajectories.len(),
        })
    }
}

impl ParameterLearner for MleLearner {
    fn learn(
        &self,
        model: &mut CtbnModel,
        trajectories: &[Trajectory],
    ) -> Result<LearningResult, CtbnError> {
        if let Some(structure) = &self.config.structure {
            model.set_structure(structure)?;
        }

        let result = self.accumulate(model, trajectories)?;

        // Stage everything first: nothing is installed unless all nodes pass.
        let mut staged: Vec<(NodeId, Vec<Cim>)> = Vec::with_capacity(model.len());
        for node in model.nodes() {
            let stats = result.statistics(node.id()).ok_or_else(|| {
                CtbnError::Invariant(format!("no statistics for node '{}'", node.name()))
            })?;
            let cims = stats.derive_cims();
            if let Some((entry, reason)) = check_cim_table(node.kind(), &cims) {
                return Err(CtbnError::InvalidCim {
                    node: node.name().to_string(),
                    entry,
                    reason,
                }
                .into_learning());
            }
            staged.push((node.id(), cims));
        }

        for (id, cims) in staged {
            let node = model.require_node_mut(id)?;
            node.set_cims(cims)?;
            node.validate_cims().map_err(CtbnError::into_learning)?;
        }

        debug!(model = model.name(), nodes = model.len(), "installed learned CIMs");
        Ok(result)
    }
}

fn annotate_trajectory(err: CtbnError, index: usize) -> CtbnError {
    match err {
        CtbnError::DataConsistency(msg) => {
            CtbnError::DataConsistency(format!("trajectory {}: {}", index, msg))
        }
        other => other,
    }
}

fn accumulate_trajectory(
    model: &CtbnModel,
    dense: &DenseTrajectory,
    ctx: &mut EvidenceContext,
    statistics: &mut FxHashMap<NodeId, SufficientStatistics>,
) -> Result<(), CtbnError> {
    for node in model.nodes() {
        let state = dense.require_state(0, node.id())?;
        ctx.set(node.id(), state)?;
    }

    for node in model.nodes().iter().filter(|n| n.is_static()) {
        let entry = node.parent_entry(ctx)?;
        let state = ctx.require(node.id())?;
        stats_mut(statistics, node.id())?.add_occurrence(entry, state)?;
    }

    for row in 1..dense.len() {
        let dt = dense.time(row) - dense.time(row - 1);
        for node in model.nodes() {
            let id = node.id();
            let next = dense.require_state(row, id)?;
            let prev = ctx.require(id)?;
            match node.kind() {
                NodeKind::Static => {
                    if next != prev {
                        return Err(CtbnError::DataConsistency(format!(
                            "static node '{}' changes from '{}' to '{}' at time {}",
                            node.name(),
                            node.state_name(prev).unwrap_or("?"),
                            node.state_name(next).unwrap_or("?"),
                            dense.time(row)
                        )));
                    }
                }
                NodeKind::Continuous => {
                    let entry = node.parent_entry(ctx)?;
                    let stats = stats_mut(statistics, id)?;
                    stats.add_time(entry, prev, dt)?;
                    if next != prev {
                        stats.add_jump(entry, prev, next)?;
                        trace!(node = node.name(), entry, prev, next, "jump");
                    }
                }
            }
        }
        // Parent entries of later rows must see this row's states.
        for node in model.nodes() {
            ctx.set(node.id(), dense.require_state(row, node.id())?)?;
        }
    }
    Ok(())
}

fn stats_mut(
    statistics: &mut FxHashMap<NodeId, SufficientStatistics>,
    id: NodeId,
) -> Result<&mut SufficientStatistics, CtbnError> {
    statistics
        .get_mut(&id)
        .ok_or_else(|| CtbnError::Invariant(format!("no statistics for node {}", id)))
}
