//! Model-selection helpers for comparing candidate CTBN structures.
//!
//! Criteria:
//! - `Aic`: `2k - 2 ln L`
//! - `Bic`: `ln(n)k - 2 ln L`
//!
//! `ln L` is the CTBN likelihood of the learned CIMs given the sufficient
//! statistics they were derived from:
//! - Continuous nodes: `Σ mxx[i][j] ln q[i][j] + Σ q[i][i] tx[i]`
//! - Static nodes: `Σ px[j] ln p[j]`
//!
//! Zero counts contribute nothing, so empty cells never produce `0 · ln 0`.
//! External structure search calls [`learn_and_score`] once per candidate.

use tracing::debug;

use crate::engine::errors::CtbnError;
use crate::engine::learning::{LearningResult, ParameterLearner};
use crate::engine::model::{AdjacencyMatrix, CtbnModel};
use crate::engine::node::CtNode;
use crate::engine::sufficient_stats::SufficientStatistics;
use crate::engine::trajectory::Trajectory;

const SCORE_EPSILON: f64 = 1e-12;

/// Structure selection criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StructureCriterion {
    /// Akaike Information Criterion: `2k - 2 ln L`
    Aic,
    /// Bayesian Information Criterion: `ln(n)k - 2 ln L`
    Bic,
}

/// Score details for a candidate structure.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructureScore {
    /// Log-likelihood of the learned CIMs.
    pub log_likelihood: f64,
    /// Number of free parameters across all CIM tables.
    pub num_parameters: f64,
    /// Number of trajectory records the statistics came from.
    pub sample_size: usize,
    /// Final criterion score (lower is better).
    pub score: f64,
}

/// Selection result for candidate structures.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStructure {
    pub name: String,
    pub details: StructureScore,
}

/// Scores a model whose CIMs were learned into `result`.
pub fn score_structure(
    model: &CtbnModel,
    result: &LearningResult,
    criterion: StructureCriterion,
) -> Result<StructureScore, CtbnError> {
    model.require_validated()?;

    let mut log_likelihood = 0.0;
    let mut num_parameters = 0.0;
    for node in model.nodes() {
        let stats = result.statistics(node.id()).ok_or_else(|| {
            CtbnError::Invariant(format!(
                "learning result has no statistics for node '{}'",
                node.name()
            ))
        })?;
        log_likelihood += node_log_likelihood(node, stats)?;
        num_parameters += node_parameters(node) as f64;
    }

    let sample_size = result.transitions_observed();
    let score = match criterion {
        StructureCriterion::Aic => 2.0 * num_parameters - 2.0 * log_likelihood,
        StructureCriterion::Bic => {
            let n = (sample_size as f64).max(1.0);
            n.ln() * num_parameters - 2.0 * log_likelihood
        }
    };

    Ok(StructureScore {
        log_likelihood,
        num_parameters,
        sample_size,
        score,
    })
}

/// Installs `structure`, learns parameters and scores the result.
pub fn learn_and_score(
    learner: &dyn ParameterLearner,
    model: &mut CtbnModel,
    structure: &AdjacencyMatrix,
    trajectories: &[Trajectory],
    criterion: StructureCriterion,
) -> Result<(LearningResult, StructureScore), CtbnError> {
    model.set_structure(structure)?;
    let result = learner.learn(model, trajectories)?;
    let score = score_structure(model, &result, criterion)?;
    debug!(
        model = model.name(),
        log_likelihood = score.log_likelihood,
        score = score.score,
        "scored structure"
    );
    Ok((result, score))
}

/// Selects the best candidate under `criterion`.
///
/// Lower score is better. Ties are broken deterministically by candidate name.
/// Candidates must have been learned from the same data.
pub fn select_best_structure<'a>(
    candidates: impl IntoIterator<Item = (&'a str, &'a CtbnModel, &'a LearningResult)>,
    criterion: StructureCriterion,
) -> Result<SelectedStructure, CtbnError> {
    let mut scored = Vec::new();
    for (name, model, result) in candidates {
        let details = score_structure(model, result, criterion)?;
        scored.push((name.to_string(), details));
    }

    let reference_n = match scored.first() {
        Some((_, details)) => details.sample_size,
        None => {
            return Err(CtbnError::Construction(
                "select_best_structure: candidate list must not be empty".into(),
            ))
        }
    };
    for (name, details) in &scored[1..] {
        if details.sample_size != reference_n {
            return Err(CtbnError::Construction(format!(
                "select_best_structure: candidates must share sample size; \
                 '{}' has n={} vs reference n={}",
                name, details.sample_size, reference_n
            )));
        }
    }

    let mut best: Option<SelectedStructure> = None;
    for (name, details) in scored {
        match &best {
            None => best = Some(SelectedStructure { name, details }),
            Some(current) => {
                let better_score = details.score < (current.details.score - SCORE_EPSILON);
                let tied_score = (details.score - current.details.score).abs() <= SCORE_EPSILON;
                if better_score || (tied_score && name < current.name) {
                    best = Some(SelectedStructure { name, details });
                }
            }
        }
    }

    best.ok_or_else(|| {
        CtbnError::Construction("select_best_structure: candidate list must not be empty".into())
    })
}

fn node_parameters(node: &CtNode) -> usize {
    let k = node.cardinality();
    let per_entry = if node.is_static() {
        k.saturating_sub(1)
    } else {
        k * k.saturating_sub(1)
    };
    node.parent_entries() * per_entry
}

fn node_log_likelihood(node: &CtNode, stats: &SufficientStatistics) -> Result<f64, CtbnError> {
    if stats.kind() != node.kind() || stats.entries() != node.parent_entries() {
        return Err(CtbnError::Invariant(format!(
            "statistics for node '{}' do not match its current structure",
            node.name()
        )));
    }

    let mut ll = 0.0;
    match stats {
        SufficientStatistics::Continuous { tx, mxx, .. } => {
            for (entry, cim) in node.cims().iter().enumerate() {
                for i in 0..cim.rows() {
                    ll += cim.get(i, i) * tx[entry][i];
                    for j in (0..cim.cols()).filter(|&j| j != i) {
                        let count = mxx[entry][i][j];
                        if count > 0.0 {
                            ll += count * cim.get(i, j).ln();
                        }
                    }
                }
            }
        }
        SufficientStatistics::Static { px, .. } => {
            for (entry, cim) in node.cims().iter().enumerate() {
                for (j, &count) in px[entry].iter().enumerate() {
                    if count > 0.0 {
                        ll += count * cim.get(0, j).ln();
                    }
                }
            }
        }
    }
    Ok(ll)
}
