//! Sufficient statistics for CIM estimation.
//!
//! Continuous nodes accumulate, per parent entry `e` and states `i`, `j`:
//! - `tx[e][i]`: total time spent in `i`
//! - `mxx[e][i][j]`: number of jumps `i → j` (`j ≠ i`)
//! - `mx[e][i] = Σ_j mxx[e][i][j]`
//!
//! Static nodes accumulate `px[e][i]` occurrences and `counts[e] = Σ_i px[e][i]`.
//!
//! All cells start from pseudo-count priors so that sparse data does not
//! leave empty cells behind.

use crate::engine::cim::Cim;
use crate::engine::errors::CtbnError;
use crate::engine::node::{CtNode, NodeKind};

/// Pseudo-count priors seeded into every accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatisticsPriors {
    pub mxx: f64,
    pub tx: f64,
    pub px: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SufficientStatistics {
    Continuous {
        tx: Vec<Vec<f64>>,
        mxx: Vec<Vec<Vec<f64>>>,
        mx: Vec<Vec<f64>>,
    },
    Static {
        px: Vec<Vec<f64>>,
        counts: Vec<f64>,
    },
}

impl SufficientStatistics {
    /// Fresh accumulators shaped for `node`, seeded with `priors`.
    pub fn for_node(node: &CtNode, priors: StatisticsPriors) -> Self {
        let entries = node.parent_entries();
        let k = node.cardinality();
        match node.kind() {
            NodeKind::Continuous => {
                let mxx_row = |i: usize| -> Vec<f64> {
                    (0..k).map(|j| if i == j { 0.0 } else { priors.mxx }).collect()
                };
                SufficientStatistics::Continuous {
                    tx: vec![vec![priors.tx; k]; entries],
                    mxx: vec![(0..k).map(mxx_row).collect(); entries],
                    mx: vec![vec![priors.mxx * (k as f64 - 1.0); k]; entries],
                }
            }
            NodeKind::Static => SufficientStatistics::Static {
                px: vec![vec![priors.px; k]; entries],
                counts: vec![priors.px * k as f64; entries],
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            SufficientStatistics::Continuous { .. } => NodeKind::Continuous,
            SufficientStatistics::Static { .. } => NodeKind::Static,
        }
    }

    pub fn entries(&self) -> usize {
        match self {
            SufficientStatistics::Continuous { tx, .. } => tx.len(),
            SufficientStatistics::Static { counts, .. } => counts.len(),
        }
    }

    /// Adds `dt` of residence time in `state` under `entry`.
    pub fn add_time(&mut self, entry: usize, state: usize, dt: f64) -> Result<(), CtbnError> {
        match self {
            SufficientStatistics::Continuous { tx, .. } => {
                *cell_mut(tx, entry, state)? += dt;
                Ok(())
            }
            SufficientStatistics::Static { .. } => Err(CtbnError::Invariant(
                "residence time is only tracked for continuous nodes".into(),
            )),
        }
    }

    /// Records one jump `from → to` under `entry`.
    pub fn add_jump(&mut self, entry: usize, from: usize, to: usize) -> Result<(), CtbnError> {
        match self {
            SufficientStatistics::Continuous { mxx, mx, .. } => {
                if from == to {
                    return Err(CtbnError::Invariant(format!(
                        "jump from state {} to itself",
                        from
                    )));
                }
                let row = mxx
                    .get_mut(entry)
                    .and_then(|r| r.get_mut(from))
                    .ok_or_else(|| {
                        CtbnError::Invariant(format!(
                            "statistics cell [{}][{}] out of range",
                            entry, from
                        ))
                    })?;
                *row.get_mut(to).ok_or_else(|| {
                    CtbnError::Invariant(format!("destination state {} out of range", to))
                })? += 1.0;
                *cell_mut(mx, entry, from)? += 1.0;
                Ok(())
            }
            SufficientStatistics::Static { .. } => Err(CtbnError::Invariant(
                "jumps are only tracked for continuous nodes".into(),
            )),
        }
    }

    /// Records one static observation of `state` under `entry`.
    pub fn add_occurrence(&mut self, entry: usize, state: usize) -> Result<(), CtbnError> {
        match self {
            SufficientStatistics::Static { px, counts } => {
                *cell_mut(px, entry, state)? += 1.0;
                *counts.get_mut(entry).ok_or_else(|| {
                    CtbnError::Invariant(format!("parent entry {} out of range", entry))
                })? += 1.0;
                Ok(())
            }
            SufficientStatistics::Continuous { .. } => Err(CtbnError::Invariant(
                "occurrences are only tracked for static nodes".into(),
            )),
        }
    }

    /// Closed-form MLE: `q_ii = −mx_i / tx_i`, `q_ij = mxx_ij / tx_i`,
    /// `p_j = px_j / counts`.
    ///
    /// Empty cells yield non-finite entries, which the validity check rejects.
    pub fn derive_cims(&self) -> Vec<Cim> {
        match self {
            SufficientStatistics::Continuous { tx, mxx, mx } => tx
                .iter()
                .zip(mxx)
                .zip(mx)
                .map(|((tx_e, mxx_e), mx_e)| {
                    let k = tx_e.len();
                    let mut cim = Cim::zeros(k, k);
                    for i in 0..k {
                        for j in 0..k {
                            let value = if i == j {
                                -mx_e[i] / tx_e[i]
                            } else {
                                mxx_e[i][j] / tx_e[i]
                            };
                            cim.set(i, j, value);
                        }
                    }
                    cim
                })
                .collect(),
            SufficientStatistics::Static { px, counts } => px
                .iter()
                .zip(counts)
                .map(|(px_e, &count)| {
                    let mut cim = Cim::zeros(1, px_e.len());
                    for (j, &p) in px_e.iter().enumerate() {
                        cim.set(0, j, p / count);
                    }
                    cim
                })
                .collect(),
        }
    }
}

fn cell_mut(table: &mut [Vec<f64>], entry: usize, state: usize) -> Result<&mut f64, CtbnError> {
    table
        .get_mut(entry)
        .and_then(|row| row.get_mut(state))
        .ok_or_else(|| {
            CtbnError::Invariant(format!("statistics cell [{}][{}] out of range", entry, state))
        })
}
