//! # Trajectories
//!
//! A [`Trajectory`] is the sparse-delta event log of one realization of all
//! variables: each [`Transition`] holds a time and one `Option<usize>` per
//! indexed variable, where `None` means "unchanged since the previous
//! transition". The first transition defines every variable, except that
//! the class variable may stay unset throughout (unlabeled data).
//!
//! Hot loops never resolve the lookback rule themselves: they work on a
//! [`DenseTrajectory`] produced once by [`Trajectory::decode`], in which
//! every cell already holds the resolved state.

use std::sync::Arc;

use crate::engine::errors::CtbnError;
use crate::engine::indexing::{NodeId, NodeIndexing};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    time: f64,
    values: Vec<Option<usize>>,
}

impl Transition {
    pub fn new(time: f64, values: Vec<Option<usize>>) -> Self {
        Self { time, values }
    }

    /// A transition at `time` where nothing changes.
    pub fn unchanged(time: f64, width: usize) -> Self {
        Self {
            time,
            values: vec![None; width],
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn values(&self) -> &[Option<usize>] {
        &self.values
    }

    /// The value recorded at this transition, `None` if unchanged.
    pub fn value(&self, id: NodeId) -> Option<usize> {
        self.values.get(id.index()).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    indexing: Arc<NodeIndexing>,
    transitions: Vec<Transition>,
}

impl Trajectory {
    /// Builds a trajectory from parallel `times` / `values` lists.
    pub fn new(
        indexing: Arc<NodeIndexing>,
        times: Vec<f64>,
        values: Vec<Vec<Option<usize>>>,
    ) -> Result<Self, CtbnError> {
        if times.len() != values.len() {
            return Err(CtbnError::Construction(format!(
                "trajectory has {} times but {} value rows",
                times.len(),
                values.len()
            )));
        }
        let transitions = times
            .into_iter()
            .zip(values)
            .map(|(time, values)| Transition::new(time, values))
            .collect();
        Self::from_transitions(indexing, transitions)
    }

    pub fn from_transitions(
        indexing: Arc<NodeIndexing>,
        transitions: Vec<Transition>,
    ) -> Result<Self, CtbnError> {
        let first = transitions.first().ok_or_else(|| {
            CtbnError::Construction("trajectory must contain at least one transition".into())
        })?;
        let width = indexing.len();

        for (row, transition) in transitions.iter().enumerate() {
            if transition.values.len() != width {
                return Err(CtbnError::Construction(format!(
                    "transition {} has {} values, indexing '{}' has {} variables",
                    row,
                    transition.values.len(),
                    indexing.name(),
                    width
                )));
            }
            if !transition.time.is_finite() {
                return Err(CtbnError::Construction(format!(
                    "transition {} has non-finite time {}",
                    row, transition.time
                )));
            }
        }
        if let Some(row) = transitions
            .windows(2)
            .position(|pair| pair[1].time < pair[0].time)
        {
            return Err(CtbnError::Construction(format!(
                "transition times must be non-decreasing; transition {} at {} precedes {}",
                row + 1,
                transitions[row + 1].time,
                transitions[row].time
            )));
        }
        for id in indexing.ids() {
            if first.value(id).is_none() && !indexing.is_class(id) {
                return Err(CtbnError::Construction(format!(
                    "first transition leaves variable '{}' unset",
                    indexing.name_of(id).unwrap_or("?")
                )));
            }
        }

        Ok(Self {
            indexing,
            transitions,
        })
    }

    pub fn indexing(&self) -> &Arc<NodeIndexing> {
        &self.indexing
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Always false: construction rejects empty trajectories.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn start_time(&self) -> f64 {
        self.transitions[0].time
    }

    pub fn end_time(&self) -> f64 {
        self.transitions[self.transitions.len() - 1].time
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.transitions.iter().map(Transition::time)
    }

    /// Resolves the lookback rule for a single cell by scanning backwards.
    ///
    /// Use [`decode`](Self::decode) when walking the whole trajectory.
    pub fn resolved_value(&self, row: usize, id: NodeId) -> Option<usize> {
        self.transitions
            .get(..=row)?
            .iter()
            .rev()
            .find_map(|t| t.value(id))
    }

    /// Materializes the dense view with every cell resolved.
    pub fn decode(&self) -> DenseTrajectory {
        let width = self.indexing.len();
        let mut cells = Vec::with_capacity(width * self.transitions.len());
        let mut current: Vec<Option<usize>> = vec![None; width];
        let mut times = Vec::with_capacity(self.transitions.len());
        for transition in &self.transitions {
            for (slot, value) in current.iter_mut().zip(&transition.values) {
                if value.is_some() {
                    *slot = *value;
                }
            }
            cells.extend_from_slice(&current);
            times.push(transition.time);
        }
        DenseTrajectory {
            times,
            width,
            cells,
        }
    }

    /// Keeps the transitions strictly before `start + fraction · duration`
    /// and appends one boundary transition at that time carrying the values
    /// held just before it.
    pub fn cut_at_fraction(&self, fraction: f64) -> Result<Trajectory, CtbnError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(CtbnError::Construction(format!(
                "cut fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        if self.duration() <= 0.0 {
            return Err(CtbnError::DataConsistency(
                "cannot cut a trajectory with zero duration".into(),
            ));
        }

        let cut = self.start_time() + fraction * self.duration();
        if cut <= self.start_time() {
            return Err(CtbnError::DataConsistency(format!(
                "cut at fraction {} rounds onto the start time {}",
                fraction,
                self.start_time()
            )));
        }
        let kept = self.transitions.iter().take_while(|t| t.time < cut).count();
        let dense = self.decode();
        let boundary = Transition::new(cut, dense.row(kept - 1).to_vec());

        let mut transitions = self.transitions[..kept].to_vec();
        transitions.push(boundary);
        Ok(Self {
            indexing: Arc::clone(&self.indexing),
            transitions,
        })
    }
}

/// Fully resolved, row-major view of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTrajectory {
    times: Vec<f64>,
    width: usize,
    cells: Vec<Option<usize>>,
}

impl DenseTrajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    pub fn time(&self, row: usize) -> f64 {
        self.times[row]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[Option<usize>] {
        &self.cells[row * self.width..(row + 1) * self.width]
    }

    #[inline]
    pub fn state(&self, row: usize, id: NodeId) -> Option<usize> {
        self.cells[row * self.width + id.index()]
    }

    /// Resolved state, reporting a missing value as bad input data.
    pub fn require_state(&self, row: usize, id: NodeId) -> Result<usize, CtbnError> {
        self.state(row, id).ok_or_else(|| {
            CtbnError::DataConsistency(format!("variable {} has no value at row {}", id, row))
        })
    }

    /// Whether `id` changed value between `row - 1` and `row`.
    #[inline]
    pub fn changed(&self, row: usize, id: NodeId) -> bool {
        row > 0 && self.state(row, id) != self.state(row - 1, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexing() -> Arc<NodeIndexing> {
        Arc::new(NodeIndexing::new("t", ["c", "x", "y"], Some("c")).expect("indexing"))
    }

    fn sample() -> Trajectory {
        Trajectory::new(
            indexing(),
            vec![0.0, 1.0, 2.5, 4.0],
            vec![
                vec![Some(0), Some(1), Some(0)],
                vec![None, Some(0), None],
                vec![None, None, Some(1)],
                vec![None, Some(1), None],
            ],
        )
        .expect("trajectory")
    }

    #[test]
    fn decode_resolves_lookback() {
        let traj = sample();
        let dense = traj.decode();
        assert_eq!(dense.row(2), &[Some(0), Some(0), Some(1)]);
        assert_eq!(traj.resolved_value(2, NodeId(1)), Some(0));
        assert!(dense.changed(2, NodeId(2)));
        assert!(!dense.changed(2, NodeId(1)));
    }

    #[test]
    fn first_row_must_be_complete_except_class() {
        let err = Trajectory::new(indexing(), vec![0.0], vec![vec![Some(0), None, Some(0)]])
            .expect_err("incomplete");
        assert!(matches!(err, CtbnError::Construction(_)));

        let unlabeled = Trajectory::new(indexing(), vec![0.0], vec![vec![None, Some(0), Some(0)]]);
        assert!(unlabeled.is_ok());
    }

    #[test]
    fn rejects_decreasing_times_and_ragged_rows() {
        assert!(Trajectory::new(
            indexing(),
            vec![1.0, 0.5],
            vec![vec![Some(0), Some(0), Some(0)], vec![None, None, None]],
        )
        .is_err());
        assert!(Trajectory::new(indexing(), vec![0.0], vec![vec![Some(0)]]).is_err());
        assert!(Trajectory::new(indexing(), vec![0.0, 1.0], vec![vec![Some(0); 3]]).is_err());
    }

    #[test]
    fn cut_keeps_prefix_and_appends_boundary() {
        let traj = sample();
        let cut = traj.cut_at_fraction(0.5).expect("cut");
        assert_eq!(cut.len(), 3);
        assert_eq!(&cut.transitions()[..2], &traj.transitions()[..2]);
        let boundary = &cut.transitions()[2];
        assert_eq!(boundary.time(), 2.0);
        assert_eq!(boundary.values(), &[Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn cut_rejects_bad_fraction() {
        let traj = sample();
        assert!(traj.cut_at_fraction(0.0).is_err());
        assert!(traj.cut_at_fraction(1.5).is_err());
        assert!(traj.cut_at_fraction(f64::NAN).is_err());
    }

    #[test]
    fn cut_that_rounds_onto_a_large_start_is_an_error() {
        let traj = Trajectory::new(
            indexing(),
            vec![1e17, 1e17 + 64.0],
            vec![vec![Some(0), Some(1), Some(0)], vec![None, Some(0), None]],
        )
        .expect("trajectory");
        let err = traj.cut_at_fraction(0.01).expect_err("rounds to start");
        assert!(matches!(err, CtbnError::DataConsistency(_)));
        // a coarser cut still lands past the start
        let cut = traj.cut_at_fraction(0.5).expect("cut");
        assert_eq!(cut.end_time(), 1e17 + 32.0);
    }
}
