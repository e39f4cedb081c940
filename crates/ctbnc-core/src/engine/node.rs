//! # CT-discrete nodes
//!
//! [`CtNode`] is the single record describing one variable of a CTBN: its
//! ordered finite state set, whether it is [`NodeKind::Static`] (a direct
//! prior per parent configuration) or [`NodeKind::Continuous`] (a generator
//! per parent configuration), its parent/child ids, and its CIM table.
//!
//! ## Parent entries
//!
//! The CIM table holds one [`Cim`] per parent entry. Entries are produced by
//! the node's [`ParentRadix`] from the parents' current states, read from an
//! [`EvidenceContext`]. Attaching or detaching a parent rebuilds the radix
//! and resets the table to zeroed CIMs.
//!
//! ## Validation
//!
//! Every CIM mutation clears the validated flag; only
//! [`CtNode::validate_cims`] sets it. Sampling refuses unvalidated nodes.
//!
//! Edges are edited through [`CtbnModel`](crate::engine::model::CtbnModel),
//! which keeps parent and child lists symmetric.

use rand::Rng;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::cim::Cim;
use crate::engine::errors::CtbnError;
use crate::engine::evidence::EvidenceContext;
use crate::engine::indexing::{NodeId, NodeIndexing};
use crate::engine::radix::ParentRadix;

/// Characters that cannot appear in state names.
pub const RESERVED_STATE_CHARS: &[char] = &[',', '"', '\r', '\n'];

/// Dynamics of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Never changes within a trajectory; parameterized by a prior row.
    Static,
    /// Evolves as a continuous-time Markov chain; parameterized by a generator.
    Continuous,
}

pub type NodeList = SmallVec<[NodeId; 4]>;

#[derive(Debug, Clone)]
pub struct CtNode {
    id: NodeId,
    name: String,
    states: Vec<String>,
    state_lookup: FxHashMap<String, usize>,
    kind: NodeKind,
    parents: NodeList,
    children: NodeList,
    radix: ParentRadix,
    cims: Vec<Cim>,
    validated: bool,
}

impl CtNode {
    /// Creates a parentless node for the variable `name` of `indexing`.
    pub fn new<S: Into<String>>(
        indexing: &NodeIndexing,
        name: &str,
        states: impl IntoIterator<Item = S>,
        kind: NodeKind,
    ) -> Result<Self, CtbnError> {
        let id = indexing.id_of(name).ok_or_else(|| {
            CtbnError::Construction(format!(
                "node '{}' is not a variable of indexing '{}'",
                name,
                indexing.name()
            ))
        })?;

        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        if states.is_empty() {
            return Err(CtbnError::Construction(format!(
                "node '{}' must have at least one state",
                name
            )));
        }
        let mut state_lookup = FxHashMap::default();
        for (i, state) in states.iter().enumerate() {
            if state.is_empty() || state.contains(RESERVED_STATE_CHARS) {
                return Err(CtbnError::Construction(format!(
                    "node '{}': state name {:?} is empty or contains a reserved character",
                    name, state
                )));
            }
            if state_lookup.insert(state.clone(), i).is_some() {
                return Err(CtbnError::Construction(format!(
                    "node '{}': duplicate state '{}'",
                    name, state
                )));
            }
        }

        let mut node = Self {
            id,
            name: name.to_string(),
            states,
            state_lookup,
            kind,
            parents: NodeList::new(),
            children: NodeList::new(),
            radix: ParentRadix::default(),
            cims: Vec::new(),
            validated: false,
        };
        node.reset_cims();
        Ok(node)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == NodeKind::Static
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Number of states.
    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.state_lookup.get(state).copied()
    }

    pub fn require_state_index(&self, state: &str) -> Result<usize, CtbnError> {
        self.state_index(state).ok_or_else(|| {
            CtbnError::Invariant(format!("state '{}' not found in node '{}'", state, self.name))
        })
    }

    pub fn state_name(&self, index: usize) -> Option<&str> {
        self.states.get(index).map(String::as_str)
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn radix(&self) -> &ParentRadix {
        &self.radix
    }

    /// Number of parent configurations, i.e. the CIM table length.
    pub fn parent_entries(&self) -> usize {
        self.radix.entries()
    }

    /// Shape every CIM of this node must have.
    pub fn cim_shape(&self) -> (usize, usize) {
        match self.kind {
            NodeKind::Static => (1, self.cardinality()),
            NodeKind::Continuous => (self.cardinality(), self.cardinality()),
        }
    }

    // Graph editing: only the model calls these, and always in pairs.

    pub(crate) fn attach_parent(
        &mut self,
        parent: NodeId,
        cardinality: usize,
    ) -> Result<(), CtbnError> {
        if parent == self.id {
            return Err(CtbnError::Invariant(format!(
                "node '{}' cannot be its own parent",
                self.name
            )));
        }
        if self.parents.contains(&parent) {
            return Err(CtbnError::Invariant(format!(
                "node {} is already a parent of '{}'",
                parent, self.name
            )));
        }
        let mut cards: SmallVec<[usize; 4]> = self.radix.cardinalities().iter().copied().collect();
        cards.push(cardinality);
        self.parents.push(parent);
        self.radix = ParentRadix::new(&cards);
        self.reset_cims();
        Ok(())
    }

    pub(crate) fn detach_parent(&mut self, parent: NodeId) -> Result<(), CtbnError> {
        let pos = self.parents.iter().position(|&p| p == parent).ok_or_else(|| {
            CtbnError::Invariant(format!("node {} is not a parent of '{}'", parent, self.name))
        })?;
        let mut cards: SmallVec<[usize; 4]> = self.radix.cardinalities().iter().copied().collect();
        cards.remove(pos);
        self.parents.remove(pos);
        self.radix = ParentRadix::new(&cards);
        self.reset_cims();
        Ok(())
    }

    pub(crate) fn attach_child(&mut self, child: NodeId) -> Result<(), CtbnError> {
        if self.children.contains(&child) {
            return Err(CtbnError::Invariant(format!(
                "node {} is already a child of '{}'",
                child, self.name
            )));
        }
        self.children.push(child);
        Ok(())
    }

    pub(crate) fn detach_child(&mut self, child: NodeId) -> Result<(), CtbnError> {
        let pos = self.children.iter().position(|&c| c == child).ok_or_else(|| {
            CtbnError::Invariant(format!("node {} is not a child of '{}'", child, self.name))
        })?;
        self.children.remove(pos);
        Ok(())
    }

    // CIM table

    /// Replaces every CIM with a zeroed matrix of the right shape.
    pub fn reset_cims(&mut self) {
        let (rows, cols) = self.cim_shape();
        self.cims = vec![Cim::zeros(rows, cols); self.radix.entries()];
        self.validated = false;
    }

    pub fn cims(&self) -> &[Cim] {
        &self.cims
    }

    pub fn cim(&self, entry: usize) -> Option<&Cim> {
        self.cims.get(entry)
    }

    pub fn set_cim(&mut self, entry: usize, cim: Cim) -> Result<(), CtbnError> {
        let entries = self.cims.len();
        self.check_shape(entry, &cim)?;
        let slot = self.cims.get_mut(entry).ok_or_else(|| {
            CtbnError::Invariant(format!(
                "node '{}': parent entry {} out of range [0, {})",
                self.name, entry, entries
            ))
        })?;
        *slot = cim;
        self.validated = false;
        Ok(())
    }

    /// Replaces the whole table; `cims.len()` must equal the entry count.
    pub fn set_cims(&mut self, cims: Vec<Cim>) -> Result<(), CtbnError> {
        if cims.len() != self.radix.entries() {
            return Err(CtbnError::Construction(format!(
                "node '{}' needs {} CIMs, got {}",
                self.name,
                self.radix.entries(),
                cims.len()
            )));
        }
        for (entry, cim) in cims.iter().enumerate() {
            self.check_shape(entry, cim)?;
        }
        self.cims = cims;
        self.validated = false;
        Ok(())
    }

    fn check_shape(&self, entry: usize, cim: &Cim) -> Result<(), CtbnError> {
        let (rows, cols) = self.cim_shape();
        if cim.rows() != rows || cim.cols() != cols {
            return Err(CtbnError::Construction(format!(
                "node '{}' entry {}: CIM must be {}x{}, got {}x{}",
                self.name,
                entry,
                rows,
                cols,
                cim.rows(),
                cim.cols()
            )));
        }
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Scans the table and returns the first malformed entry with the reason.
    /// Does not touch the validated flag.
    pub fn first_invalid_entry(&self) -> Option<(usize, String)> {
        check_cim_table(self.kind, &self.cims)
    }

    /// Full validation pass; sets the validated flag on success.
    pub fn validate_cims(&mut self) -> Result<(), CtbnError> {
        if let Some((entry, reason)) = self.first_invalid_entry() {
            self.validated = false;
            return Err(CtbnError::InvalidCim {
                node: self.name.clone(),
                entry,
                reason,
            });
        }
        self.validated = true;
        Ok(())
    }

    pub fn require_validated(&self) -> Result<(), CtbnError> {
        if self.validated {
            Ok(())
        } else {
            Err(CtbnError::Invariant(format!(
                "node '{}' has unvalidated CIMs",
                self.name
            )))
        }
    }

    // Parent configuration

    /// Encodes the parents' current states in `ctx` as a parent entry.
    pub fn parent_entry(&self, ctx: &EvidenceContext) -> Result<usize, CtbnError> {
        let mut entry = 0usize;
        for (i, &parent) in self.parents.iter().enumerate() {
            let state = ctx.get(parent).ok_or_else(|| {
                CtbnError::Invariant(format!(
                    "parent {} of node '{}' has no current evidence",
                    parent, self.name
                ))
            })?;
            let card = self.radix.cardinalities()[i];
            if state >= card {
                return Err(CtbnError::Invariant(format!(
                    "parent {} of node '{}' is in state {}, cardinality is {}",
                    parent, self.name, state, card
                )));
            }
            entry += state * self.radix.multipliers()[i];
        }
        Ok(entry)
    }

    /// Writes into `ctx` the parent states that encode to `entry`.
    pub fn apply_parent_entry(
        &self,
        entry: usize,
        ctx: &mut EvidenceContext,
    ) -> Result<(), CtbnError> {
        let digits = self.radix.decode(entry)?;
        for (&parent, &state) in self.parents.iter().zip(digits.iter()).rev() {
            ctx.set(parent, state)?;
        }
        Ok(())
    }

    // Sampling

    /// Draws the time until the next jump out of `state`.
    ///
    /// Returns `f64::INFINITY` for an absorbing state (rate 0).
    pub fn sample_dwell_time<R: Rng + ?Sized>(
        &self,
        entry: usize,
        state: usize,
        rng: &mut R,
    ) -> Result<f64, CtbnError> {
        let cim = self.sampling_cim(NodeKind::Continuous, entry)?;
        let rate = -cim.get(state, state);
        if rate <= 0.0 {
            return Ok(f64::INFINITY);
        }
        let u: f64 = rng.gen();
        Ok(-(1.0 - u).ln() / rate)
    }

    /// Draws the destination of a jump out of `state` from the
    /// off-diagonal row, renormalized.
    pub fn sample_next_state<R: Rng + ?Sized>(
        &self,
        entry: usize,
        state: usize,
        rng: &mut R,
    ) -> Result<usize, CtbnError> {
        let cim = self.sampling_cim(NodeKind::Continuous, entry)?;
        let row = cim.row(state);
        let weights: SmallVec<[f64; 8]> = row
            .iter()
            .enumerate()
            .map(|(j, &v)| if j == state { 0.0 } else { v })
            .collect();
        sample_weighted(&weights, rng).ok_or_else(|| {
            CtbnError::Numerical(format!(
                "node '{}': state '{}' is absorbing under parent entry {}",
                self.name, self.states[state], entry
            ))
        })
    }

    /// Draws a state from a static node's prior row.
    pub fn sample_static_state<R: Rng + ?Sized>(
        &self,
        entry: usize,
        rng: &mut R,
    ) -> Result<usize, CtbnError> {
        let cim = self.sampling_cim(NodeKind::Static, entry)?;
        sample_weighted(cim.row(0), rng).ok_or_else(|| {
            CtbnError::Numerical(format!(
                "node '{}': prior under parent entry {} has zero mass",
                self.name, entry
            ))
        })
    }

    fn sampling_cim(&self, expected: NodeKind, entry: usize) -> Result<&Cim, CtbnError> {
        self.require_validated()?;
        if self.kind != expected {
            return Err(CtbnError::Invariant(format!(
                "node '{}' is {:?}, operation requires {:?}",
                self.name, self.kind, expected
            )));
        }
        self.cim(entry).ok_or_else(|| {
            CtbnError::Invariant(format!(
                "node '{}': parent entry {} out of range [0, {})",
                self.name,
                entry,
                self.cims.len()
            ))
        })
    }
}

/// Validity scan shared by nodes and by learning's staging tables.
pub(crate) fn check_cim_table(kind: NodeKind, cims: &[Cim]) -> Option<(usize, String)> {
    cims.iter().enumerate().find_map(|(entry, cim)| {
        let outcome = match kind {
            NodeKind::Continuous => cim.check_generator(),
            NodeKind::Static => cim.check_distribution(),
        };
        outcome.err().map(|reason| (entry, reason))
    })
}

/// Samples an index proportionally to non-negative weights.
fn sample_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let target = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    let mut last_positive = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        acc += w;
        last_positive = Some(i);
        if target < acc {
            return Some(i);
        }
    }
    last_positive
}
