//! Caller-owned evidence context.
//!
//! Learning, classification and sampling walk the model while assigning a
//! current state to each variable. That scratch state lives here instead of
//! on the nodes, so a model can be shared read-only while every caller (or
//! worker thread) keeps its own context.

use crate::engine::errors::CtbnError;
use crate::engine::indexing::{NodeId, NodeIndexing};

/// Current state assignment per variable; `None` means retracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceContext {
    states: Vec<Option<usize>>,
}

impl EvidenceContext {
    /// Creates an empty context sized for `indexing`.
    pub fn new(indexing: &NodeIndexing) -> Self {
        Self::with_len(indexing.len())
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            states: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<usize> {
        self.states.get(id.index()).copied().flatten()
    }

    /// Returns the state of `id`, failing if it has no evidence.
    pub fn require(&self, id: NodeId) -> Result<usize, CtbnError> {
        self.get(id).ok_or_else(|| {
            CtbnError::Invariant(format!("node {} has no current evidence", id))
        })
    }

    pub fn set(&mut self, id: NodeId, state: usize) -> Result<(), CtbnError> {
        let slot = self.slot_mut(id)?;
        *slot = Some(state);
        Ok(())
    }

    pub fn retract(&mut self, id: NodeId) -> Result<(), CtbnError> {
        let slot = self.slot_mut(id)?;
        *slot = None;
        Ok(())
    }

    pub fn retract_all(&mut self) {
        self.states.iter_mut().for_each(|s| *s = None);
    }

    /// Overwrites every slot from a fully decoded row.
    pub fn load_row(&mut self, row: &[Option<usize>]) {
        debug_assert_eq!(row.len(), self.states.len());
        self.states.copy_from_slice(row);
    }

    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.states
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Option<usize>, CtbnError> {
        let len = self.states.len();
        self.states.get_mut(id.index()).ok_or_else(|| {
            CtbnError::Invariant(format!(
                "node {} out of range for evidence context of {} variables",
                id, len
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_retract_round_trip() {
        let mut ctx = EvidenceContext::with_len(3);
        ctx.set(NodeId(1), 4).expect("set");
        assert_eq!(ctx.get(NodeId(1)), Some(4));
        ctx.retract(NodeId(1)).expect("retract");
        assert_eq!(ctx.get(NodeId(1)), None);
        assert!(ctx.require(NodeId(1)).is_err());
    }

    #[test]
    fn out_of_range_is_an_invariant_error() {
        let mut ctx = EvidenceContext::with_len(1);
        let err = ctx.set(NodeId(5), 0).expect_err("out of range");
        assert!(matches!(err, CtbnError::Invariant(_)));
    }
}
