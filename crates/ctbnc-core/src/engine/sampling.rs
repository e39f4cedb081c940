//! Forward simulation of trajectories from a model with validated CIMs.
//!
//! Continuous nodes start in a uniformly drawn state; static nodes are drawn
//! from their priors once their parents are set. The event loop keeps one
//! pending jump time per continuous node: the earliest fires, the node's
//! state changes, and that node plus its continuous children are
//! rescheduled because their rates depend on the new state. Exponential
//! dwell times are memoryless, so every other pending time stays valid.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, trace};

use crate::engine::errors::CtbnError;
use crate::engine::evidence::EvidenceContext;
use crate::engine::indexing::NodeId;
use crate::engine::model::CtbnModel;
use crate::engine::trajectory::{Trajectory, Transition};

/// Generates trajectories over `[0, horizon]`.
#[derive(Debug, Clone)]
pub struct TrajectorySampler<'a> {
    model: &'a CtbnModel,
    /// Static node slots, each after all of its static parents.
    static_order: Vec<usize>,
    /// Model slot per indexing id, `None` when the variable is not modelled.
    slot_of: Vec<Option<usize>>,
}

impl<'a> TrajectorySampler<'a> {
    pub fn new(model: &'a CtbnModel) -> Result<Self, CtbnError> {
        model.require_validated()?;
        if model.len() != model.indexing().len() {
            return Err(CtbnError::Construction(format!(
                "model '{}' covers {} of {} indexed variables; sampling needs all of them",
                model.name(),
                model.len(),
                model.indexing().len()
            )));
        }

        let mut slot_of = vec![None; model.indexing().len()];
        for (slot, node) in model.nodes().iter().enumerate() {
            slot_of[node.id().index()] = Some(slot);
        }
        let static_order = static_order(model, &slot_of)?;
        Ok(Self {
            model,
            static_order,
            slot_of,
        })
    }

    pub fn model(&self) -> &CtbnModel {
        self.model
    }

    /// Samples one trajectory ending with an all-unset record at `horizon`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        horizon: f64,
        rng: &mut R,
    ) -> Result<Trajectory, CtbnError> {
        if !horizon.is_finite() || horizon <= 0.0 {
            return Err(CtbnError::Construction(format!(
                "sampling horizon must be finite and > 0, got {}",
                horizon
            )));
        }

        let nodes = self.model.nodes();
        let width = self.model.indexing().len();
        let mut ctx = EvidenceContext::new(self.model.indexing());

        for node in nodes.iter().filter(|n| !n.is_static()) {
            ctx.set(node.id(), rng.gen_range(0..node.cardinality()))?;
        }
        for &slot in &self.static_order {
            let node = &nodes[slot];
            let entry = node.parent_entry(&ctx)?;
            ctx.set(node.id(), node.sample_static_state(entry, rng)?)?;
        }

        let mut transitions = vec![Transition::new(0.0, ctx.as_slice().to_vec())];
        let mut pending: Vec<Option<f64>> = vec![None; nodes.len()];
        let mut now = 0.0;
        loop {
            for (slot, node) in nodes.iter().enumerate() {
                if node.is_static() || pending[slot].is_some() {
                    continue;
                }
                let entry = node.parent_entry(&ctx)?;
                let state = ctx.require(node.id())?;
                pending[slot] = Some(now + node.sample_dwell_time(entry, state, rng)?);
            }

            let next = pending
                .iter()
                .enumerate()
                .filter_map(|(slot, t)| t.map(|t| (slot, t)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let (slot, time) = match next {
                Some((slot, time)) if time < horizon => (slot, time),
                _ => break,
            };

            let node = &nodes[slot];
            let entry = node.parent_entry(&ctx)?;
            let from = ctx.require(node.id())?;
            let to = node.sample_next_state(entry, from, rng)?;
            ctx.set(node.id(), to)?;
            now = time;
            trace!(node = node.name(), time, from, to, "sampled jump");

            let mut values = vec![None; width];
            values[node.id().index()] = Some(to);
            transitions.push(Transition::new(time, values));

            pending[slot] = None;
            for child in node.children() {
                if let Some(child_slot) = self.slot_of[child.index()] {
                    pending[child_slot] = None;
                }
            }
        }
        transitions.push(Transition::unchanged(horizon, width));

        debug!(
            model = self.model.name(),
            horizon,
            transitions = transitions.len(),
            "sampled trajectory"
        );
        Trajectory::from_transitions(Arc::clone(self.model.indexing()), transitions)
    }
}

/// Orders static nodes so that static parents come first.
fn static_order(model: &CtbnModel, slot_of: &[Option<usize>]) -> Result<Vec<usize>, CtbnError> {
    let nodes = model.nodes();
    let is_static_parent = |parent: &NodeId| {
        slot_of[parent.index()]
            .map(|slot| nodes[slot].is_static())
            .unwrap_or(false)
    };

    let mut order = Vec::new();
    let mut placed = vec![false; nodes.len()];
    let mut remaining: Vec<usize> = (0..nodes.len()).filter(|&s| nodes[s].is_static()).collect();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|&slot| {
            let ready = nodes[slot]
                .parents()
                .iter()
                .filter(|p| is_static_parent(p))
                .all(|p| slot_of[p.index()].map(|s| placed[s]).unwrap_or(true));
            if ready {
                placed[slot] = true;
                order.push(slot);
            }
            !ready
        });
        if remaining.len() == before {
            let names: Vec<&str> = remaining.iter().map(|&s| nodes[s].name()).collect();
            return Err(CtbnError::Invariant(format!(
                "static nodes form a cycle: {}",
                names.join(", ")
            )));
        }
    }
    Ok(order)
}

/// Convenience for the common case: one sampler, one trajectory.
pub fn sample_trajectory<R: Rng + ?Sized>(
    model: &CtbnModel,
    horizon: f64,
    rng: &mut R,
) -> Result<Trajectory, CtbnError> {
    TrajectorySampler::new(model)?.generate(horizon, rng)
}
