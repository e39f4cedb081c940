//! # CTBN model
//!
//! [`CtbnModel`] owns the nodes of one network and is the only place where
//! edges are edited, so every parent relation has its matching child
//! relation. Nodes are addressed by their [`NodeId`] in the shared
//! [`NodeIndexing`]; a model may cover a subset of the indexed variables.
//!
//! ## Structure
//!
//! - [`CtbnModel::add_edge`] / [`CtbnModel::remove_edge`] edit single edges
//! - [`CtbnModel::set_structure`] rebuilds every edge from an `N×N` adjacency
//!   matrix over the indexing order (`matrix[p][c]` means `p → c`)
//! - [`CtbnModel::adjacency_matrix`] is the inverse
//!
//! Any edge edit resets the child's CIM table.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::errors::CtbnError;
use crate::engine::indexing::{NodeId, NodeIndexing};
use crate::engine::node::{CtNode, NodeKind};

pub type AdjacencyMatrix = Vec<Vec<bool>>;

#[derive(Debug, Clone)]
pub struct CtbnModel {
    name: String,
    indexing: Arc<NodeIndexing>,
    nodes: Vec<CtNode>,
    slots: FxHashMap<NodeId, usize>,
}

impl CtbnModel {
    pub fn new(indexing: Arc<NodeIndexing>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            indexing,
            nodes: Vec::new(),
            slots: FxHashMap::default(),
        }
    }

    /// Builds a class-rooted naive-Bayes skeleton: the class variable is a
    /// static root and every other listed variable is continuous with the
    /// class as its only parent.
    ///
    /// `states[i]` are the states of the variable with id `i`.
    pub fn naive_bayes(
        indexing: Arc<NodeIndexing>,
        name: &str,
        states: &[Vec<String>],
    ) -> Result<Self, CtbnError> {
        let class_id = indexing.class_id().ok_or_else(|| {
            CtbnError::Construction(format!(
                "naive Bayes model '{}' needs an indexing with a class variable",
                name
            ))
        })?;
        if states.len() != indexing.len() {
            return Err(CtbnError::Construction(format!(
                "expected state lists for {} variables, got {}",
                indexing.len(),
                states.len()
            )));
        }

        let mut model = Self::new(Arc::clone(&indexing), name);
        for (id, node_states) in indexing.ids().zip(states) {
            let kind = if id == class_id {
                NodeKind::Static
            } else {
                NodeKind::Continuous
            };
            let var = indexing.name_of(id).unwrap_or_default();
            model.add_node(CtNode::new(&indexing, var, node_states.iter().cloned(), kind)?)?;
        }
        for id in indexing.ids().filter(|&id| id != class_id) {
            model.add_edge(class_id, id)?;
        }
        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexing(&self) -> &Arc<NodeIndexing> {
        &self.indexing
    }

    /// Adds a parentless node. Its id must belong to this model's indexing
    /// and not be present yet.
    pub fn add_node(&mut self, node: CtNode) -> Result<NodeId, CtbnError> {
        let id = node.id();
        self.indexing.check_id(id)?;
        if self.indexing.name_of(id) != Some(node.name()) {
            return Err(CtbnError::Construction(format!(
                "node '{}' was built against a different indexing than model '{}'",
                node.name(),
                self.name
            )));
        }
        if self.slots.contains_key(&id) {
            return Err(CtbnError::Construction(format!(
                "model '{}' already contains node '{}'",
                self.name,
                node.name()
            )));
        }
        if !node.parents().is_empty() || !node.children().is_empty() {
            return Err(CtbnError::Construction(format!(
                "node '{}' must be added without edges",
                node.name()
            )));
        }
        self.slots.insert(id, self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[CtNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&CtNode> {
        self.slots.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut CtNode> {
        match self.slots.get(&id) {
            Some(&slot) => Some(&mut self.nodes[slot]),
            None => None,
        }
    }

    pub fn require_node(&self, id: NodeId) -> Result<&CtNode, CtbnError> {
        self.node(id).ok_or_else(|| self.missing_node(id))
    }

    pub fn require_node_mut(&mut self, id: NodeId) -> Result<&mut CtNode, CtbnError> {
        match self.slots.get(&id).copied() {
            Some(slot) => Ok(&mut self.nodes[slot]),
            None => Err(self.missing_node(id)),
        }
    }

    pub fn node_by_name(&self, name: &str) -> Option<&CtNode> {
        self.indexing.id_of(name).and_then(|id| self.node(id))
    }

    /// The class node, which must exist in the model.
    pub fn class_node(&self) -> Result<&CtNode, CtbnError> {
        let class_id = self.indexing.class_id().ok_or_else(|| {
            CtbnError::Invariant(format!(
                "indexing '{}' has no class variable",
                self.indexing.name()
            ))
        })?;
        self.require_node(class_id)
    }

    fn missing_node(&self, id: NodeId) -> CtbnError {
        CtbnError::Invariant(format!(
            "node {} ({}) is not part of model '{}'",
            id,
            self.indexing.name_of(id).unwrap_or("?"),
            self.name
        ))
    }

    fn slot(&self, id: NodeId) -> Result<usize, CtbnError> {
        self.slots.get(&id).copied().ok_or_else(|| self.missing_node(id))
    }

    // Structure editing

    /// Adds `parent → child`; resets the child's CIMs.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), CtbnError> {
        let parent_slot = self.slot(parent)?;
        let child_slot = self.slot(child)?;
        let cardinality = self.nodes[parent_slot].cardinality();
        self.nodes[child_slot].attach_parent(parent, cardinality)?;
        if let Err(err) = self.nodes[parent_slot].attach_child(child) {
            // keep the pair symmetric
            self.nodes[child_slot].detach_parent(parent)?;
            return Err(err);
        }
        Ok(())
    }

    /// Removes `parent → child`; resets the child's CIMs.
    pub fn remove_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), CtbnError> {
        let parent_slot = self.slot(parent)?;
        let child_slot = self.slot(child)?;
        if !self.nodes[child_slot].parents().contains(&parent) {
            return Err(CtbnError::Invariant(format!(
                "edge {} -> {} does not exist in model '{}'",
                parent, child, self.name
            )));
        }
        self.nodes[child_slot].detach_parent(parent)?;
        self.nodes[parent_slot].detach_child(child)?;
        Ok(())
    }

    pub fn has_edge(&self, parent: NodeId, child: NodeId) -> bool {
        self.node(child)
            .map(|n| n.parents().contains(&parent))
            .unwrap_or(false)
    }

    /// Removes every edge. Each child's CIM table is reset.
    pub fn clear_edges(&mut self) -> Result<(), CtbnError> {
        let edges: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .flat_map(|n| n.parents().iter().map(move |&p| (p, n.id())))
            .collect();
        for (parent, child) in edges {
            self.remove_edge(parent, child)?;
        }
        Ok(())
    }

    /// Rebuilds all edges from an `N×N` matrix over the indexing order.
    ///
    /// Parents are attached to each child in increasing id order, which fixes
    /// the parent-entry encoding. The matrix is checked completely before
    /// any edge changes.
    pub fn set_structure(&mut self, matrix: &[Vec<bool>]) -> Result<(), CtbnError> {
        let n = self.indexing.len();
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(CtbnError::Construction(format!(
                "adjacency matrix must be {}x{} for indexing '{}'",
                n,
                n,
                self.indexing.name()
            )));
        }
        for (p, row) in matrix.iter().enumerate() {
            for (c, &edge) in row.iter().enumerate() {
                if !edge {
                    continue;
                }
                if p == c {
                    return Err(CtbnError::Invariant(format!(
                        "adjacency matrix marks '{}' as its own parent",
                        self.indexing.names()[p]
                    )));
                }
                for id in [NodeId(p as u32), NodeId(c as u32)] {
                    if !self.contains(id) {
                        return Err(self.missing_node(id));
                    }
                }
            }
        }

        self.clear_edges()?;
        for c in 0..n {
            for (p, row) in matrix.iter().enumerate() {
                if row[c] {
                    self.add_edge(NodeId(p as u32), NodeId(c as u32))?;
                }
            }
        }
        Ok(())
    }

    /// `N×N` matrix over the indexing order with `matrix[p][c] = p → c`.
    pub fn adjacency_matrix(&self) -> AdjacencyMatrix {
        let n = self.indexing.len();
        let mut matrix = vec![vec![false; n]; n];
        for node in &self.nodes {
            for parent in node.parents() {
                matrix[parent.index()][node.id().index()] = true;
            }
        }
        matrix
    }

    /// Copy sharing the indexing, with identical structure and zeroed CIMs.
    pub fn clone_skeleton(&self) -> Self {
        let mut skeleton = self.clone();
        for node in &mut skeleton.nodes {
            node.reset_cims();
        }
        skeleton
    }

    /// Validates every node's CIM table.
    pub fn validate(&mut self) -> Result<(), CtbnError> {
        for node in &mut self.nodes {
            node.validate_cims()?;
        }
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.nodes.iter().all(CtNode::is_validated)
    }

    /// Fails unless every node carries validated CIMs.
    pub fn require_validated(&self) -> Result<(), CtbnError> {
        self.nodes.iter().try_for_each(CtNode::require_validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cim::Cim;

    fn three_node_model() -> CtbnModel {
        let indexing =
            Arc::new(NodeIndexing::new("m", ["c", "x", "y"], Some("c")).expect("indexing"));
        let states = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["0".to_string(), "1".to_string(), "2".to_string()],
            vec!["lo".to_string(), "hi".to_string()],
        ];
        CtbnModel::naive_bayes(indexing, "nb", &states).expect("model")
    }

    #[test]
    fn naive_bayes_wires_class_to_every_feature() {
        let model = three_node_model();
        let class = model.class_node().expect("class");
        assert!(class.is_static());
        assert_eq!(class.children(), &[NodeId(1), NodeId(2)]);
        let x = model.node(NodeId(1)).expect("x");
        assert_eq!(x.parents(), &[NodeId(0)]);
        assert_eq!(x.parent_entries(), 2);
    }

    #[test]
    fn edges_stay_symmetric() {
        let mut model = three_node_model();
        model.add_edge(NodeId(1), NodeId(2)).expect("edge");
        assert!(model.node(NodeId(1)).expect("x").children().contains(&NodeId(2)));
        assert_eq!(model.node(NodeId(2)).expect("y").parent_entries(), 6);

        model.remove_edge(NodeId(1), NodeId(2)).expect("remove");
        assert!(!model.node(NodeId(1)).expect("x").children().contains(&NodeId(2)));
        assert_eq!(model.node(NodeId(2)).expect("y").parent_entries(), 2);

        assert!(model.add_edge(NodeId(0), NodeId(1)).is_err());
        assert!(model.add_edge(NodeId(2), NodeId(2)).is_err());
        assert!(model.remove_edge(NodeId(2), NodeId(1)).is_err());
    }

    #[test]
    fn structure_round_trips_through_adjacency_matrix() {
        let mut model = three_node_model();
        let matrix = vec![
            vec![false, true, false],
            vec![false, false, true],
            vec![false, false, false],
        ];
        model.set_structure(&matrix).expect("structure");
        assert_eq!(model.adjacency_matrix(), matrix);
        assert_eq!(model.node(NodeId(2)).expect("y").parents(), &[NodeId(1)]);
    }

    #[test]
    fn bad_matrix_leaves_structure_untouched() {
        let mut model = three_node_model();
        let before = model.adjacency_matrix();
        let self_loop = vec![
            vec![true, false, false],
            vec![false, false, false],
            vec![false, false, false],
        ];
        assert!(model.set_structure(&self_loop).is_err());
        assert!(model.set_structure(&[vec![false]]).is_err());
        assert_eq!(model.adjacency_matrix(), before);
    }

    #[test]
    fn skeleton_keeps_structure_but_drops_parameters() {
        let mut model = three_node_model();
        let class_id = NodeId(0);
        model
            .require_node_mut(class_id)
            .expect("class")
            .set_cims(vec![Cim::from_rows(vec![vec![0.4, 0.6]]).expect("cim")])
            .expect("set");
        model.validate().expect("valid");
        assert!(model.is_validated());

        let skeleton = model.clone_skeleton();
        assert_eq!(skeleton.adjacency_matrix(), model.adjacency_matrix());
        assert!(!skeleton.is_validated());
        assert_eq!(
            skeleton.node(class_id).expect("class").cim(0).expect("cim").get(0, 1),
            0.0
        );
        assert!(Arc::ptr_eq(skeleton.indexing(), model.indexing()));
    }
}
