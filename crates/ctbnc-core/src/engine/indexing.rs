//! # Node indexing
//!
//! A [`NodeIndexing`] maps variable names to dense integer ids and back, and
//! marks which variable is the class. Every node, trajectory and model of a
//! dataset is built against the same indexing, shared read-only via `Arc`.
//!
//! [`IndexingRegistry`] is an explicit, caller-owned registry that hands out
//! indexings by name with get-or-create semantics. It is safe to use from
//! several threads at once; once created an indexing never changes.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::engine::errors::CtbnError;

/// A unique identifier for a variable within a [`NodeIndexing`].
///
/// NodeId implements Ord/PartialOrd for stable, deterministic iteration.
/// Uses u32 internally for efficient storage and indexing.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of this id in dense per-variable arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable name ⇄ id mapping for the variables of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIndexing {
    name: String,
    names: Vec<String>,
    lookup: FxHashMap<String, NodeId>,
    class_id: Option<NodeId>,
}

impl NodeIndexing {
    /// Builds an indexing from variable names in first-seen order.
    ///
    /// Repeated names keep the index of their first occurrence. When
    /// `class_name` is given it must be one of the variables.
    pub fn new<I, S>(name: &str, variables: I, class_name: Option<&str>) -> Result<Self, CtbnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = Vec::new();
        let mut lookup = FxHashMap::default();
        for variable in variables {
            let variable: String = variable.into();
            if variable.is_empty() {
                return Err(CtbnError::Construction(format!(
                    "indexing '{}': variable names must not be empty",
                    name
                )));
            }
            if lookup.contains_key(&variable) {
                continue;
            }
            let id = NodeId(names.len() as u32);
            lookup.insert(variable.clone(), id);
            names.push(variable);
        }

        let class_id = match class_name {
            None => None,
            Some(class) => Some(*lookup.get(class).ok_or_else(|| {
                CtbnError::Construction(format!(
                    "indexing '{}': class variable '{}' is not among the variables",
                    name, class
                ))
            })?),
        };

        Ok(Self {
            name: name.to_string(),
            names,
            lookup,
            class_id,
        })
    }

    /// Name of this indexing (usually the dataset or model family).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of indexed variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Variable names in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Ids of all variables in index order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.names.len()).map(|i| NodeId(i as u32))
    }

    pub fn id_of(&self, variable: &str) -> Option<NodeId> {
        self.lookup.get(variable).copied()
    }

    /// Like [`id_of`](Self::id_of) but reports unknown names as an invariant error.
    pub fn require_id(&self, variable: &str) -> Result<NodeId, CtbnError> {
        self.id_of(variable).ok_or_else(|| {
            CtbnError::Invariant(format!(
                "variable '{}' not found in indexing '{}'",
                variable, self.name
            ))
        })
    }

    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// The class variable, if one is designated.
    pub fn class_id(&self) -> Option<NodeId> {
        self.class_id
    }

    pub fn is_class(&self, id: NodeId) -> bool {
        self.class_id == Some(id)
    }

    /// Checks that `id` addresses one of the indexed variables.
    pub fn check_id(&self, id: NodeId) -> Result<(), CtbnError> {
        if id.index() < self.names.len() {
            Ok(())
        } else {
            Err(CtbnError::Invariant(format!(
                "node id {} out of range for indexing '{}' with {} variables",
                id,
                self.name,
                self.names.len()
            )))
        }
    }
}

/// Thread-safe get-or-create registry of named indexings.
#[derive(Debug, Default)]
pub struct IndexingRegistry {
    inner: RwLock<FxHashMap<String, Arc<NodeIndexing>>>,
}

impl IndexingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the indexing registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<NodeIndexing>> {
        self.inner
            .read()
            .ok()
            .and_then(|guard| guard.get(name).cloned())
    }

    /// Returns the indexing registered under `name`, building it with `build`
    /// on first use.
    ///
    /// `build` runs under the write lock, so concurrent first-time calls for
    /// the same name build it exactly once and all receive the same `Arc`.
    pub fn get_or_create<F>(&self, name: &str, build: F) -> Result<Arc<NodeIndexing>, CtbnError>
    where
        F: FnOnce() -> Result<NodeIndexing, CtbnError>,
    {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        let mut guard = self
            .inner
            .write()
            .map_err(|_| CtbnError::Invariant("indexing registry lock poisoned".into()))?;
        if let Some(existing) = guard.get(name) {
            return Ok(Arc::clone(existing));
        }

        let indexing = build()?;
        if indexing.name() != name {
            return Err(CtbnError::Construction(format!(
                "indexing built for '{}' is named '{}'",
                name,
                indexing.name()
            )));
        }
        let indexing = Arc::new(indexing);
        guard.insert(name.to_string(), Arc::clone(&indexing));
        Ok(indexing)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_first_seen_order() {
        let indexing =
            NodeIndexing::new("ds", ["class", "x", "y", "x"], Some("class")).expect("indexing");
        assert_eq!(indexing.len(), 3);
        assert_eq!(indexing.id_of("class"), Some(NodeId(0)));
        assert_eq!(indexing.id_of("y"), Some(NodeId(2)));
        assert_eq!(indexing.name_of(NodeId(1)), Some("x"));
        assert_eq!(indexing.class_id(), Some(NodeId(0)));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let err = NodeIndexing::new("ds", ["x"], Some("c")).expect_err("must reject");
        assert!(matches!(err, CtbnError::Construction(_)));
    }

    #[test]
    fn require_id_reports_missing_name() {
        let indexing = NodeIndexing::new("ds", ["x"], None).expect("indexing");
        let err = indexing.require_id("nope").expect_err("missing");
        assert!(err.to_string().contains("nope"), "unexpected error: {}", err);
    }

    #[test]
    fn registry_returns_shared_instance() {
        let registry = IndexingRegistry::new();
        let first = registry
            .get_or_create("ds", || NodeIndexing::new("ds", ["a", "b"], None))
            .expect("create");
        let second = registry
            .get_or_create("ds", || panic!("must not rebuild"))
            .expect("fetch");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_is_safe_under_concurrent_creation() {
        let registry = Arc::new(IndexingRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let name = format!("ds{}", i % 2);
                    registry
                        .get_or_create(&name, || NodeIndexing::new(&name, ["a"], None))
                        .expect("create")
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(registry.len(), 2);
    }
}
