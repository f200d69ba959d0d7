use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

/// Incrementally built directed graph, stored as adjacency sets.
///
/// The layers of a [`KnownGraph`] grow edge by edge while pruning runs; the
/// algebra happens on [`MatrixGraph`] snapshots taken between rounds.
///
/// [`KnownGraph`]: crate::graph::known::KnownGraph
/// [`MatrixGraph`]: crate::graph::matrix::MatrixGraph
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Outgoing neighbors per vertex. Every edge target is also a key.
    pub adj_map: HashMap<T, HashSet<T>>,
}

impl<T> DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Returns `false` if the edge was already there.
    pub fn add_edge(&mut self, source: T, target: T) -> bool {
        self.add_vertex(target.clone());
        self.adj_map.entry(source).or_default().insert(target)
    }

    pub fn add_vertex(&mut self, vertex: T) {
        self.adj_map.entry(vertex).or_default();
    }

    pub fn has_edge(&self, source: &T, target: &T) -> bool {
        self.adj_map
            .get(source)
            .is_some_and(|targets| targets.contains(target))
    }

    /// Empty for unknown vertices.
    pub fn successors<'a>(&'a self, source: &T) -> impl Iterator<Item = &'a T> + 'a {
        self.adj_map.get(source).into_iter().flatten()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &T> {
        self.adj_map.keys()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adj_map.values().map(HashSet::len).sum()
    }
}
