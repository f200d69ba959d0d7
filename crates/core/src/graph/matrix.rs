//! Dense bit-matrix snapshots of directed graphs.
//!
//! A [`MatrixGraph`] assigns every node a dense index `0..n` (shared through
//! an [`Arc<NodeIndex>`]) and stores the adjacency relation as one
//! [`BitSet`] per row. All algebra is row-wise:
//!
//! - union is a word-wise OR of rows,
//! - composition `A;B` ORs together the `B` rows of every successor in `A`,
//! - reachability accumulates rows in reverse topological order when the
//!   graph is acyclic and falls back to a bitset Warshall closure otherwise.
//!
//! Snapshots are immutable once built: every operation returns a new graph.
//! Two graphs can only be combined when they share the same node index;
//! anything else is a caller bug and panics.
//!
//! With the `parallel` feature, composition and the Warshall closure process
//! rows on the rayon thread pool. Results are identical to the sequential
//! path.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::graph::bitset::BitSet;
use crate::graph::digraph::DiGraph;

/// Bijection between nodes and dense indices `0..n`.
#[derive(Debug, PartialEq, Eq)]
pub struct NodeIndex<N>
where
    N: Hash + Eq,
{
    nodes: Vec<N>,
    positions: HashMap<N, usize>,
}

impl<N> NodeIndex<N>
where
    N: Hash + Eq + Clone,
{
    /// Indexes `nodes` in the given order. Duplicates keep their first slot.
    #[must_use]
    pub fn new(nodes: Vec<N>) -> Self {
        let mut unique = Vec::with_capacity(nodes.len());
        let mut positions = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if !positions.contains_key(&node) {
                positions.insert(node.clone(), unique.len());
                unique.push(node);
            }
        }
        Self {
            nodes: unique,
            positions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn position(&self, node: &N) -> Option<usize> {
        self.positions.get(node).copied()
    }

    #[must_use]
    pub fn node(&self, position: usize) -> &N {
        &self.nodes[position]
    }

    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }
}

#[derive(Debug, Clone)]
pub struct MatrixGraph<N>
where
    N: Hash + Eq,
{
    index: Arc<NodeIndex<N>>,
    rows: Vec<BitSet>,
}

impl<N> PartialEq for MatrixGraph<N>
where
    N: Hash + Eq,
{
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.index, &other.index) || self.index == other.index)
            && self.rows == other.rows
    }
}

impl<N> Eq for MatrixGraph<N> where N: Hash + Eq {}

impl<N> MatrixGraph<N>
where
    N: Hash + Eq + Clone + Debug + Ord,
{
    /// Snapshots `graph`, indexing its vertices in ascending order.
    #[must_use]
    pub fn from_digraph(graph: &DiGraph<N>) -> Self {
        let mut nodes: Vec<N> = graph.vertices().cloned().collect();
        nodes.sort_unstable();
        Self::from_digraph_with_index(graph, &Arc::new(NodeIndex::new(nodes)))
    }

    /// Builds a graph over `nodes` with the given edges.
    #[must_use]
    pub fn from_edges(nodes: Vec<N>, edges: &[(N, N)]) -> Self {
        let mut graph = Self::empty(Arc::new(NodeIndex::new(nodes)));
        for (source, target) in edges {
            graph.put_edge(source, target);
        }
        graph
    }
}

impl<N> MatrixGraph<N>
where
    N: Hash + Eq + Clone + Debug,
{
    /// A graph with no edges over `index`.
    #[must_use]
    pub fn empty(index: Arc<NodeIndex<N>>) -> Self {
        let n = index.len();
        Self {
            index,
            rows: vec![BitSet::zeros(n); n],
        }
    }

    /// Snapshots `graph` over an existing node index, so the result can be
    /// combined with other graphs built on the same index.
    ///
    /// # Panics
    ///
    /// Panics if `graph` has a vertex the index does not know.
    #[must_use]
    pub fn from_digraph_with_index(graph: &DiGraph<N>, index: &Arc<NodeIndex<N>>) -> Self {
        let mut matrix = Self::empty(Arc::clone(index));
        for (source, targets) in &graph.adj_map {
            let row = matrix.position_or_panic(source);
            for target in targets {
                let column = matrix.position_or_panic(target);
                matrix.rows[row].insert(column);
            }
        }
        matrix
    }

    fn position_or_panic(&self, node: &N) -> usize {
        self.index
            .position(node)
            .unwrap_or_else(|| panic!("node {node:?} is not in the matrix index"))
    }

    fn put_edge(&mut self, source: &N, target: &N) {
        let row = self.position_or_panic(source);
        let column = self.position_or_panic(target);
        self.rows[row].insert(column);
    }

    fn with_rows(&self, rows: Vec<BitSet>) -> Self {
        Self {
            index: Arc::clone(&self.index),
            rows,
        }
    }

    fn assert_same_index(&self, other: &Self) {
        assert!(
            Arc::ptr_eq(&self.index, &other.index) || self.index == other.index,
            "matrix graphs built over different node indices"
        );
    }

    #[must_use]
    pub const fn index(&self) -> &Arc<NodeIndex<N>> {
        &self.index
    }

    #[must_use]
    pub fn nodes(&self) -> &[N] {
        self.index.nodes()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn has_edge(&self, source: &N, target: &N) -> bool {
        match (self.index.position(source), self.index.position(target)) {
            (Some(row), Some(column)) => self.rows[row].get(column),
            _ => false,
        }
    }

    pub fn successors<'a>(&'a self, source: &N) -> impl Iterator<Item = &'a N> + 'a {
        self.index
            .position(source)
            .into_iter()
            .flat_map(move |row| {
                self.rows[row]
                    .ones()
                    .map(move |column| self.index.node(column))
            })
    }

    /// Number of set entries in the matrix.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.rows.iter().map(BitSet::count_ones).sum()
    }

    /// Fraction of the `n * n` entries that are set; `0.0` for empty graphs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn density(&self) -> f64 {
        let n = self.node_count();
        if n == 0 {
            0.0
        } else {
            self.edge_count() as f64 / (n as f64 * n as f64)
        }
    }

    #[must_use]
    pub fn edges(&self) -> Vec<(N, N)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(row, bits)| {
                bits.ones()
                    .map(move |column| (self.index.node(row).clone(), self.index.node(column).clone()))
            })
            .collect()
    }

    /// Edge-wise OR of two graphs over the same index.
    ///
    /// # Panics
    ///
    /// Panics if the node indices differ.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.assert_same_index(other);
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(left, right)| {
                let mut row = left.clone();
                row.union_with(right);
                row
            })
            .collect();
        self.with_rows(rows)
    }

    /// `self` then `other`: `i -> k` iff some `j` has `i -> j` in `self` and
    /// `j -> k` in `other`.
    ///
    /// # Panics
    ///
    /// Panics if the node indices differ.
    #[must_use]
    pub fn composition(&self, other: &Self) -> Self {
        self.assert_same_index(other);
        self.with_rows(compose_rows(&self.rows, &other.rows))
    }

    /// Transitive closure: `i -> j` iff a non-empty path leads from `i` to
    /// `j`. A node reaches itself only through a cycle.
    #[must_use]
    pub fn reachability(&self) -> Self {
        let rows = match self.topological_positions() {
            Some(order) => {
                let n = self.node_count();
                let mut rows = vec![BitSet::zeros(n); n];
                for &row in order.iter().rev() {
                    let mut reach = self.rows[row].clone();
                    for successor in self.rows[row].ones() {
                        reach.union_with(&rows[successor]);
                    }
                    rows[row] = reach;
                }
                rows
            }
            None => warshall_closure(self.rows.clone()),
        };
        self.with_rows(rows)
    }

    /// `true` iff the graph has a cycle (including self-loops).
    #[must_use]
    pub fn has_loops(&self) -> bool {
        self.topological_positions().is_none()
    }

    /// Kahn's algorithm over the raw adjacency. Ties are broken by index, so
    /// the order is deterministic. `None` if the graph has a cycle.
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<N>> {
        self.topological_positions().map(|order| {
            order
                .into_iter()
                .map(|position| self.index.node(position).clone())
                .collect()
        })
    }

    fn in_degrees(&self) -> Vec<usize> {
        let mut in_degree = vec![0usize; self.node_count()];
        for row in &self.rows {
            for column in row.ones() {
                in_degree[column] += 1;
            }
        }
        in_degree
    }

    /// Kahn's algorithm; returns the positions that could not be removed as
    /// `Err` when a cycle is present.
    fn kahn(&self) -> Result<Vec<usize>, Vec<bool>> {
        let n = self.node_count();
        let mut in_degree = self.in_degrees();
        let mut queue: VecDeque<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut removed = vec![false; n];

        while let Some(vertex) = queue.pop_front() {
            order.push(vertex);
            removed[vertex] = true;
            for successor in self.rows[vertex].ones() {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    queue.push_back(successor);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(removed)
        }
    }

    fn topological_positions(&self) -> Option<Vec<usize>> {
        self.kahn().ok()
    }

    /// Returns the nodes of one cycle, in edge order (`c0 -> c1 -> ... ->
    /// c0`), or `None` if the graph is acyclic.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<N>> {
        let removed = self.kahn().err()?;
        // Every vertex Kahn could not remove has a predecessor that also
        // stayed, so walking predecessors must revisit a vertex.
        let start = removed.iter().position(|&gone| !gone)?;
        let mut path = vec![start];
        let mut seen_at: HashMap<usize, usize> = HashMap::new();
        seen_at.insert(start, 0);
        let mut current = start;
        loop {
            let predecessor = (0..self.node_count())
                .find(|&candidate| !removed[candidate] && self.rows[candidate].get(current))?;
            if let Some(&at) = seen_at.get(&predecessor) {
                let mut cycle: Vec<N> = path[at..]
                    .iter()
                    .rev()
                    .map(|&position| self.index.node(position).clone())
                    .collect();
                cycle.rotate_right(1);
                return Some(cycle);
            }
            seen_at.insert(predecessor, path.len());
            path.push(predecessor);
            current = predecessor;
        }
    }

    /// Drops edges implied by session order before computing reachability.
    ///
    /// For every node, only the earliest successor of each other session is
    /// kept; later ones are reachable from it through session-order edges.
    /// Successors in the node's own session are always kept: they may be the
    /// session-order edges the other rows rely on. The graph must contain an
    /// edge between every pair of consecutive transactions of a session.
    /// Nodes missing from `order_in_session` keep all their incoming edges.
    #[must_use]
    pub fn reduce_edges<S>(&self, order_in_session: &HashMap<N, (S, usize)>) -> Self
    where
        S: Hash + Eq + Clone,
    {
        let n = self.node_count();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(source, row)| {
                let own_session = order_in_session
                    .get(self.index.node(source))
                    .map(|(session, _)| session);
                let mut reduced = BitSet::zeros(n);
                let mut first_in_session: HashMap<S, (usize, usize)> = HashMap::new();
                for column in row.ones() {
                    match order_in_session.get(self.index.node(column)) {
                        Some((session, _)) if Some(session) == own_session => {
                            reduced.insert(column);
                        }
                        Some((session, position)) => {
                            let slot = first_in_session
                                .entry(session.clone())
                                .or_insert((*position, column));
                            if *position < slot.0 {
                                *slot = (*position, column);
                            }
                        }
                        None => {
                            reduced.insert(column);
                        }
                    }
                }
                for (_, column) in first_in_session.into_values() {
                    reduced.insert(column);
                }
                reduced
            })
            .collect();
        self.with_rows(rows)
    }
}

#[cfg(not(feature = "parallel"))]
fn compose_rows(left: &[BitSet], right: &[BitSet]) -> Vec<BitSet> {
    left.iter().map(|row| compose_row(row, right)).collect()
}

#[cfg(feature = "parallel")]
fn compose_rows(left: &[BitSet], right: &[BitSet]) -> Vec<BitSet> {
    use rayon::prelude::*;

    left.par_iter().map(|row| compose_row(row, right)).collect()
}

fn compose_row(row: &BitSet, right: &[BitSet]) -> BitSet {
    let mut composed = BitSet::zeros(row.len());
    for middle in row.ones() {
        composed.union_with(&right[middle]);
    }
    composed
}

#[cfg(not(feature = "parallel"))]
fn warshall_closure(mut rows: Vec<BitSet>) -> Vec<BitSet> {
    for pivot_index in 0..rows.len() {
        let pivot = rows[pivot_index].clone();
        for row in &mut rows {
            if row.get(pivot_index) {
                row.union_with(&pivot);
            }
        }
    }
    rows
}

#[cfg(feature = "parallel")]
fn warshall_closure(mut rows: Vec<BitSet>) -> Vec<BitSet> {
    use rayon::prelude::*;

    for pivot_index in 0..rows.len() {
        let pivot = rows[pivot_index].clone();
        rows.par_iter_mut().for_each(|row| {
            if row.get(pivot_index) {
                row.union_with(&pivot);
            }
        });
    }
    rows
}
