use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::graph::digraph::DiGraph;
use crate::graph::matrix::{MatrixGraph, NodeIndex};
use crate::history::error::InvalidHistory;
use crate::history::types::{SessionId, TransactionId};
use crate::history::History;

/// Kind of a dependency edge between two transactions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// Consecutive transactions of one session.
    SessionOrder,
    /// The target read a version the source wrote.
    WriteRead,
    /// The source's write of a key is ordered before the target's.
    WriteWrite,
    /// The source read a version the target overwrote.
    ReadWrite,
}

impl EdgeKind {
    /// `true` for edges of the primary layer (graph A).
    ///
    /// Anti-dependencies form the secondary layer (graph B); under snapshot
    /// isolation they only matter when preceded by a primary edge.
    #[must_use]
    pub const fn is_primary(self) -> bool {
        !matches!(self, Self::ReadWrite)
    }
}

/// Label of one edge: its kind and, except for session order, its key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency<Key> {
    pub kind: EdgeKind,
    pub key: Option<Key>,
}

/// The partially known dependency graph of a history.
///
/// Two layers over the transaction ids of the history:
///
/// - the primary layer (A) holds session order, write-read dependencies and
///   resolved write-write orders,
/// - the secondary layer (B) holds resolved read-write anti-dependencies.
///
/// A history is snapshot-isolation consistent iff some resolution of its
/// constraints keeps `A ∪ (A;B)` acyclic.
///
/// Besides the edges, the graph keeps the read-from relation (which
/// transactions read which writer's version of a key) and the position of
/// every transaction in its session.
#[derive(Debug, Clone)]
pub struct KnownGraph<Key> {
    index: Arc<NodeIndex<TransactionId>>,
    primary: DiGraph<TransactionId>,
    primary_predecessors: DiGraph<TransactionId>,
    secondary: DiGraph<TransactionId>,
    labels: HashMap<(TransactionId, TransactionId), Vec<Dependency<Key>>>,
    readers: HashMap<(TransactionId, Key), Vec<TransactionId>>,
    order_in_session: HashMap<TransactionId, (SessionId, usize)>,
}

impl<Key> KnownGraph<Key>
where
    Key: Clone + Eq + Hash + Debug,
{
    /// Seeds the graph with everything the history states directly: session
    /// order and write-read dependencies.
    ///
    /// When the history has the synthetic initial transaction, it is also
    /// ordered before the first transaction of every session.
    ///
    /// # Errors
    ///
    /// [`InvalidHistory::UnknownWrite`] if a read observes a version no write
    /// produced.
    pub fn new<Element>(history: &History<Key, Element>) -> Result<Self, InvalidHistory<Key, Element>>
    where
        Element: Clone + Eq + Hash,
    {
        let ids = history.transaction_ids();
        let mut graph = Self {
            index: Arc::new(NodeIndex::new(ids.clone())),
            primary: DiGraph::default(),
            primary_predecessors: DiGraph::default(),
            secondary: DiGraph::default(),
            labels: HashMap::new(),
            readers: HashMap::new(),
            order_in_session: history.session_positions(),
        };
        for txn in ids {
            graph.primary.add_vertex(txn);
            graph.primary_predecessors.add_vertex(txn);
            graph.secondary.add_vertex(txn);
        }

        let root = TransactionId::root();
        let has_root = history.transaction(root).is_some();
        for session in history.sessions() {
            if session.id == SessionId::root() {
                continue;
            }
            if has_root {
                if let Some(&first) = session.transactions.first() {
                    graph.put_edge(root, first, EdgeKind::SessionOrder, None);
                }
            }
            for pair in session.transactions.windows(2) {
                graph.put_edge(pair[0], pair[1], EdgeKind::SessionOrder, None);
            }
        }

        for txn in history.transactions() {
            for event in txn.reads() {
                let version = event.value.version();
                let Some(writer) = history.writer_of(&event.key, version) else {
                    return Err(InvalidHistory::UnknownWrite {
                        transaction: txn.id,
                        key: event.key.clone(),
                        version: version.cloned(),
                    });
                };
                if writer == txn.id {
                    continue;
                }
                graph.put_edge(writer, txn.id, EdgeKind::WriteRead, Some(event.key.clone()));
                let readers = graph.readers.entry((writer, event.key.clone())).or_default();
                if !readers.contains(&txn.id) {
                    readers.push(txn.id);
                }
            }
        }

        tracing::debug!(
            transactions = graph.node_count(),
            primary_edges = graph.primary.edge_count(),
            "built known graph"
        );
        Ok(graph)
    }

    /// Adds a labelled edge to the layer its kind belongs to.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is not a transaction of the history.
    pub fn put_edge(
        &mut self,
        from: TransactionId,
        to: TransactionId,
        kind: EdgeKind,
        key: Option<Key>,
    ) {
        assert!(
            self.index.position(&from).is_some() && self.index.position(&to).is_some(),
            "edge {from} -> {to} leaves the transaction set"
        );
        if kind.is_primary() {
            self.primary.add_edge(from, to);
            self.primary_predecessors.add_edge(to, from);
        } else {
            self.secondary.add_edge(from, to);
        }
        let label = Dependency { kind, key };
        let labels = self.labels.entry((from, to)).or_default();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    /// Transactions that read the version of `key` written by `writer`.
    #[must_use]
    pub fn readers_of(&self, writer: TransactionId, key: &Key) -> &[TransactionId] {
        self.readers
            .get(&(writer, key.clone()))
            .map_or(&[], Vec::as_slice)
    }
}

impl<Key> KnownGraph<Key> {
    #[must_use]
    pub const fn index(&self) -> &Arc<NodeIndex<TransactionId>> {
        &self.index
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// The primary layer (A).
    #[must_use]
    pub const fn primary(&self) -> &DiGraph<TransactionId> {
        &self.primary
    }

    /// The secondary layer (B).
    #[must_use]
    pub const fn secondary(&self) -> &DiGraph<TransactionId> {
        &self.secondary
    }

    /// Predecessors of `txn` in the primary layer.
    pub fn predecessors(&self, txn: TransactionId) -> impl Iterator<Item = TransactionId> + '_ {
        self.primary_predecessors.successors(&txn).copied()
    }

    /// Labels of the edges from `from` to `to`, across both layers.
    #[must_use]
    pub fn labels(&self, from: TransactionId, to: TransactionId) -> &[Dependency<Key>] {
        self.labels.get(&(from, to)).map_or(&[], Vec::as_slice)
    }

    /// Session and position of each transaction.
    #[must_use]
    pub const fn order_in_session(&self) -> &HashMap<TransactionId, (SessionId, usize)> {
        &self.order_in_session
    }

    #[must_use]
    pub fn primary_matrix(&self) -> MatrixGraph<TransactionId> {
        MatrixGraph::from_digraph_with_index(&self.primary, &self.index)
    }

    #[must_use]
    pub fn secondary_matrix(&self) -> MatrixGraph<TransactionId> {
        MatrixGraph::from_digraph_with_index(&self.secondary, &self.index)
    }

    /// `A ∪ (A;B)`, the snapshot-isolation dependency relation.
    #[must_use]
    pub fn dependency_matrix(&self) -> MatrixGraph<TransactionId> {
        let primary = self.primary_matrix();
        let composed = primary.composition(&self.secondary_matrix());
        primary.union(&composed)
    }

    /// A cycle of the dependency relation, in edge order, if there is one.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<TransactionId>> {
        self.dependency_matrix().find_cycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::{Operation, Value};

    type TestHistory = History<&'static str, u64>;

    fn two_sessions() -> TestHistory {
        let mut history = TestHistory::from_parts(
            [SessionId(1), SessionId(2)],
            [
                (SessionId(1), vec![TransactionId(1), TransactionId(2)]),
                (SessionId(2), vec![TransactionId(3)]),
            ],
            [
                (TransactionId(1), vec![Operation::write("x", 1)]),
                (TransactionId(2), vec![Operation::read("x", 1), Operation::write("x", 2)]),
                (TransactionId(3), vec![Operation::read("x", 1), Operation::read("y", 0)]),
            ],
        )
        .unwrap();
        history
            .add_initial_writes([("x", Value::Scalar(0)), ("y", Value::Scalar(0))])
            .unwrap();
        history
    }

    #[test]
    fn test_seeded_edges() {
        let graph = KnownGraph::new(&two_sessions()).unwrap();
        let primary = graph.primary();

        assert!(primary.has_edge(&TransactionId(1), &TransactionId(2)));
        assert!(primary.has_edge(&TransactionId(0), &TransactionId(1)));
        assert!(primary.has_edge(&TransactionId(0), &TransactionId(3)));
        assert!(primary.has_edge(&TransactionId(1), &TransactionId(3)));
        assert_eq!(graph.secondary().edge_count(), 0);

        assert_eq!(
            graph.labels(TransactionId(1), TransactionId(2)),
            &[
                Dependency {
                    kind: EdgeKind::SessionOrder,
                    key: None
                },
                Dependency {
                    kind: EdgeKind::WriteRead,
                    key: Some("x")
                },
            ]
        );

        let mut readers = graph.readers_of(TransactionId(1), &"x").to_vec();
        readers.sort_unstable();
        assert_eq!(readers, vec![TransactionId(2), TransactionId(3)]);
        assert_eq!(graph.readers_of(TransactionId(0), &"y"), &[TransactionId(3)]);
        assert!(graph.readers_of(TransactionId(2), &"x").is_empty());

        let mut predecessors: Vec<_> = graph.predecessors(TransactionId(3)).collect();
        predecessors.sort_unstable();
        assert_eq!(predecessors, vec![TransactionId(0), TransactionId(1)]);
    }

    #[test]
    fn test_unknown_write() {
        let history = TestHistory::from_parts(
            [SessionId(1)],
            [(SessionId(1), vec![TransactionId(1)])],
            [(TransactionId(1), vec![Operation::read("x", 5)])],
        )
        .unwrap();
        assert_eq!(
            KnownGraph::new(&history).unwrap_err(),
            InvalidHistory::UnknownWrite {
                transaction: TransactionId(1),
                key: "x",
                version: Some(5),
            }
        );
    }

    #[test]
    fn test_cycle_through_anti_dependency() {
        let mut graph = KnownGraph::new(&two_sessions()).unwrap();
        assert_eq!(graph.find_cycle(), None);

        // t3 read x=1 which t2 overwrote; t2 -> t3 in A closes A;B on t2
        graph.put_edge(TransactionId(3), TransactionId(2), EdgeKind::ReadWrite, Some("x"));
        assert_eq!(graph.find_cycle(), None);
        graph.put_edge(TransactionId(2), TransactionId(3), EdgeKind::WriteWrite, Some("x"));
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec![TransactionId(2)]);
    }

    #[test]
    #[should_panic(expected = "leaves the transaction set")]
    fn test_edge_outside_history() {
        let mut graph = KnownGraph::new(&two_sessions()).unwrap();
        graph.put_edge(TransactionId(1), TransactionId(42), EdgeKind::WriteWrite, Some("x"));
    }
}
