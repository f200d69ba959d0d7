//! Ordering constraints between conflicting writes.
//!
//! Two transactions that write a common key must be ordered one way or the
//! other. Each choice implies a write-write edge on every shared key, plus
//! an anti-dependency from every reader of the earlier write to the later
//! writer: those readers saw a version the later writer overwrote.
//!
//! An [`SiConstraint`] bundles both alternatives. Generation only looks at
//! the history and its read-from relation, never at other constraints.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};
use core::hash::Hash;

use derive_more::From;

use crate::graph::known::{EdgeKind, KnownGraph};
use crate::history::types::TransactionId;
use crate::history::History;

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct ConstraintId(pub usize);

impl Display for ConstraintId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "c{}", self.0)
    }
}

/// One of the two alternatives of a constraint.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The first writer goes first (`edges1`).
    First,
    /// The second writer goes first (`edges2`).
    Second,
}

impl Side {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// An edge implied by one side of a constraint. Always WW or RW.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SiEdge<Key> {
    pub from: TransactionId,
    pub to: TransactionId,
    pub kind: EdgeKind,
    pub key: Key,
}

impl<Key: Debug> Debug for SiEdge<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let tag = match self.kind {
            EdgeKind::WriteWrite => "ww",
            EdgeKind::ReadWrite => "rw",
            EdgeKind::WriteRead => "wr",
            EdgeKind::SessionOrder => "so",
        };
        write!(f, "{}-{tag}({:?})->{}", self.from, self.key, self.to)
    }
}

/// A binary choice between two write orders.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiConstraint<Key> {
    pub id: ConstraintId,
    pub first: TransactionId,
    pub second: TransactionId,
    /// Implied by `first` before `second`.
    pub edges1: Vec<SiEdge<Key>>,
    /// Implied by `second` before `first`.
    pub edges2: Vec<SiEdge<Key>>,
}

impl<Key> SiConstraint<Key> {
    #[must_use]
    pub fn edges(&self, side: Side) -> &[SiEdge<Key>] {
        match side {
            Side::First => &self.edges1,
            Side::Second => &self.edges2,
        }
    }

    /// The writer placed first by `side`.
    #[must_use]
    pub const fn earlier(&self, side: Side) -> TransactionId {
        match side {
            Side::First => self.first,
            Side::Second => self.second,
        }
    }
}

/// Generates one constraint per pair of transactions writing a common key.
///
/// With `coalesce`, all keys a pair shares go into a single constraint;
/// otherwise each shared key gets its own. Pairs are visited in id order and
/// keys in key order, so ids are stable across runs.
pub fn generate_constraints<Key, Element>(
    history: &History<Key, Element>,
    graph: &KnownGraph<Key>,
    coalesce: bool,
) -> Vec<SiConstraint<Key>>
where
    Key: Clone + Eq + Hash + Ord + Debug,
{
    let mut writers: BTreeMap<&Key, Vec<TransactionId>> = BTreeMap::new();
    for txn in history.transactions() {
        for event in txn.writes() {
            let ids = writers.entry(&event.key).or_default();
            if ids.last() != Some(&txn.id) {
                ids.push(txn.id);
            }
        }
    }

    let mut shared: BTreeMap<(TransactionId, TransactionId), Vec<&Key>> = BTreeMap::new();
    for (key, ids) in &writers {
        for (position, &first) in ids.iter().enumerate() {
            for &second in &ids[position + 1..] {
                shared.entry((first, second)).or_default().push(*key);
            }
        }
    }

    let mut constraints = Vec::new();
    for ((first, second), keys) in shared {
        if coalesce {
            let mut constraint = SiConstraint {
                id: ConstraintId(constraints.len()),
                first,
                second,
                edges1: Vec::new(),
                edges2: Vec::new(),
            };
            for key in keys {
                push_edges(graph, &mut constraint, key);
            }
            constraints.push(constraint);
        } else {
            for key in keys {
                let mut constraint = SiConstraint {
                    id: ConstraintId(constraints.len()),
                    first,
                    second,
                    edges1: Vec::new(),
                    edges2: Vec::new(),
                };
                push_edges(graph, &mut constraint, key);
                constraints.push(constraint);
            }
        }
    }

    tracing::debug!(
        keys = writers.len(),
        constraints = constraints.len(),
        coalesce,
        "generated constraints"
    );
    constraints
}

fn push_edges<Key>(graph: &KnownGraph<Key>, constraint: &mut SiConstraint<Key>, key: &Key)
where
    Key: Clone + Eq + Hash + Debug,
{
    let (first, second) = (constraint.first, constraint.second);
    constraint.edges1.extend(order_edges(graph, first, second, key));
    constraint.edges2.extend(order_edges(graph, second, first, key));
}

/// Edges implied by `earlier`'s write of `key` preceding `later`'s.
fn order_edges<'a, Key>(
    graph: &'a KnownGraph<Key>,
    earlier: TransactionId,
    later: TransactionId,
    key: &'a Key,
) -> impl Iterator<Item = SiEdge<Key>> + 'a
where
    Key: Clone + Eq + Hash + Debug,
{
    let ww = SiEdge {
        from: earlier,
        to: later,
        kind: EdgeKind::WriteWrite,
        key: key.clone(),
    };
    let rw = graph
        .readers_of(earlier, key)
        .iter()
        .filter(move |&&reader| reader != later)
        .map(move |&reader| SiEdge {
            from: reader,
            to: later,
            kind: EdgeKind::ReadWrite,
            key: key.clone(),
        });
    core::iter::once(ww).chain(rw)
}
