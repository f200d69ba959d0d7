//! Early resolution of ordering constraints.
//!
//! Pruning decides the constraints whose outcome already follows from the
//! known graph, so the external solver only sees the rest. Two strategies
//! exist, picked once per history from its [`ValueKind`]:
//!
//! - [`key_value`]: rounds of reachability over `A ∪ (A;B)`, forcing every
//!   constraint one of whose sides would close a cycle.
//! - [`list`]: append-only lists expose the final write order of each key
//!   directly, so one pass over the longest read of every key decides most
//!   constraints.
//!
//! Both mutate the known graph and shrink the constraint set in place.
//!
//! [`ValueKind`]: crate::history::types::ValueKind

pub mod key_value;
pub mod list;

use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use crate::consistency::config::PruningConfig;
use crate::consistency::constraint::{SiConstraint, SiEdge, Side};
use crate::consistency::error::Error;
use crate::graph::known::{EdgeKind, KnownGraph};
use crate::history::types::TransactionId;
use crate::history::History;

/// What happened in one pruning round.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStats {
    /// 1-based.
    pub round: usize,
    pub solved: usize,
    /// Constraints left after the round.
    pub remaining: usize,
}

/// Outcome of a pruning run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PruneReport {
    pub rounds: Vec<RoundStats>,
    pub solved: usize,
    pub remaining: usize,
    /// Transactions of the contradiction that stopped pruning, if any: a
    /// dependency cycle, or for list histories the writers of two diverging
    /// read elements.
    pub cycle: Option<Vec<TransactionId>>,
}

impl PruneReport {
    #[must_use]
    pub const fn found_cycle(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Resolves what it can and returns `true` iff the history is already known
/// to be inconsistent.
///
/// # Errors
///
/// [`Error::AmbiguousInitialWrites`] if a list history orders two initial
/// writes against each other.
pub fn prune_constraints<Key, Element>(
    graph: &mut KnownGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    history: &History<Key, Element>,
    config: &PruningConfig,
) -> Result<bool, Error<Key, Element>>
where
    Key: Clone + Eq + Hash + Ord + Debug,
    Element: Clone + Eq + Hash + Debug,
{
    prune_with_report(graph, constraints, history, config).map(|report| report.found_cycle())
}

/// [`prune_constraints`], keeping the per-round statistics.
///
/// # Errors
///
/// See [`prune_constraints`].
pub fn prune_with_report<Key, Element>(
    graph: &mut KnownGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    history: &History<Key, Element>,
    config: &PruningConfig,
) -> Result<PruneReport, Error<Key, Element>>
where
    Key: Clone + Eq + Hash + Ord + Debug,
    Element: Clone + Eq + Hash + Debug,
{
    if !config.enabled {
        tracing::debug!(constraints = constraints.len(), "pruning disabled");
        return Ok(PruneReport {
            remaining: constraints.len(),
            ..PruneReport::default()
        });
    }

    let report = if history.value_kind().supports_final_order() {
        list::prune_list_history(graph, constraints, history)?
    } else {
        key_value::prune_key_value_history(graph, constraints, config)
    };

    tracing::debug!(
        rounds = report.rounds.len(),
        solved = report.solved,
        remaining = report.remaining,
        cycle = report.found_cycle(),
        primary_edges = graph.primary().edge_count(),
        secondary_edges = graph.secondary().edge_count(),
        "pruning finished"
    );
    Ok(report)
}

/// Merges the edges of one side of `constraint` into the known graph.
///
/// # Panics
///
/// Panics if the side carries an edge other than WW or RW.
pub fn apply_side<Key>(graph: &mut KnownGraph<Key>, constraint: &SiConstraint<Key>, side: Side)
where
    Key: Clone + Eq + Hash + Debug,
{
    add_to_known_graph(graph, constraint.edges(side));
}

fn add_to_known_graph<Key>(graph: &mut KnownGraph<Key>, edges: &[SiEdge<Key>])
where
    Key: Clone + Eq + Hash + Debug,
{
    for edge in edges {
        match edge.kind {
            EdgeKind::WriteWrite | EdgeKind::ReadWrite => {
                graph.put_edge(edge.from, edge.to, edge.kind, Some(edge.key.clone()));
            }
            kind => panic!("only WW and RW edges come from constraints, got {kind:?}"),
        }
    }
}
