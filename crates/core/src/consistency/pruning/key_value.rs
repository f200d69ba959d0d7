//! Round-based pruning for histories of opaque values.
//!
//! Each round snapshots the known graph into matrices and:
//!
//! 1. computes `C = A;B` and stops with a cycle if `A ∪ C` has one,
//! 2. computes `R`, the reachability of `A ∪ C` after dropping edges implied
//!    by session order,
//! 3. forces the other side of every constraint with a side that would close
//!    a cycle in `R`.
//!
//! A WW edge `u -> v` closes a cycle if `R` has `v -> u`. An RW edge
//! `u -> v` closes one if some primary predecessor `p` of `u` is `v` or is
//! reachable from `v`: then `p -> u -> v` is an `A;B` step back into `p`.
//!
//! Rounds repeat while they keep solving more than the stop threshold's
//! share of the constraints and more than that share is still open.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashSet;

use super::{apply_side, PruneReport, RoundStats};
use crate::consistency::config::PruningConfig;
use crate::consistency::constraint::{SiConstraint, SiEdge, Side};
use crate::graph::known::{EdgeKind, KnownGraph};
use crate::graph::matrix::MatrixGraph;
use crate::history::types::TransactionId;

enum RoundOutcome {
    Cycle(Vec<TransactionId>),
    Solved(usize),
}

pub fn prune_key_value_history<Key>(
    graph: &mut KnownGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    config: &PruningConfig,
) -> PruneReport
where
    Key: Clone + Eq + Hash + Debug,
{
    let total = constraints.len();
    #[allow(clippy::cast_precision_loss)]
    let limit = config.stop_threshold * total as f64;
    let mut report = PruneReport::default();

    loop {
        let round = report.rounds.len() + 1;
        match prune_round(graph, constraints) {
            RoundOutcome::Cycle(cycle) => {
                tracing::debug!(round, ?cycle, "pruning found a cycle");
                report.rounds.push(RoundStats {
                    round,
                    solved: 0,
                    remaining: constraints.len(),
                });
                report.cycle = Some(cycle);
                break;
            }
            RoundOutcome::Solved(solved) => {
                report.solved += solved;
                report.rounds.push(RoundStats {
                    round,
                    solved,
                    remaining: constraints.len(),
                });
                tracing::trace!(round, solved, remaining = constraints.len(), "pruning round");

                #[allow(clippy::cast_precision_loss)]
                let stalled = solved as f64 <= limit;
                #[allow(clippy::cast_precision_loss)]
                let nearly_done = (total - report.solved) as f64 <= limit;
                if stalled || nearly_done {
                    break;
                }
            }
        }
    }

    report.remaining = constraints.len();
    report
}

fn prune_round<Key>(
    graph: &mut KnownGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
) -> RoundOutcome
where
    Key: Clone + Eq + Hash + Debug,
{
    let primary = graph.primary_matrix();
    let composed = primary.composition(&graph.secondary_matrix());
    let dependency = primary.union(&composed);
    if let Some(cycle) = dependency.find_cycle() {
        return RoundOutcome::Cycle(cycle);
    }

    let reachability = dependency
        .reduce_edges(graph.order_in_session())
        .reachability();
    tracing::trace!(
        nodes = reachability.node_count(),
        density = reachability.density(),
        "reachability"
    );

    let mut solved = HashSet::new();
    for constraint in constraints.iter() {
        let forced = if conflicts(graph, &reachability, &constraint.edges1) {
            Side::Second
        } else if conflicts(graph, &reachability, &constraint.edges2) {
            Side::First
        } else {
            continue;
        };
        apply_side(graph, constraint, forced);
        solved.insert(constraint.id);
    }

    constraints.retain(|constraint| !solved.contains(&constraint.id));
    RoundOutcome::Solved(solved.len())
}

fn conflicts<Key>(
    graph: &KnownGraph<Key>,
    reachability: &MatrixGraph<TransactionId>,
    edges: &[SiEdge<Key>],
) -> bool {
    edges.iter().any(|edge| match edge.kind {
        EdgeKind::WriteWrite => reachability.has_edge(&edge.to, &edge.from),
        EdgeKind::ReadWrite => graph
            .predecessors(edge.from)
            .any(|predecessor| predecessor == edge.to || reachability.has_edge(&edge.to, &predecessor)),
        kind => panic!("only WW and RW edges come from constraints, got {kind:?}"),
    })
}
