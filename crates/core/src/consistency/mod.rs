use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::{Debug, Display};
use core::hash::Hash;

use hashbrown::HashMap;

use self::config::VerifierConfig;
use self::constraint::{generate_constraints, ConstraintId, SiConstraint, Side};
use self::error::Error;
use self::pruning::{apply_side, prune_with_report};
use crate::graph::known::KnownGraph;
use crate::history::types::TransactionId;
use crate::history::History;

pub mod config;
pub mod constraint;
pub mod error;
pub mod pruning;

pub use pruning::{prune_constraints, PruneReport, RoundStats};

/// Answer of a [`ConstraintSolver`] for a residual constraint set.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One side per residual constraint, keeping the dependency graph acyclic.
    Selection(Vec<(ConstraintId, Side)>),
    /// No choice of sides avoids a cycle.
    Unsatisfiable,
}

/// Decides the constraints pruning could not.
///
/// The solver sees the known graph after pruning and the residual
/// constraints. A selection must name a side for every one of them.
pub trait ConstraintSolver<Key> {
    type Error;

    /// # Errors
    ///
    /// Solver-specific failures; the verifier reports them as
    /// [`Error::Solver`].
    fn solve(
        &mut self,
        graph: &KnownGraph<Key>,
        constraints: &[SiConstraint<Key>],
    ) -> Result<Resolution, Self::Error>;
}

/// Result of a verification run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A commit order compatible with every dependency.
    Consistent { order: Vec<TransactionId> },
    /// `cycle` is a dependency cycle when one is known. For list histories
    /// whose reads diverge, it instead names the writers of the two
    /// conflicting elements. `unresolved` lists the constraints left open
    /// when the history was rejected.
    Inconsistent {
        cycle: Vec<TransactionId>,
        unresolved: Vec<ConstraintId>,
    },
}

impl Verdict {
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent { .. })
    }
}

/// Checks whether `history` satisfies snapshot isolation.
///
/// Builds the known graph, generates the ordering constraints, prunes them,
/// hands the residue to `solver` and checks the completed dependency graph
/// for cycles.
///
/// # Errors
///
/// - [`Error::InvalidHistory`] for uncommitted transactions or reads of
///   versions nobody wrote.
/// - [`Error::AmbiguousInitialWrites`] from list pruning.
/// - [`Error::Solver`] if the solver fails.
/// - [`Error::InvalidSelection`] if its selection is incomplete or cyclic.
pub fn verify<Key, Element, S>(
    history: &History<Key, Element>,
    config: &VerifierConfig,
    solver: &mut S,
) -> Result<Verdict, Error<Key, Element>>
where
    Key: Clone + Eq + Hash + Ord + Debug,
    Element: Clone + Eq + Hash + Debug,
    S: ConstraintSolver<Key>,
    S::Error: Display,
{
    tracing::debug!(
        sessions = history.session_count(),
        transactions = history.transaction_count(),
        events = history.event_count(),
        "verifying history"
    );

    history.ensure_committed()?;
    let mut graph = KnownGraph::new(history)?;
    let mut constraints = generate_constraints(history, &graph, config.coalesce_constraints);

    let report = prune_with_report(&mut graph, &mut constraints, history, &config.pruning)?;
    if let Some(cycle) = report.cycle {
        tracing::debug!(?cycle, "rejected by pruning");
        return Ok(Verdict::Inconsistent {
            cycle,
            unresolved: constraints.iter().map(|constraint| constraint.id).collect(),
        });
    }

    if !constraints.is_empty() {
        tracing::debug!(constraints = constraints.len(), "solving residual constraints");
        match solver
            .solve(&graph, &constraints)
            .map_err(|error| Error::Solver(error.to_string()))?
        {
            Resolution::Unsatisfiable => {
                tracing::debug!("rejected by solver");
                return Ok(Verdict::Inconsistent {
                    cycle: graph.find_cycle().unwrap_or_default(),
                    unresolved: constraints.iter().map(|constraint| constraint.id).collect(),
                });
            }
            Resolution::Selection(selection) => {
                let chosen: HashMap<ConstraintId, Side> = selection.into_iter().collect();
                for constraint in &constraints {
                    let Some(&side) = chosen.get(&constraint.id) else {
                        return Err(Error::InvalidSelection);
                    };
                    apply_side(&mut graph, constraint, side);
                }
                if graph.find_cycle().is_some() {
                    return Err(Error::InvalidSelection);
                }
            }
        }
    }

    let dependency = graph.dependency_matrix();
    let verdict = match dependency.topological_sort() {
        Some(order) => Verdict::Consistent { order },
        None => Verdict::Inconsistent {
            cycle: dependency.find_cycle().unwrap_or_default(),
            unresolved: Vec::new(),
        },
    };
    tracing::debug!(consistent = verdict.is_consistent(), "verification finished");
    Ok(verdict)
}
