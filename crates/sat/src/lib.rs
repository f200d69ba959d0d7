//! SAT-based constraint solver using rustsat + rustsat-batsat.
//!
//! [`SatSolver`] decides the constraints pruning left open. It looks for a
//! strict total order of the transactions that contains every dependency
//! edge: session order, write-read, the chosen write-write orders, and the
//! compositions of primary edges with anti-dependencies. Such an order
//! exists iff the completed dependency graph is acyclic.
//!
//! Each residual constraint gets one selector variable (`true` picks the
//! first writer first). Edges contributed by a constraint side are guarded
//! by the matching selector literal; composites of two guarded edges are
//! guarded by both.
//!
// TODO: drop the transitivity clauses for pairs already ordered by the
//   reachability of the known graph; they dominate the encoding size.

use core::fmt::{Display, Formatter};

use rustsat::clause;
use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Clause, Lit, TernaryVal};
use rustsat_batsat::BasicSolver;
use sicop_core::consistency::constraint::{ConstraintId, Side};
use sicop_core::graph::matrix::NodeIndex;
use sicop_core::history::types::TransactionId;
use sicop_core::{ConstraintSolver, KnownGraph, Resolution, SiConstraint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatError {
    /// The SAT backend failed.
    Backend(String),
    /// The backend stopped without an answer.
    Interrupted,
    /// More variables than the backend can index.
    TooLarge { nodes: usize, constraints: usize },
}

impl Display for SatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "sat backend failed: {message}"),
            Self::Interrupted => write!(f, "sat backend was interrupted"),
            Self::TooLarge { nodes, constraints } => write!(
                f,
                "{nodes} transactions and {constraints} constraints exceed the variable range"
            ),
        }
    }
}

impl std::error::Error for SatError {}

fn backend<E: Display>(error: E) -> SatError {
    SatError::Backend(error.to_string())
}

/// Size of the last encoding, for benchmarks and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingStats {
    pub variables: u32,
    pub clauses: usize,
}

/// Total-order CNF encoding of the residual constraints.
#[derive(Debug, Default)]
pub struct SatSolver {
    last: Option<EncodingStats>,
}

impl SatSolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoding size of the last call to `solve`, if it got that far.
    #[must_use]
    pub const fn last_encoding(&self) -> Option<EncodingStats> {
        self.last
    }
}

const MAX_VARIABLES: u32 = u32::MAX / 2;

/// Variable layout: `before(i, j)` is `i * nodes + j`, followed by one
/// selector per constraint.
struct Encoding {
    nodes: u32,
    selectors: u32,
}

impl Encoding {
    fn new(nodes: usize, constraints: usize) -> Result<Self, SatError> {
        let too_large = || SatError::TooLarge { nodes, constraints };
        let node_count = u32::try_from(nodes).map_err(|_| too_large())?;
        let selectors = node_count
            .checked_mul(node_count)
            .ok_or_else(too_large)?;
        let constraint_count = u32::try_from(constraints).map_err(|_| too_large())?;
        selectors
            .checked_add(constraint_count)
            .filter(|&total| total <= MAX_VARIABLES)
            .ok_or_else(too_large)?;
        Ok(Self {
            nodes: node_count,
            selectors,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn before(&self, i: usize, j: usize) -> Lit {
        Lit::positive(i as u32 * self.nodes + j as u32)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn not_before(&self, i: usize, j: usize) -> Lit {
        Lit::negative(i as u32 * self.nodes + j as u32)
    }

    /// `true` iff the constraint at `position` takes its first side.
    #[allow(clippy::cast_possible_truncation)]
    fn selector(&self, position: usize) -> Lit {
        Lit::positive(self.selectors + position as u32)
    }

    const fn variables(&self, constraints: usize) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let constraints = constraints as u32;
        self.selectors + constraints
    }
}

/// An edge between node positions, present when all `guards` hold.
#[derive(Clone)]
struct Guarded {
    from: usize,
    to: usize,
    guards: Vec<Lit>,
}

fn position(index: &NodeIndex<TransactionId>, txn: TransactionId) -> usize {
    index
        .position(&txn)
        .unwrap_or_else(|| panic!("{txn} is not a transaction of the known graph"))
}

/// `guards => before(from, to)`, or `guards => false` for a self loop.
fn implication(encoding: &Encoding, guards: &[Lit], from: usize, to: usize) -> Clause {
    guards
        .iter()
        .map(|guard| !*guard)
        .chain((from != to).then(|| encoding.before(from, to)))
        .collect()
}

fn side_guard(encoding: &Encoding, position: usize, side: Side) -> Lit {
    match side {
        Side::First => encoding.selector(position),
        Side::Second => !encoding.selector(position),
    }
}

impl<Key> ConstraintSolver<Key> for SatSolver {
    type Error = SatError;

    fn solve(
        &mut self,
        graph: &KnownGraph<Key>,
        constraints: &[SiConstraint<Key>],
    ) -> Result<Resolution, SatError> {
        let index = graph.index();
        let nodes = index.len();
        let encoding = Encoding::new(nodes, constraints.len())?;

        // primary edges by target, secondary edges by source
        let mut primary_into: Vec<Vec<Guarded>> = vec![Vec::new(); nodes];
        let mut secondary: Vec<Guarded> = Vec::new();

        for (source, targets) in &graph.primary().adj_map {
            for target in targets {
                let edge = Guarded {
                    from: position(index, *source),
                    to: position(index, *target),
                    guards: Vec::new(),
                };
                primary_into[edge.to].push(edge);
            }
        }
        for (source, targets) in &graph.secondary().adj_map {
            for target in targets {
                secondary.push(Guarded {
                    from: position(index, *source),
                    to: position(index, *target),
                    guards: Vec::new(),
                });
            }
        }
        for (at, constraint) in constraints.iter().enumerate() {
            for side in [Side::First, Side::Second] {
                let guard = side_guard(&encoding, at, side);
                for edge in constraint.edges(side) {
                    let edge_kind = edge.kind;
                    let edge = Guarded {
                        from: position(index, edge.from),
                        to: position(index, edge.to),
                        guards: vec![guard],
                    };
                    if edge_kind.is_primary() {
                        primary_into[edge.to].push(edge);
                    } else {
                        secondary.push(edge);
                    }
                }
            }
        }

        let mut solver = BasicSolver::default();
        let mut clauses = 0usize;
        let mut add = |solver: &mut BasicSolver, clause: Clause| -> Result<(), SatError> {
            clauses += 1;
            solver.add_clause(clause).map_err(backend)
        };

        // strict total order
        for i in 0..nodes {
            for j in i + 1..nodes {
                add(&mut solver, clause![encoding.before(i, j), encoding.before(j, i)])?;
                add(
                    &mut solver,
                    clause![encoding.not_before(i, j), encoding.not_before(j, i)],
                )?;
            }
        }
        for a in 0..nodes {
            for b in (0..nodes).filter(|&b| b != a) {
                for c in (0..nodes).filter(|&c| c != a && c != b) {
                    add(
                        &mut solver,
                        clause![
                            encoding.not_before(a, b),
                            encoding.not_before(b, c),
                            encoding.before(a, c)
                        ],
                    )?;
                }
            }
        }

        // A and A;B are contained in the order
        let mut trivially_cyclic = false;
        for edge in primary_into.iter().flatten() {
            trivially_cyclic |= edge.guards.is_empty() && edge.from == edge.to;
            add(&mut solver, implication(&encoding, &edge.guards, edge.from, edge.to))?;
        }
        for rw in &secondary {
            for first in &primary_into[rw.from] {
                let mut guards = first.guards.clone();
                guards.extend(rw.guards.iter().copied());
                trivially_cyclic |= guards.is_empty() && first.from == rw.to;
                add(&mut solver, implication(&encoding, &guards, first.from, rw.to))?;
            }
        }

        let stats = EncodingStats {
            variables: encoding.variables(constraints.len()),
            clauses,
        };
        self.last = Some(stats);
        tracing::debug!(
            nodes,
            constraints = constraints.len(),
            variables = stats.variables,
            clauses = stats.clauses,
            "encoded residual constraints"
        );

        if trivially_cyclic {
            tracing::debug!("known graph is cyclic");
            return Ok(Resolution::Unsatisfiable);
        }

        match solver.solve().map_err(backend)? {
            SolverResult::Sat => {
                let mut selection: Vec<(ConstraintId, Side)> = Vec::with_capacity(constraints.len());
                for (at, constraint) in constraints.iter().enumerate() {
                    let side = match solver.lit_val(encoding.selector(at)).map_err(backend)? {
                        TernaryVal::False => Side::Second,
                        TernaryVal::True | TernaryVal::DontCare => Side::First,
                    };
                    selection.push((constraint.id, side));
                }
                Ok(Resolution::Selection(selection))
            }
            SolverResult::Unsat => Ok(Resolution::Unsatisfiable),
            SolverResult::Interrupted => Err(SatError::Interrupted),
        }
    }
}
