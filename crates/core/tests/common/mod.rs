#![allow(dead_code)]

use std::convert::Infallible;

use sicop_core::consistency::constraint::{SiConstraint, Side};
use sicop_core::consistency::pruning::apply_side;
use sicop_core::history::types::{Operation, SessionId, TransactionId, Value};
use sicop_core::{ConstraintSolver, History, KnownGraph, Resolution};

/// DSL macro for building scalar test histories.
///
/// Produces `History<&'static str, u64>`. Sessions get ids `1..`, and
/// transactions get ids `1..` in the order they are written. Every key that
/// appears gets an initial write of `0` in the root transaction.
///
/// ```ignore
/// history! {
///     [
///         { r(x, 0), w(x, 1) },
///         { r(x, 1) },
///     ],
///     [
///         { r(x, 0), w(x, 2) },
///     ],
/// }
/// ```
#[macro_export]
macro_rules! history {
    ($( [ $( { $( $op:ident ( $($args:tt)* ) ),* $(,)? } ),* $(,)? ] ),* $(,)?) => {
        $crate::common::build_history(vec![
            $( vec![ $( vec![ $( $crate::op!($op($($args)*)) ),* ] ),* ] ),*
        ])
    };
}

/// Build a single Operation.
///
/// - `w(var, val)` -> write
/// - `r(var, val)` -> read
#[macro_export]
macro_rules! op {
    (w($var:ident, $val:expr)) => {
        sicop_core::history::types::Operation::<&'static str, u64>::write(
            stringify!($var),
            $val as u64,
        )
    };
    (r($var:ident, $val:expr)) => {
        sicop_core::history::types::Operation::<&'static str, u64>::read(
            stringify!($var),
            $val as u64,
        )
    };
}

pub fn build_history(sessions: Vec<Vec<Vec<Operation<&'static str, u64>>>>) -> History<&'static str, u64> {
    let mut history = History::new();
    let mut keys = Vec::new();
    let mut next_txn = 1;
    for (position, session) in sessions.into_iter().enumerate() {
        let session_id = SessionId(position as u64 + 1);
        history.add_session(session_id).unwrap();
        for operations in session {
            let txn = TransactionId(next_txn);
            next_txn += 1;
            history.add_transaction(session_id, txn).unwrap();
            for operation in operations {
                if !keys.contains(&operation.key) {
                    keys.push(operation.key);
                }
                history.add_event(txn, operation).unwrap();
            }
            history.commit(txn).unwrap();
        }
    }
    history
        .add_initial_writes(keys.into_iter().map(|key| (key, Value::Scalar(0))))
        .unwrap();
    history
}

/// List-append history, numbered like [`build_history`], with the initial
/// empty list for every key in `keys`.
pub fn build_list_history(
    sessions: Vec<Vec<Vec<Operation<u64, u64>>>>,
    keys: &[u64],
) -> History<u64, u64> {
    let mut history = History::new();
    let mut next_txn = 1;
    for (position, session) in sessions.into_iter().enumerate() {
        let session_id = SessionId(position as u64 + 1);
        history.add_session(session_id).unwrap();
        for operations in session {
            let txn = TransactionId(next_txn);
            next_txn += 1;
            history.add_transaction(session_id, txn).unwrap();
            for operation in operations {
                history.add_event(txn, operation).unwrap();
            }
            history.commit(txn).unwrap();
        }
    }
    history
        .add_initial_writes(keys.iter().map(|key| (*key, Value::Append(None))))
        .unwrap();
    history
}

/// Tries every combination of sides. Only for small residual sets.
#[derive(Debug, Default)]
pub struct ExhaustiveSolver {
    pub calls: usize,
    pub seen: usize,
}

impl<Key> ConstraintSolver<Key> for ExhaustiveSolver
where
    Key: Clone + Eq + std::hash::Hash + std::fmt::Debug,
{
    type Error = Infallible;

    fn solve(
        &mut self,
        graph: &KnownGraph<Key>,
        constraints: &[SiConstraint<Key>],
    ) -> Result<Resolution, Infallible> {
        assert!(constraints.len() <= 16, "too many constraints to enumerate");
        self.calls += 1;
        self.seen = constraints.len();
        for mask in 0u32..(1 << constraints.len()) {
            let mut candidate = graph.clone();
            let selection: Vec<_> = constraints
                .iter()
                .enumerate()
                .map(|(bit, constraint)| {
                    let side = if mask & (1 << bit) == 0 {
                        Side::First
                    } else {
                        Side::Second
                    };
                    apply_side(&mut candidate, constraint, side);
                    (constraint.id, side)
                })
                .collect();
            if candidate.find_cycle().is_none() {
                return Ok(Resolution::Selection(selection));
            }
        }
        Ok(Resolution::Unsatisfiable)
    }
}

/// Always answers with the given resolution.
pub struct FixedSolver(pub Resolution);

impl<Key> ConstraintSolver<Key> for FixedSolver {
    type Error = Infallible;

    fn solve(&mut self, _: &KnownGraph<Key>, _: &[SiConstraint<Key>]) -> Result<Resolution, Infallible> {
        Ok(self.0.clone())
    }
}

/// Always fails.
pub struct FailingSolver;

impl<Key> ConstraintSolver<Key> for FailingSolver {
    type Error = &'static str;

    fn solve(&mut self, _: &KnownGraph<Key>, _: &[SiConstraint<Key>]) -> Result<Resolution, &'static str> {
        Err("backend unavailable")
    }
}
