//! Single-pass pruning for append-only list histories.
//!
//! Every read of a list key returns a prefix of the key's final list, so
//! sorting the reads of a key by length must yield a chain of prefixes. A
//! divergence is an immediate contradiction. Otherwise the longest read is
//! the best known final order, and a constraint is decided on the first
//! shared key that tells its writers apart:
//!
//! - the initial empty list precedes every append,
//! - an append seen in the final order precedes one that is not,
//! - two seen appends keep their order in the final list.
//!
//! Appends no read ever observed say nothing; if no shared key decides the
//! constraint it is left to the solver. Ordering an observed append before
//! an unobserved one is a heuristic, not a consequence of the reads.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

use super::{apply_side, PruneReport, RoundStats};
use crate::consistency::constraint::{SiConstraint, Side};
use crate::consistency::error::Error;
use crate::graph::known::KnownGraph;
use crate::history::types::TransactionId;
use crate::history::History;

pub fn prune_list_history<Key, Element>(
    graph: &mut KnownGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    history: &History<Key, Element>,
) -> Result<PruneReport, Error<Key, Element>>
where
    Key: Clone + Eq + Hash + Ord + Debug,
    Element: Clone + Eq + Hash + Debug,
{
    let mut read_results: BTreeMap<&Key, Vec<&[Element]>> = BTreeMap::new();
    for event in history.events().filter(|event| event.is_read()) {
        if let Some(list) = event.value.observed_list() {
            read_results.entry(&event.key).or_default().push(list);
        }
    }

    let mut final_lists: HashMap<&Key, &[Element]> = HashMap::new();
    for (key, lists) in &mut read_results {
        lists.sort_by_key(|list| list.len());
        for pair in lists.windows(2) {
            let (shorter, longer) = (pair[0], pair[1]);
            if let Some(position) = shorter
                .iter()
                .zip(longer)
                .position(|(left, right)| left != right)
            {
                tracing::debug!(?key, position, ?shorter, ?longer, "inconsistent list reads");
                let cycle = [&shorter[position], &longer[position]]
                    .into_iter()
                    .filter_map(|element| history.writer_of(key, Some(element)))
                    .collect();
                return Ok(PruneReport {
                    rounds: vec![RoundStats {
                        round: 1,
                        solved: 0,
                        remaining: constraints.len(),
                    }],
                    solved: 0,
                    remaining: constraints.len(),
                    cycle: Some(cycle),
                });
            }
        }
        if let Some(longest) = lists.last() {
            final_lists.insert(*key, *longest);
        }
    }

    let mut txn_writes: HashMap<(TransactionId, &Key), Option<&Element>> = HashMap::new();
    let mut written_keys: HashMap<TransactionId, BTreeSet<&Key>> = HashMap::new();
    for txn in history.transactions() {
        for event in txn.writes() {
            txn_writes
                .entry((txn.id, &event.key))
                .or_insert_with(|| event.value.appended());
            written_keys.entry(txn.id).or_default().insert(&event.key);
        }
    }

    let mut decisions = Vec::new();
    for constraint in constraints.iter() {
        let (Some(first_keys), Some(second_keys)) = (
            written_keys.get(&constraint.first),
            written_keys.get(&constraint.second),
        ) else {
            continue;
        };

        for key in first_keys.intersection(second_keys) {
            let (Some(&first), Some(&second)) = (
                txn_writes.get(&(constraint.first, *key)),
                txn_writes.get(&(constraint.second, *key)),
            ) else {
                continue;
            };

            let side = match (first, second) {
                (None, None) => {
                    return Err(Error::AmbiguousInitialWrites {
                        constraint: constraint.id,
                        transactions: [constraint.first, constraint.second],
                    });
                }
                (None, Some(_)) => Side::First,
                (Some(_), None) => Side::Second,
                (Some(first), Some(second)) => {
                    let Some(final_list) = final_lists.get(key) else {
                        continue;
                    };
                    let position = |element: &Element| final_list.iter().position(|e| e == element);
                    match (position(first), position(second)) {
                        (None, None) => continue,
                        (Some(_), None) => Side::First,
                        (None, Some(_)) => Side::Second,
                        (Some(i), Some(j)) if i < j => Side::First,
                        (Some(_), Some(_)) => Side::Second,
                    }
                }
            };
            decisions.push((constraint.id, side));
            break;
        }
    }

    let solved: HashSet<_> = decisions.iter().map(|(id, _)| *id).collect();
    let chosen: HashMap<_, _> = decisions.into_iter().collect();
    for constraint in constraints.iter() {
        if let Some(&side) = chosen.get(&constraint.id) {
            apply_side(graph, constraint, side);
        }
    }
    constraints.retain(|constraint| !solved.contains(&constraint.id));

    tracing::debug!(
        keys = final_lists.len(),
        solved = solved.len(),
        remaining = constraints.len(),
        "list pruning"
    );
    Ok(PruneReport {
        rounds: vec![RoundStats {
            round: 1,
            solved: solved.len(),
            remaining: constraints.len(),
        }],
        solved: solved.len(),
        remaining: constraints.len(),
        cycle: None,
    })
}
