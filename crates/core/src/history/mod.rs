//! Recorded histories: sessions, transactions and their read/write events.
//!
//! A [`History`] is an arena. It owns every [`Session`] and [`Transaction`];
//! sessions refer to their transactions and transactions to their session by
//! id only. Construction validates the structural invariants the verifier
//! relies on:
//!
//! - session and transaction ids are unique,
//! - events are only appended to transactions that are still ongoing,
//! - every `(key, version)` is written at most once across the history, so a
//!   version identifies the write that produced it,
//! - scalar and list values are not mixed.
//!
//! Once loading is finished, [`History::ensure_committed`] rejects histories
//! with transactions that never committed.

pub mod error;
pub mod types;

use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::HashMap;

use self::error::InvalidHistory;
use self::types::{
    Event, Operation, Session, SessionId, Transaction, TransactionId, TransactionStatus, Value,
    ValueKind,
};

#[derive(Debug, Clone)]
pub struct History<Key, Element> {
    sessions: HashMap<SessionId, Session>,
    transactions: HashMap<TransactionId, Transaction<Key, Element>>,
    writes: HashMap<(Key, Option<Element>), TransactionId>,
    value_kind: Option<ValueKind>,
}

impl<Key, Element> Default for History<Key, Element> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            transactions: HashMap::new(),
            writes: HashMap::new(),
            value_kind: None,
        }
    }
}

impl<Key, Element> History<Key, Element>
where
    Key: Clone + Eq + Hash,
    Element: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a complete history in one go and commits every transaction.
    ///
    /// `transactions` maps a session to its transactions in session order;
    /// `events` maps a transaction to its operations in program order.
    ///
    /// # Errors
    ///
    /// Any structural violation, see [`InvalidHistory`].
    pub fn from_parts<S, T, E>(
        sessions: S,
        transactions: T,
        events: E,
    ) -> Result<Self, InvalidHistory<Key, Element>>
    where
        S: IntoIterator<Item = SessionId>,
        T: IntoIterator<Item = (SessionId, Vec<TransactionId>)>,
        E: IntoIterator<Item = (TransactionId, Vec<Operation<Key, Element>>)>,
    {
        let mut history = Self::new();
        for session in sessions {
            history.add_session(session)?;
        }
        for (session, txns) in transactions {
            for txn in txns {
                history.add_transaction(session, txn)?;
            }
        }
        for (txn, operations) in events {
            for operation in operations {
                history.add_event(txn, operation)?;
            }
        }
        let mut ids: Vec<TransactionId> = history.transactions.keys().copied().collect();
        ids.sort_unstable();
        for txn in ids {
            history.commit(txn)?;
        }
        Ok(history)
    }

    /// # Errors
    ///
    /// [`InvalidHistory::DuplicateSession`] if the id is taken.
    pub fn add_session(&mut self, id: SessionId) -> Result<(), InvalidHistory<Key, Element>> {
        if self.sessions.contains_key(&id) {
            return Err(InvalidHistory::DuplicateSession { session: id });
        }
        self.sessions.insert(
            id,
            Session {
                id,
                transactions: Vec::new(),
            },
        );
        Ok(())
    }

    /// Appends a new ongoing transaction to the end of `session`.
    ///
    /// # Errors
    ///
    /// [`InvalidHistory::UnknownSession`] or
    /// [`InvalidHistory::DuplicateTransaction`].
    pub fn add_transaction(
        &mut self,
        session: SessionId,
        id: TransactionId,
    ) -> Result<(), InvalidHistory<Key, Element>> {
        let Some(owner) = self.sessions.get_mut(&session) else {
            return Err(InvalidHistory::UnknownSession { session });
        };
        if self.transactions.contains_key(&id) {
            return Err(InvalidHistory::DuplicateTransaction { transaction: id });
        }
        owner.transactions.push(id);
        self.transactions.insert(
            id,
            Transaction {
                id,
                session,
                events: Vec::new(),
                status: TransactionStatus::Ongoing,
            },
        );
        Ok(())
    }

    /// Appends an event to an ongoing transaction.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is unknown or committed, if the value kind
    /// differs from the rest of the history, or if a write repeats a
    /// `(key, version)` pair.
    pub fn add_event(
        &mut self,
        transaction: TransactionId,
        operation: Operation<Key, Element>,
    ) -> Result<(), InvalidHistory<Key, Element>> {
        let Some(txn) = self.transactions.get_mut(&transaction) else {
            return Err(InvalidHistory::UnknownTransaction { transaction });
        };
        if txn.is_committed() {
            return Err(InvalidHistory::TransactionNotOngoing { transaction });
        }

        let kind = operation.value.kind();
        match self.value_kind {
            Some(existing) if existing != kind => {
                return Err(InvalidHistory::MixedValueKinds { transaction });
            }
            _ => self.value_kind = Some(kind),
        }

        let Operation { kind, key, value } = operation;
        let event = Event {
            transaction,
            kind,
            key,
            value,
        };

        if event.is_write() {
            let identity = (event.key.clone(), event.value.version().cloned());
            if let Some(&other) = self.writes.get(&identity) {
                let (key, version) = identity;
                return Err(InvalidHistory::DuplicateWrite {
                    key,
                    version,
                    transactions: [other, transaction],
                });
            }
            self.writes.insert(identity, transaction);
        }

        txn.events.push(event);
        Ok(())
    }

    /// Moves a transaction from ongoing to committed.
    ///
    /// # Errors
    ///
    /// [`InvalidHistory::UnknownTransaction`], or
    /// [`InvalidHistory::TransactionNotOngoing`] on a second commit.
    pub fn commit(&mut self, transaction: TransactionId) -> Result<(), InvalidHistory<Key, Element>> {
        let Some(txn) = self.transactions.get_mut(&transaction) else {
            return Err(InvalidHistory::UnknownTransaction { transaction });
        };
        if txn.is_committed() {
            return Err(InvalidHistory::TransactionNotOngoing { transaction });
        }
        txn.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Adds the synthetic initial session and transaction holding one write
    /// per given key, so every read of an initial value has a writer.
    ///
    /// # Errors
    ///
    /// Fails if the root ids are taken or a write repeats a version.
    pub fn add_initial_writes<I>(&mut self, writes: I) -> Result<TransactionId, InvalidHistory<Key, Element>>
    where
        I: IntoIterator<Item = (Key, Value<Element>)>,
    {
        let root = TransactionId::root();
        self.add_session(SessionId::root())?;
        self.add_transaction(SessionId::root(), root)?;
        for (key, value) in writes {
            self.add_event(
                root,
                Operation {
                    kind: types::EventKind::Write,
                    key,
                    value,
                },
            )?;
        }
        self.commit(root)?;
        Ok(root)
    }

    /// Rejects the history if any transaction is still ongoing.
    ///
    /// # Errors
    ///
    /// [`InvalidHistory::Uncommitted`] naming the smallest such transaction.
    pub fn ensure_committed(&self) -> Result<(), InvalidHistory<Key, Element>> {
        match self
            .transactions
            .values()
            .filter(|txn| !txn.is_committed())
            .map(|txn| txn.id)
            .min()
        {
            Some(transaction) => Err(InvalidHistory::Uncommitted { transaction }),
            None => Ok(()),
        }
    }

    /// The transaction that wrote `version` of `key`, if any.
    #[must_use]
    pub fn writer_of(&self, key: &Key, version: Option<&Element>) -> Option<TransactionId> {
        self.writes.get(&(key.clone(), version.cloned())).copied()
    }
}

impl<Key, Element> History<Key, Element> {
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    #[must_use]
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction<Key, Element>> {
        self.transactions.get(&id)
    }

    /// Sessions ordered by id.
    #[must_use]
    pub fn sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_unstable_by_key(|session| session.id);
        sessions
    }

    /// Transactions ordered by id.
    #[must_use]
    pub fn transactions(&self) -> Vec<&Transaction<Key, Element>> {
        let mut txns: Vec<&Transaction<Key, Element>> = self.transactions.values().collect();
        txns.sort_unstable_by_key(|txn| txn.id);
        txns
    }

    #[must_use]
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<TransactionId> = self.transactions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All events, grouped by transaction in id order.
    pub fn events(&self) -> impl Iterator<Item = &Event<Key, Element>> {
        self.transactions()
            .into_iter()
            .flat_map(|txn| txn.events.iter())
    }

    /// The value representation used by this history. Empty histories are
    /// treated as scalar.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind.unwrap_or(ValueKind::Scalar)
    }

    /// Each transaction's session and position inside it.
    #[must_use]
    pub fn session_positions(&self) -> HashMap<TransactionId, (SessionId, usize)> {
        self.sessions
            .values()
            .flat_map(|session| {
                session
                    .transactions
                    .iter()
                    .enumerate()
                    .map(|(position, txn)| (*txn, (session.id, position)))
            })
            .collect()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.transactions.values().map(|txn| txn.events.len()).sum()
    }
}

impl<Key, Element> History<Key, Element>
where
    Key: Eq + Hash,
{
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.transactions
            .values()
            .flat_map(|txn| txn.events.iter().map(|event| &event.key))
            .collect::<hashbrown::HashSet<&Key>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::EventKind;

    type TestHistory = History<&'static str, u64>;

    fn one_session() -> TestHistory {
        let mut history = TestHistory::new();
        history.add_session(SessionId(1)).unwrap();
        history.add_transaction(SessionId(1), TransactionId(1)).unwrap();
        history
    }

    #[test]
    fn test_duplicate_write_is_rejected() {
        let mut history = one_session();
        history.add_transaction(SessionId(1), TransactionId(2)).unwrap();
        history
            .add_event(TransactionId(1), Operation::write("x", 1))
            .unwrap();
        assert_eq!(
            history.add_event(TransactionId(2), Operation::write("x", 1)),
            Err(InvalidHistory::DuplicateWrite {
                key: "x",
                version: Some(1),
                transactions: [TransactionId(1), TransactionId(2)],
            })
        );
        // same version on another key is fine
        history
            .add_event(TransactionId(2), Operation::write("y", 1))
            .unwrap();
    }

    #[test]
    fn test_reads_may_repeat_versions() {
        let mut history = one_session();
        history
            .add_event(TransactionId(1), Operation::read("x", 0))
            .unwrap();
        history
            .add_event(TransactionId(1), Operation::read("x", 0))
            .unwrap();
        assert_eq!(history.event_count(), 2);
    }

    #[test]
    fn test_event_on_unknown_transaction_is_rejected() {
        let mut history = one_session();
        assert_eq!(
            history.add_event(TransactionId(9), Operation::read("x", 0)),
            Err(InvalidHistory::UnknownTransaction {
                transaction: TransactionId(9)
            })
        );
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut history = one_session();
        assert_eq!(
            history.add_session(SessionId(1)),
            Err(InvalidHistory::DuplicateSession {
                session: SessionId(1)
            })
        );
        history.add_session(SessionId(2)).unwrap();
        assert_eq!(
            history.add_transaction(SessionId(2), TransactionId(1)),
            Err(InvalidHistory::DuplicateTransaction {
                transaction: TransactionId(1)
            })
        );
        assert_eq!(
            history.add_transaction(SessionId(3), TransactionId(5)),
            Err(InvalidHistory::UnknownSession {
                session: SessionId(3)
            })
        );
    }

    #[test]
    fn test_committed_transactions_are_closed() {
        let mut history = one_session();
        history.commit(TransactionId(1)).unwrap();
        assert_eq!(
            history.commit(TransactionId(1)),
            Err(InvalidHistory::TransactionNotOngoing {
                transaction: TransactionId(1)
            })
        );
        assert_eq!(
            history.add_event(TransactionId(1), Operation::write("x", 1)),
            Err(InvalidHistory::TransactionNotOngoing {
                transaction: TransactionId(1)
            })
        );
    }

    #[test]
    fn test_uncommitted_history_is_rejected() {
        let mut history = one_session();
        history.add_transaction(SessionId(1), TransactionId(2)).unwrap();
        history.commit(TransactionId(2)).unwrap();
        assert_eq!(
            history.ensure_committed(),
            Err(InvalidHistory::Uncommitted {
                transaction: TransactionId(1)
            })
        );
        history.commit(TransactionId(1)).unwrap();
        assert!(history.ensure_committed().is_ok());
    }

    #[test]
    fn test_mixed_value_kinds_are_rejected() {
        let mut history = History::<u64, u64>::new();
        history.add_session(SessionId(1)).unwrap();
        history.add_transaction(SessionId(1), TransactionId(1)).unwrap();
        history
            .add_event(TransactionId(1), Operation::append(1, 10))
            .unwrap();
        assert_eq!(
            history.add_event(TransactionId(1), Operation::write(2, 3)),
            Err(InvalidHistory::MixedValueKinds {
                transaction: TransactionId(1)
            })
        );
        assert_eq!(history.value_kind(), ValueKind::List);
    }

    #[test]
    fn test_from_parts_commits_and_orders() {
        let history = TestHistory::from_parts(
            [SessionId(1), SessionId(2)],
            [
                (SessionId(1), vec![TransactionId(1), TransactionId(3)]),
                (SessionId(2), vec![TransactionId(2)]),
            ],
            [
                (TransactionId(1), vec![Operation::write("x", 1)]),
                (
                    TransactionId(2),
                    vec![Operation::read("x", 1), Operation::write("y", 1)],
                ),
                (TransactionId(3), vec![Operation::read("y", 1)]),
            ],
        )
        .unwrap();

        assert!(history.ensure_committed().is_ok());
        assert_eq!(
            history.session(SessionId(1)).unwrap().transactions,
            vec![TransactionId(1), TransactionId(3)]
        );
        assert_eq!(history.transaction(TransactionId(3)).unwrap().session, SessionId(1));
        assert_eq!(history.writer_of(&"y", Some(&1)), Some(TransactionId(2)));
        assert_eq!(history.writer_of(&"y", Some(&2)), None);
        assert_eq!(history.key_count(), 2);

        let positions = history.session_positions();
        assert_eq!(positions[&TransactionId(3)], (SessionId(1), 1));
        assert_eq!(positions[&TransactionId(2)], (SessionId(2), 0));
    }

    #[test]
    fn test_initial_writes_use_the_root_transaction() {
        let mut history = one_session();
        let root = history
            .add_initial_writes([("x", Value::Scalar(0)), ("y", Value::Scalar(0))])
            .unwrap();
        assert_eq!(root, TransactionId::root());
        assert_eq!(history.writer_of(&"x", Some(&0)), Some(root));
        assert!(history.transaction(root).unwrap().is_committed());
        assert_eq!(
            history
                .transaction(root)
                .unwrap()
                .events
                .iter()
                .filter(|event| event.kind == EventKind::Write)
                .count(),
            2
        );
    }
}
