use core::fmt::{Debug, Display, Formatter, Result};

use crate::history::types::{SessionId, TransactionId};

/// Structural violation found while building or finalizing a history.
///
/// These describe malformed input, not a consistency violation.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidHistory<Key, Element> {
    DuplicateSession {
        session: SessionId,
    },
    DuplicateTransaction {
        transaction: TransactionId,
    },
    UnknownSession {
        session: SessionId,
    },
    UnknownTransaction {
        transaction: TransactionId,
    },
    /// An event or a commit arrived for a transaction that already committed.
    TransactionNotOngoing {
        transaction: TransactionId,
    },
    /// Two writes claim the same version of a key.
    DuplicateWrite {
        key: Key,
        version: Option<Element>,
        transactions: [TransactionId; 2],
    },
    /// Scalar and list values in one history.
    MixedValueKinds {
        transaction: TransactionId,
    },
    /// A transaction never committed.
    Uncommitted {
        transaction: TransactionId,
    },
    /// A read observed a version that no write produced.
    UnknownWrite {
        transaction: TransactionId,
        key: Key,
        version: Option<Element>,
    },
}

impl<Key, Element> Display for InvalidHistory<Key, Element>
where
    Key: Debug,
    Element: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::DuplicateSession { session } => write!(f, "session {session} added twice"),
            Self::DuplicateTransaction { transaction } => {
                write!(f, "transaction {transaction} added twice")
            }
            Self::UnknownSession { session } => write!(f, "unknown session {session}"),
            Self::UnknownTransaction { transaction } => {
                write!(f, "unknown transaction {transaction}")
            }
            Self::TransactionNotOngoing { transaction } => {
                write!(f, "transaction {transaction} is already committed")
            }
            Self::DuplicateWrite {
                key,
                version,
                transactions: [first, second],
            } => write!(
                f,
                "{first} and {second} both wrote version {version:?} of key {key:?}"
            ),
            Self::MixedValueKinds { transaction } => write!(
                f,
                "transaction {transaction} mixes scalar and list values with the rest of the history"
            ),
            Self::Uncommitted { transaction } => {
                write!(f, "transaction {transaction} did not commit")
            }
            Self::UnknownWrite {
                transaction,
                key,
                version,
            } => write!(
                f,
                "{transaction} read version {version:?} of key {key:?}, which was never written"
            ),
        }
    }
}
