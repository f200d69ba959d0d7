use alloc::string::String;
use core::fmt::{Debug, Display, Formatter, Result};

use derive_more::From;

use crate::consistency::constraint::ConstraintId;
use crate::history::error::InvalidHistory;
use crate::history::types::TransactionId;

/// Error that aborts a verification run.
///
/// An inconsistent history is not an error; see
/// [`Verdict`](crate::consistency::Verdict).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum Error<Key, Element> {
    /// The history is structurally malformed.
    InvalidHistory(InvalidHistory<Key, Element>),
    /// A constraint between two writes of the initial empty list.
    #[from(ignore)]
    AmbiguousInitialWrites {
        constraint: ConstraintId,
        transactions: [TransactionId; 2],
    },
    /// The external solver failed.
    #[from(ignore)]
    Solver(String),
    /// The solver's selection misses a constraint or creates a cycle.
    #[from(ignore)]
    InvalidSelection,
}

impl<Key, Element> Display for Error<Key, Element>
where
    Key: Debug,
    Element: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::InvalidHistory(error) => write!(f, "invalid history: {error}"),
            Self::AmbiguousInitialWrites {
                constraint,
                transactions: [first, second],
            } => write!(
                f,
                "constraint {constraint} orders two initial writes ({first}, {second})"
            ),
            Self::Solver(message) => write!(f, "constraint solver failed: {message}"),
            Self::InvalidSelection => {
                write!(f, "constraint solver returned an invalid selection")
            }
        }
    }
}
