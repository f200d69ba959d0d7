use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};

use derive_more::From;

/// Identifier of a session (one client's sequence of transactions).
///
/// `0` is reserved for the synthetic initial session that holds the
/// initial value of every key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The synthetic initial session.
    #[must_use]
    pub const fn root() -> Self {
        Self(0)
    }
}

/// Identifier of a transaction, unique across the whole history.
///
/// `0` is reserved for the synthetic initial transaction. It is a
/// predecessor of nothing in particular; it only owns the initial writes.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The synthetic initial transaction.
    #[must_use]
    pub const fn root() -> Self {
        Self(0)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "s{}", self.0)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "t{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Read,
    Write,
}

/// Which pruning strategy a history's values allow.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Opaque write-once values; only graph reasoning applies.
    Scalar,
    /// Append-only lists; every read exposes a prefix of the final order.
    List,
}

impl ValueKind {
    /// Returns `true` if reads of this kind reveal the final write order
    /// of their key.
    #[must_use]
    pub const fn supports_final_order(self) -> bool {
        matches!(self, Self::List)
    }
}

/// The value carried by an event.
///
/// For list histories, a write appends one element and a read returns the
/// whole list. The identity of a value (see [`Value::version`]) is the
/// scalar itself, the appended element, or the last element of the list
/// that was read. Appended elements are unique per key, so a list read is
/// attributed to the write that appended its last element.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value<Element> {
    Scalar(Element),
    /// `None` is the initial empty list.
    Append(Option<Element>),
    List(Vec<Element>),
}

impl<Element> Value<Element> {
    /// The write identity of this value.
    #[must_use]
    pub fn version(&self) -> Option<&Element> {
        match self {
            Self::Scalar(element) => Some(element),
            Self::Append(element) => element.as_ref(),
            Self::List(list) => list.last(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Append(_) | Self::List(_) => ValueKind::List,
        }
    }

    /// The list observed by a read, if this is a list read.
    #[must_use]
    pub fn observed_list(&self) -> Option<&[Element]> {
        match self {
            Self::List(list) => Some(list),
            Self::Scalar(_) | Self::Append(_) => None,
        }
    }

    /// The element appended by a write, if this is a list append.
    #[must_use]
    pub const fn appended(&self) -> Option<&Element> {
        match self {
            Self::Append(element) => element.as_ref(),
            Self::Scalar(_) | Self::List(_) => None,
        }
    }
}

impl<Element: Debug> Debug for Value<Element> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Scalar(element) => write!(f, "{element:?}"),
            Self::Append(Some(element)) => write!(f, "+{element:?}"),
            Self::Append(None) => write!(f, "[]"),
            Self::List(list) => write!(f, "{list:?}"),
        }
    }
}

/// A read or write, before it is attached to a transaction.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation<Key, Element> {
    pub kind: EventKind,
    pub key: Key,
    pub value: Value<Element>,
}

impl<Key, Element> Operation<Key, Element> {
    pub const fn read(key: Key, version: Element) -> Self {
        Self {
            kind: EventKind::Read,
            key,
            value: Value::Scalar(version),
        }
    }

    pub const fn write(key: Key, version: Element) -> Self {
        Self {
            kind: EventKind::Write,
            key,
            value: Value::Scalar(version),
        }
    }

    pub const fn append(key: Key, element: Element) -> Self {
        Self {
            kind: EventKind::Write,
            key,
            value: Value::Append(Some(element)),
        }
    }

    pub const fn read_list(key: Key, list: Vec<Element>) -> Self {
        Self {
            kind: EventKind::Read,
            key,
            value: Value::List(list),
        }
    }
}

/// A single read or write inside a committed history.
///
/// Equality is structural over all four fields.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Event<Key, Element> {
    pub transaction: TransactionId,
    pub kind: EventKind,
    pub key: Key,
    pub value: Value<Element>,
}

impl<Key, Element> Event<Key, Element> {
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self.kind, EventKind::Read)
    }

    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self.kind, EventKind::Write)
    }
}

impl<Key, Element> Debug for Event<Key, Element>
where
    Key: Debug,
    Element: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self.kind {
            EventKind::Read => write!(f, "{:?}=>{:?}", self.key, self.value),
            EventKind::Write => write!(f, "{:?}<={:?}", self.key, self.value),
        }
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Ongoing,
    Committed,
}

/// A transaction: an ordered list of events issued by one session.
///
/// The owning session is stored by id; the [`History`] arena owns both.
///
/// [`History`]: crate::history::History
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone)]
pub struct Transaction<Key, Element> {
    pub id: TransactionId,
    pub session: SessionId,
    pub events: Vec<Event<Key, Element>>,
    pub status: TransactionStatus,
}

impl<Key, Element> Transaction<Key, Element> {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    pub fn writes(&self) -> impl Iterator<Item = &Event<Key, Element>> {
        self.events.iter().filter(|event| event.is_write())
    }

    pub fn reads(&self) -> impl Iterator<Item = &Event<Key, Element>> {
        self.events.iter().filter(|event| event.is_read())
    }
}

impl<Key, Element> Debug for Transaction<Key, Element>
where
    Key: Debug,
    Element: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{}@{}{:?}", self.id, self.session, self.events)?;
        if !self.is_committed() {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// A session: transactions in the real-time order its client issued them.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub transactions: Vec<TransactionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_version() {
        assert_eq!(Value::Scalar(3).version(), Some(&3));
        assert_eq!(Value::Append(Some(4)).version(), Some(&4));
        assert_eq!(Value::<u64>::Append(None).version(), None);
        assert_eq!(Value::List(vec![1, 2, 5]).version(), Some(&5));
        assert_eq!(Value::<u64>::List(vec![]).version(), None);

        assert_eq!(Value::Append(Some(4)).appended(), Some(&4));
        assert_eq!(Value::<u64>::Append(None).appended(), None);
        assert_eq!(Value::Scalar(3).appended(), None);
        assert_eq!(Value::List(vec![1, 2]).appended(), None);
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::Scalar(1).kind(), ValueKind::Scalar);
        assert_eq!(Value::Append(Some(1)).kind(), ValueKind::List);
        assert!(ValueKind::List.supports_final_order());
        assert!(!ValueKind::Scalar.supports_final_order());
    }

    #[test]
    fn test_event_debug() {
        let read = Event {
            transaction: TransactionId(1),
            kind: EventKind::Read,
            key: "x",
            value: Value::Scalar(0),
        };
        assert_eq!(format!("{read:?}"), "\"x\"=>0");
        let append = Event {
            transaction: TransactionId(1),
            kind: EventKind::Write,
            key: 2,
            value: Value::Append(Some(7)),
        };
        assert_eq!(format!("{append:?}"), "2<=+7");
    }

    #[test]
    fn test_transaction_debug() {
        let mut transaction = Transaction {
            id: TransactionId(4),
            session: SessionId(2),
            events: vec![Event {
                transaction: TransactionId(4),
                kind: EventKind::Write,
                key: 1,
                value: Value::Scalar(2),
            }],
            status: TransactionStatus::Committed,
        };
        assert_eq!(format!("{transaction:?}"), "t4@s2[1<=2]");
        transaction.status = TransactionStatus::Ongoing;
        assert_eq!(format!("{transaction:?}"), "t4@s2[1<=2]!");
    }
}
