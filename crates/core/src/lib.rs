//! Snapshot isolation checking for recorded database histories.
//!
//! `sicop_core` decides whether a history of committed transactions could
//! have been produced by a database providing snapshot isolation. The
//! question is reduced to cycle detection in a dependency graph whose edges
//! are partly certain and partly ambiguous:
//!
//! 1. A [`History`] records sessions, their transactions and the reads and
//!    writes inside them. Every written `(key, version)` is unique, so a read
//!    identifies the write it observed.
//! 2. A [`KnownGraph`] holds the certain dependencies: session order and
//!    write-read edges.
//! 3. Every pair of transactions writing a common key yields an
//!    [`SiConstraint`] with two alternative edge sets, one per write order.
//! 4. Pruning resolves the constraints whose outcome already follows from
//!    the known graph, using bit-matrix reachability.
//! 5. A [`ConstraintSolver`] decides the rest; the history is consistent iff
//!    the completed graph `A ∪ (A;B)` is acyclic.
//!
//! # Entry point
//!
//! ```rust,ignore
//! use sicop_core::{verify, VerifierConfig};
//!
//! let verdict = verify(&history, &VerifierConfig::default(), &mut solver)?;
//! if verdict.is_consistent() {
//!     println!("history satisfies snapshot isolation");
//! }
//! ```
//!
//! # Crate features
//!
//! - **`serde`** -- `Serialize`/`Deserialize` derives on ids, events,
//!   constraints, configuration and verdicts.
//! - **`parallel`** -- row-parallel matrix composition and closure on the
//!   rayon thread pool.
//!
//! Without `parallel` this crate is `no_std` compatible (requires `alloc`).

#![cfg_attr(not(any(test, feature = "parallel")), no_std)]
extern crate alloc;

pub mod consistency;
pub mod graph;
pub mod history;

pub use consistency::config::{PruningConfig, VerifierConfig};
pub use consistency::constraint::SiConstraint;
pub use consistency::{verify, ConstraintSolver, Resolution, Verdict};
pub use graph::known::KnownGraph;
pub use history::History;
