//! Graph representations used by the verifier.
//!
//! - [`digraph::DiGraph`]: mutable adjacency map, grown edge by edge.
//! - [`matrix::MatrixGraph`]: immutable bit-matrix snapshot for bulk algebra.
//! - [`known::KnownGraph`]: the two-layer dependency graph of a history.

pub mod bitset;
pub mod digraph;
pub mod known;
pub mod matrix;
