//! Random history generation for cross-checks and benchmarks.

pub mod generator;
