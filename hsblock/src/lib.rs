//! Nested stochastic block model (SBM) for bipartite document-word graphs.
//!
//! Infers a hierarchy of document and word blocks by minimising the
//! description length of a degree-corrected microcanonical SBM. Level 0
//! is optimised with Gibbs and greedy single-vertex sweeps plus
//! agglomerative block merges. Upper levels are built by merging the
//! blocks of the level below.
//!
//! # Model
//!
//! Description length in nats: adjacency, block degrees, and partitions
//! at level 0, a dense multigraph term and partitions at every upper
//! level, and a single-block top level.
//!
//! # References
//!
//! Peixoto (2017). "Nonparametric Bayesian inference of the
//! microcanonical stochastic block model." Phys. Rev. E 95, 012317.
//!
//! Gerlach, Peixoto & Altmann (2018). "A network approach to topic
//! models." Science Advances 4, eaaq1360.

#![warn(missing_docs)]

/// Bipartite document-word multigraph
pub mod graph;

/// Description-length primitives with cached log-factorials
pub mod model;

/// Level-0 block statistics with incremental moves and merges
pub mod sufficient_stats;

/// Gibbs and greedy single-vertex sweeps
pub mod gibbs;

/// Agglomerative block merges
pub mod merge;

/// Block levels, level graphs, and the nested hierarchy
pub mod nested;

/// Minimisation driver and options
pub mod inference;

#[cfg(test)]
mod test;

pub use graph::{BipartiteGraph, CountEdge, Side};
pub use inference::{Hsblock, HsbmOptions};
pub use nested::{BlockLevel, NestedBlockState};
