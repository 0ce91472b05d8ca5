//! TopSBM: topic models as nested stochastic block models of the
//! bipartite document-word graph.
//!
//! The estimator takes a document × word count matrix, finds the
//! hierarchy of document clusters and word topics with the shortest
//! description length, and maps documents to topic mixtures.
//!
//! # References
//!
//! Gerlach, Peixoto & Altmann (2018). "A network approach to topic
//! models." Science Advances 4, eaaq1360.

#![warn(missing_docs)]

/// Estimator lifecycle traits
pub mod estimator;

/// Per-level topic and cluster summaries
pub mod groups;

/// Planted-topic corpus simulation
pub mod sim;

/// The TopSBM estimator
pub mod topsbm;

pub use estimator::{Estimator, Fit, FitTransform, Transform};
pub use groups::TopicGroups;
pub use hsblock::HsbmOptions;
pub use topsbm::{FitSummary, TopSbm, TopSbmParams};
