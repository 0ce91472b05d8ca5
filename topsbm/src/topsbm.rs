//! Topic modelling with a nested stochastic block model on the bipartite
//! document-word graph.
//!
//! Documents (rows) and words (columns) of a count matrix become the two
//! sides of a multigraph, each count a bundle of parallel edges. The
//! hierarchy with the shortest description length over `n_init`
//! independent runs is kept. Word blocks are topics, document blocks are
//! clusters.

use crate::estimator::{Estimator, Fit, Transform};
use crate::groups::{topic_mixture, TopicGroups};

use hsblock::{BipartiteGraph, CountEdge, Hsblock, HsbmOptions, NestedBlockState};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget};
use log::info;
use matrix_util::traits::MatTriplets;
use nalgebra::DMatrix;
use num_traits::ToPrimitive;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters of [`TopSbm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopSbmParams {
    /// One weighted edge per non-zero cell (`true`), or one unit edge per token
    pub weighted_edges: bool,
    /// Number of independent minimisations; the shortest description wins
    pub n_init: usize,
    /// Base seed; `None` draws one from the OS
    pub random_state: Option<u64>,
    /// Inference knobs
    pub inference: HsbmOptions,
}

impl Default for TopSbmParams {
    fn default() -> Self {
        TopSbmParams {
            weighted_edges: true,
            n_init: 1,
            random_state: None,
            inference: HsbmOptions::default(),
        }
    }
}

/// Attributes learned by `fit`
#[derive(Debug, Clone)]
struct Fitted {
    graph: BipartiteGraph,
    state: NestedBlockState,
    mdl: f64,
    run_mdls: Vec<f64>,
    seed: u64,
    groups: Vec<TopicGroups>,
}

/// Take-home summary of a fit
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    /// documents
    pub num_samples: usize,
    /// words
    pub num_features: usize,
    /// total token count
    pub num_tokens: f64,
    /// description length of the kept hierarchy
    pub mdl: f64,
    /// description length of every run, in run order
    pub run_mdls: Vec<f64>,
    /// base seed actually used
    pub seed: u64,
    /// `(doc blocks, word blocks)` for each level below the top
    pub blocks: Vec<(usize, usize)>,
    /// description length contributed by every level, top included
    pub entropy_by_level: Vec<f64>,
    /// parameters of the fit
    pub params: TopSbmParams,
}

/// Hierarchical SBM topic model.
///
/// # Usage
///
/// ```ignore
/// use topsbm::{FitTransform, TopSbm};
///
/// let mut model = TopSbm::default().with_n_init(10).with_random_state(Some(0));
/// let doc_topic = model.fit_transform(&counts)?; // n_docs × n_topics
/// let mdl = model.mdl();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopSbm {
    params: TopSbmParams,
    show_progress: bool,
    fitted: Option<Fitted>,
}

impl TopSbm {
    /// A model with the given parameters
    pub fn new(params: TopSbmParams) -> Self {
        TopSbm {
            params,
            show_progress: false,
            fitted: None,
        }
    }

    /// Set `weighted_edges`
    pub fn with_weighted_edges(mut self, weighted_edges: bool) -> Self {
        self.params.weighted_edges = weighted_edges;
        self.fitted = None;
        self
    }

    /// Set `n_init`
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.params.n_init = n_init;
        self.fitted = None;
        self
    }

    /// Set `random_state`
    pub fn with_random_state(mut self, random_state: Option<u64>) -> Self {
        self.params.random_state = random_state;
        self.fitted = None;
        self
    }

    /// Set the inference options
    pub fn with_inference(mut self, inference: HsbmOptions) -> Self {
        self.params.inference = inference;
        self.fitted = None;
        self
    }

    /// Draw a progress bar over runs
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Graph the model was fitted on
    pub fn graph(&self) -> Option<&BipartiteGraph> {
        self.fitted.as_ref().map(|f| &f.graph)
    }

    /// Fitted hierarchy
    pub fn state(&self) -> Option<&NestedBlockState> {
        self.fitted.as_ref().map(|f| &f.state)
    }

    /// Description length (nats) of the fitted hierarchy
    pub fn mdl(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.mdl)
    }

    /// Description length of every run
    pub fn run_mdls(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.run_mdls.as_slice())
    }

    /// Base seed used by the last fit
    pub fn seed(&self) -> Option<u64> {
        self.fitted.as_ref().map(|f| f.seed)
    }

    /// Number of words seen in fit
    pub fn num_features(&self) -> Option<usize> {
        self.graph().map(BipartiteGraph::num_words)
    }

    /// Number of documents seen in fit
    pub fn num_samples(&self) -> Option<usize> {
        self.graph().map(BipartiteGraph::num_docs)
    }

    /// Number of levels below the trivial top level
    pub fn n_levels(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.groups.len())
    }

    /// Summaries of every level below the top
    pub fn all_groups(&self) -> Option<&[TopicGroups]> {
        self.fitted.as_ref().map(|f| f.groups.as_slice())
    }

    /// Summary of level `l`
    pub fn groups(&self, l: usize) -> anyhow::Result<&TopicGroups> {
        let fitted = self.fitted()?;
        fitted.groups.get(l).ok_or_else(|| {
            anyhow::anyhow!("level {} out of range, {} levels", l, fitted.groups.len())
        })
    }

    /// Top `n` words `(word, prob)` of every word topic at level `l`
    pub fn topics(&self, l: usize, n: usize) -> anyhow::Result<Vec<Vec<(usize, f32)>>> {
        Ok(self.groups(l)?.topics(n))
    }

    /// Up to `n` documents of every document cluster at level `l`
    pub fn clusters(&self, l: usize, n: usize) -> anyhow::Result<Vec<Vec<usize>>> {
        Ok(self.groups(l)?.clusters(n))
    }

    /// Topic mixture of one training document at level `l`
    pub fn topic_dist(&self, l: usize, doc: usize) -> anyhow::Result<Vec<f32>> {
        self.groups(l)?
            .topic_dist(doc)
            .ok_or_else(|| anyhow::anyhow!("document {} out of range", doc))
    }

    /// Run summary for reporting
    pub fn summary(&self) -> anyhow::Result<FitSummary> {
        let fitted = self.fitted()?;
        let graph = &fitted.graph;
        Ok(FitSummary {
            num_samples: graph.num_docs(),
            num_features: graph.num_words(),
            num_tokens: graph.total_weight(),
            mdl: fitted.mdl,
            run_mdls: fitted.run_mdls.clone(),
            seed: fitted.seed,
            blocks: fitted.groups.iter().map(|g| (g.bd, g.bw)).collect(),
            entropy_by_level: fitted.state.entropy_by_level(graph)?,
            params: self.params.clone(),
        })
    }

    fn fitted(&self) -> anyhow::Result<&Fitted> {
        self.fitted
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("this TopSbm instance is not fitted yet"))
    }

    /// Fit on `(doc, word, count)` cells of an `n_docs × n_words` matrix
    pub fn fit_counts(
        &mut self,
        n_docs: usize,
        n_words: usize,
        counts: &[CountEdge],
    ) -> anyhow::Result<&mut Self> {
        self.fitted = None;
        let params = &self.params;
        anyhow::ensure!(params.n_init >= 1, "n_init must be at least 1");
        anyhow::ensure!(
            !counts.is_empty(),
            "the count matrix has no positive entries"
        );

        let graph = BipartiteGraph::from_counts(n_docs, n_words, counts, params.weighted_edges)?;
        let seed = params
            .random_state
            .unwrap_or_else(|| rand::rng().random::<u64>());

        info!(
            "fitting {} docs x {} words, {} tokens, n_init={}, seed={}",
            n_docs,
            n_words,
            graph.total_weight(),
            params.n_init,
            seed
        );

        let hsblock = Hsblock::new(params.inference.clone());

        let pb = ProgressBar::new(params.n_init as u64);
        if !self.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let runs = (0..params.n_init)
            .into_par_iter()
            .progress_with(pb.clone())
            .map(|i| -> anyhow::Result<(NestedBlockState, f64)> {
                let state = hsblock.minimize(&graph, run_seed(seed, i))?;
                let mdl = state.entropy(&graph)?;
                Ok((state, mdl))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        pb.finish_and_clear();

        let run_mdls: Vec<f64> = runs.iter().map(|(_, mdl)| *mdl).collect();

        // strict comparison keeps the lowest run index on ties
        let mut best = 0;
        for (i, &mdl) in run_mdls.iter().enumerate().skip(1) {
            if mdl < run_mdls[best] {
                best = i;
            }
        }
        let (state, mdl) = runs
            .into_iter()
            .nth(best)
            .ok_or_else(|| anyhow::anyhow!("no minimisation run finished"))?;

        let n_levels = state.num_levels() - 1;
        let groups = (0..n_levels)
            .map(|l| TopicGroups::from_state(&graph, &state, l))
            .collect::<anyhow::Result<Vec<_>>>()?;

        info!(
            "kept run {} of {}: mdl={:.4}, levels={}, topics={}",
            best,
            params.n_init,
            mdl,
            n_levels,
            groups.first().map(|g| g.bw).unwrap_or(0)
        );

        self.fitted = Some(Fitted {
            graph,
            state,
            mdl,
            run_mdls,
            seed,
            groups,
        });
        Ok(self)
    }

    /// Topic mixture of `(doc, word, count)` cells of an `n_docs × n_words` matrix
    pub fn transform_counts(
        &self,
        n_docs: usize,
        n_words: usize,
        counts: &[CountEdge],
    ) -> anyhow::Result<DMatrix<f32>> {
        let fitted = self.fitted()?;
        anyhow::ensure!(
            n_words == fitted.graph.num_words(),
            "expected {} features, got {}",
            fitted.graph.num_words(),
            n_words
        );
        anyhow::ensure!(
            counts.iter().all(|&(d, w, _)| d < n_docs && w < n_words),
            "count entries out of bounds"
        );

        let level0 = fitted.groups.first().ok_or_else(|| {
            anyhow::anyhow!("the fitted hierarchy has no level below the top")
        })?;
        Ok(topic_mixture(n_docs, &level0.word_blocks, level0.bw, counts))
    }
}

/// Seed of run `i`; run 0 uses the base seed itself
pub fn run_seed(base: u64, i: usize) -> u64 {
    if i == 0 {
        return base;
    }
    // splitmix64 step
    let mut z = base.wrapping_add((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Validate a matrix and extract its rounded positive counts.
///
/// Returns `(n_docs, n_words, counts)`.
pub fn count_triplets<X>(x: &X) -> anyhow::Result<(usize, usize, Vec<CountEdge>)>
where
    X: MatTriplets,
    X::Scalar: ToPrimitive,
{
    let (nrow, ncol, triplets) = x.to_nonzero_triplets()?;
    anyhow::ensure!(nrow > 0, "need at least one sample (row)");
    anyhow::ensure!(ncol > 0, "need at least one feature (column)");

    let mut counts = Vec::with_capacity(triplets.len());
    for (i, j, x_ij) in triplets {
        let x_ij = x_ij
            .to_f64()
            .ok_or_else(|| anyhow::anyhow!("entry ({}, {}) is not a number", i, j))?;
        anyhow::ensure!(x_ij.is_finite(), "entry ({}, {}) is not finite", i, j);
        anyhow::ensure!(x_ij >= 0.0, "negative entry {} at ({}, {})", x_ij, i, j);
        let c = x_ij.round();
        if c > 0.0 {
            counts.push((i, j, c));
        }
    }
    Ok((nrow, ncol, counts))
}

impl Estimator for TopSbm {
    type Params = TopSbmParams;

    fn params(&self) -> &TopSbmParams {
        &self.params
    }

    fn set_params(&mut self, params: TopSbmParams) -> &mut Self {
        self.params = params;
        self.fitted = None;
        self
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

impl<X> Fit<X> for TopSbm
where
    X: MatTriplets,
    X::Scalar: ToPrimitive,
{
    fn fit(&mut self, x: &X) -> anyhow::Result<&mut Self> {
        let (n_docs, n_words, counts) = count_triplets(x)?;
        self.fit_counts(n_docs, n_words, &counts)
    }
}

impl<X> Transform<X> for TopSbm
where
    X: MatTriplets,
    X::Scalar: ToPrimitive,
{
    type Output = DMatrix<f32>;

    fn transform(&self, x: &X) -> anyhow::Result<DMatrix<f32>> {
        self.fitted()?;
        let (n_docs, n_words, counts) = count_triplets(x)?;
        self.transform_counts(n_docs, n_words, &counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_seed() {
        assert_eq!(run_seed(42, 0), 42);
        assert_ne!(run_seed(42, 1), 42);
        assert_ne!(run_seed(42, 1), run_seed(42, 2));
        assert_eq!(run_seed(7, 3), run_seed(7, 3));
    }

    #[test]
    fn test_count_triplets_rounds_and_drops_zeros() -> anyhow::Result<()> {
        let x = DMatrix::<f32>::from_row_slice(2, 3, &[0.4, 1.6, 0.0, 2.0, 0.0, 3.0]);
        let (nrow, ncol, counts) = count_triplets(&x)?;
        assert_eq!((nrow, ncol), (2, 3));
        let mut counts = counts;
        counts.sort_by_key(|&(i, j, _)| (i, j));
        assert_eq!(counts, vec![(0, 1, 2.0), (1, 0, 2.0), (1, 2, 3.0)]);
        Ok(())
    }

    #[test]
    fn test_count_triplets_rejects_invalid() {
        let negative = DMatrix::<f32>::from_row_slice(1, 2, &[1.0, -1.0]);
        assert!(count_triplets(&negative).is_err());

        let nan = DMatrix::<f64>::from_row_slice(1, 2, &[1.0, f64::NAN]);
        assert!(count_triplets(&nan).is_err());

        let empty = DMatrix::<f32>::zeros(0, 3);
        assert!(count_triplets(&empty).is_err());
    }

    #[test]
    fn test_params_serde() -> anyhow::Result<()> {
        let params: TopSbmParams = serde_json::from_str(r#"{"n_init": 3, "random_state": 5}"#)?;
        assert_eq!(params.n_init, 3);
        assert_eq!(params.random_state, Some(5));
        assert!(params.weighted_edges);
        Ok(())
    }

    #[test]
    fn test_set_params_discards_fit() -> anyhow::Result<()> {
        let x = DMatrix::<f32>::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 3.0]);
        let mut model = TopSbm::default().with_random_state(Some(1));
        model.fit(&x)?;
        assert!(model.is_fitted());

        let params = TopSbmParams {
            n_init: 2,
            ..model.params().clone()
        };
        model.set_params(params);
        assert!(!model.is_fitted());
        assert!(model.mdl().is_none());
        Ok(())
    }
}
