//! Description-length minimisation of the nested bipartite SBM.
//!
//! 1. **Gibbs sweeps** (stochastic): explore level-0 block assignments
//!    with probability `∝ exp(-β ΔS)`.
//! 2. **Greedy sweeps** (argmin): move vertices on strict improvement.
//! 3. **Greedy merges**: fuse whole blocks while the description shrinks.
//!
//! Rounds repeat until one makes neither a greedy move nor a merge. The
//! shortest level-0 partition seen is kept, then the hierarchy is built
//! on top of it.

use crate::gibbs::GibbsSampler;
use crate::graph::{BipartiteGraph, Side};
use crate::merge::greedy_merges;
use crate::model::LnFactorial;
use crate::nested::{BlockLevel, NestedBlockState};
use crate::sufficient_stats::BipartiteStats;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Options for nested SBM inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsbmOptions {
    /// Block slots per side at level 0. Default: 64
    pub max_blocks: usize,
    /// Gibbs sweeps per round. Default: 10
    pub num_sweeps: usize,
    /// Greedy sweeps per round, at most. Default: 20
    pub max_greedy_sweeps: usize,
    /// Sweep-and-merge rounds, at most. Default: 50
    pub max_rounds: usize,
    /// Inverse temperature of the Gibbs sweeps. Default: 1.0
    pub beta: f64,
}

impl Default for HsbmOptions {
    fn default() -> Self {
        HsbmOptions {
            max_blocks: 64,
            num_sweeps: 10,
            max_greedy_sweeps: 20,
            max_rounds: 50,
            beta: 1.0,
        }
    }
}

/// Nested stochastic block model inference on a bipartite graph.
///
/// # Usage
///
/// ```ignore
/// use hsblock::{BipartiteGraph, Hsblock, HsbmOptions};
///
/// let graph = BipartiteGraph::from_counts(n_docs, n_words, &counts, true)?;
/// let state = Hsblock::new(HsbmOptions::default()).minimize(&graph, 42)?;
/// let mdl = state.entropy(&graph)?;
/// ```
pub struct Hsblock {
    options: HsbmOptions,
}

impl Hsblock {
    /// Create a new inference instance.
    pub fn new(options: HsbmOptions) -> Self {
        Hsblock { options }
    }

    /// Options in use
    pub fn options(&self) -> &HsbmOptions {
        &self.options
    }

    /// Minimise the description length of a nested SBM on `graph`.
    ///
    /// Deterministic given `seed`.
    pub fn minimize(&self, graph: &BipartiteGraph, seed: u64) -> anyhow::Result<NestedBlockState> {
        let lnf = LnFactorial::for_graph(graph);
        let (level0, flat_dl) = self.minimize_level0_with(graph, seed, &lnf)?;
        let state = NestedBlockState::build(graph, level0, &lnf)?;

        let (bd, bw) = state.num_blocks(0)?;
        info!(
            "hsblock done: seed={}, level-0 blocks {}+{}, levels={}, flat dl={:.4}",
            seed,
            bd,
            bw,
            state.num_levels(),
            flat_dl
        );
        Ok(state)
    }

    /// Minimise the flat level-0 description length.
    ///
    /// Returns the canonical level-0 partition and its description
    /// length with a single top block per side above it.
    pub fn minimize_level0(
        &self,
        graph: &BipartiteGraph,
        seed: u64,
    ) -> anyhow::Result<(BlockLevel, f64)> {
        let lnf = LnFactorial::for_graph(graph);
        self.minimize_level0_with(graph, seed, &lnf)
    }

    fn minimize_level0_with(
        &self,
        graph: &BipartiteGraph,
        seed: u64,
        lnf: &LnFactorial,
    ) -> anyhow::Result<(BlockLevel, f64)> {
        let opts = &self.options;
        anyhow::ensure!(opts.max_blocks > 0, "max_blocks must be positive");
        anyhow::ensure!(
            opts.beta.is_finite() && opts.beta >= 0.0,
            "beta must be finite and non-negative"
        );

        let n_docs = graph.num_docs();
        let n_words = graph.num_words();
        let kd = n_docs.min(opts.max_blocks);
        let kw = n_words.min(opts.max_blocks);

        let mut rng = SmallRng::seed_from_u64(seed);
        let doc_labels = initial_labels(n_docs, kd, &mut rng);
        let word_labels = initial_labels(n_words, kw, &mut rng);

        let adj_list = graph.adj_list();
        let mut stats =
            BipartiteStats::from_graph(graph, &doc_labels, &word_labels, kd, kw, lnf)?;
        let mut gibbs = GibbsSampler::new(SmallRng::seed_from_u64(seed.wrapping_add(1)));

        info!(
            "hsblock: docs={}, words={}, E={}, slots={}+{}, weighted={}",
            n_docs,
            n_words,
            graph.total_weight(),
            kd,
            kw,
            graph.is_weighted()
        );

        let mut best_dl = stats.description_length(lnf);
        let mut best_membership = stats.membership.clone();

        for round in 0..opts.max_rounds {
            let gibbs_moves = gibbs.run(lnf, &mut stats, &adj_list, opts.num_sweeps, opts.beta);
            let (greedy_moves, _) =
                gibbs.run_greedy(lnf, &mut stats, &adj_list, opts.max_greedy_sweeps);
            let (num_merges, _) = greedy_merges(&mut stats, lnf);

            let dl = stats.description_length(lnf);
            debug!(
                "round {}: gibbs={}, greedy={}, merges={}, blocks={}+{}, dl={:.4}",
                round,
                gibbs_moves,
                greedy_moves,
                num_merges,
                stats.num_nonempty(Side::Doc),
                stats.num_nonempty(Side::Word),
                dl
            );

            if dl < best_dl {
                best_dl = dl;
                best_membership.clone_from(&stats.membership);
            }

            if greedy_moves == 0 && num_merges == 0 {
                break;
            }
        }

        let level0 = BlockLevel::canonical(&best_membership[..n_docs], &best_membership[n_docs..]);
        Ok((level0, best_dl))
    }
}

/// Own block per vertex (shuffled) when every vertex fits, random slots otherwise
fn initial_labels(n: usize, capacity: usize, rng: &mut SmallRng) -> Vec<usize> {
    if n <= capacity {
        let mut labels: Vec<usize> = (0..n).collect();
        labels.shuffle(rng);
        labels
    } else {
        (0..n).map(|_| rng.random_range(0..capacity)).collect()
    }
}
