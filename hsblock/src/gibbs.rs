//! Single-vertex sweeps over the level-0 partition.
//!
//! For each vertex, the description-length change of moving it to every
//! same-side block slot is computed in closed form from the sufficient
//! statistics. Gibbs sweeps then sample a slot with probability
//! `∝ exp(-β ΔS)`, greedy sweeps take the best strict improvement.
//!
//! Vertices are visited in a fresh random order every sweep.

use crate::graph::Side;
use crate::model::LnFactorial;
use crate::sufficient_stats::{BipartiteStats, NeighborBlocks};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Collapsed Gibbs sampler (and greedy mover) for level-0 block assignments.
pub struct GibbsSampler {
    rng: SmallRng,
    /// Scratch space for per-slot log-probabilities
    log_probs: Vec<f64>,
    nbr_blocks: NeighborBlocks,
    order: Vec<usize>,
}

impl GibbsSampler {
    /// Create a new sampler with the given RNG.
    pub fn new(rng: SmallRng) -> Self {
        GibbsSampler {
            rng,
            log_probs: Vec::new(),
            nbr_blocks: NeighborBlocks::default(),
            order: Vec::new(),
        }
    }

    fn prepare(&mut self, stats: &BipartiteStats) {
        let max_capacity = stats.capacity(Side::Doc).max(stats.capacity(Side::Word));
        self.log_probs.resize(max_capacity, 0.0);
        if self.order.len() != stats.membership.len() {
            self.order = (0..stats.membership.len()).collect();
            self.nbr_blocks = NeighborBlocks::with_capacity(max_capacity);
        }
    }

    /// Run `num_sweeps` Gibbs sweeps at inverse temperature `beta`.
    ///
    /// Returns the total number of vertex moves across all sweeps.
    ///
    /// * `lnf` - cached log-factorials
    /// * `stats` - sufficient statistics (modified in place)
    /// * `adj_list` - `adj_list[v]` = `(neighbor, multiplicity)` pairs
    /// * `num_sweeps` - number of full sweeps over all vertices
    /// * `beta` - inverse temperature
    pub fn run(
        &mut self,
        lnf: &LnFactorial,
        stats: &mut BipartiteStats,
        adj_list: &[Vec<(usize, f64)>],
        num_sweeps: usize,
        beta: f64,
    ) -> usize {
        self.prepare(stats);
        let mut total_moves = 0;

        for _sweep in 0..num_sweeps {
            self.order.shuffle(&mut self.rng);
            for i in 0..self.order.len() {
                let v = self.order[i];
                let old_b = stats.membership[v];
                let k = stats.capacity(stats.side(v));

                self.nbr_blocks.collect(stats, &adj_list[v]);
                for t in 0..k {
                    self.log_probs[t] = -beta * stats.move_delta(lnf, v, t, &self.nbr_blocks);
                }

                let new_b = sample_categorical_log(&self.log_probs[..k], &mut self.rng);
                if new_b != old_b {
                    stats.delta_move(v, new_b, &adj_list[v]);
                    total_moves += 1;
                }
            }
        }

        total_moves
    }

    /// Run greedy sweeps: each vertex moves to the slot with the lowest
    /// description-length change, only if that change is negative.
    ///
    /// Stops early once a sweep makes no move. Returns the total number
    /// of moves and the total description-length change.
    pub fn run_greedy(
        &mut self,
        lnf: &LnFactorial,
        stats: &mut BipartiteStats,
        adj_list: &[Vec<(usize, f64)>],
        max_sweeps: usize,
    ) -> (usize, f64) {
        self.prepare(stats);
        let mut total_moves = 0;
        let mut total_delta = 0.0;

        for _sweep in 0..max_sweeps {
            let mut sweep_moves = 0;
            self.order.shuffle(&mut self.rng);
            for i in 0..self.order.len() {
                let v = self.order[i];
                let k = stats.capacity(stats.side(v));

                self.nbr_blocks.collect(stats, &adj_list[v]);
                for t in 0..k {
                    self.log_probs[t] = stats.move_delta(lnf, v, t, &self.nbr_blocks);
                }

                let (best, delta) = argmin(&self.log_probs[..k]);
                if delta < -1e-10 {
                    stats.delta_move(v, best, &adj_list[v]);
                    sweep_moves += 1;
                    total_delta += delta;
                }
            }
            total_moves += sweep_moves;
            if sweep_moves == 0 {
                break; // converged
            }
        }

        (total_moves, total_delta)
    }
}

/// Index and value of the smallest entry, first one on ties.
fn argmin(values: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut best_val = values[0];
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < best_val {
            best_val = v;
            best = i;
        }
    }
    (best, best_val)
}

/// Sample from a categorical distribution given log-probabilities.
///
/// Uses the log-sum-exp trick for numerical stability.
fn sample_categorical_log(log_probs: &[f64], rng: &mut SmallRng) -> usize {
    let max = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let weights: Vec<f64> = log_probs.iter().map(|lp| (lp - max).exp()).collect();
    let total: f64 = weights.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        // Fallback: uniform
        return rng.random_range(0..log_probs.len());
    }

    let u: f64 = rng.random::<f64>() * total;
    let mut cum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cum += w;
        if u < cum {
            return i;
        }
    }
    log_probs.len() - 1
}
