//! Agglomerative block merges.
//!
//! At every step all same-side pairs of non-empty blocks are scored in
//! parallel and the merge with the most negative description-length
//! change is applied. Ties go to the doc side first, then to the lowest
//! `(a, b)` pair, so the result does not depend on the thread count.

use crate::graph::Side;
use crate::model::LnFactorial;
use crate::sufficient_stats::BipartiteStats;
use rayon::prelude::*;

/// Block statistics that support whole-block merges.
pub trait MergeModel: Sync {
    /// Non-empty blocks on a side, ascending
    fn active_blocks(&self, side: Side) -> Vec<usize>;

    /// Change in the description length if block `a` merged into `b`
    fn merge_delta(&self, lnf: &LnFactorial, side: Side, a: usize, b: usize) -> f64;

    /// Move every member of block `a` into block `b`
    fn apply_merge(&mut self, side: Side, a: usize, b: usize);
}

/// A candidate merge: block `from` is absorbed by block `into`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// side of both blocks
    pub side: Side,
    /// block that disappears
    pub from: usize,
    /// block that grows
    pub into: usize,
    /// description-length change
    pub delta: f64,
}

/// Score every same-side merge and return the best one, if any pair exists.
pub fn best_merge<M: MergeModel>(model: &M, lnf: &LnFactorial) -> Option<Merge> {
    let mut candidates = Vec::new();
    for side in [Side::Doc, Side::Word] {
        let blocks = model.active_blocks(side);
        for (i, &a) in blocks.iter().enumerate() {
            for &b in &blocks[(i + 1)..] {
                candidates.push((side, a, b));
            }
        }
    }

    let scored: Vec<Merge> = candidates
        .into_par_iter()
        .map(|(side, a, b)| Merge {
            side,
            from: b,
            into: a,
            delta: model.merge_delta(lnf, side, b, a),
        })
        .collect();

    // first minimum wins, candidates are already in tie-break order
    scored
        .into_iter()
        .filter(|m| m.delta.is_finite())
        .min_by(|x, y| x.delta.total_cmp(&y.delta))
}

/// Apply best merges while they shorten the description.
///
/// Returns the number of merges and the total description-length change.
pub fn greedy_merges<M: MergeModel>(model: &mut M, lnf: &LnFactorial) -> (usize, f64) {
    let mut num_merges = 0;
    let mut total_delta = 0.0;

    while let Some(m) = best_merge(model, lnf) {
        if m.delta >= 0.0 {
            break;
        }
        model.apply_merge(m.side, m.from, m.into);
        num_merges += 1;
        total_delta += m.delta;
    }

    (num_merges, total_delta)
}

impl MergeModel for BipartiteStats {
    fn active_blocks(&self, side: Side) -> Vec<usize> {
        (0..self.capacity(side))
            .filter(|&b| self.size(side, b) > 0.0)
            .collect()
    }

    fn merge_delta(&self, lnf: &LnFactorial, side: Side, a: usize, b: usize) -> f64 {
        BipartiteStats::merge_delta(self, lnf, side, a, b)
    }

    fn apply_merge(&mut self, side: Side, a: usize, b: usize) {
        BipartiteStats::apply_merge(self, side, a, b)
    }
}
