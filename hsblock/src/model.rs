//! Description-length primitives (in nats).
//!
//! # Terms
//!
//! ```text
//! ln_binom(n, k)    = ln n! - ln k! - ln (n-k)!
//! ln_multiset(n, k) = ln_binom(n + k - 1, k)       (k balls in n bins)
//! partition(N, {n}) = ln_binom(N-1, B-1) + ln N! - Σ ln n_r! + ln N
//! top(Bd, Bw, E)    = ln_multiset(Bd * Bw, E) + ln Bd + ln Bw
//! ```

use special::Gamma as SpecialGamma;

/// Largest table of cached log-factorials
const MAX_TABLE_SIZE: usize = 1 << 22;

/// `ln x!` through the log-gamma function
#[inline]
pub fn ln_factorial_exact(x: f64) -> f64 {
    SpecialGamma::ln_gamma(x + 1.0).0
}

/// Cached `ln n!` for small integers with a log-gamma fallback.
///
/// This is the hot path of every sweep and merge.
#[derive(Debug, Clone)]
pub struct LnFactorial {
    table: Vec<f64>,
}

impl LnFactorial {
    /// Tabulate `ln n!` for `n = 0..=max_n` (capped)
    pub fn new(max_n: usize) -> Self {
        let size = max_n.saturating_add(1).clamp(2, MAX_TABLE_SIZE);
        let mut table = Vec::with_capacity(size);
        table.push(0.0);
        for n in 1..size {
            table.push(table[n - 1] + (n as f64).ln());
        }
        LnFactorial { table }
    }

    /// A table large enough for every level-0 count of the graph
    pub fn for_graph(graph: &crate::graph::BipartiteGraph) -> Self {
        Self::new(graph.total_weight() as usize + graph.num_vertices() + 1)
    }

    /// `ln x!` for a non-negative integral `x`
    #[inline]
    pub fn ln_factorial(&self, x: f64) -> f64 {
        debug_assert!(x >= -1e-9, "ln_factorial of negative {}", x);
        let i = x.round();
        if i >= 0.0 && (i as usize) < self.table.len() {
            self.table[i as usize]
        } else {
            ln_factorial_exact(x)
        }
    }

    /// `ln C(n, k)`
    #[inline]
    pub fn ln_binom(&self, n: f64, k: f64) -> f64 {
        debug_assert!(k >= 0.0 && k <= n + 1e-9, "ln_binom({}, {})", n, k);
        self.ln_factorial(n) - self.ln_factorial(k) - self.ln_factorial(n - k)
    }

    /// `ln multiset(n, k)`: ways to place `k` indistinguishable items in `n` bins
    #[inline]
    pub fn ln_multiset(&self, n: f64, k: f64) -> f64 {
        if k <= 0.0 {
            return 0.0;
        }
        if n <= 0.0 {
            return f64::INFINITY;
        }
        self.ln_binom(n + k - 1.0, k)
    }

    /// Description length of a partition of `n_nodes` into the non-empty `sizes`
    pub fn partition_dl(&self, n_nodes: f64, sizes: &[f64]) -> f64 {
        if n_nodes <= 0.0 {
            return 0.0;
        }
        let mut num_blocks = 0.0;
        let mut ln_sizes = 0.0;
        for &s in sizes.iter().filter(|&&s| s > 0.0) {
            num_blocks += 1.0;
            ln_sizes += self.ln_factorial(s);
        }
        self.ln_binom(n_nodes - 1.0, num_blocks - 1.0) + self.ln_factorial(n_nodes) - ln_sizes
            + n_nodes.ln()
    }

    /// Only the block-count dependent part of [`Self::partition_dl`]
    #[inline]
    pub fn partition_count_dl(&self, n_nodes: f64, num_blocks: f64) -> f64 {
        self.ln_binom(n_nodes - 1.0, num_blocks - 1.0)
    }

    /// Description length of the block edge counts under a single top block per side
    #[inline]
    pub fn top_edge_dl(&self, b_doc: f64, b_word: f64, total: f64) -> f64 {
        self.ln_multiset(b_doc * b_word, total) + b_doc.ln() + b_word.ln()
    }
}
