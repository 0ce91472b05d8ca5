//! Nested block hierarchy above the level-0 partition.
//!
//! Level `l` partitions the nodes of level `l - 1` (level 0 partitions
//! the graph vertices). Each level is scored as a dense multigraph
//! between the blocks below it:
//!
//! ```text
//! S_l = Σ_RS ln_multiset(n_R n_S, e_RS) + partition(N_d, {n_R}) + partition(N_w, {n_S})
//! ```
//!
//! The last level always has a single block per side.

use crate::graph::{BipartiteGraph, Side};
use crate::merge::{greedy_merges, MergeModel};
use crate::model::LnFactorial;
use crate::sufficient_stats::BipartiteStats;
use log::debug;
use serde::{Deserialize, Serialize};

/// Block memberships of one level, for the doc and word nodes of the level below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLevel {
    /// block of each doc node
    pub doc_membership: Vec<usize>,
    /// block of each word node
    pub word_membership: Vec<usize>,
}

impl BlockLevel {
    /// Relabel blocks in order of first appearance within each side
    pub fn canonical(doc_labels: &[usize], word_labels: &[usize]) -> Self {
        BlockLevel {
            doc_membership: relabel_by_first_appearance(doc_labels),
            word_membership: relabel_by_first_appearance(word_labels),
        }
    }

    /// One block per side
    pub fn trivial(n_doc_nodes: usize, n_word_nodes: usize) -> Self {
        BlockLevel {
            doc_membership: vec![0; n_doc_nodes],
            word_membership: vec![0; n_word_nodes],
        }
    }

    /// Every node in its own block
    pub fn identity(n_doc_nodes: usize, n_word_nodes: usize) -> Self {
        BlockLevel {
            doc_membership: (0..n_doc_nodes).collect(),
            word_membership: (0..n_word_nodes).collect(),
        }
    }

    /// Memberships of one side
    pub fn membership(&self, side: Side) -> &[usize] {
        match side {
            Side::Doc => &self.doc_membership,
            Side::Word => &self.word_membership,
        }
    }

    /// Number of blocks on a side (labels are assumed canonical)
    pub fn num_blocks(&self, side: Side) -> usize {
        self.membership(side)
            .iter()
            .max()
            .map(|&b| b + 1)
            .unwrap_or(0)
    }

    /// Whether both sides have at most one block
    pub fn is_trivial(&self) -> bool {
        self.num_blocks(Side::Doc) <= 1 && self.num_blocks(Side::Word) <= 1
    }
}

fn relabel_by_first_appearance(labels: &[usize]) -> Vec<usize> {
    let mut remap = fnv::FnvHashMap::default();
    labels
        .iter()
        .map(|&b| {
            let next = remap.len();
            *remap.entry(b).or_insert(next)
        })
        .collect()
}

/// Multigraph between the doc and word nodes of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelGraph {
    n_doc_nodes: usize,
    n_word_nodes: usize,
    /// row-major `n_doc_nodes × n_word_nodes`
    edge_counts: Vec<f64>,
    total: f64,
}

impl LevelGraph {
    /// Wrap a dense edge-count matrix
    pub fn new(n_doc_nodes: usize, n_word_nodes: usize, edge_counts: Vec<f64>) -> Self {
        debug_assert_eq!(edge_counts.len(), n_doc_nodes * n_word_nodes);
        let total = edge_counts.iter().sum();
        LevelGraph {
            n_doc_nodes,
            n_word_nodes,
            edge_counts,
            total,
        }
    }

    /// Number of nodes on a side
    pub fn num_nodes(&self, side: Side) -> usize {
        match side {
            Side::Doc => self.n_doc_nodes,
            Side::Word => self.n_word_nodes,
        }
    }

    /// Edge count between doc node `r` and word node `s`
    #[inline]
    pub fn edge(&self, r: usize, s: usize) -> f64 {
        self.edge_counts[r * self.n_word_nodes + s]
    }

    /// Total edge count
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Graph between the blocks of `level`
    pub fn coarsen(&self, level: &BlockLevel) -> LevelGraph {
        let bd = level.num_blocks(Side::Doc);
        let bw = level.num_blocks(Side::Word);
        let mut edge_counts = vec![0.0; bd * bw];
        for (r, &big_r) in level.doc_membership.iter().enumerate() {
            for (s, &big_s) in level.word_membership.iter().enumerate() {
                edge_counts[big_r * bw + big_s] += self.edge(r, s);
            }
        }
        LevelGraph::new(bd, bw, edge_counts)
    }

    /// Description length `S_l` of a partition of this graph's nodes
    pub fn level_dl(&self, lnf: &LnFactorial, level: &BlockLevel) -> f64 {
        let coarse = self.coarsen(level);
        let doc_sizes = block_sizes(&level.doc_membership, coarse.n_doc_nodes);
        let word_sizes = block_sizes(&level.word_membership, coarse.n_word_nodes);

        let mut dl = 0.0;
        for (big_r, &n_r) in doc_sizes.iter().enumerate() {
            for (big_s, &n_s) in word_sizes.iter().enumerate() {
                dl += lnf.ln_multiset(n_r * n_s, coarse.edge(big_r, big_s));
            }
        }
        dl + lnf.partition_dl(self.n_doc_nodes as f64, &doc_sizes)
            + lnf.partition_dl(self.n_word_nodes as f64, &word_sizes)
    }

    /// Description length of the trivial level placed directly above this graph
    pub fn top_dl(&self, lnf: &LnFactorial) -> f64 {
        lnf.top_edge_dl(
            self.n_doc_nodes as f64,
            self.n_word_nodes as f64,
            self.total,
        )
    }

    /// Greedily merge this graph's nodes into blocks.
    ///
    /// Returns the canonical partition, or `None` when no merge shortens
    /// the description compared to closing the hierarchy here.
    pub fn agglomerate(&self, lnf: &LnFactorial) -> Option<BlockLevel> {
        let mut stats = UpperStats::identity(self);
        let (num_merges, _) = greedy_merges(&mut stats, lnf);
        if num_merges == 0 {
            return None;
        }

        let level = BlockLevel::canonical(&stats.doc_membership, &stats.word_membership);
        let with_level = self.level_dl(lnf, &level) + self.coarsen(&level).top_dl(lnf);
        let closed = self.top_dl(lnf);
        debug!(
            "agglomerate: {}+{} -> {}+{} nodes, dl {:.4} vs closed {:.4}",
            self.n_doc_nodes,
            self.n_word_nodes,
            level.num_blocks(Side::Doc),
            level.num_blocks(Side::Word),
            with_level,
            closed
        );
        (with_level < closed).then_some(level)
    }
}

fn block_sizes(membership: &[usize], num_blocks: usize) -> Vec<f64> {
    let mut sizes = vec![0.0; num_blocks];
    for &b in membership {
        sizes[b] += 1.0;
    }
    sizes
}

/// Merge state of an upper level: groups of [`LevelGraph`] nodes.
struct UpperStats<'a> {
    graph: &'a LevelGraph,
    doc_membership: Vec<usize>,
    word_membership: Vec<usize>,
    doc_size: Vec<f64>,
    word_size: Vec<f64>,
    /// row-major `n_doc_nodes × n_word_nodes` block slots
    edge_counts: Vec<f64>,
    num_doc_blocks: usize,
    num_word_blocks: usize,
}

impl<'a> UpperStats<'a> {
    fn identity(graph: &'a LevelGraph) -> Self {
        let (nd, nw) = (graph.n_doc_nodes, graph.n_word_nodes);
        UpperStats {
            graph,
            doc_membership: (0..nd).collect(),
            word_membership: (0..nw).collect(),
            doc_size: vec![1.0; nd],
            word_size: vec![1.0; nw],
            edge_counts: graph.edge_counts.clone(),
            num_doc_blocks: nd,
            num_word_blocks: nw,
        }
    }

    #[inline]
    fn edge(&self, side: Side, own: usize, other: usize) -> f64 {
        let nw = self.graph.n_word_nodes;
        match side {
            Side::Doc => self.edge_counts[own * nw + other],
            Side::Word => self.edge_counts[other * nw + own],
        }
    }

    fn sizes(&self, side: Side) -> &[f64] {
        match side {
            Side::Doc => &self.doc_size,
            Side::Word => &self.word_size,
        }
    }

    fn num_blocks(&self, side: Side) -> usize {
        match side {
            Side::Doc => self.num_doc_blocks,
            Side::Word => self.num_word_blocks,
        }
    }

    /// `S_l` plus the trivial level above it
    #[cfg(test)]
    fn description_length(&self, lnf: &LnFactorial) -> f64 {
        let mut dl = 0.0;
        for (r, &n_r) in self.doc_size.iter().enumerate() {
            for (s, &n_s) in self.word_size.iter().enumerate() {
                dl += lnf.ln_multiset(n_r * n_s, self.edge(Side::Doc, r, s));
            }
        }
        dl + lnf.partition_dl(self.graph.n_doc_nodes as f64, &self.doc_size)
            + lnf.partition_dl(self.graph.n_word_nodes as f64, &self.word_size)
            + lnf.top_edge_dl(
                self.num_doc_blocks as f64,
                self.num_word_blocks as f64,
                self.graph.total,
            )
    }
}

impl MergeModel for UpperStats<'_> {
    fn active_blocks(&self, side: Side) -> Vec<usize> {
        self.sizes(side)
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0.0)
            .map(|(b, _)| b)
            .collect()
    }

    fn merge_delta(&self, lnf: &LnFactorial, side: Side, a: usize, b: usize) -> f64 {
        let sizes = self.sizes(side);
        let (n_a, n_b) = (sizes[a], sizes[b]);
        let mut delta = 0.0;

        for (t, &n_t) in self.sizes(side.other()).iter().enumerate() {
            if n_t == 0.0 {
                continue;
            }
            let e_at = self.edge(side, a, t);
            let e_bt = self.edge(side, b, t);
            delta += lnf.ln_multiset((n_a + n_b) * n_t, e_at + e_bt)
                - lnf.ln_multiset(n_a * n_t, e_at)
                - lnf.ln_multiset(n_b * n_t, e_bt);
        }

        delta += lnf.ln_factorial(n_a) + lnf.ln_factorial(n_b) - lnf.ln_factorial(n_a + n_b);

        let n_nodes = self.graph.num_nodes(side) as f64;
        let b_now = self.num_blocks(side) as f64;
        let b_other = self.num_blocks(side.other()) as f64;
        let total = self.graph.total;
        delta + lnf.partition_count_dl(n_nodes, b_now - 1.0) - lnf.partition_count_dl(n_nodes, b_now)
            + lnf.top_edge_dl(b_now - 1.0, b_other, total)
            - lnf.top_edge_dl(b_now, b_other, total)
    }

    fn apply_merge(&mut self, side: Side, a: usize, b: usize) {
        let nw = self.graph.n_word_nodes;
        match side {
            Side::Doc => {
                for t in 0..nw {
                    self.edge_counts[b * nw + t] += self.edge_counts[a * nw + t];
                    self.edge_counts[a * nw + t] = 0.0;
                }
                self.doc_size[b] += self.doc_size[a];
                self.doc_size[a] = 0.0;
                self.doc_membership
                    .iter_mut()
                    .filter(|m| **m == a)
                    .for_each(|m| *m = b);
                self.num_doc_blocks -= 1;
            }
            Side::Word => {
                for t in 0..self.graph.n_doc_nodes {
                    self.edge_counts[t * nw + b] += self.edge_counts[t * nw + a];
                    self.edge_counts[t * nw + a] = 0.0;
                }
                self.word_size[b] += self.word_size[a];
                self.word_size[a] = 0.0;
                self.word_membership
                    .iter_mut()
                    .filter(|m| **m == a)
                    .for_each(|m| *m = b);
                self.num_word_blocks -= 1;
            }
        }
    }
}

/// A full hierarchy: level 0 partitions the graph, the last level is trivial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlockState {
    levels: Vec<BlockLevel>,
}

impl NestedBlockState {
    /// Validate and wrap a stack of levels.
    ///
    /// Level `l + 1` must label exactly the blocks of level `l`, and the
    /// last level must be trivial.
    pub fn new(levels: Vec<BlockLevel>) -> anyhow::Result<Self> {
        anyhow::ensure!(!levels.is_empty(), "a hierarchy needs at least one level");
        for (l, pair) in levels.windows(2).enumerate() {
            let (lower, upper) = (&pair[0], &pair[1]);
            for side in [Side::Doc, Side::Word] {
                anyhow::ensure!(
                    upper.membership(side).len() == lower.num_blocks(side),
                    "level {} labels {} {:?} nodes, level {} has {} blocks",
                    l + 1,
                    upper.membership(side).len(),
                    side,
                    l,
                    lower.num_blocks(side)
                );
            }
        }
        let top = levels.last().map(BlockLevel::is_trivial).unwrap_or(false);
        anyhow::ensure!(top, "the last level must have a single block per side");
        Ok(NestedBlockState { levels })
    }

    /// Build the hierarchy above a level-0 partition of `graph`.
    ///
    /// At least one level is stacked on top of level 0, so even a
    /// single-block level 0 is closed by a separate trivial level.
    pub fn build(
        graph: &BipartiteGraph,
        level0: BlockLevel,
        lnf: &LnFactorial,
    ) -> anyhow::Result<Self> {
        let level0 = BlockLevel::canonical(&level0.doc_membership, &level0.word_membership);
        let mut current = level0_stats(graph, &level0, lnf)?.block_graph();
        let mut levels = vec![level0];

        loop {
            match current.agglomerate(lnf) {
                Some(level) if !level.is_trivial() => {
                    current = current.coarsen(&level);
                    levels.push(level);
                }
                Some(level) => {
                    levels.push(level);
                    break;
                }
                None => {
                    levels.push(BlockLevel::trivial(
                        current.num_nodes(Side::Doc),
                        current.num_nodes(Side::Word),
                    ));
                    break;
                }
            }
        }

        NestedBlockState::new(levels)
    }

    /// All levels, bottom first
    pub fn levels(&self) -> &[BlockLevel] {
        &self.levels
    }

    /// Number of levels including the trivial top
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn level(&self, l: usize) -> anyhow::Result<&BlockLevel> {
        self.levels.get(l).ok_or_else(|| {
            anyhow::anyhow!("level {} out of range, {} levels", l, self.levels.len())
        })
    }

    /// `(doc blocks, word blocks)` of level `l`
    pub fn num_blocks(&self, l: usize) -> anyhow::Result<(usize, usize)> {
        let level = self.level(l)?;
        Ok((level.num_blocks(Side::Doc), level.num_blocks(Side::Word)))
    }

    /// Membership of every graph vertex at level `l`
    pub fn project(&self, l: usize) -> anyhow::Result<BlockLevel> {
        self.level(l)?;
        let mut projected = self.levels[0].clone();
        for level in &self.levels[1..=l] {
            for d in projected.doc_membership.iter_mut() {
                *d = level.doc_membership[*d];
            }
            for w in projected.word_membership.iter_mut() {
                *w = level.word_membership[*w];
            }
        }
        Ok(projected)
    }

    /// Description length of every level, recomputed from scratch
    pub fn entropy_by_level(&self, graph: &BipartiteGraph) -> anyhow::Result<Vec<f64>> {
        let lnf = LnFactorial::for_graph(graph);
        let stats = level0_stats(graph, &self.levels[0], &lnf)?;

        let mut ret = Vec::with_capacity(self.levels.len());
        ret.push(stats.level0_dl(&lnf));

        let mut current = stats.block_graph();
        for level in &self.levels[1..] {
            ret.push(current.level_dl(&lnf, level));
            current = current.coarsen(level);
        }
        Ok(ret)
    }

    /// Total description length of the hierarchy
    pub fn entropy(&self, graph: &BipartiteGraph) -> anyhow::Result<f64> {
        Ok(self.entropy_by_level(graph)?.iter().sum())
    }
}

fn level0_stats(
    graph: &BipartiteGraph,
    level0: &BlockLevel,
    lnf: &LnFactorial,
) -> anyhow::Result<BipartiteStats> {
    BipartiteStats::from_graph(
        graph,
        &level0.doc_membership,
        &level0.word_membership,
        level0.num_blocks(Side::Doc).max(1),
        level0.num_blocks(Side::Word).max(1),
        lnf,
    )
}
