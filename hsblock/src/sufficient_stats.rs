//! Level-0 sufficient statistics of the degree-corrected bipartite SBM.
//!
//! Tracks the `Bd × Bw` block edge counts `e_rs`, block sizes, and block
//! degrees for a fixed capacity of block slots per side. Supports
//! O(degree) incremental updates when a single vertex moves, closed-form
//! description-length changes for single moves and block merges, and
//! full recomputation of the level-0 description length.
//!
//! ```text
//! S_adj  = Σ ln A_dw! - Σ_v ln k_v! - Σ_rs ln e_rs! + Σ_r ln e_r! + Σ_s ln e_s!
//! S_deg  = Σ_b ln_multiset(n_b, e_b)
//! S_part = partition(N_d, {n_r}) + partition(N_w, {n_s})
//! S_flat = S_adj + S_deg + S_part + top(B_d, B_w, E)
//! ```

use crate::graph::{BipartiteGraph, Side};
use crate::model::LnFactorial;
use crate::nested::{BlockLevel, LevelGraph};

/// Per-side block statistics
#[derive(Debug, Clone)]
struct SideStats {
    /// number of block slots
    capacity: usize,
    /// number of vertices on this side
    num_nodes: usize,
    /// vertices per block
    size: Vec<f64>,
    /// sum of vertex degrees per block
    degree: Vec<f64>,
    /// number of non-empty blocks
    num_nonempty: usize,
}

/// Sufficient statistics for the level-0 partition.
#[derive(Debug, Clone)]
pub struct BipartiteStats {
    n_docs: usize,
    docs: SideStats,
    words: SideStats,
    /// `kd × kw` block edge counts, row-major: `edge_counts[r * kw + s]`
    edge_counts: Vec<f64>,
    /// Block of every vertex (doc blocks for docs, word blocks for words)
    pub membership: Vec<usize>,
    /// Per-vertex degree
    pub vertex_degree: Vec<f64>,
    total_edges: f64,
    /// `Σ ln A_dw! - Σ_v ln k_v!`
    adjacency_const: f64,
}

impl BipartiteStats {
    /// Build statistics from a graph and per-side labels.
    ///
    /// * `graph` - bipartite graph
    /// * `doc_labels` - block of each document, in `0..kd`
    /// * `word_labels` - block of each word, in `0..kw`
    /// * `kd`, `kw` - block capacity per side
    pub fn from_graph(
        graph: &BipartiteGraph,
        doc_labels: &[usize],
        word_labels: &[usize],
        kd: usize,
        kw: usize,
        lnf: &LnFactorial,
    ) -> anyhow::Result<Self> {
        let n_docs = graph.num_docs();
        let n_words = graph.num_words();
        anyhow::ensure!(
            doc_labels.len() == n_docs && word_labels.len() == n_words,
            "labels do not match the graph ({} docs, {} words)",
            n_docs,
            n_words
        );
        anyhow::ensure!(
            doc_labels.iter().all(|&r| r < kd) && word_labels.iter().all(|&s| s < kw),
            "labels exceed the block capacity"
        );

        let vertex_degree = graph.vertex_degrees().to_vec();
        let membership: Vec<usize> = doc_labels.iter().chain(word_labels).copied().collect();

        let docs = SideStats::new(kd, doc_labels, &vertex_degree[..n_docs]);
        let words = SideStats::new(kw, word_labels, &vertex_degree[n_docs..]);

        let mut edge_counts = vec![0.0; kd * kw];
        for &(d, w, c) in graph.edges() {
            edge_counts[doc_labels[d] * kw + word_labels[w]] += c;
        }

        let adjacency_const = graph.ln_pair_factorial()
            - vertex_degree
                .iter()
                .map(|&k| lnf.ln_factorial(k))
                .sum::<f64>();

        Ok(BipartiteStats {
            n_docs,
            docs,
            words,
            edge_counts,
            membership,
            vertex_degree,
            total_edges: graph.total_weight(),
            adjacency_const,
        })
    }

    fn side_stats(&self, side: Side) -> &SideStats {
        match side {
            Side::Doc => &self.docs,
            Side::Word => &self.words,
        }
    }

    fn side_stats_mut(&mut self, side: Side) -> &mut SideStats {
        match side {
            Side::Doc => &mut self.docs,
            Side::Word => &mut self.words,
        }
    }

    /// Side of a vertex
    #[inline]
    pub fn side(&self, vertex: usize) -> Side {
        if vertex < self.n_docs {
            Side::Doc
        } else {
            Side::Word
        }
    }

    /// Vertex range of one side
    pub fn vertices(&self, side: Side) -> std::ops::Range<usize> {
        match side {
            Side::Doc => 0..self.n_docs,
            Side::Word => self.n_docs..self.membership.len(),
        }
    }

    /// Total edge count `E`
    pub fn total_edges(&self) -> f64 {
        self.total_edges
    }

    /// Number of block slots on a side
    #[inline]
    pub fn capacity(&self, side: Side) -> usize {
        self.side_stats(side).capacity
    }

    /// Number of non-empty blocks on a side
    #[inline]
    pub fn num_nonempty(&self, side: Side) -> usize {
        self.side_stats(side).num_nonempty
    }

    /// Vertices in block `b` of `side`
    #[inline]
    pub fn size(&self, side: Side, b: usize) -> f64 {
        self.side_stats(side).size[b]
    }

    /// Degree sum `e_b` of block `b` of `side`
    #[inline]
    pub fn degree(&self, side: Side, b: usize) -> f64 {
        self.side_stats(side).degree[b]
    }

    /// Edge count between block `own` on `side` and block `other` on the opposite side
    #[inline]
    pub fn edge(&self, side: Side, own: usize, other: usize) -> f64 {
        let kw = self.words.capacity;
        match side {
            Side::Doc => self.edge_counts[own * kw + other],
            Side::Word => self.edge_counts[other * kw + own],
        }
    }

    #[inline]
    fn edge_mut(&mut self, side: Side, own: usize, other: usize) -> &mut f64 {
        let kw = self.words.capacity;
        match side {
            Side::Doc => &mut self.edge_counts[own * kw + other],
            Side::Word => &mut self.edge_counts[other * kw + own],
        }
    }

    /// Incrementally update statistics when moving `vertex` to `new_b`.
    ///
    /// * `vertex` - the vertex being moved
    /// * `new_b` - target block on the vertex's side
    /// * `neighbors` - `(neighbor vertex, multiplicity)` for `vertex`
    pub fn delta_move(&mut self, vertex: usize, new_b: usize, neighbors: &[(usize, f64)]) {
        let old_b = self.membership[vertex];
        if old_b == new_b {
            return;
        }

        let side = self.side(vertex);
        let deg = self.vertex_degree[vertex];

        let st = self.side_stats_mut(side);
        st.size[old_b] -= 1.0;
        st.degree[old_b] -= deg;
        if st.size[old_b] == 0.0 {
            st.num_nonempty -= 1;
        }
        if st.size[new_b] == 0.0 {
            st.num_nonempty += 1;
        }
        st.size[new_b] += 1.0;
        st.degree[new_b] += deg;

        for &(nbr, w) in neighbors {
            let t = self.membership[nbr];
            *self.edge_mut(side, old_b, t) -= w;
            *self.edge_mut(side, new_b, t) += w;
        }

        self.membership[vertex] = new_b;
    }

    /// Change in the flat description length if `vertex` moved to `target`.
    ///
    /// * `nbr_blocks` - the vertex's edge counts to each block of the other side
    pub fn move_delta(
        &self,
        lnf: &LnFactorial,
        vertex: usize,
        target: usize,
        nbr_blocks: &NeighborBlocks,
    ) -> f64 {
        let r = self.membership[vertex];
        let s = target;
        if r == s {
            return 0.0;
        }

        let side = self.side(vertex);
        let kv = self.vertex_degree[vertex];
        let mut delta = 0.0;

        // block pair terms, only blocks the vertex touches change
        for (t, w) in nbr_blocks.iter() {
            let e_rt = self.edge(side, r, t);
            let e_st = self.edge(side, s, t);
            delta += lnf.ln_factorial(e_rt) - lnf.ln_factorial(e_rt - w)
                + lnf.ln_factorial(e_st)
                - lnf.ln_factorial(e_st + w);
        }

        let st = self.side_stats(side);
        let (e_r, e_s) = (st.degree[r], st.degree[s]);
        let (n_r, n_s) = (st.size[r], st.size[s]);

        delta += lnf.ln_factorial(e_r - kv) - lnf.ln_factorial(e_r) + lnf.ln_factorial(e_s + kv)
            - lnf.ln_factorial(e_s);

        delta += lnf.ln_multiset(n_r - 1.0, e_r - kv) - lnf.ln_multiset(n_r, e_r)
            + lnf.ln_multiset(n_s + 1.0, e_s + kv)
            - lnf.ln_multiset(n_s, e_s);

        delta += lnf.ln_factorial(n_r) - lnf.ln_factorial(n_r - 1.0) + lnf.ln_factorial(n_s)
            - lnf.ln_factorial(n_s + 1.0);

        let b = st.num_nonempty;
        let b_new = b - usize::from(n_r == 1.0) + usize::from(n_s == 0.0);
        if b_new != b {
            delta += self.block_count_delta(lnf, side, b, b_new);
        }

        delta
    }

    /// Change in the count-dependent terms when `side` goes from `b` to `b_new` blocks
    fn block_count_delta(&self, lnf: &LnFactorial, side: Side, b: usize, b_new: usize) -> f64 {
        let n = self.side_stats(side).num_nodes as f64;
        let b_other = self.num_nonempty(side.other()) as f64;
        let (b, b_new) = (b as f64, b_new as f64);
        lnf.partition_count_dl(n, b_new) - lnf.partition_count_dl(n, b)
            + lnf.top_edge_dl(b_new, b_other, self.total_edges)
            - lnf.top_edge_dl(b, b_other, self.total_edges)
    }

    /// Change in the flat description length if block `a` merged into block `b`
    pub fn merge_delta(&self, lnf: &LnFactorial, side: Side, a: usize, b: usize) -> f64 {
        debug_assert!(a != b);
        let mut delta = 0.0;

        for t in 0..self.capacity(side.other()) {
            let e_at = self.edge(side, a, t);
            let e_bt = self.edge(side, b, t);
            if e_at > 0.0 && e_bt > 0.0 {
                delta += lnf.ln_factorial(e_at) + lnf.ln_factorial(e_bt)
                    - lnf.ln_factorial(e_at + e_bt);
            }
        }

        let st = self.side_stats(side);
        let (e_a, e_b) = (st.degree[a], st.degree[b]);
        let (n_a, n_b) = (st.size[a], st.size[b]);

        delta += lnf.ln_factorial(e_a + e_b) - lnf.ln_factorial(e_a) - lnf.ln_factorial(e_b);

        delta += lnf.ln_multiset(n_a + n_b, e_a + e_b)
            - lnf.ln_multiset(n_a, e_a)
            - lnf.ln_multiset(n_b, e_b);

        delta += lnf.ln_factorial(n_a) + lnf.ln_factorial(n_b) - lnf.ln_factorial(n_a + n_b);

        let nb = st.num_nonempty;
        delta + self.block_count_delta(lnf, side, nb, nb - 1)
    }

    /// Move every vertex of block `a` into block `b`
    pub fn apply_merge(&mut self, side: Side, a: usize, b: usize) {
        if a == b {
            return;
        }

        for t in 0..self.capacity(side.other()) {
            let e_at = self.edge(side, a, t);
            *self.edge_mut(side, b, t) += e_at;
            *self.edge_mut(side, a, t) = 0.0;
        }

        for v in self.vertices(side) {
            if self.membership[v] == a {
                self.membership[v] = b;
            }
        }

        let st = self.side_stats_mut(side);
        st.size[b] += st.size[a];
        st.degree[b] += st.degree[a];
        st.size[a] = 0.0;
        st.degree[a] = 0.0;
        st.num_nonempty -= 1;
    }

    /// Adjacency, degree and partition terms of level 0 (no edge-count prior)
    pub fn level0_dl(&self, lnf: &LnFactorial) -> f64 {
        let mut dl = self.adjacency_const;

        dl -= self
            .edge_counts
            .iter()
            .filter(|&&e| e > 0.0)
            .map(|&e| lnf.ln_factorial(e))
            .sum::<f64>();

        for st in [&self.docs, &self.words] {
            for b in 0..st.capacity {
                dl += lnf.ln_factorial(st.degree[b]);
                dl += lnf.ln_multiset(st.size[b], st.degree[b]);
            }
            dl += lnf.partition_dl(st.num_nodes as f64, &st.size);
        }

        dl
    }

    /// Flat description length: level 0 with a single top block per side above it
    pub fn description_length(&self, lnf: &LnFactorial) -> f64 {
        self.level0_dl(lnf)
            + lnf.top_edge_dl(
                self.docs.num_nonempty as f64,
                self.words.num_nonempty as f64,
                self.total_edges,
            )
    }

    /// Canonical labels: blocks numbered by first appearance within each side
    pub fn to_block_level(&self) -> BlockLevel {
        BlockLevel::canonical(
            &self.membership[..self.n_docs],
            &self.membership[self.n_docs..],
        )
    }

    /// Block graph between the (canonically relabelled) non-empty level-0 blocks
    pub fn block_graph(&self) -> LevelGraph {
        let level = self.to_block_level();
        let bd = level.num_blocks(Side::Doc);
        let bw = level.num_blocks(Side::Word);

        // map slot -> canonical label
        let mut doc_slot = vec![usize::MAX; self.docs.capacity];
        for (d, &slot) in self.membership[..self.n_docs].iter().enumerate() {
            doc_slot[slot] = level.doc_membership[d];
        }
        let mut word_slot = vec![usize::MAX; self.words.capacity];
        for (w, &slot) in self.membership[self.n_docs..].iter().enumerate() {
            word_slot[slot] = level.word_membership[w];
        }

        let mut edge_counts = vec![0.0; bd * bw];
        for r in 0..self.docs.capacity {
            if doc_slot[r] == usize::MAX {
                continue;
            }
            for s in 0..self.words.capacity {
                if word_slot[s] == usize::MAX {
                    continue;
                }
                edge_counts[doc_slot[r] * bw + word_slot[s]] += self.edge(Side::Doc, r, s);
            }
        }

        LevelGraph::new(bd, bw, edge_counts)
    }
}

impl SideStats {
    fn new(capacity: usize, labels: &[usize], degrees: &[f64]) -> Self {
        let mut size = vec![0.0; capacity];
        let mut degree = vec![0.0; capacity];
        for (&b, &k) in labels.iter().zip(degrees) {
            size[b] += 1.0;
            degree[b] += k;
        }
        let num_nonempty = size.iter().filter(|&&s| s > 0.0).count();
        SideStats {
            capacity,
            num_nodes: labels.len(),
            size,
            degree,
            num_nonempty,
        }
    }
}

/// Scratch buffer: edge counts from one vertex to each block of the other side.
#[derive(Debug, Clone, Default)]
pub struct NeighborBlocks {
    weight: Vec<f64>,
    touched: Vec<usize>,
}

impl NeighborBlocks {
    /// Scratch space for up to `capacity` blocks
    pub fn with_capacity(capacity: usize) -> Self {
        NeighborBlocks {
            weight: vec![0.0; capacity],
            touched: Vec::with_capacity(capacity),
        }
    }

    /// Aggregate `neighbors` by their current block
    pub fn collect(&mut self, stats: &BipartiteStats, neighbors: &[(usize, f64)]) {
        for &t in &self.touched {
            self.weight[t] = 0.0;
        }
        self.touched.clear();

        for &(nbr, w) in neighbors {
            let t = stats.membership[nbr];
            if t >= self.weight.len() {
                self.weight.resize(t + 1, 0.0);
            }
            if self.weight[t] == 0.0 {
                self.touched.push(t);
            }
            self.weight[t] += w;
        }
    }

    /// `(block, edge count)` pairs of the last collection
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.touched.iter().map(move |&t| (t, self.weight[t]))
    }
}
