//! Bipartite document-word multigraph.
//!
//! Vertices `0..n_docs` are documents, `n_docs..n_docs + n_words` are
//! words. An edge `(doc, word, count)` stands for `count` parallel
//! edges. With `weighted = false` every unit edge is stored separately;
//! both encodings describe the same multigraph.

use fnv::FnvHashMap as HashMap;
use serde::{Deserialize, Serialize};

/// Which side of the bipartite graph a vertex (or block) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// document vertices
    Doc,
    /// word vertices
    Word,
}

impl Side {
    /// The opposite side
    pub fn other(self) -> Side {
        match self {
            Side::Doc => Side::Word,
            Side::Word => Side::Doc,
        }
    }
}

/// Most unit edges `from_counts` expands to when `weighted = false`
pub const MAX_UNIT_EDGES: usize = 1 << 28;

/// An edge `(doc, word, multiplicity)`, word indexed within the word side
pub type CountEdge = (usize, usize, f64);

/// Bipartite multigraph between documents and words.
#[derive(Debug, Clone)]
pub struct BipartiteGraph {
    n_docs: usize,
    n_words: usize,
    weighted: bool,
    edges: Vec<CountEdge>,
    vertex_degree: Vec<f64>,
    ln_pair_factorial: f64,
}

impl BipartiteGraph {
    /// Build the graph from `(doc, word, count)` entries.
    ///
    /// Repeated `(doc, word)` entries are summed. Counts must be
    /// positive integers.
    ///
    /// * `n_docs` - number of documents (>= 1)
    /// * `n_words` - number of words (>= 1)
    /// * `counts` - document-word counts
    /// * `weighted` - keep one weighted edge per pair, or expand into unit edges
    pub fn from_counts(
        n_docs: usize,
        n_words: usize,
        counts: &[CountEdge],
        weighted: bool,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(n_docs > 0, "need at least one document");
        anyhow::ensure!(n_words > 0, "need at least one word");

        let mut pairs: HashMap<(usize, usize), f64> = HashMap::default();
        for &(d, w, c) in counts {
            anyhow::ensure!(
                d < n_docs && w < n_words,
                "edge ({}, {}) out of bounds for {} documents and {} words",
                d,
                w,
                n_docs,
                n_words
            );
            anyhow::ensure!(
                c.is_finite() && c >= 1.0 && c.fract() == 0.0,
                "edge ({}, {}) has a non-count multiplicity {}",
                d,
                w,
                c
            );
            *pairs.entry((d, w)).or_default() += c;
        }

        let mut merged: Vec<CountEdge> = pairs.into_iter().map(|((d, w), c)| (d, w, c)).collect();
        merged.sort_by_key(|&(d, w, _)| (d, w));

        let mut vertex_degree = vec![0.0; n_docs + n_words];
        let mut ln_pair_factorial = 0.0;
        for &(d, w, c) in &merged {
            vertex_degree[d] += c;
            vertex_degree[n_docs + w] += c;
            ln_pair_factorial += crate::model::ln_factorial_exact(c);
        }

        if !weighted {
            let total: f64 = merged.iter().map(|&(_, _, c)| c).sum();
            anyhow::ensure!(
                total <= MAX_UNIT_EDGES as f64,
                "{} tokens exceed the {} unit edges allowed without weights",
                total,
                MAX_UNIT_EDGES
            );
        }

        let edges = if weighted {
            merged
        } else {
            merged
                .into_iter()
                .flat_map(|(d, w, c)| std::iter::repeat_n((d, w, 1.0), c as usize))
                .collect()
        };

        Ok(BipartiteGraph {
            n_docs,
            n_words,
            weighted,
            edges,
            vertex_degree,
            ln_pair_factorial,
        })
    }

    /// Number of document vertices
    pub fn num_docs(&self) -> usize {
        self.n_docs
    }

    /// Number of word vertices
    pub fn num_words(&self) -> usize {
        self.n_words
    }

    /// Total number of vertices
    pub fn num_vertices(&self) -> usize {
        self.n_docs + self.n_words
    }

    /// Number of vertices on one side
    pub fn num_side(&self, side: Side) -> usize {
        match side {
            Side::Doc => self.n_docs,
            Side::Word => self.n_words,
        }
    }

    /// Number of stored edges (distinct pairs if weighted, unit edges otherwise)
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Sum of edge multiplicities `E`
    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|&(_, _, c)| c).sum()
    }

    /// Whether edges carry multiplicities
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Stored edges `(doc, word, multiplicity)`
    pub fn edges(&self) -> &[CountEdge] {
        &self.edges
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

    /// Global vertex index of a word
    #[inline]
    pub fn word_vertex(&self, word: usize) -> usize {
        self.n_docs + word
    }

    /// Degree (sum of multiplicities) of every vertex
    pub fn vertex_degrees(&self) -> &[f64] {
        &self.vertex_degree
    }

    /// `Σ ln A_dw!` over distinct document-word pairs
    pub fn ln_pair_factorial(&self) -> f64 {
        self.ln_pair_factorial
    }

    /// Adjacency list indexed by global vertex: `(neighbor vertex, multiplicity)`
    pub fn adj_list(&self) -> Vec<Vec<(usize, f64)>> {
        let mut adj = vec![Vec::new(); self.num_vertices()];
        for &(d, w, c) in &self.edges {
            let wv = self.word_vertex(w);
            adj[d].push((wv, c));
            adj[wv].push((d, c));
        }
        adj
    }
}
