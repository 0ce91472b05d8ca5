//! Per-level topic and document-cluster summaries of a fitted hierarchy.

use hsblock::{BipartiteGraph, CountEdge, NestedBlockState};
use nalgebra::DMatrix;
use serde::Serialize;

/// Probabilities describing one level of the hierarchy.
///
/// Matrices are stored as `f32` like the rest of the pipeline outputs.
#[derive(Debug, Clone, Serialize)]
pub struct TopicGroups {
    /// number of document blocks
    pub bd: usize,
    /// number of word blocks (topics)
    pub bw: usize,
    /// `n_words × bw`: P(word | word topic)
    #[serde(skip)]
    pub p_w_tw: DMatrix<f32>,
    /// `bw × n_words`: P(word topic | word), one-hot
    #[serde(skip)]
    pub p_tw_w: DMatrix<f32>,
    /// `bd × n_docs`: P(doc cluster | doc), one-hot
    #[serde(skip)]
    pub p_td_d: DMatrix<f32>,
    /// `bw × n_docs`: P(word topic | doc)
    #[serde(skip)]
    pub p_tw_d: DMatrix<f32>,
    /// block of every document at this level
    pub doc_blocks: Vec<usize>,
    /// block of every word at this level
    pub word_blocks: Vec<usize>,
}

impl TopicGroups {
    /// Summarise level `l` of `state` on the graph it was fitted to
    pub fn from_state(
        graph: &BipartiteGraph,
        state: &NestedBlockState,
        l: usize,
    ) -> anyhow::Result<Self> {
        let level = state.project(l)?;
        let (bd, bw) = state.num_blocks(l)?;
        let n_docs = graph.num_docs();
        let n_words = graph.num_words();
        let word_degree = &graph.vertex_degrees()[n_docs..];

        let p_w_tw = word_given_topic(&level.word_membership, word_degree, bw);
        let p_tw_w = one_hot(&level.word_membership, bw);
        let p_td_d = one_hot(&level.doc_membership, bd);
        let p_tw_d = topic_mixture(n_docs, &level.word_membership, bw, graph.edges()).transpose();

        debug_assert_eq!(p_w_tw.nrows(), n_words);

        Ok(TopicGroups {
            bd,
            bw,
            p_w_tw,
            p_tw_w,
            p_td_d,
            p_tw_d,
            doc_blocks: level.doc_membership,
            word_blocks: level.word_membership,
        })
    }

    /// Top `n` words of every topic as `(word, P(word | topic))`.
    ///
    /// Sorted by probability, then by word index.
    pub fn topics(&self, n: usize) -> Vec<Vec<(usize, f32)>> {
        (0..self.bw)
            .map(|s| {
                let mut words: Vec<(usize, f32)> = self
                    .word_blocks
                    .iter()
                    .enumerate()
                    .filter(|&(_, &b)| b == s)
                    .map(|(w, _)| (w, self.p_w_tw[(w, s)]))
                    .collect();
                words.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                words.truncate(n);
                words
            })
            .collect()
    }

    /// Up to `n` member documents of every cluster, ascending
    pub fn clusters(&self, n: usize) -> Vec<Vec<usize>> {
        let mut ret = vec![Vec::new(); self.bd];
        for (d, &r) in self.doc_blocks.iter().enumerate() {
            if ret[r].len() < n {
                ret[r].push(d);
            }
        }
        ret
    }

    /// P(word topic | doc) for one document
    pub fn topic_dist(&self, doc: usize) -> Option<Vec<f32>> {
        (doc < self.p_tw_d.ncols()).then(|| self.p_tw_d.column(doc).iter().copied().collect())
    }
}

/// `word degree / topic degree`; a topic without tokens spreads evenly over its words
fn word_given_topic(word_blocks: &[usize], word_degree: &[f64], bw: usize) -> DMatrix<f32> {
    let mut topic_degree = vec![0.0; bw];
    let mut topic_size = vec![0.0; bw];
    for (&s, &k) in word_blocks.iter().zip(word_degree) {
        topic_degree[s] += k;
        topic_size[s] += 1.0;
    }

    let mut ret = DMatrix::<f32>::zeros(word_blocks.len(), bw);
    for (w, (&s, &k)) in word_blocks.iter().zip(word_degree).enumerate() {
        ret[(w, s)] = if topic_degree[s] > 0.0 {
            (k / topic_degree[s]) as f32
        } else {
            (1.0 / topic_size[s]) as f32
        };
    }
    ret
}

fn one_hot(membership: &[usize], num_blocks: usize) -> DMatrix<f32> {
    let mut ret = DMatrix::<f32>::zeros(num_blocks, membership.len());
    for (i, &b) in membership.iter().enumerate() {
        ret[(b, i)] = 1.0;
    }
    ret
}

/// `n_docs × bw`: fraction of each document's tokens in every word topic.
///
/// A document without tokens gets the uniform distribution.
pub fn topic_mixture(
    n_docs: usize,
    word_blocks: &[usize],
    bw: usize,
    edges: &[CountEdge],
) -> DMatrix<f32> {
    let mut counts = DMatrix::<f64>::zeros(n_docs, bw);
    for &(d, w, c) in edges {
        counts[(d, word_blocks[w])] += c;
    }

    let mut ret = DMatrix::<f32>::zeros(n_docs, bw);
    for d in 0..n_docs {
        let total: f64 = counts.row(d).sum();
        for s in 0..bw {
            ret[(d, s)] = if total > 0.0 {
                (counts[(d, s)] / total) as f32
            } else {
                1.0 / bw as f32
            };
        }
    }
    ret
}
