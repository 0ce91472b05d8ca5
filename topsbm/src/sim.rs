//! Planted-topic corpus simulation.

use fnv::FnvHashMap as HashMap;
use log::info;
use matrix_util::traits::MatTriplets;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

/// Simulation settings
#[derive(Debug, Clone)]
pub struct PlantedCorpusParams {
    /// number of documents
    pub n_docs: usize,
    /// vocabulary size
    pub n_words: usize,
    /// number of planted topics
    pub n_topics: usize,
    /// average tokens per document (Poisson mean)
    pub doc_length: f64,
    /// probability that a token ignores the document's topic
    pub mixing: f64,
    /// random seed
    pub seed: u64,
}

impl Default for PlantedCorpusParams {
    fn default() -> Self {
        PlantedCorpusParams {
            n_docs: 100,
            n_words: 500,
            n_topics: 5,
            doc_length: 200.0,
            mixing: 0.1,
            seed: 42,
        }
    }
}

/// A simulated document-word count matrix with its planted labels
#[derive(Debug, Clone)]
pub struct PlantedCorpus {
    /// number of documents (rows)
    pub n_docs: usize,
    /// number of words (columns)
    pub n_words: usize,
    /// `(doc, word, count)`, sorted
    pub triplets: Vec<(usize, usize, f32)>,
    /// planted topic of every document
    pub doc_topic: Vec<usize>,
    /// planted topic of every word
    pub word_topic: Vec<usize>,
}

impl PlantedCorpus {
    /// Dense `n_docs × n_words` counts
    pub fn to_dmatrix(&self) -> anyhow::Result<DMatrix<f32>> {
        DMatrix::<f32>::from_nonzero_triplets(self.n_docs, self.n_words, self.triplets.clone())
    }

    /// Sparse `n_docs × n_words` counts
    pub fn to_csr(&self) -> anyhow::Result<CsrMatrix<f32>> {
        CsrMatrix::<f32>::from_nonzero_triplets(self.n_docs, self.n_words, self.triplets.clone())
    }
}

/// Words of topic `t` when `n_words` are split into `n_topics` contiguous blocks
fn topic_words(t: usize, n_words: usize, n_topics: usize) -> std::ops::Range<usize> {
    (t * n_words / n_topics)..((t + 1) * n_words / n_topics)
}

/// Sample a corpus whose documents each draw most tokens from one topic.
///
/// * doc `d` belongs to topic `d % n_topics`
/// * doc length ~ Poisson(`doc_length`), at least 1
/// * a token is uniform over the doc's topic words with probability
///   `1 - mixing`, uniform over the whole vocabulary otherwise
pub fn simulate_planted_corpus(params: &PlantedCorpusParams) -> anyhow::Result<PlantedCorpus> {
    let PlantedCorpusParams {
        n_docs,
        n_words,
        n_topics,
        doc_length,
        mixing,
        seed,
    } = *params;

    anyhow::ensure!(n_docs > 0, "need at least one document");
    anyhow::ensure!(n_topics > 0, "need at least one topic");
    anyhow::ensure!(
        n_words >= n_topics,
        "{} words cannot cover {} topics",
        n_words,
        n_topics
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&mixing),
        "mixing must be in [0, 1], got {}",
        mixing
    );

    let length_dist = Poisson::new(doc_length)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let doc_topic: Vec<usize> = (0..n_docs).map(|d| d % n_topics).collect();
    let mut word_topic = vec![0; n_words];
    for t in 0..n_topics {
        for w in topic_words(t, n_words, n_topics) {
            word_topic[w] = t;
        }
    }

    let mut triplets = Vec::new();
    for (d, &t) in doc_topic.iter().enumerate() {
        let len = (length_dist.sample(&mut rng) as usize).max(1);
        let words = topic_words(t, n_words, n_topics);

        let mut counts: HashMap<usize, f32> = HashMap::default();
        for _ in 0..len {
            let w = if rng.random::<f64>() < mixing {
                rng.random_range(0..n_words)
            } else {
                rng.random_range(words.clone())
            };
            *counts.entry(w).or_default() += 1.0;
        }

        let mut row: Vec<(usize, usize, f32)> =
            counts.into_iter().map(|(w, c)| (d, w, c)).collect();
        row.sort_by_key(|&(_, w, _)| w);
        triplets.extend(row);
    }

    info!(
        "simulated {} docs x {} words, {} topics, {} non-zeros",
        n_docs,
        n_words,
        n_topics,
        triplets.len()
    );

    Ok(PlantedCorpus {
        n_docs,
        n_words,
        triplets,
        doc_topic,
        word_topic,
    })
}
