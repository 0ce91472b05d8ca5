//! Integration tests for the hsblock crate.

use crate::graph::{BipartiteGraph, CountEdge, Side};
use crate::inference::{Hsblock, HsbmOptions};
use crate::model::LnFactorial;
use crate::nested::BlockLevel;
use crate::sufficient_stats::BipartiteStats;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Planted bipartite corpus: docs and words split into `n_groups` blocks.
///
/// Every doc links to every word of its group with a count in `1..=3`,
/// plus `n_noise` random cross-group tokens.
fn planted_corpus(
    n_groups: usize,
    docs_per_group: usize,
    words_per_group: usize,
    n_noise: usize,
    seed: u64,
) -> (BipartiteGraph, Vec<usize>, Vec<usize>) {
    let n_docs = n_groups * docs_per_group;
    let n_words = n_groups * words_per_group;
    let mut rng = SmallRng::seed_from_u64(seed);

    let doc_labels: Vec<usize> = (0..n_docs).map(|d| d / docs_per_group).collect();
    let word_labels: Vec<usize> = (0..n_words).map(|w| w / words_per_group).collect();

    let mut counts: Vec<CountEdge> = Vec::new();
    for (d, &g) in doc_labels.iter().enumerate() {
        for w in (g * words_per_group)..((g + 1) * words_per_group) {
            counts.push((d, w, rng.random_range(1..=3) as f64));
        }
    }
    for _ in 0..n_noise {
        counts.push((rng.random_range(0..n_docs), rng.random_range(0..n_words), 1.0));
    }

    let graph = BipartiteGraph::from_counts(n_docs, n_words, &counts, true).unwrap();
    (graph, doc_labels, word_labels)
}

/// Compute Adjusted Rand Index between two label vectors.
fn adjusted_rand_index(labels_a: &[usize], labels_b: &[usize]) -> f64 {
    assert_eq!(labels_a.len(), labels_b.len());
    let n = labels_a.len();
    if n < 2 {
        return 1.0;
    }

    let max_a = *labels_a.iter().max().unwrap_or(&0) + 1;
    let max_b = *labels_b.iter().max().unwrap_or(&0) + 1;
    let mut nij = vec![0i64; max_a * max_b];
    let mut ni = vec![0i64; max_a];
    let mut nj = vec![0i64; max_b];

    for (&a, &b) in labels_a.iter().zip(labels_b) {
        nij[a * max_b + b] += 1;
        ni[a] += 1;
        nj[b] += 1;
    }

    let choose2 = |x: i64| -> f64 { (x * (x - 1)) as f64 / 2.0 };

    let sum_nij_c2: f64 = nij.iter().map(|&x| choose2(x)).sum();
    let sum_ni_c2: f64 = ni.iter().map(|&x| choose2(x)).sum();
    let sum_nj_c2: f64 = nj.iter().map(|&x| choose2(x)).sum();
    let n_c2 = choose2(n as i64);

    let expected = sum_ni_c2 * sum_nj_c2 / n_c2;
    let max_index = (sum_ni_c2 + sum_nj_c2) / 2.0;

    if (max_index - expected).abs() < 1e-10 {
        return 1.0;
    }

    (sum_nij_c2 - expected) / (max_index - expected)
}

// ─── Tests ───

#[test]
fn test_end_to_end_planted_corpus() -> anyhow::Result<()> {
    let (graph, true_docs, true_words) = planted_corpus(3, 8, 20, 10, 42);

    let state = Hsblock::new(HsbmOptions::default()).minimize(&graph, 42)?;
    let level0 = &state.levels()[0];

    let ari_docs = adjusted_rand_index(&true_docs, &level0.doc_membership);
    let ari_words = adjusted_rand_index(&true_words, &level0.word_membership);
    println!(
        "ARI docs = {:.4}, words = {:.4}, blocks = {:?}",
        ari_docs,
        ari_words,
        state.num_blocks(0)?
    );

    assert!(ari_docs > 0.8, "ARI on documents too low: {:.4}", ari_docs);
    assert!(ari_words > 0.8, "ARI on words too low: {:.4}", ari_words);
    Ok(())
}

#[test]
fn test_same_seed_is_deterministic() -> anyhow::Result<()> {
    let (graph, _, _) = planted_corpus(2, 5, 12, 20, 3);
    let hsblock = Hsblock::new(HsbmOptions::default());

    let a = hsblock.minimize(&graph, 17)?;
    let b = hsblock.minimize(&graph, 17)?;
    assert_eq!(a, b);
    assert_eq!(a.entropy(&graph)?, b.entropy(&graph)?);
    Ok(())
}

#[test]
fn test_hierarchy_ends_with_trivial_level() -> anyhow::Result<()> {
    let (graph, _, _) = planted_corpus(4, 4, 10, 5, 11);
    let state = Hsblock::new(HsbmOptions::default()).minimize(&graph, 1)?;

    assert!(state.num_levels() >= 2);
    let top = state.levels().last().unwrap();
    assert!(top.is_trivial());

    // every level labels the blocks of the level below
    for l in 1..state.num_levels() {
        let (bd, bw) = state.num_blocks(l - 1)?;
        assert_eq!(state.levels()[l].membership(Side::Doc).len(), bd);
        assert_eq!(state.levels()[l].membership(Side::Word).len(), bw);
    }

    // projections cover every vertex and coarsen monotonically
    let mut prev = state.num_blocks(0)?;
    for l in 0..state.num_levels() {
        let p = state.project(l)?;
        assert_eq!(p.doc_membership.len(), graph.num_docs());
        assert_eq!(p.word_membership.len(), graph.num_words());
        let nb = state.num_blocks(l)?;
        assert!(nb.0 <= prev.0 && nb.1 <= prev.1);
        prev = nb;
    }
    Ok(())
}

#[test]
fn test_entropy_is_sum_of_levels_and_below_flat() -> anyhow::Result<()> {
    let (graph, _, _) = planted_corpus(3, 5, 8, 15, 5);
    let hsblock = Hsblock::new(HsbmOptions::default());

    let (_, flat_dl) = hsblock.minimize_level0(&graph, 9)?;
    let state = hsblock.minimize(&graph, 9)?;

    let by_level = state.entropy_by_level(&graph)?;
    assert_eq!(by_level.len(), state.num_levels());
    let total: f64 = by_level.iter().sum();
    approx::assert_relative_eq!(total, state.entropy(&graph)?, max_relative = 1e-12);

    assert!(total > 0.0);
    assert!(total <= flat_dl + 1e-8, "{} > {}", total, flat_dl);
    Ok(())
}

#[test]
fn test_weighted_and_unit_edges_agree() -> anyhow::Result<()> {
    let counts = vec![
        (0, 0, 3.0),
        (0, 1, 1.0),
        (1, 0, 2.0),
        (1, 2, 4.0),
        (2, 2, 1.0),
        (2, 3, 5.0),
    ];
    let weighted = BipartiteGraph::from_counts(3, 4, &counts, true)?;
    let unit = BipartiteGraph::from_counts(3, 4, &counts, false)?;

    let state = Hsblock::new(HsbmOptions::default()).minimize(&weighted, 4)?;
    approx::assert_relative_eq!(
        state.entropy(&weighted)?,
        state.entropy(&unit)?,
        max_relative = 1e-10
    );

    // the same holds for any fixed partition
    let lnf = LnFactorial::for_graph(&weighted);
    let a = BipartiteStats::from_graph(&weighted, &[0, 1, 1], &[0, 0, 1, 1], 2, 2, &lnf)?;
    let b = BipartiteStats::from_graph(&unit, &[0, 1, 1], &[0, 0, 1, 1], 2, 2, &lnf)?;
    approx::assert_relative_eq!(
        a.description_length(&lnf),
        b.description_length(&lnf),
        max_relative = 1e-10
    );
    Ok(())
}

#[test]
fn test_single_cell_graph() -> anyhow::Result<()> {
    let graph = BipartiteGraph::from_counts(1, 1, &[(0, 0, 7.0)], true)?;
    let state = Hsblock::new(HsbmOptions::default()).minimize(&graph, 0)?;

    assert_eq!(state.num_levels(), 2);
    assert_eq!(state.levels()[0], BlockLevel::trivial(1, 1));
    assert!(state.entropy(&graph)?.is_finite());
    Ok(())
}

#[test]
fn test_small_capacity_still_partitions() -> anyhow::Result<()> {
    let (graph, _, _) = planted_corpus(3, 6, 10, 0, 8);
    let options = HsbmOptions {
        max_blocks: 4,
        ..Default::default()
    };
    let state = Hsblock::new(options).minimize(&graph, 2)?;
    let (bd, bw) = state.num_blocks(0)?;
    assert!(bd <= 4 && bw <= 4);
    assert!(bd >= 1 && bw >= 1);
    Ok(())
}
