use hsblock::{BipartiteGraph, HsbmOptions};
use matrix_util::common_io::create_temp_dir_file;
use matrix_util::mtx_io::{read_mtx_triplets, write_mtx_triplets};
use matrix_util::traits::MatTriplets;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use topsbm::sim::{simulate_planted_corpus, PlantedCorpus, PlantedCorpusParams};
use topsbm::topsbm::count_triplets;
use topsbm::{Estimator, Fit, FitTransform, TopSbm, Transform};

/// Block of each document in the 20 x 1000 block-diagonal matrix
fn trivial_doc_block(d: usize) -> usize {
    match d {
        0..5 => 0,
        5..10 => 1,
        10..12 => 2,
        _ => 3,
    }
}

/// Block of each word in the 20 x 1000 block-diagonal matrix
fn trivial_word_block(w: usize) -> usize {
    match w {
        0..200 => 0,
        200..210 => 1,
        210..500 => 2,
        _ => 3,
    }
}

/// 20 documents x 1000 words in 4 disjoint blocks of uneven sizes
fn trivial_matrix() -> DMatrix<f32> {
    DMatrix::<f32>::from_fn(20, 1000, |d, w| {
        if trivial_doc_block(d) == trivial_word_block(w) {
            1.0
        } else {
            0.0
        }
    })
}

fn small_corpus(mixing: f64) -> anyhow::Result<PlantedCorpus> {
    simulate_planted_corpus(&PlantedCorpusParams {
        n_docs: 30,
        n_words: 90,
        n_topics: 3,
        doc_length: 80.0,
        mixing,
        seed: 11,
    })
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (j, &x) in row.iter().enumerate() {
        if x > row[best] {
            best = j;
        }
    }
    best
}

fn rows(x: &DMatrix<f32>) -> Vec<Vec<f32>> {
    (0..x.nrows())
        .map(|i| x.row(i).iter().copied().collect())
        .collect()
}

#[test]
fn trivial_block_matrix() -> anyhow::Result<()> {
    let x = trivial_matrix();

    for seed in [0, 1, 2, 3, 42] {
        let mut model = TopSbm::default()
            .with_n_init(10)
            .with_random_state(Some(seed));
        let doc_topic = model.fit_transform(&x)?;

        assert_eq!(doc_topic.shape(), (20, 4), "seed {}", seed);
        assert!(model.mdl().unwrap() > 0.0);
        assert_eq!(model.num_features(), Some(1000));
        assert_eq!(model.num_samples(), Some(20));

        let mut dominant = Vec::new();
        for row in rows(&doc_topic) {
            approx::assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
            let max = row.iter().copied().fold(f32::MIN, f32::max);
            let min = row.iter().copied().fold(f32::MAX, f32::min);
            approx::assert_abs_diff_eq!(max - min, 1.0, epsilon = 1e-6);
            assert!(row.iter().all(|&p| p == 0.0 || p == 1.0));
            dominant.push(argmax(&row));
        }

        // docs of a block share a column, different blocks never do
        for d in 0..20 {
            for e in 0..20 {
                assert_eq!(
                    trivial_doc_block(d) == trivial_doc_block(e),
                    dominant[d] == dominant[e],
                    "seed {}: docs {} and {}",
                    seed,
                    d,
                    e
                );
            }
        }

        let mut columns = dominant.clone();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), 4);

        let level0 = model.groups(0)?;
        assert_eq!((level0.bd, level0.bw), (4, 4));
        for w in 0..1000 {
            for v in [0, 200, 210, 500] {
                assert_eq!(
                    trivial_word_block(w) == trivial_word_block(v),
                    level0.word_blocks[w] == level0.word_blocks[v]
                );
            }
        }
    }
    Ok(())
}

#[test]
fn more_runs_never_worse() -> anyhow::Result<()> {
    let x = small_corpus(0.2)?.to_dmatrix()?;

    let mut one = TopSbm::default().with_random_state(Some(3));
    one.fit(&x)?;
    let mut ten = TopSbm::default().with_random_state(Some(3)).with_n_init(10);
    ten.fit(&x)?;

    let mdl1 = one.mdl().unwrap();
    let mdl10 = ten.mdl().unwrap();
    assert!(mdl10 <= mdl1, "{} > {}", mdl10, mdl1);

    let runs = ten.run_mdls().unwrap();
    assert_eq!(runs.len(), 10);
    approx::assert_abs_diff_eq!(runs[0], mdl1);
    assert!(runs.iter().all(|&m| m >= mdl10));

    for model in [&one, &ten] {
        let entropy = model.state().unwrap().entropy(model.graph().unwrap())?;
        let mdl = model.mdl().unwrap();
        approx::assert_relative_eq!(entropy, mdl, max_relative = 1e-8);
    }
    Ok(())
}

#[test]
fn same_seed_same_transform() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_csr()?;

    let mut a = TopSbm::default().with_random_state(Some(17)).with_n_init(3);
    let mut b = TopSbm::default().with_random_state(Some(17)).with_n_init(3);
    let ta = a.fit_transform(&x)?;
    let tb = b.fit_transform(&x)?;

    assert_eq!(ta, tb);
    assert_eq!(a.mdl(), b.mdl());
    assert_eq!(a.seed(), Some(17));
    Ok(())
}

#[test]
fn different_seeds_differ() -> anyhow::Result<()> {
    let x = simulate_planted_corpus(&PlantedCorpusParams {
        n_docs: 20,
        n_words: 100,
        n_topics: 4,
        mixing: 0.5,
        ..Default::default()
    })?
    .to_dmatrix()?;

    let mut a = TopSbm::default().with_random_state(Some(0));
    let mut b = TopSbm::default().with_random_state(Some(2));
    let ta = a.fit_transform(&x)?;
    let tb = b.fit_transform(&x)?;

    assert!(ta.shape() != tb.shape() || ta != tb);
    Ok(())
}

#[test]
fn unseeded_fit_records_seed() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;
    let mut model = TopSbm::default();
    model.fit(&x)?;
    let seed = model.seed().unwrap();

    let mut again = TopSbm::default().with_random_state(Some(seed));
    again.fit(&x)?;
    assert_eq!(model.mdl(), again.mdl());
    Ok(())
}

#[test]
fn transform_errors() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;

    let model = TopSbm::default();
    assert!(!model.is_fitted());
    assert!(model.transform(&x).is_err());
    assert!(model.groups(0).is_err());
    assert!(model.summary().is_err());

    let mut model = TopSbm::default().with_random_state(Some(1));
    model.fit(&x)?;
    let narrow = DMatrix::<f32>::from_element(2, x.ncols() - 1, 1.0);
    assert!(model.transform(&narrow).is_err());
    assert!(model.groups(model.n_levels().unwrap()).is_err());
    assert!(model.topic_dist(0, x.nrows()).is_err());
    Ok(())
}

#[test]
fn fit_rejects_bad_input() {
    let mut model = TopSbm::default().with_random_state(Some(1));

    let negative = DMatrix::<f32>::from_row_slice(2, 2, &[1.0, -2.0, 0.0, 3.0]);
    assert!(model.fit(&negative).is_err());

    let zeros = DMatrix::<f32>::zeros(4, 5);
    assert!(model.fit(&zeros).is_err());
    assert!(!model.is_fitted());

    let mut model = TopSbm::default().with_n_init(0);
    let ones = DMatrix::<f32>::from_element(2, 2, 1.0);
    assert!(model.fit(&ones).is_err());
}

#[test]
fn weighted_and_unit_edges_agree() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;
    let mut model = TopSbm::default().with_random_state(Some(5));
    model.fit(&x)?;

    let (n_docs, n_words, counts) = count_triplets(&x)?;
    let unit = BipartiteGraph::from_counts(n_docs, n_words, &counts, false)?;
    assert!(!unit.is_weighted());

    let entropy = model.state().unwrap().entropy(&unit)?;
    approx::assert_relative_eq!(entropy, model.mdl().unwrap(), max_relative = 1e-8);

    let mut unweighted = TopSbm::default()
        .with_random_state(Some(5))
        .with_weighted_edges(false);
    unweighted.fit(&x)?;
    assert_eq!(unweighted.graph().unwrap().num_edges() as f64, unit.total_weight());
    Ok(())
}

#[test]
fn transform_matches_groups() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;

    let mut model = TopSbm::default().with_random_state(Some(9));
    let fitted = model.fit_transform(&x)?;
    let again = model.transform(&x)?;
    assert_eq!(fitted, again);

    let level0 = model.groups(0)?;
    approx::assert_abs_diff_eq!(fitted, level0.p_tw_d.transpose(), epsilon = 1e-6);
    assert_eq!(model.topic_dist(0, 4)?, rows(&fitted)[4]);

    // transform does not depend on the storage
    let csr = CsrMatrix::<f32>::from_nonzero_triplets(x.nrows(), x.ncols(), {
        let (_, _, triplets) = x.to_nonzero_triplets()?;
        triplets
    })?;
    approx::assert_abs_diff_eq!(model.transform(&csr)?, fitted, epsilon = 1e-6);

    // one new document with no tokens
    let with_empty = x.clone().resize_vertically(x.nrows() + 1, 0.0);
    let out = model.transform(&with_empty)?;
    let bw = out.ncols() as f32;
    for &p in out.row(x.nrows()).iter() {
        approx::assert_abs_diff_eq!(p, 1.0 / bw, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn level_group_probabilities() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;
    let mut model = TopSbm::default().with_random_state(Some(2));
    model.fit(&x)?;

    let n_levels = model.n_levels().unwrap();
    assert!(n_levels >= 1);

    let groups = model.all_groups().unwrap();
    for (l, g) in groups.iter().enumerate() {
        assert_eq!(g.p_w_tw.shape(), (x.ncols(), g.bw));
        assert_eq!(g.p_tw_d.shape(), (g.bw, x.nrows()));
        for s in 0..g.bw {
            approx::assert_abs_diff_eq!(g.p_w_tw.column(s).sum(), 1.0, epsilon = 1e-5);
        }
        for d in 0..x.nrows() {
            approx::assert_abs_diff_eq!(g.p_tw_d.column(d).sum(), 1.0, epsilon = 1e-5);
            approx::assert_abs_diff_eq!(g.p_td_d.column(d).sum(), 1.0);
        }

        let topics = model.topics(l, 5)?;
        assert_eq!(topics.len(), g.bw);
        assert!(topics.iter().all(|t| !t.is_empty() && t.len() <= 5));

        let clusters = model.clusters(l, usize::MAX)?;
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), x.nrows());

        if l > 0 {
            assert!(g.bw <= groups[l - 1].bw);
            assert!(g.bd <= groups[l - 1].bd);
        }
    }

    let summary = model.summary()?;
    assert_eq!(summary.blocks.len(), n_levels);
    assert_eq!(summary.entropy_by_level.len(), n_levels + 1);
    approx::assert_relative_eq!(
        summary.entropy_by_level.iter().sum::<f64>(),
        summary.mdl,
        max_relative = 1e-8
    );
    let json = serde_json::to_string(&summary)?;
    assert!(json.contains("\"mdl\""));
    Ok(())
}

#[test]
fn planted_topics_are_recovered() -> anyhow::Result<()> {
    let corpus = simulate_planted_corpus(&PlantedCorpusParams {
        n_docs: 50,
        n_words: 200,
        n_topics: 5,
        doc_length: 200.0,
        mixing: 0.05,
        seed: 7,
    })?;
    let x = corpus.to_csr()?;

    let mut model = TopSbm::default().with_random_state(Some(0));
    let doc_topic = model.fit_transform(&x)?;
    let dominant: Vec<usize> = rows(&doc_topic).iter().map(|r| argmax(r)).collect();

    for d in 0..corpus.n_docs {
        for e in 0..corpus.n_docs {
            if corpus.doc_topic[d] != corpus.doc_topic[e] {
                assert_ne!(dominant[d], dominant[e], "docs {} and {}", d, e);
            }
        }
    }
    Ok(())
}

#[test]
fn small_block_budget() -> anyhow::Result<()> {
    let x = small_corpus(0.1)?.to_dmatrix()?;
    let mut model = TopSbm::default()
        .with_random_state(Some(4))
        .with_inference(HsbmOptions {
            max_blocks: 3,
            ..Default::default()
        });
    let doc_topic = model.fit_transform(&x)?;
    assert!(doc_topic.ncols() <= 3);
    Ok(())
}

#[test]
fn fit_from_mtx_file() -> anyhow::Result<()> {
    let corpus = small_corpus(0.1)?;
    let mtx_file = create_temp_dir_file("mtx.gz")?;
    let mtx_file = mtx_file.to_str().unwrap();
    write_mtx_triplets(&corpus.triplets, corpus.n_docs, corpus.n_words, mtx_file)?;

    let mtx = read_mtx_triplets(mtx_file)?;
    assert_eq!((mtx.nrow, mtx.ncol), (corpus.n_docs, corpus.n_words));
    let x = CsrMatrix::<f32>::from_nonzero_triplets(mtx.nrow, mtx.ncol, mtx.triplets)?;

    let mut from_file = TopSbm::default().with_random_state(Some(8));
    from_file.fit(&x)?;
    let mut direct = TopSbm::default().with_random_state(Some(8));
    direct.fit(&corpus.to_csr()?)?;

    assert_eq!(from_file.mdl(), direct.mdl());
    Ok(())
}
