use clap::{Args, Parser, Subcommand};
use log::info;
use matrix_util::common_io::{mkdir, read_lines, write_lines};
use matrix_util::mtx_io::{read_mtx_triplets, write_mtx_triplets};
use matrix_util::traits::{IoOps, MatTriplets};
use nalgebra_sparse::CsrMatrix;

use topsbm::sim::{simulate_planted_corpus, PlantedCorpusParams};
use topsbm::{Estimator, Fit, HsbmOptions, TopSbm, TopSbmParams, Transform};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "TopSBM",
    long_about = "Topic modelling by nested stochastic block models.\n\n\
                  Documents and words of a count matrix form a bipartite multigraph.\n\
                  A hierarchy of document clusters and word topics is inferred by\n\
                  minimising its description length.",
    term_width = 80
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// verbosity (`RUST_LOG=info`)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Fit a hierarchical topic model on a count matrix",
        long_about = "Fit a nested SBM on a document x word MatrixMarket file.\n\n\
                      Outputs:\n\
                      - {out}.doc_topic.tsv.gz: P(topic | doc) at level 0\n\
                      - {out}.level{l}.word_topic.tsv.gz: P(word | topic)\n\
                      - {out}.level{l}.topics.tsv.gz: top words of every topic\n\
                      - {out}.level{l}.clusters.tsv.gz: documents of every cluster\n\
                      - {out}.summary.json: description lengths and block counts"
    )]
    Fit(FitArgs),

    #[command(
        about = "Simulate a planted-topic corpus",
        long_about = "Simulate documents that draw most tokens from a single topic.\n\n\
                      Outputs:\n\
                      - {out}.mtx.gz: document x word counts\n\
                      - {out}.doc_topic.gz: planted topic of every document\n\
                      - {out}.word_topic.gz: planted topic of every word"
    )]
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct FitArgs {
    /// MatrixMarket count file (`.mtx` or `.mtx.gz`)
    #[arg(required = true)]
    mtx_file: Box<str>,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    #[arg(
        long,
        default_value_t = false,
        help = "Input is word x document",
        long_help = "Treat rows as words and columns as documents,\n\
                     as in most single-cell style MatrixMarket files."
    )]
    transpose: bool,

    /// document names, one per line
    #[arg(long)]
    doc_names: Option<Box<str>>,

    /// word names, one per line
    #[arg(long)]
    word_names: Option<Box<str>>,

    #[arg(
        long,
        default_value_t = false,
        help = "Expand counts into unit edges",
        long_help = "Represent a count c as c parallel unit edges\n\
                     instead of a single weighted edge.\n\
                     Both give the same description length."
    )]
    unweighted: bool,

    /// number of independent runs; the shortest description wins
    #[arg(long, default_value_t = 1)]
    n_init: usize,

    /// random seed (drawn from the OS if missing)
    #[arg(long)]
    seed: Option<u64>,

    /// block slots per side at level 0
    #[arg(long, default_value_t = 64)]
    max_blocks: usize,

    /// Gibbs sweeps per round
    #[arg(long, default_value_t = 10)]
    num_sweeps: usize,

    /// number of top words to report per topic
    #[arg(long, default_value_t = 20)]
    top_words: usize,

    #[arg(
        long,
        help = "Number of threads",
        long_help = "Number of worker threads for parallel runs.\n\
                     Defaults to the number of logical CPUs."
    )]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// number of documents
    #[arg(long, default_value_t = 100)]
    docs: usize,

    /// vocabulary size
    #[arg(long, default_value_t = 500)]
    words: usize,

    /// number of planted topics
    #[arg(long, default_value_t = 5)]
    topics: usize,

    /// average document length
    #[arg(long, default_value_t = 200.0)]
    doc_length: f64,

    /// probability of a token outside the document's topic
    #[arg(long, default_value_t = 0.1)]
    mixing: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Fit(args) => {
            fit_topsbm(args)?;
        }
        Commands::Simulate(args) => {
            simulate(args)?;
        }
    }

    info!("Done");
    Ok(())
}

fn read_names(file: Option<&str>, n: usize, prefix: &str) -> anyhow::Result<Vec<Box<str>>> {
    match file {
        Some(file) => {
            let names: Vec<Box<str>> = read_lines(file)?
                .into_iter()
                .filter(|x| !x.trim().is_empty())
                .collect();
            anyhow::ensure!(
                names.len() == n,
                "{} has {} names, expected {}",
                file,
                names.len(),
                n
            );
            Ok(names)
        }
        None => Ok((0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()),
    }
}

fn fit_topsbm(args: &FitArgs) -> anyhow::Result<()> {
    let num_threads = args.threads.unwrap_or_else(num_cpus::get).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let mut mtx = read_mtx_triplets(&args.mtx_file)?;
    if args.transpose {
        mtx = mtx.transpose();
    }
    info!("{}: {} docs x {} words", args.mtx_file, mtx.nrow, mtx.ncol);

    let doc_names = read_names(args.doc_names.as_deref(), mtx.nrow, "doc")?;
    let word_names = read_names(args.word_names.as_deref(), mtx.ncol, "word")?;

    let counts = CsrMatrix::<f32>::from_nonzero_triplets(mtx.nrow, mtx.ncol, mtx.triplets)?;

    let params = TopSbmParams {
        weighted_edges: !args.unweighted,
        n_init: args.n_init,
        random_state: args.seed,
        inference: HsbmOptions {
            max_blocks: args.max_blocks,
            num_sweeps: args.num_sweeps,
            ..Default::default()
        },
    };

    let mut model = TopSbm::new(params).with_progress(true);
    model.fit(&counts)?;

    let summary = model.summary()?;
    info!("mdl = {:.4}, blocks per level = {:?}", summary.mdl, summary.blocks);

    let out = &args.out;
    mkdir(out)?;

    let doc_topic = model.transform(&counts)?;
    let topic_names = |bw: usize| -> Vec<Box<str>> {
        (0..bw).map(|s| format!("T{}", s).into_boxed_str()).collect()
    };
    doc_topic.to_tsv_with_names(
        &format!("{}.doc_topic.tsv.gz", out),
        &doc_names,
        &topic_names(doc_topic.ncols()),
    )?;

    for (l, groups) in model.all_groups().unwrap_or_default().iter().enumerate() {
        groups.p_w_tw.to_tsv_with_names(
            &format!("{}.level{}.word_topic.tsv.gz", out, l),
            &word_names,
            &topic_names(groups.bw),
        )?;

        let mut topic_lines = vec!["topic\trank\tword\tprob".to_string()];
        for (s, words) in groups.topics(args.top_words).iter().enumerate() {
            for (rank, &(w, p)) in words.iter().enumerate() {
                topic_lines.push(format!("T{}\t{}\t{}\t{}", s, rank, word_names[w], p));
            }
        }
        write_lines(&topic_lines, &format!("{}.level{}.topics.tsv.gz", out, l))?;

        let mut cluster_lines = vec!["cluster\tdoc".to_string()];
        for (r, docs) in groups.clusters(usize::MAX).iter().enumerate() {
            for &d in docs {
                cluster_lines.push(format!("C{}\t{}", r, doc_names[d]));
            }
        }
        write_lines(&cluster_lines, &format!("{}.level{}.clusters.tsv.gz", out, l))?;
    }

    let json = serde_json::to_string_pretty(&summary)?;
    write_lines(&[json], &format!("{}.summary.json", out))?;

    info!(
        "wrote {} levels for params {:?}",
        summary.blocks.len(),
        model.params()
    );
    Ok(())
}

fn simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    let corpus = simulate_planted_corpus(&PlantedCorpusParams {
        n_docs: args.docs,
        n_words: args.words,
        n_topics: args.topics,
        doc_length: args.doc_length,
        mixing: args.mixing,
        seed: args.seed,
    })?;

    let out = &args.out;
    mkdir(out)?;

    write_mtx_triplets(
        &corpus.triplets,
        corpus.n_docs,
        corpus.n_words,
        &format!("{}.mtx.gz", out),
    )?;

    let doc_lines: Vec<String> = corpus
        .doc_topic
        .iter()
        .enumerate()
        .map(|(d, t)| format!("doc{}\t{}", d, t))
        .collect();
    write_lines(&doc_lines, &format!("{}.doc_topic.gz", out))?;

    let word_lines: Vec<String> = corpus
        .word_topic
        .iter()
        .enumerate()
        .map(|(w, t)| format!("word{}\t{}", w, t))
        .collect();
    write_lines(&word_lines, &format!("{}.word_topic.gz", out))?;

    Ok(())
}
