//! Command-line driver for featurizing, classifying and tuning.
//!
//! Usage:
//!     eval featurize --businesses b.json --taxonomy naics.json --level 6 --out matrices.json
//!     eval classify --matrices matrices.json --businesses b.json --taxonomy naics.json --out out.json
//!     eval score --classifications out.json --ground-truth truth.json
//!     eval optimize --matrices matrices.json --businesses b.json --taxonomy naics.json \
//!         --ground-truth truth.json --random 500 --seed 7

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use naicsflow_classify::{Classifier, ClassifierConfig, ScoreMatrixBuilder, ThresholdMode};
use naicsflow_explain::{explain_decision, summarize_decisions, summarize_evaluation, summarize_search};
use naicsflow_features::{FeatureExtractor, SimilarityMatrices, TextSimilarity};
use naicsflow_model::Taxonomy;
use naicsflow_optimize::{
    evaluate, CandidateSource, CartesianGrid, ExplicitGrid, Optimizer, RandomSearch, TrialResult,
};
use naicsflow_rules::{default_rules, Rule, RuleTable};
use naicsflow_store::{
    load_businesses, load_classifications, load_ground_truth, load_hints, load_synonyms, load_taxonomy,
    load_word_vectors, read_json, write_json, BusinessStore, ClassificationSink, JsonFileSink, MemoryStore,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Classify businesses into industry codes and tune the classifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter directives (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_filter: Option<String>,
}

/// Inputs shared by every command that works on precomputed matrices.
#[derive(clap::Args)]
struct MatrixInputs {
    /// Similarity matrices written by `featurize`
    #[arg(long)]
    matrices: PathBuf,

    /// Business records (JSON array)
    #[arg(long)]
    businesses: PathBuf,

    /// Taxonomy entries (JSON array)
    #[arg(long)]
    taxonomy: PathBuf,

    /// Keep only taxonomy codes with this many digits
    #[arg(long)]
    level: Option<usize>,

    /// Business id to business-type labels (JSON object)
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Rule declarations (JSON array); the built-in rules when absent
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Per-category prior weights, one per taxonomy entry (JSON array)
    #[arg(long)]
    category_prior: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the eight similarity matrices
    Featurize {
        /// Business records (JSON array)
        #[arg(long)]
        businesses: PathBuf,

        /// Taxonomy entries (JSON array)
        #[arg(long)]
        taxonomy: PathBuf,

        /// Keep only taxonomy codes with this many digits
        #[arg(long)]
        level: Option<usize>,

        /// Business id to business-type labels (JSON object)
        #[arg(long)]
        hints: Option<PathBuf>,

        /// Word vectors in word2vec text format
        #[arg(long)]
        vectors: Option<PathBuf>,

        /// Word to synonyms table (JSON object)
        #[arg(long)]
        synonyms: Option<PathBuf>,

        /// Append synonyms to taxonomy text before comparing
        #[arg(long)]
        expand_synonyms: bool,

        /// Output path for the matrices
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Assign a code to every business
    Classify {
        #[command(flatten)]
        inputs: MatrixInputs,

        /// Classifier settings (JSON); defaults to the tuned weights
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the decision threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Let a score equal to the threshold classify
        #[arg(long)]
        inclusive: bool,

        /// Ignore the rule table
        #[arg(long)]
        no_rules: bool,

        /// Print an explanation per business
        #[arg(long)]
        explain: bool,

        /// Output path for the classifications
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Score classifications against ground truth
    Score {
        /// Classifications (JSON array)
        #[arg(long)]
        classifications: PathBuf,

        /// Business id to reference code (JSON object)
        #[arg(long)]
        ground_truth: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Search for the best weights and threshold
    Optimize {
        #[command(flatten)]
        inputs: MatrixInputs,

        /// Business id to reference code (JSON object)
        #[arg(long)]
        ground_truth: PathBuf,

        /// Search space file: {"explicit": [...]}, {"cartesian": {...}} or {"random": {...}}
        #[arg(long, conflicts_with = "random", required_unless_present = "random")]
        grid: Option<PathBuf>,

        /// Sample this many weight vectors uniformly from [0, 1]
        #[arg(long)]
        random: Option<usize>,

        /// Seed for --random
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Threshold used by --random
        #[arg(long, default_value = "1.1")]
        threshold: f64,

        /// Let a score equal to the threshold classify
        #[arg(long)]
        inclusive: bool,

        /// Ignore the rule table
        #[arg(long)]
        no_rules: bool,

        /// Stop starting new trials after this many seconds
        #[arg(long)]
        time_limit: Option<u64>,

        /// Write the full search report here (JSON)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// A search space read from a file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SearchSpace {
    Explicit(ExplicitGrid),
    Cartesian(CartesianGrid),
    Random(RandomSearch),
}

impl SearchSpace {
    fn into_source(self) -> Box<dyn CandidateSource> {
        match self {
            SearchSpace::Explicit(grid) => Box::new(grid),
            SearchSpace::Cartesian(grid) => Box::new(grid),
            SearchSpace::Random(search) => Box::new(search),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match &cli.log_filter {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::from_default_env()
            .add_directive("naicsflow=debug".parse()?)
            .add_directive("eval=info".parse()?),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Featurize {
            businesses,
            taxonomy,
            level,
            hints,
            vectors,
            synonyms,
            expand_synonyms,
            out,
        } => run_featurize(
            &businesses,
            &taxonomy,
            level,
            hints.as_deref(),
            vectors.as_deref(),
            synonyms.as_deref(),
            expand_synonyms,
            &out,
        ),
        Commands::Classify {
            inputs,
            config,
            threshold,
            inclusive,
            no_rules,
            explain,
            out,
        } => {
            let mut config: ClassifierConfig = match config {
                Some(path) => read_json(&path)?,
                None => ClassifierConfig::default(),
            };
            apply_overrides(&mut config, threshold, inclusive, no_rules)?;
            run_classify(&inputs, &config, explain, &out)
        }
        Commands::Score {
            classifications,
            ground_truth,
            format,
        } => run_score(&classifications, &ground_truth, &format),
        Commands::Optimize {
            inputs,
            ground_truth,
            grid,
            random,
            seed,
            threshold,
            inclusive,
            no_rules,
            time_limit,
            out,
        } => {
            let source: Box<dyn CandidateSource> = match (grid, random) {
                (Some(path), _) => read_json::<SearchSpace>(&path)?.into_source(),
                (None, Some(count)) => Box::new(RandomSearch::unit(count, threshold, seed)),
                (None, None) => bail!("one of --grid or --random is required"),
            };
            let mode = if inclusive {
                ThresholdMode::Inclusive
            } else {
                ThresholdMode::Exclusive
            };
            run_optimize(
                &inputs,
                &ground_truth,
                source.as_ref(),
                mode,
                !no_rules,
                time_limit,
                out.as_deref(),
            )
        }
    }
}

/// Apply command-line overrides on top of a loaded config.
fn apply_overrides(
    config: &mut ClassifierConfig,
    threshold: Option<f64>,
    inclusive: bool,
    no_rules: bool,
) -> Result<()> {
    if let Some(threshold) = threshold {
        if !threshold.is_finite() {
            bail!("threshold must be finite, got {}", threshold);
        }
        config.threshold = threshold;
    }
    if inclusive {
        config.threshold_mode = ThresholdMode::Inclusive;
    }
    if no_rules {
        config.use_rules = false;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_featurize(
    businesses: &Path,
    taxonomy: &Path,
    level: Option<usize>,
    hints: Option<&Path>,
    vectors: Option<&Path>,
    synonyms: Option<&Path>,
    expand_synonyms: bool,
    out: &Path,
) -> Result<()> {
    let businesses = load_businesses(businesses)?;
    let taxonomy = load_taxonomy(taxonomy, level)?;
    let vectors = vectors.map(load_word_vectors).transpose()?;
    if vectors.is_none() {
        tracing::warn!("No word vectors given; embedding dimensions will be 0");
    }

    let mut extractor = FeatureExtractor::new(TextSimilarity::new(vectors));
    if let Some(path) = synonyms {
        extractor = extractor.with_synonyms(load_synonyms(path)?);
    }
    if let Some(path) = hints {
        extractor = extractor.with_hints(load_hints(path)?);
    }

    let matrices = SimilarityMatrices::compute(&extractor, &businesses, &taxonomy, expand_synonyms);
    write_json(out, &matrices)?;

    let (rows, columns) = matrices.shape();
    println!("Wrote {} x {} matrices to {}", rows, columns, out.display());
    Ok(())
}

/// Everything a classifier needs, loaded and cross-checked.
struct Loaded {
    matrices: SimilarityMatrices,
    taxonomy: Taxonomy,
    rules: RuleTable,
    prior: Option<Vec<f64>>,
}

impl Loaded {
    fn read(inputs: &MatrixInputs) -> Result<Self> {
        let matrices: SimilarityMatrices = read_json(&inputs.matrices)?;
        let store = MemoryStore::new(load_businesses(&inputs.businesses)?)?;
        let taxonomy = load_taxonomy(&inputs.taxonomy, inputs.level)?;

        if let Some(missing) = matrices.business_ids().iter().find(|id| !store.exists(id)) {
            bail!("matrices mention business {} which is not in {}", missing, inputs.businesses.display());
        }
        let codes: Vec<&str> = taxonomy.iter().map(|e| e.code.as_str()).collect();
        if codes != matrices.codes() {
            bail!(
                "matrices were computed over {} categories that do not match the {} loaded from {}",
                matrices.codes().len(),
                codes.len(),
                inputs.taxonomy.display()
            );
        }

        let hints: HashMap<String, String> = match &inputs.hints {
            Some(path) => load_hints(path)?,
            None => HashMap::new(),
        };
        let rules: Vec<Rule> = match &inputs.rules {
            Some(path) => read_json(path)?,
            None => default_rules(),
        };
        let rules = RuleTable::build(rules, store.businesses(), &hints);

        let prior: Option<Vec<f64>> = inputs.category_prior.as_ref().map(read_json).transpose()?;

        Ok(Self {
            matrices,
            taxonomy,
            rules,
            prior,
        })
    }

    fn classifier(&self) -> Result<Classifier<'_>> {
        let mut builder = ScoreMatrixBuilder::new(&self.matrices);
        if let Some(prior) = &self.prior {
            builder = builder
                .with_prior(prior.clone())
                .context("category prior does not fit the taxonomy")?;
        }
        Ok(Classifier::new(builder, &self.rules))
    }
}

fn run_classify(inputs: &MatrixInputs, config: &ClassifierConfig, explain: bool, out: &Path) -> Result<()> {
    let loaded = Loaded::read(inputs)?;
    let decisions = loaded.classifier()?.run_config(config)?;

    let mut sink = JsonFileSink::new(out);
    for decision in &decisions {
        sink.record(&decision.business_id, decision.code())?;
    }
    sink.flush()?;

    if explain {
        for decision in &decisions {
            let explanation = explain_decision(decision, &loaded.taxonomy);
            println!("\n{}: {}", decision.business_id, explanation.summary);
            println!("   {}", explanation.detail);
        }
        println!("\n---");
    }
    println!("{}", summarize_decisions(&decisions));
    Ok(())
}

fn run_score(classifications: &Path, ground_truth: &Path, format: &str) -> Result<()> {
    let classifications = load_classifications(classifications)?;
    let ground_truth = load_ground_truth(ground_truth)?;
    let evaluation = evaluate(&classifications, &ground_truth);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        println!("{}", summarize_evaluation(&evaluation));
    }
    Ok(())
}

fn run_optimize(
    inputs: &MatrixInputs,
    ground_truth: &Path,
    source: &dyn CandidateSource,
    mode: ThresholdMode,
    use_rules: bool,
    time_limit: Option<u64>,
    out: Option<&Path>,
) -> Result<()> {
    let loaded = Loaded::read(inputs)?;
    let ground_truth = load_ground_truth(ground_truth)?;

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(seconds) = time_limit {
        let flag = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            tracing::warn!(seconds, "Time limit reached, finishing running trials");
            flag.store(true, Ordering::Relaxed);
        });
    }

    let best_score = AtomicU64::new(0);
    let optimizer = Optimizer::new(loaded.classifier()?, &ground_truth)
        .with_threshold_mode(mode)
        .with_rules(use_rules)
        .with_cancel(cancel)
        .with_observer(Arc::new(move |trial: &TrialResult| {
            let score = trial.evaluation.score;
            if score > best_score.fetch_max(score, Ordering::Relaxed) {
                tracing::info!(index = trial.index, score, max = trial.evaluation.max_possible, "New best candidate");
            }
        }));
    let outcome = optimizer.search(source)?;

    if let Some(path) = out {
        write_json(path, &outcome)?;
        println!("Wrote search report to {}", path.display());
    }
    println!("{}", summarize_search(&outcome));
    Ok(())
}
