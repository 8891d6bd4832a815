//! Evaluation and weight search.
//!
//! Scores classifications against hand-labelled ground truth with a
//! hierarchical partial-credit metric, and searches candidate weight vectors
//! for the best-scoring one.

use naicsflow_classify::{ClassifyError, Classifier, Decision, Threshold, ThresholdMode};
use naicsflow_model::{Classification, GroundTruth, WeightError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

mod grid;

pub use grid::{Candidate, CandidateSource, CartesianGrid, ExplicitGrid, RandomSearch, Range};

/// Points available per business: one per leading code digit.
pub const MAX_CREDIT: u32 = 6;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("No candidates to evaluate")]
    EmptyGrid,

    #[error("Search interrupted before any trial finished")]
    Interrupted,

    #[error("Invalid range for '{name}': [{min}, {max}]")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error(transparent)]
    Weight(#[from] WeightError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// Partial credit for one prediction: the number of leading characters the
/// two codes share, compared left to right up to the first mismatch, capped
/// at `MAX_CREDIT`.
pub fn score_prediction(predicted: &str, reference: &str) -> u32 {
    predicted
        .chars()
        .zip(reference.chars())
        .take(MAX_CREDIT as usize)
        .take_while(|(p, r)| p == r)
        .count() as u32
}

/// Result of scoring one classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Total partial credit earned
    pub score: u64,
    /// `MAX_CREDIT` per ground-truth business
    pub max_possible: u64,
    /// Ground-truth businesses considered
    pub evaluated: usize,
    /// Predictions matching the reference in full
    pub exact: usize,
    /// Ground-truth businesses left without a guess
    pub no_guess: usize,
}

impl Evaluation {
    pub fn ratio(&self) -> f64 {
        if self.max_possible == 0 {
            0.0
        } else {
            self.score as f64 / self.max_possible as f64
        }
    }
}

/// Score `classifications` against `ground_truth`.
///
/// Every ground-truth business counts toward `max_possible`; one without a
/// classification is scored as "no guess". Classifications for businesses
/// outside the ground truth are ignored.
pub fn evaluate(classifications: &[Classification], ground_truth: &GroundTruth) -> Evaluation {
    if ground_truth.is_empty() {
        warn!("Evaluating against empty ground truth");
    }

    let predicted: HashMap<&str, &str> = classifications
        .iter()
        .map(|c| (c.business_id.as_str(), c.code.as_str()))
        .collect();

    let mut evaluation = Evaluation::default();
    for (business_id, reference) in ground_truth.iter() {
        let guess = predicted.get(business_id).copied().unwrap_or("");
        let credit = score_prediction(guess, reference);

        evaluation.score += credit as u64;
        evaluation.max_possible += MAX_CREDIT as u64;
        evaluation.evaluated += 1;
        if guess.is_empty() {
            evaluation.no_guess += 1;
        } else if guess == reference {
            evaluation.exact += 1;
        }
    }
    evaluation
}

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Position of the candidate in the grid
    pub index: usize,
    pub candidate: Candidate,
    pub evaluation: Evaluation,
}

/// All finished trials and the best among them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best: TrialResult,
    pub trials: Vec<TrialResult>,
    /// Candidates skipped because the search was cancelled
    pub skipped: usize,
}

/// Called with every finished trial, from whichever worker ran it.
pub type TrialObserver = Arc<dyn Fn(&TrialResult) + Send + Sync>;

/// Evaluates candidate weight vectors against ground truth.
///
/// Trials share the classifier's similarity matrices read-only and run in
/// parallel. A cancellation flag is checked before each trial starts.
pub struct Optimizer<'a> {
    classifier: Classifier<'a>,
    ground_truth: &'a GroundTruth,
    threshold_mode: ThresholdMode,
    use_rules: bool,
    cancel: Arc<AtomicBool>,
    observer: Option<TrialObserver>,
}

impl<'a> Optimizer<'a> {
    pub fn new(classifier: Classifier<'a>, ground_truth: &'a GroundTruth) -> Self {
        Self {
            classifier,
            ground_truth,
            threshold_mode: ThresholdMode::default(),
            use_rules: true,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: None,
        }
    }

    pub fn with_threshold_mode(mut self, mode: ThresholdMode) -> Self {
        self.threshold_mode = mode;
        self
    }

    pub fn with_rules(mut self, use_rules: bool) -> Self {
        self.use_rules = use_rules;
        self
    }

    /// Share an external cancellation flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: TrialObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Classify with one candidate and score the result.
    pub fn trial(&self, candidate: &Candidate) -> Result<(Vec<Decision>, Evaluation), OptimizeError> {
        let threshold = Threshold {
            value: candidate.threshold,
            mode: self.threshold_mode,
        };
        let decisions = self.classifier.run(&candidate.weights, threshold, self.use_rules)?;
        let classifications: Vec<Classification> =
            decisions.iter().map(Decision::to_classification).collect();
        let evaluation = evaluate(&classifications, self.ground_truth);
        Ok((decisions, evaluation))
    }

    /// Evaluate every candidate and keep the highest score. Ties go to the
    /// earliest candidate.
    pub fn search(&self, source: &dyn CandidateSource) -> Result<SearchOutcome, OptimizeError> {
        let candidates = source.candidates()?;
        if candidates.is_empty() {
            return Err(OptimizeError::EmptyGrid);
        }
        info!(candidates = candidates.len(), "Starting weight search");

        let results: Vec<Option<Result<TrialResult, OptimizeError>>> = candidates
            .into_par_iter()
            .enumerate()
            .map(|(index, candidate)| {
                if self.cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let outcome = self.trial(&candidate).map(|(_, evaluation)| {
                    debug!(
                        index,
                        score = evaluation.score,
                        max = evaluation.max_possible,
                        threshold = candidate.threshold,
                        "Trial finished"
                    );
                    TrialResult {
                        index,
                        candidate,
                        evaluation,
                    }
                });
                if let (Ok(result), Some(observer)) = (&outcome, &self.observer) {
                    observer(result);
                }
                Some(outcome)
            })
            .collect();

        let mut trials = Vec::with_capacity(results.len());
        let mut skipped = 0;
        for result in results {
            match result {
                Some(result) => trials.push(result?),
                None => skipped += 1,
            }
        }

        let mut best: Option<&TrialResult> = None;
        for trial in &trials {
            if best.map_or(true, |b| trial.evaluation.score > b.evaluation.score) {
                best = Some(trial);
            }
        }
        let best = best.cloned().ok_or(OptimizeError::Interrupted)?;

        if skipped > 0 {
            warn!(skipped, finished = trials.len(), "Weight search interrupted");
        }
        info!(
            index = best.index,
            score = best.evaluation.score,
            max = best.evaluation.max_possible,
            ratio = best.evaluation.ratio(),
            "Best candidate"
        );

        Ok(SearchOutcome {
            best,
            trials,
            skipped,
        })
    }
}
