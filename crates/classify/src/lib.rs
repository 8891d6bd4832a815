//! Score combination and classification decisions.
//!
//! Takes the frozen per-dimension similarity matrices, combines them under a
//! `WeightVector` into one score matrix, and decides a code per business:
//! rule override first, then the best-scoring category if it clears the
//! threshold, otherwise "no guess".

use naicsflow_features::SimilarityMatrices;
use naicsflow_model::{Classification, Dimension, PerDimension, WeightVector};
use naicsflow_rules::RuleTable;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("Score matrix is {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Prior has {found} entries, expected one per category ({expected})")]
    PriorLength { expected: usize, found: usize },

    #[error("Prior for column {0} is not finite")]
    NonFinitePrior(usize),

    #[error("Threshold is not finite: {0}")]
    NonFiniteThreshold(f64),
}

/// Whether a score equal to the threshold classifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// `score > threshold`
    #[default]
    Exclusive,
    /// `score >= threshold`
    Inclusive,
}

/// Cutoff applied to the best combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    #[serde(default)]
    pub mode: ThresholdMode,
}

impl Threshold {
    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            mode: ThresholdMode::Exclusive,
        }
    }

    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            mode: ThresholdMode::Inclusive,
        }
    }

    pub fn passes(&self, score: f64) -> bool {
        match self.mode {
            ThresholdMode::Exclusive => score > self.value,
            ThresholdMode::Inclusive => score >= self.value,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Weights for the 8 similarity dimensions (and optional prior)
    #[serde(default)]
    pub weights: WeightVector,

    /// Minimum best score for a guess
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Whether a score equal to the threshold classifies
    #[serde(default)]
    pub threshold_mode: ThresholdMode,

    /// Consult the rule table before scores
    #[serde(default = "default_true")]
    pub use_rules: bool,
}

fn default_threshold() -> f64 {
    1.1
}

fn default_true() -> bool {
    true
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: WeightVector::default(),
            threshold: default_threshold(),
            threshold_mode: ThresholdMode::default(),
            use_rules: true,
        }
    }
}

impl ClassifierConfig {
    pub fn threshold(&self) -> Threshold {
        Threshold {
            value: self.threshold,
            mode: self.threshold_mode,
        }
    }
}

/// Combined (business × category) scores for one weight vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    scores: Array2<f64>,
}

impl ScoreMatrix {
    pub fn new(scores: Array2<f64>) -> Self {
        Self { scores }
    }

    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    pub fn shape(&self) -> (usize, usize) {
        self.scores.dim()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.scores.row(row)
    }

    /// Column and value of the row maximum. The first column wins ties.
    pub fn best(&self, row: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (column, &score) in self.scores.row(row).iter().enumerate() {
            match best {
                Some((_, top)) if score <= top => {}
                _ if score.is_nan() => {}
                _ => best = Some((column, score)),
            }
        }
        best
    }
}

/// Weighted sum of the per-dimension matrices, plus `prior × p[j]` on column
/// `j` when the weights carry a prior. Without a prior vector `p[j] = 1`.
pub fn combine(
    matrices: &PerDimension<Array2<f64>>,
    weights: &WeightVector,
    prior: Option<&Array1<f64>>,
) -> ScoreMatrix {
    let shape = matrices[Dimension::TitleTitle].dim();
    let mut combined = Array2::<f64>::zeros(shape);

    for (dimension, matrix) in matrices.iter() {
        combined.scaled_add(weights.weight(dimension), matrix);
    }

    if let Some(prior_weight) = weights.prior() {
        match prior {
            Some(prior) => combined += &prior.mapv(|p| p * prior_weight),
            None => combined += prior_weight,
        }
    }

    ScoreMatrix::new(combined)
}

/// Builds a fresh `ScoreMatrix` per weight vector from cached similarity matrices.
#[derive(Debug, Clone)]
pub struct ScoreMatrixBuilder<'a> {
    matrices: &'a SimilarityMatrices,
    prior: Option<Array1<f64>>,
}

impl<'a> ScoreMatrixBuilder<'a> {
    pub fn new(matrices: &'a SimilarityMatrices) -> Self {
        Self {
            matrices,
            prior: None,
        }
    }

    /// Per-category prior, one entry per taxonomy column.
    pub fn with_prior(mut self, prior: Vec<f64>) -> Result<Self, ClassifyError> {
        let expected = self.matrices.codes().len();
        if prior.len() != expected {
            return Err(ClassifyError::PriorLength {
                expected,
                found: prior.len(),
            });
        }
        if let Some(column) = prior.iter().position(|p| !p.is_finite()) {
            return Err(ClassifyError::NonFinitePrior(column));
        }
        self.prior = Some(Array1::from(prior));
        Ok(self)
    }

    pub fn matrices(&self) -> &'a SimilarityMatrices {
        self.matrices
    }

    pub fn build(&self, weights: &WeightVector) -> ScoreMatrix {
        combine(self.matrices.matrices(), weights, self.prior.as_ref())
    }
}

/// How a code was reached for one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Matched an override rule
    Rule { rule: String, code: String },
    /// Best category cleared the threshold
    Scored { code: String, score: f64 },
    /// Nothing cleared the threshold; `best` is absent for an empty taxonomy
    NoGuess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        best: Option<(String, f64)>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub business_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Decision {
    /// The assigned code, empty for "no guess".
    pub fn code(&self) -> &str {
        match &self.outcome {
            Outcome::Rule { code, .. } | Outcome::Scored { code, .. } => code,
            Outcome::NoGuess { .. } => "",
        }
    }

    pub fn to_classification(&self) -> Classification {
        Classification::new(self.business_id.clone(), self.code())
    }
}

/// Decide every business (row) of `scores`.
///
/// `business_ids` and `codes` name the rows and columns of `scores`.
pub fn decide(
    business_ids: &[String],
    codes: &[String],
    scores: &ScoreMatrix,
    rules: &RuleTable,
    threshold: Threshold,
    use_rules: bool,
) -> Result<Vec<Decision>, ClassifyError> {
    let expected = (business_ids.len(), codes.len());
    if scores.shape() != expected {
        return Err(ClassifyError::ShapeMismatch {
            expected,
            found: scores.shape(),
        });
    }

    let decisions: Vec<Decision> = business_ids
        .iter()
        .enumerate()
        .map(|(row, business_id)| {
            let rule = use_rules
                .then(|| rules.matched_rule(business_id))
                .flatten();

            let outcome = match (rule, scores.best(row)) {
                (Some(rule), _) => Outcome::Rule {
                    rule: rule.name().to_string(),
                    code: rule.code().to_string(),
                },
                (None, Some((column, score))) if threshold.passes(score) => Outcome::Scored {
                    code: codes[column].clone(),
                    score,
                },
                (None, best) => Outcome::NoGuess {
                    best: best.map(|(column, score)| (codes[column].clone(), score)),
                },
            };

            Decision {
                business_id: business_id.clone(),
                outcome,
            }
        })
        .collect();

    let by_rule = decisions
        .iter()
        .filter(|d| matches!(d.outcome, Outcome::Rule { .. }))
        .count();
    let no_guess = decisions
        .iter()
        .filter(|d| matches!(d.outcome, Outcome::NoGuess { .. }))
        .count();
    debug!(
        businesses = decisions.len(),
        by_rule,
        scored = decisions.len() - by_rule - no_guess,
        no_guess,
        "Classified"
    );

    Ok(decisions)
}

/// `decide`, reduced to (business id, code) pairs.
pub fn classify(
    business_ids: &[String],
    codes: &[String],
    scores: &ScoreMatrix,
    rules: &RuleTable,
    threshold: Threshold,
    use_rules: bool,
) -> Result<Vec<Classification>, ClassifyError> {
    Ok(decide(business_ids, codes, scores, rules, threshold, use_rules)?
        .iter()
        .map(Decision::to_classification)
        .collect())
}

/// Score building plus decisions over one set of similarity matrices.
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    builder: ScoreMatrixBuilder<'a>,
    rules: &'a RuleTable,
}

impl<'a> Classifier<'a> {
    pub fn new(builder: ScoreMatrixBuilder<'a>, rules: &'a RuleTable) -> Self {
        Self { builder, rules }
    }

    pub fn run(
        &self,
        weights: &WeightVector,
        threshold: Threshold,
        use_rules: bool,
    ) -> Result<Vec<Decision>, ClassifyError> {
        if !threshold.value.is_finite() {
            return Err(ClassifyError::NonFiniteThreshold(threshold.value));
        }
        let matrices = self.builder.matrices();
        let scores = self.builder.build(weights);
        decide(
            matrices.business_ids(),
            matrices.codes(),
            &scores,
            self.rules,
            threshold,
            use_rules,
        )
    }

    pub fn run_config(&self, config: &ClassifierConfig) -> Result<Vec<Decision>, ClassifyError> {
        self.run(&config.weights, config.threshold(), config.use_rules)
    }
}
