//! Explanation generation for classification decisions.
//!
//! Converts decisions and evaluation results into human-readable text
//! suitable for CLI output and review reports.

use naicsflow_classify::{Decision, Outcome};
use naicsflow_model::Taxonomy;
use naicsflow_optimize::{Evaluation, SearchOutcome};
use serde::{Deserialize, Serialize};

/// A structured explanation of one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line)
    pub summary: String,

    /// Detailed explanation (1-2 sentences)
    pub detail: String,

    /// Evidence items supporting this decision
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence supporting a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Type of evidence
    pub kind: String,

    /// The specific value or match
    pub value: String,

    /// Optional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn title_of<'a>(taxonomy: &'a Taxonomy, code: &str) -> &'a str {
    taxonomy
        .column_of(code)
        .and_then(|column| taxonomy.get(column))
        .map(|entry| entry.title.as_str())
        .unwrap_or("unknown category")
}

/// Generate the explanation for a single decision.
pub fn explain_decision(decision: &Decision, taxonomy: &Taxonomy) -> Explanation {
    match &decision.outcome {
        Outcome::Rule { rule, code } => Explanation {
            summary: format!("{} by rule '{}'", code, rule),
            detail: format!(
                "Business {} matched the '{}' keyword rule, which assigns {} \
                 before any similarity score is considered.",
                decision.business_id, rule, code
            ),
            evidence: vec![EvidenceItem {
                kind: "rule".to_string(),
                value: rule.clone(),
                context: None,
            }],
        },

        Outcome::Scored { code, score } => Explanation {
            summary: format!("{} ({}) scored {:.3}", code, title_of(taxonomy, code), score),
            detail: format!(
                "Business {} is most similar to '{}' with a combined score of {:.3}, \
                 which clears the threshold.",
                decision.business_id,
                title_of(taxonomy, code),
                score
            ),
            evidence: vec![EvidenceItem {
                kind: "best_score".to_string(),
                value: format!("{:.3}", score),
                context: Some(code.clone()),
            }],
        },

        Outcome::NoGuess { best: Some((code, score)) } => Explanation {
            summary: "No guess".to_string(),
            detail: format!(
                "The best category for business {} was {} ({}) at {:.3}, \
                 which does not clear the threshold.",
                decision.business_id,
                code,
                title_of(taxonomy, code),
                score
            ),
            evidence: vec![EvidenceItem {
                kind: "best_score".to_string(),
                value: format!("{:.3}", score),
                context: Some(code.clone()),
            }],
        },

        Outcome::NoGuess { best: None } => Explanation {
            summary: "No guess".to_string(),
            detail: "There are no categories to score against.".to_string(),
            evidence: vec![],
        },
    }
}

/// One-line tally of how a run was decided.
pub fn summarize_decisions(decisions: &[Decision]) -> String {
    let mut by_rule = 0;
    let mut scored = 0;
    let mut no_guess = 0;
    for decision in decisions {
        match decision.outcome {
            Outcome::Rule { .. } => by_rule += 1,
            Outcome::Scored { .. } => scored += 1,
            Outcome::NoGuess { .. } => no_guess += 1,
        }
    }
    format!(
        "{} businesses: {} by rule, {} by score, {} without a guess",
        decisions.len(),
        by_rule,
        scored,
        no_guess
    )
}

pub fn summarize_evaluation(evaluation: &Evaluation) -> String {
    format!(
        "Score {}/{} ({:.2}%) over {} businesses, {} exact, {} without a guess",
        evaluation.score,
        evaluation.max_possible,
        evaluation.ratio() * 100.0,
        evaluation.evaluated,
        evaluation.exact,
        evaluation.no_guess
    )
}

/// Best candidate of a search, with its weights by dimension.
pub fn summarize_search(outcome: &SearchOutcome) -> String {
    let best = &outcome.best;
    let mut lines = vec![
        format!(
            "Best of {} trials: candidate #{}",
            outcome.trials.len(),
            best.index
        ),
        summarize_evaluation(&best.evaluation),
        format!("Threshold: {}", best.candidate.threshold),
    ];
    for (dimension, weight) in best.candidate.weights.dimensions().iter() {
        lines.push(format!("  {:<11} {}", dimension.name(), weight));
    }
    if let Some(prior) = best.candidate.weights.prior() {
        lines.push(format!("  {:<11} {}", "prior", prior));
    }
    if outcome.skipped > 0 {
        lines.push(format!("Interrupted: {} candidates skipped", outcome.skipped));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use naicsflow_model::{TaxonomyEntry, WeightVector};
    use naicsflow_optimize::{Candidate, TrialResult};
    use pretty_assertions::assert_eq;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec![TaxonomyEntry::new("111", "pet clinic", "animal care")]).unwrap()
    }

    fn decision(outcome: Outcome) -> Decision {
        Decision {
            business_id: "b1".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_explain_rule() {
        let explanation = explain_decision(
            &decision(Outcome::Rule {
                rule: "restaurant".into(),
                code: "72251".into(),
            }),
            &taxonomy(),
        );
        assert_eq!(explanation.summary, "72251 by rule 'restaurant'");
        assert_eq!(explanation.evidence[0].kind, "rule");
    }

    #[test]
    fn test_explain_scored_uses_title() {
        let explanation = explain_decision(
            &decision(Outcome::Scored {
                code: "111".into(),
                score: 1.25,
            }),
            &taxonomy(),
        );
        assert_eq!(explanation.summary, "111 (pet clinic) scored 1.250");
    }

    #[test]
    fn test_explain_no_guess() {
        let explanation = explain_decision(
            &decision(Outcome::NoGuess {
                best: Some(("111".into(), 0.5)),
            }),
            &taxonomy(),
        );
        assert!(explanation.detail.contains("does not clear the threshold"));

        let empty = explain_decision(&decision(Outcome::NoGuess { best: None }), &taxonomy());
        assert!(empty.evidence.is_empty());
    }

    #[test]
    fn test_summaries() {
        let decisions = vec![
            decision(Outcome::Scored {
                code: "111".into(),
                score: 2.0,
            }),
            decision(Outcome::NoGuess { best: None }),
        ];
        assert_eq!(
            summarize_decisions(&decisions),
            "2 businesses: 0 by rule, 1 by score, 1 without a guess"
        );

        let evaluation = Evaluation {
            score: 9,
            max_possible: 18,
            evaluated: 3,
            exact: 1,
            no_guess: 1,
        };
        assert_eq!(
            summarize_evaluation(&evaluation),
            "Score 9/18 (50.00%) over 3 businesses, 1 exact, 1 without a guess"
        );

        let outcome = SearchOutcome {
            best: TrialResult {
                index: 2,
                candidate: Candidate::new(WeightVector::uniform(1.0), 1.1).unwrap(),
                evaluation,
            },
            trials: vec![],
            skipped: 1,
        };
        let text = summarize_search(&outcome);
        assert!(text.contains("candidate #2"));
        assert!(text.contains("t_t_sim"));
        assert!(text.contains("1 candidates skipped"));
    }
}
