//! Featurize → score → classify → evaluate over a tiny taxonomy.

use naicsflow_classify::{Classifier, ScoreMatrixBuilder, Threshold};
use naicsflow_features::{tokenize, FeatureExtractor, SimilarityMatrices, SimilarityProvider, TextSimilarity};
use naicsflow_model::{Business, Classification, Dimension, GroundTruth, Taxonomy, TaxonomyEntry, WeightVector};
use naicsflow_optimize::{evaluate, Candidate, ExplicitGrid, Optimizer};
use naicsflow_rules::{default_rules, RuleTable};
use std::collections::{HashMap, HashSet};

/// Jaccard overlap of 4-character token prefixes. Gives the search test
/// scores that are easy to reason about.
struct StemOverlap;

impl StemOverlap {
    fn stems(text: &str) -> HashSet<String> {
        tokenize(text)
            .into_iter()
            .map(|t| t.chars().take(4).collect())
            .collect()
    }
}

impl SimilarityProvider for StemOverlap {
    fn lexical_similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (Self::stems(a), Self::stems(b));
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }

    fn embedding_similarity(&self, _a: &str, _b: &str) -> f64 {
        f64::NAN
    }
}

fn taxonomy() -> Taxonomy {
    Taxonomy::new(vec![
        TaxonomyEntry::new("111", "pet clinic", "animal care"),
        TaxonomyEntry::new("222", "diner", "food service"),
    ])
    .unwrap()
}

#[test]
fn vet_is_classified_as_pet_clinic() {
    let businesses = vec![Business::new("b1", "Main St Vet", "we treat animals")];
    let taxonomy = taxonomy();
    let extractor = FeatureExtractor::new(TextSimilarity::default());
    let matrices = SimilarityMatrices::compute(&extractor, &businesses, &taxonomy, false);

    // "animals" and "animal" stem to the same term.
    let description = matrices.matrix(Dimension::DescriptionDescription);
    assert!(description[[0, 0]] > 0.0);
    assert_eq!(description[[0, 1]], 0.0);

    let rules = RuleTable::build(default_rules(), &businesses, &HashMap::new());
    assert!(rules.lookup("b1").is_none());

    let classifier = Classifier::new(ScoreMatrixBuilder::new(&matrices), &rules);
    let decisions = classifier
        .run(&WeightVector::uniform(1.0), Threshold::exclusive(0.0), true)
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].to_classification(), Classification::new("b1", "111"));
}

#[test]
fn search_prefers_weights_that_use_the_signal() {
    let businesses = vec![
        Business::new("b1", "Main St Vet", "we treat animals"),
        Business::new("b2", "Downtown Diner", "food all day"),
        Business::new("b3", "Corner Bistro", "a restaurant with food"),
    ];
    let taxonomy = taxonomy();
    let extractor = FeatureExtractor::new(StemOverlap);
    let matrices = SimilarityMatrices::compute(&extractor, &businesses, &taxonomy, false);
    let rules = RuleTable::build(default_rules(), &businesses, &HashMap::new());
    let ground_truth: GroundTruth = [("b1", "111"), ("b2", "222"), ("b3", "222")].into_iter().collect();

    let optimizer = Optimizer::new(Classifier::new(ScoreMatrixBuilder::new(&matrices), &rules), &ground_truth)
        .with_rules(false);
    let grid = ExplicitGrid(vec![
        Candidate::new(WeightVector::uniform(0.0), 0.1).unwrap(),
        Candidate::new(WeightVector::uniform(1.0), 0.1).unwrap(),
    ]);

    let outcome = optimizer.search(&grid).unwrap();
    assert_eq!(outcome.best.index, 1);
    assert_eq!(outcome.trials[0].evaluation.score, 0);
    // Three-digit codes earn at most 3 of the 6 points each.
    assert_eq!(outcome.best.evaluation.score, 9);
    assert_eq!(outcome.best.evaluation.max_possible, 18);

    // With rules on, the restaurant rule overrides b3 with a 5-digit code.
    let (decisions, _) = Optimizer::new(Classifier::new(ScoreMatrixBuilder::new(&matrices), &rules), &ground_truth)
        .trial(&grid.0[1])
        .unwrap();
    let classifications: Vec<Classification> = decisions.iter().map(|d| d.to_classification()).collect();
    assert_eq!(classifications[2], Classification::new("b3", "72251"));
    assert_eq!(evaluate(&classifications, &ground_truth).score, 3 + 3);
}
