//! TF-IDF cosine similarity over a two-document corpus.

use crate::text::tokenize;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "etc",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn english_stemmer() -> Stemmer {
    Stemmer::create(Algorithm::English)
}

/// Cosine similarity of TF-IDF vectors fitted on exactly the two texts compared.
///
/// Terms are stemmed cleaned tokens, so "animals" and "animal" are one term.
/// IDF is smoothed, `ln((1 + n) / (1 + df)) + 1` with `n = 2`, so a term present
/// in both texts still carries weight. English stop words are dropped after
/// stemming, and the stop list is stemmed the same way.
#[derive(Debug, Clone)]
pub struct TfidfCosine {
    stop_words: HashSet<String>,
}

impl Default for TfidfCosine {
    fn default() -> Self {
        let stemmer = english_stemmer();
        Self {
            stop_words: ENGLISH_STOP_WORDS
                .iter()
                .map(|word| stemmer.stem(word).into_owned())
                .collect(),
        }
    }
}

impl TfidfCosine {
    /// Similarity in [0, 1]. Either side without content terms scores 0.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let tf_a = self.term_counts(a);
        let tf_b = self.term_counts(b);
        if tf_a.is_empty() || tf_b.is_empty() {
            return 0.0;
        }

        let idf = |term: &str| {
            let df = tf_a.contains_key(term) as u32 + tf_b.contains_key(term) as u32;
            (3.0 / (1.0 + df as f64)).ln() + 1.0
        };

        let weights_a: HashMap<&str, f64> = tf_a
            .iter()
            .map(|(term, count)| (term.as_str(), *count as f64 * idf(term.as_str())))
            .collect();
        let weights_b: HashMap<&str, f64> = tf_b
            .iter()
            .map(|(term, count)| (term.as_str(), *count as f64 * idf(term.as_str())))
            .collect();

        let dot: f64 = weights_a
            .iter()
            .filter_map(|(term, wa)| weights_b.get(term).map(|wb| wa * wb))
            .sum();
        let norm_a = weights_a.values().map(|w| w * w).sum::<f64>().sqrt();
        let norm_b = weights_b.values().map(|w| w * w).sum::<f64>().sqrt();

        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }

    fn term_counts(&self, text: &str) -> HashMap<String, u32> {
        let stemmer = english_stemmer();
        let mut counts = HashMap::new();
        for token in tokenize(text) {
            let term = stemmer.stem(&token).into_owned();
            if self.stop_words.contains(&term) {
                continue;
            }
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }
}
