//! Word-vector similarity between text spans.

use crate::text::tokenize;
use crate::FeatureError;
use std::collections::HashMap;
use std::io::BufRead;

/// An in-memory word-vector vocabulary.
#[derive(Debug, Clone, Default)]
pub struct WordVectors {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    /// Read the word2vec text format: one `word v1 v2 ...` per line, with an
    /// optional leading `count dimension` header.
    pub fn read_word2vec(reader: impl BufRead) -> Result<Self, FeatureError> {
        let mut vectors = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            let values: Vec<f32> = parts
                .map(|p| p.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|e| FeatureError::WordVectorParse {
                    line: line_no,
                    message: e.to_string(),
                })?;

            // Header line: "<count> <dimension>"
            if line_no == 1 && values.len() == 1 && word.parse::<usize>().is_ok() {
                vectors.dimension = values[0] as usize;
                continue;
            }

            vectors.insert(word, values)?;
        }

        Ok(vectors)
    }

    /// Add a vector. The first insert fixes the dimension when none is set.
    pub fn insert(&mut self, word: impl Into<String>, vector: Vec<f32>) -> Result<(), FeatureError> {
        let word = word.into();
        if self.dimension == 0 {
            self.dimension = vector.len();
        }
        if vector.len() != self.dimension {
            return Err(FeatureError::VectorDimension {
                word,
                expected: self.dimension,
                found: vector.len(),
            });
        }
        self.vectors.insert(word.to_lowercase(), vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.vectors.contains_key(word)
    }

    /// Mean of the in-vocabulary token vectors, or `None` if no token is known.
    pub fn mean_vector(&self, text: &str) -> Option<Vec<f64>> {
        let mut sum = vec![0.0_f64; self.dimension];
        let mut known = 0usize;

        for token in tokenize(text) {
            if let Some(vector) = self.vectors.get(&token) {
                for (acc, v) in sum.iter_mut().zip(vector) {
                    *acc += *v as f64;
                }
                known += 1;
            }
        }

        if known == 0 {
            return None;
        }
        for acc in &mut sum {
            *acc /= known as f64;
        }
        Some(sum)
    }

    /// Cosine of the two mean vectors.
    ///
    /// NaN when either side has no in-vocabulary token or a zero mean vector.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let (Some(mean_a), Some(mean_b)) = (self.mean_vector(a), self.mean_vector(b)) else {
            return f64::NAN;
        };

        let dot: f64 = mean_a.iter().zip(&mean_b).map(|(x, y)| x * y).sum();
        let norm_a = mean_a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = mean_b.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return f64::NAN;
        }
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors() -> WordVectors {
        let text = "3 2\npet 1.0 0.0\nanimals 0.9 0.1\ndiner 0.0 1.0\n";
        WordVectors::read_word2vec(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_read_with_header() {
        let vectors = vectors();
        assert_eq!(vectors.dimension(), 2);
        assert_eq!(vectors.len(), 3);
        assert!(vectors.contains("animals"));
    }

    #[test]
    fn test_read_rejects_ragged_rows() {
        let text = "pet 1.0 0.0\ndiner 0.0\n";
        assert!(matches!(
            WordVectors::read_word2vec(text.as_bytes()),
            Err(FeatureError::VectorDimension { found: 1, expected: 2, .. })
        ));
    }

    #[test]
    fn test_read_rejects_bad_number() {
        let text = "pet 1.0 x\n";
        assert!(matches!(
            WordVectors::read_word2vec(text.as_bytes()),
            Err(FeatureError::WordVectorParse { line: 1, .. })
        ));
    }

    #[test]
    fn test_similarity_orders_semantics() {
        let vectors = vectors();
        let close = vectors.similarity("pet", "animals");
        let far = vectors.similarity("pet", "diner");
        assert!(close > 0.9);
        assert!(far.abs() < 1e-9);
    }

    #[test]
    fn test_out_of_vocabulary_is_nan() {
        let vectors = vectors();
        assert!(vectors.similarity("pet", "locksmith").is_nan());
        assert!(vectors.similarity("", "pet").is_nan());
    }

    #[test]
    fn test_unknown_tokens_are_ignored_in_mean() {
        let vectors = vectors();
        let with_noise = vectors.similarity("pet zzz", "pet");
        assert!((with_noise - 1.0).abs() < 1e-9);
    }
}
