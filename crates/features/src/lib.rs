//! Feature extraction for business classification.
//!
//! Provides the similarity signals the classifier combines:
//! - Text normalization and synonym expansion
//! - TF-IDF cosine (lexical) similarity
//! - Word-vector (embedding) similarity
//! - The 8-dimension feature extractor and the per-dimension matrices

use naicsflow_model::Dimension;
use thiserror::Error;

mod embedding;
mod extract;
mod lexical;
mod matrices;
mod text;

pub use embedding::WordVectors;
pub use extract::{sanitize_similarity, FeatureExtractor, PreparedTaxonomy};
pub use lexical::TfidfCosine;
pub use matrices::SimilarityMatrices;
pub use text::{clean_paragraph, expand_synonyms, tokenize, NoSynonyms, SynonymSource, SynonymTable};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid word vector at line {line}: {message}")]
    WordVectorParse { line: usize, message: String },

    #[error("Vector for '{word}' has dimension {found}, expected {expected}")]
    VectorDimension {
        word: String,
        expected: usize,
        found: usize,
    },

    #[error("Matrix '{dimension}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        dimension: Dimension,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Source of the two raw similarity signals between text spans.
///
/// Implementations must be shareable across worker threads.
pub trait SimilarityProvider: Sync {
    /// Bag-of-words similarity in [0, 1].
    fn lexical_similarity(&self, a: &str, b: &str) -> f64;

    /// Word-vector similarity. May be NaN when no token is in vocabulary.
    fn embedding_similarity(&self, a: &str, b: &str) -> f64;
}

/// TF-IDF cosine plus optional word vectors.
///
/// Without word vectors every embedding similarity is undefined.
#[derive(Debug, Default)]
pub struct TextSimilarity {
    lexical: TfidfCosine,
    vectors: Option<WordVectors>,
}

impl TextSimilarity {
    pub fn new(vectors: Option<WordVectors>) -> Self {
        Self {
            lexical: TfidfCosine::default(),
            vectors,
        }
    }
}

impl SimilarityProvider for TextSimilarity {
    fn lexical_similarity(&self, a: &str, b: &str) -> f64 {
        self.lexical.similarity(a, b)
    }

    fn embedding_similarity(&self, a: &str, b: &str) -> f64 {
        match &self.vectors {
            Some(vectors) => vectors.similarity(a, b),
            None => f64::NAN,
        }
    }
}
