//! Per-dimension similarity matrices across all businesses and categories.

use crate::extract::FeatureExtractor;
use crate::{FeatureError, SimilarityProvider};
use naicsflow_model::{Business, Dimension, FeatureVector, PerDimension, Taxonomy};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

const PROGRESS_EVERY: usize = 1000;

/// Businesses featurized per parallel batch. Bounds the feature vectors held
/// outside the matrices at any one time.
const CHUNK_ROWS: usize = 256;

/// Eight (business × category) matrices, one per similarity dimension.
///
/// Row `i` is `business_ids[i]`, column `j` is `codes[j]`. Frozen once built;
/// weight trials only ever read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMatrices")]
pub struct SimilarityMatrices {
    business_ids: Vec<String>,
    codes: Vec<String>,
    matrices: PerDimension<Array2<f64>>,
}

#[derive(Deserialize)]
struct RawMatrices {
    business_ids: Vec<String>,
    codes: Vec<String>,
    matrices: PerDimension<Array2<f64>>,
}

impl TryFrom<RawMatrices> for SimilarityMatrices {
    type Error = FeatureError;

    fn try_from(raw: RawMatrices) -> Result<Self, Self::Error> {
        Self::from_parts(raw.business_ids, raw.codes, raw.matrices)
    }
}

impl SimilarityMatrices {
    /// Extract features for every business in parallel and assemble the matrices.
    pub fn compute<P: SimilarityProvider>(
        extractor: &FeatureExtractor<P>,
        businesses: &[Business],
        taxonomy: &Taxonomy,
        expand_synonyms: bool,
    ) -> Self {
        let prepared = extractor.prepare(taxonomy, expand_synonyms);
        let total = businesses.len();
        let done = AtomicUsize::new(0);

        info!(
            businesses = total,
            categories = prepared.len(),
            expand_synonyms,
            "Computing similarity matrices"
        );

        let shape = (total, prepared.len());
        let mut matrices = PerDimension::from_fn(|_| Array2::<f64>::zeros(shape));

        for (chunk_index, chunk) in businesses.chunks(CHUNK_ROWS).enumerate() {
            let rows: Vec<Vec<FeatureVector>> = chunk
                .par_iter()
                .map(|business| {
                    let row = extractor.extract_prepared(business, &prepared);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if finished % PROGRESS_EVERY == 0 {
                        debug!(finished, total, "Featurized businesses");
                    }
                    row
                })
                .collect();

            let offset = chunk_index * CHUNK_ROWS;
            for (i, row) in rows.iter().enumerate() {
                for (column, features) in row.iter().enumerate() {
                    for (dimension, value) in features.iter() {
                        matrices[dimension][[offset + i, column]] = *value;
                    }
                }
            }
        }

        Self {
            business_ids: businesses.iter().map(|b| b.id.clone()).collect(),
            codes: prepared.codes().to_vec(),
            matrices,
        }
    }

    /// Assemble from precomputed parts, checking every matrix shape.
    pub fn from_parts(
        business_ids: Vec<String>,
        codes: Vec<String>,
        matrices: PerDimension<Array2<f64>>,
    ) -> Result<Self, FeatureError> {
        let expected = (business_ids.len(), codes.len());
        for (dimension, matrix) in matrices.iter() {
            if matrix.dim() != expected {
                return Err(FeatureError::ShapeMismatch {
                    dimension,
                    expected,
                    found: matrix.dim(),
                });
            }
        }
        Ok(Self {
            business_ids,
            codes,
            matrices,
        })
    }

    pub fn matrix(&self, dimension: Dimension) -> &Array2<f64> {
        &self.matrices[dimension]
    }

    pub fn matrices(&self) -> &PerDimension<Array2<f64>> {
        &self.matrices
    }

    pub fn business_ids(&self) -> &[String] {
        &self.business_ids
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// (businesses, categories)
    pub fn shape(&self) -> (usize, usize) {
        (self.business_ids.len(), self.codes.len())
    }
}
