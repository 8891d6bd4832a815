//! The 8-dimension feature extractor.

use crate::text::{clean_paragraph, expand_synonyms, NoSynonyms, SynonymSource};
use crate::SimilarityProvider;
use naicsflow_model::{Business, Dimension, FeatureVector, Taxonomy};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Replace an undefined similarity with 0.0.
pub fn sanitize_similarity(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Taxonomy titles and descriptions after normalization, in taxonomy order.
#[derive(Debug, Clone)]
pub struct PreparedTaxonomy {
    codes: Vec<String>,
    titles: Vec<String>,
    descriptions: Vec<String>,
    expand_synonyms: bool,
}

impl PreparedTaxonomy {
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}

/// Computes a `FeatureVector` for a business against every taxonomy entry.
pub struct FeatureExtractor<P> {
    provider: P,
    synonyms: Box<dyn SynonymSource>,
    hints: HashMap<String, String>,
}

impl<P: SimilarityProvider> FeatureExtractor<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            synonyms: Box::new(NoSynonyms),
            hints: HashMap::new(),
        }
    }

    pub fn with_synonyms(mut self, synonyms: impl SynonymSource + 'static) -> Self {
        self.synonyms = Box::new(synonyms);
        self
    }

    /// External business-type labels keyed by business id. These take
    /// precedence over `Business::business_type`.
    pub fn with_hints(mut self, hints: HashMap<String, String>) -> Self {
        self.hints = hints;
        self
    }

    /// Feature vectors keyed by taxonomy code.
    pub fn extract(
        &self,
        business: &Business,
        taxonomy: &Taxonomy,
        expand_synonyms: bool,
    ) -> BTreeMap<String, FeatureVector> {
        let prepared = self.prepare(taxonomy, expand_synonyms);
        prepared
            .codes
            .iter()
            .cloned()
            .zip(self.extract_prepared(business, &prepared))
            .collect()
    }

    /// Normalize the taxonomy once so it can be reused across businesses.
    pub fn prepare(&self, taxonomy: &Taxonomy, expand_synonyms: bool) -> PreparedTaxonomy {
        let mut prepared = PreparedTaxonomy {
            codes: Vec::with_capacity(taxonomy.len()),
            titles: Vec::with_capacity(taxonomy.len()),
            descriptions: Vec::with_capacity(taxonomy.len()),
            expand_synonyms,
        };
        for entry in taxonomy.iter() {
            prepared.codes.push(entry.code.clone());
            prepared.titles.push(self.normalize(&entry.title, expand_synonyms));
            prepared.descriptions.push(self.normalize(&entry.description, expand_synonyms));
        }
        prepared
    }

    /// One feature vector per prepared taxonomy entry, in taxonomy order.
    pub fn extract_prepared(&self, business: &Business, taxonomy: &PreparedTaxonomy) -> Vec<FeatureVector> {
        let expand = taxonomy.expand_synonyms;
        let name = self.normalize(&self.name_with_hint(business), expand);
        let description = self.normalize(&business.description, expand);

        taxonomy
            .titles
            .iter()
            .zip(&taxonomy.descriptions)
            .map(|(title, category_description)| {
                FeatureVector::from_fn(|dimension| {
                    let (left, right) = match dimension {
                        Dimension::TitleTitle | Dimension::TitleTitleEmbedding => (&name, title),
                        Dimension::TitleDescription | Dimension::TitleDescriptionEmbedding => {
                            (&name, category_description)
                        }
                        Dimension::DescriptionTitle | Dimension::DescriptionTitleEmbedding => {
                            (&description, title)
                        }
                        Dimension::DescriptionDescription
                        | Dimension::DescriptionDescriptionEmbedding => {
                            (&description, category_description)
                        }
                    };

                    if dimension.is_embedding() {
                        let raw = self.provider.embedding_similarity(left, right);
                        if raw.is_nan() {
                            trace!(business = %business.id, %dimension, "embedding similarity undefined, using 0.0");
                        }
                        sanitize_similarity(raw)
                    } else {
                        self.provider.lexical_similarity(left, right)
                    }
                })
            })
            .collect()
    }

    fn name_with_hint(&self, business: &Business) -> String {
        match business.category_hint(&self.hints) {
            Some(hint) => format!("{} {}", business.name, hint),
            None => business.name.clone(),
        }
    }

    fn normalize(&self, text: &str, expand: bool) -> String {
        if expand {
            expand_synonyms(text, self.synonyms.as_ref())
        } else {
            clean_paragraph(text)
        }
    }
}
