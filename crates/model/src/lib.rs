//! Core domain model for NaicsFlow business classification.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `Business`: A business record to classify
//! - `TaxonomyEntry` / `Taxonomy`: The fixed, ordered set of industry codes
//! - `Dimension` / `PerDimension`: The 8 named similarity signals
//! - `FeatureVector` / `WeightVector`: Values and weights keyed by dimension
//! - `Classification`: The code (or "no guess") assigned to a business
//! - `GroundTruth`: Hand-assigned reference codes

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;
use thiserror::Error;

/// Number of similarity dimensions.
pub const DIMENSION_COUNT: usize = 8;

/// Key used for the optional constant bias term in a weight map.
pub const PRIOR_KEY: &str = "prior";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Empty taxonomy code for entry '{0}'")]
    EmptyCode(String),

    #[error("Duplicate taxonomy code: {0}")]
    DuplicateCode(String),

    #[error(transparent)]
    Weight(#[from] WeightError),
}

/// Errors raised while building a dimension-keyed mapping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("Missing weight for dimension '{0}'")]
    MissingDimension(Dimension),

    #[error("Unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("Weight '{name}' is not finite: {value}")]
    NonFinite { name: String, value: f64 },
}

/// One of the 8 similarity signals between a business and a taxonomy entry.
///
/// "Title" on the business side means the business name (plus any categorical
/// hint); on the taxonomy side it is the entry title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    /// Lexical: name vs title
    #[serde(rename = "t_t_sim")]
    TitleTitle,
    /// Lexical: name vs description
    #[serde(rename = "t_d_sim")]
    TitleDescription,
    /// Lexical: description vs title
    #[serde(rename = "d_t_sim")]
    DescriptionTitle,
    /// Lexical: description vs description
    #[serde(rename = "d_d_sim")]
    DescriptionDescription,
    /// Embedding: name vs title
    #[serde(rename = "t_t_w2vsim")]
    TitleTitleEmbedding,
    /// Embedding: name vs description
    #[serde(rename = "t_d_w2vsim")]
    TitleDescriptionEmbedding,
    /// Embedding: description vs title
    #[serde(rename = "d_t_w2vsim")]
    DescriptionTitleEmbedding,
    /// Embedding: description vs description
    #[serde(rename = "d_d_w2vsim")]
    DescriptionDescriptionEmbedding,
}

impl Dimension {
    /// All dimensions in canonical order: 4 lexical, then 4 embedding.
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Self::TitleTitle,
        Self::TitleDescription,
        Self::DescriptionTitle,
        Self::DescriptionDescription,
        Self::TitleTitleEmbedding,
        Self::TitleDescriptionEmbedding,
        Self::DescriptionTitleEmbedding,
        Self::DescriptionDescriptionEmbedding,
    ];

    /// Stable wire name used in config files and reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::TitleTitle => "t_t_sim",
            Self::TitleDescription => "t_d_sim",
            Self::DescriptionTitle => "d_t_sim",
            Self::DescriptionDescription => "d_d_sim",
            Self::TitleTitleEmbedding => "t_t_w2vsim",
            Self::TitleDescriptionEmbedding => "t_d_w2vsim",
            Self::DescriptionTitleEmbedding => "d_t_w2vsim",
            Self::DescriptionDescriptionEmbedding => "d_d_w2vsim",
        }
    }

    /// Position of this dimension in canonical order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_embedding(self) -> bool {
        self.index() >= DIMENSION_COUNT / 2
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = WeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| WeightError::UnknownDimension(s.to_string()))
    }
}

/// A total mapping from every `Dimension` to a value.
///
/// Access is only by `Dimension`, so values can never drift out of alignment
/// with the signal they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct PerDimension<T> {
    values: [T; DIMENSION_COUNT],
}

impl<T> PerDimension<T> {
    /// Build by evaluating `f` for every dimension in canonical order.
    pub fn from_fn(mut f: impl FnMut(Dimension) -> T) -> Self {
        Self {
            values: std::array::from_fn(|i| f(Dimension::ALL[i])),
        }
    }

    /// Build from a name-keyed map, rejecting unknown and missing keys.
    pub fn from_named<K: AsRef<str>>(named: impl IntoIterator<Item = (K, T)>) -> Result<Self, WeightError> {
        let mut slots: [Option<T>; DIMENSION_COUNT] = Default::default();
        for (key, value) in named {
            let dimension: Dimension = key.as_ref().parse()?;
            slots[dimension.index()] = Some(value);
        }

        let mut values = Vec::with_capacity(DIMENSION_COUNT);
        for (dimension, slot) in Dimension::ALL.into_iter().zip(slots) {
            values.push(slot.ok_or(WeightError::MissingDimension(dimension))?);
        }

        match values.try_into() {
            Ok(values) => Ok(Self { values }),
            Err(_) => unreachable!("one value per dimension"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &T)> {
        Dimension::ALL.into_iter().zip(self.values.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Dimension, &T) -> U) -> PerDimension<U> {
        PerDimension::from_fn(|d| f(d, &self.values[d.index()]))
    }
}

impl<T: Default> Default for PerDimension<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Dimension> for PerDimension<T> {
    type Output = T;

    fn index(&self, dimension: Dimension) -> &T {
        &self.values[dimension.index()]
    }
}

impl<T> IndexMut<Dimension> for PerDimension<T> {
    fn index_mut(&mut self, dimension: Dimension) -> &mut T {
        &mut self.values[dimension.index()]
    }
}

impl<T: Serialize> Serialize for PerDimension<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(DIMENSION_COUNT))?;
        for (dimension, value) in self.iter() {
            map.serialize_entry(dimension.name(), value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for PerDimension<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let named = BTreeMap::<String, T>::deserialize(deserializer)?;
        Self::from_named(named).map_err(de::Error::custom)
    }
}

/// Similarity scores of one (business, taxonomy entry) pair.
pub type FeatureVector = PerDimension<f64>;

/// Weights applied to the 8 similarity matrices, plus an optional prior bias.
///
/// Serialized as a flat JSON object keyed by dimension name, with an optional
/// `prior` key. A map missing any dimension is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct WeightVector {
    dimensions: PerDimension<f64>,
    prior: Option<f64>,
}

impl WeightVector {
    pub fn new(dimensions: PerDimension<f64>, prior: Option<f64>) -> Result<Self, WeightError> {
        for (dimension, value) in dimensions.iter() {
            check_finite(dimension.name(), *value)?;
        }
        if let Some(prior) = prior {
            check_finite(PRIOR_KEY, prior)?;
        }
        Ok(Self { dimensions, prior })
    }

    /// Same weight on every dimension, no prior.
    pub fn uniform(weight: f64) -> Self {
        Self {
            dimensions: PerDimension::from_fn(|_| weight),
            prior: None,
        }
    }

    pub fn weight(&self, dimension: Dimension) -> f64 {
        self.dimensions[dimension]
    }

    pub fn prior(&self) -> Option<f64> {
        self.prior
    }

    pub fn dimensions(&self) -> &PerDimension<f64> {
        &self.dimensions
    }

    /// Copy with one dimension's weight replaced.
    pub fn with_weight(mut self, dimension: Dimension, weight: f64) -> Result<Self, WeightError> {
        check_finite(dimension.name(), weight)?;
        self.dimensions[dimension] = weight;
        Ok(self)
    }

    pub fn with_prior(mut self, prior: Option<f64>) -> Result<Self, WeightError> {
        if let Some(prior) = prior {
            check_finite(PRIOR_KEY, prior)?;
        }
        self.prior = prior;
        Ok(self)
    }
}

impl Default for WeightVector {
    /// Weights tuned on the hand-labelled challenge set.
    fn default() -> Self {
        let dimensions = PerDimension::from_fn(|d| match d {
            Dimension::DescriptionDescription => 0.862052344506,
            Dimension::DescriptionDescriptionEmbedding => 0.1,
            Dimension::DescriptionTitle => 0.7694268978,
            Dimension::DescriptionTitleEmbedding => 0.1,
            Dimension::TitleDescription => 1.0,
            Dimension::TitleDescriptionEmbedding => 0.2,
            Dimension::TitleTitle => 1.5,
            Dimension::TitleTitleEmbedding => 0.5,
        });
        Self {
            dimensions,
            prior: Some(0.05),
        }
    }
}

impl TryFrom<BTreeMap<String, f64>> for WeightVector {
    type Error = WeightError;

    fn try_from(mut named: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let prior = named.remove(PRIOR_KEY);
        Self::new(PerDimension::from_named(named)?, prior)
    }
}

impl From<WeightVector> for BTreeMap<String, f64> {
    fn from(weights: WeightVector) -> Self {
        let mut named: BTreeMap<String, f64> = weights
            .dimensions
            .iter()
            .map(|(d, w)| (d.name().to_string(), *w))
            .collect();
        if let Some(prior) = weights.prior {
            named.insert(PRIOR_KEY.to_string(), prior);
        }
        named
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), WeightError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(WeightError::NonFinite {
            name: name.to_string(),
            value,
        })
    }
}

/// A business record to classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    /// Unique identifier
    #[serde(alias = "unique_id")]
    pub id: String,

    /// Business name
    #[serde(default)]
    pub name: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Coarse external category label (e.g. a places-API business type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
}

impl Business {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            business_type: None,
        }
    }

    pub fn with_business_type(mut self, business_type: impl Into<String>) -> Self {
        self.business_type = Some(business_type.into());
        self
    }

    /// The categorical hint for this business. An external label keyed by
    /// business id wins over the record's own `business_type`.
    pub fn category_hint<'a>(&'a self, external: &'a HashMap<String, String>) -> Option<&'a str> {
        external
            .get(&self.id)
            .or(self.business_type.as_ref())
            .map(String::as_str)
    }
}

/// One industry category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Hierarchical numeric code (e.g. "722511")
    pub code: String,

    /// Category title
    pub title: String,

    /// Category description
    #[serde(default)]
    pub description: String,
}

impl TaxonomyEntry {
    pub fn new(code: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    /// Depth in the hierarchy, i.e. the number of digits.
    pub fn level(&self) -> usize {
        self.code.len()
    }
}

/// The fixed, ordered category set. Column `j` of every score matrix is `entries[j]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Taxonomy {
    entries: Vec<TaxonomyEntry>,
    columns: HashMap<String, usize>,
}

impl Taxonomy {
    pub fn new(entries: Vec<TaxonomyEntry>) -> Result<Self, ModelError> {
        let mut columns = HashMap::with_capacity(entries.len());
        for (column, entry) in entries.iter().enumerate() {
            if entry.code.trim().is_empty() {
                return Err(ModelError::EmptyCode(entry.title.clone()));
            }
            if columns.insert(entry.code.clone(), column).is_some() {
                return Err(ModelError::DuplicateCode(entry.code.clone()));
            }
        }
        Ok(Self { entries, columns })
    }

    /// Keep only entries at the given hierarchy level, preserving order.
    pub fn at_level(&self, level: usize) -> Self {
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.level() == level)
            .cloned()
            .collect();
        let columns = entries
            .iter()
            .enumerate()
            .map(|(column, e)| (e.code.clone(), column))
            .collect();
        Self { entries, columns }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&TaxonomyEntry> {
        self.entries.get(column)
    }

    pub fn column_of(&self, code: &str) -> Option<usize> {
        self.columns.get(code).copied()
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaxonomyEntry> {
        self.entries.iter()
    }
}

impl Serialize for Taxonomy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Taxonomy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<TaxonomyEntry>::deserialize(deserializer)?;
        Self::new(entries).map_err(de::Error::custom)
    }
}

/// The code assigned to one business. An empty code means "no guess".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub business_id: String,
    #[serde(default)]
    pub code: String,
}

impl Classification {
    pub fn new(business_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            code: code.into(),
        }
    }

    pub fn no_guess(business_id: impl Into<String>) -> Self {
        Self::new(business_id, String::new())
    }

    pub fn is_guess(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Hand-assigned reference codes, keyed by business identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundTruth {
    codes: BTreeMap<String, String>,
}

impl GroundTruth {
    pub fn get(&self, business_id: &str) -> Option<&str> {
        self.codes.get(business_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.codes.iter().map(|(id, code)| (id.as_str(), code.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GroundTruth {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dimension_names_round_trip() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.name().parse::<Dimension>(), Ok(dimension));
        }
        assert!(matches!(
            "x_y_sim".parse::<Dimension>(),
            Err(WeightError::UnknownDimension(_))
        ));
    }

    #[test]
    fn test_embedding_dimensions_follow_lexical() {
        let embedding: Vec<_> = Dimension::ALL.iter().map(|d| d.is_embedding()).collect();
        assert_eq!(embedding, vec![false, false, false, false, true, true, true, true]);
    }

    #[test]
    fn test_weights_from_json() {
        let json = r#"{
            "d_d_sim": 0.8, "d_d_w2vsim": 0.1, "d_t_sim": 0.7, "d_t_w2vsim": 0.1,
            "t_d_sim": 1.0, "t_d_w2vsim": 0.2, "t_t_sim": 1.5, "t_t_w2vsim": 0.5,
            "prior": 0.05
        }"#;
        let weights: WeightVector = serde_json::from_str(json).unwrap();
        assert_eq!(weights.weight(Dimension::TitleTitle), 1.5);
        assert_eq!(weights.weight(Dimension::DescriptionTitleEmbedding), 0.1);
        assert_eq!(weights.prior(), Some(0.05));
    }

    #[test]
    fn test_weights_missing_dimension_rejected() {
        let mut named: BTreeMap<String, f64> = Dimension::ALL
            .iter()
            .map(|d| (d.name().to_string(), 1.0))
            .collect();
        named.remove("t_d_w2vsim");
        assert_eq!(
            WeightVector::try_from(named).unwrap_err(),
            WeightError::MissingDimension(Dimension::TitleDescriptionEmbedding)
        );

        let json = r#"{"t_t_sim": 1.0}"#;
        assert!(serde_json::from_str::<WeightVector>(json).is_err());
    }

    #[test]
    fn test_weights_unknown_key_rejected() {
        let mut named: BTreeMap<String, f64> = Dimension::ALL
            .iter()
            .map(|d| (d.name().to_string(), 1.0))
            .collect();
        named.insert("bias".to_string(), 1.0);
        assert_eq!(
            WeightVector::try_from(named).unwrap_err(),
            WeightError::UnknownDimension("bias".to_string())
        );
    }

    #[test]
    fn test_weights_non_finite_rejected() {
        let err = WeightVector::uniform(1.0)
            .with_weight(Dimension::TitleTitle, f64::NAN)
            .unwrap_err();
        assert!(matches!(err, WeightError::NonFinite { .. }));
    }

    #[test]
    fn test_weights_serialization_keeps_prior() {
        let weights = WeightVector::default();
        let json = serde_json::to_string(&weights).unwrap();
        let parsed: WeightVector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, weights);
    }

    #[test]
    fn test_taxonomy_rejects_duplicates() {
        let entries = vec![
            TaxonomyEntry::new("111", "a", ""),
            TaxonomyEntry::new("111", "b", ""),
        ];
        assert!(matches!(Taxonomy::new(entries), Err(ModelError::DuplicateCode(code)) if code == "111"));
    }

    #[test]
    fn test_taxonomy_level_filter() {
        let taxonomy = Taxonomy::new(vec![
            TaxonomyEntry::new("72", "Accommodation and Food Services", ""),
            TaxonomyEntry::new("722511", "Full-Service Restaurants", ""),
            TaxonomyEntry::new("541940", "Veterinary Services", ""),
        ])
        .unwrap();
        let six = taxonomy.at_level(6);
        assert_eq!(six.len(), 2);
        assert_eq!(six.column_of("541940"), Some(1));
        assert_eq!(six.column_of("72"), None);
    }

    #[test]
    fn test_category_hint_precedence() {
        let business = Business::new("b1", "Main St", "").with_business_type("bar");
        let none = HashMap::new();
        assert_eq!(business.category_hint(&none), Some("bar"));

        let external = HashMap::from([("b1".to_string(), "restaurant".to_string())]);
        assert_eq!(business.category_hint(&external), Some("restaurant"));
        assert_eq!(Business::new("b2", "x", "").category_hint(&external), None);
    }

    #[test]
    fn test_business_accepts_unique_id_alias() {
        let json = r#"{"unique_id": "b1", "name": "Main St Vet", "description": "we treat animals"}"#;
        let business: Business = serde_json::from_str(json).unwrap();
        assert_eq!(business.id, "b1");
        assert_eq!(business.business_type, None);
    }
}
