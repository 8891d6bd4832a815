//! Business stores, classification sinks and file loaders.
//!
//! The classifier only ever sees plain values; this crate is where they come
//! from and where results go. `BusinessStore` and `ClassificationSink` keep
//! the pipeline independent of whatever holds the records.

mod load;

pub use load::{
    load_businesses, load_classifications, load_ground_truth, load_hints, load_synonyms, load_taxonomy,
    load_word_vectors, read_json, write_json,
};

use naicsflow_features::FeatureError;
use naicsflow_model::{Business, Classification, ModelError};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from store and loader operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid word vectors in {path}: {source}")]
    WordVectors {
        path: PathBuf,
        source: FeatureError,
    },

    #[error("Duplicate business id: {0}")]
    DuplicateBusiness(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// One page of records. Pages are zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.per_page > 0 && (self.page + 1) * self.per_page < self.total
    }
}

/// Paged, stable-ordered access to business records.
pub trait BusinessStore {
    fn page(&self, page: usize, per_page: usize) -> Page<Business>;

    fn exists(&self, business_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain every page of a store, in store order.
pub fn collect_all(store: &dyn BusinessStore, per_page: usize) -> Vec<Business> {
    let mut out = Vec::with_capacity(store.len());
    if per_page == 0 {
        return out;
    }

    let mut page = 0;
    loop {
        let current = store.page(page, per_page);
        let has_next = current.has_next();
        out.extend(current.items);
        if !has_next {
            return out;
        }
        page += 1;
    }
}

/// Receives the code chosen for each business.
pub trait ClassificationSink {
    /// Record a code, replacing any earlier one for the same business.
    fn record(&mut self, business_id: &str, code: &str) -> Result<(), StoreError>;

    fn record_all(&mut self, classifications: &[Classification]) -> Result<(), StoreError> {
        for classification in classifications {
            self.record(&classification.business_id, &classification.code)?;
        }
        Ok(())
    }
}

/// Businesses and classifications held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    businesses: Vec<Business>,
    index: HashMap<String, usize>,
    classifications: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new(businesses: Vec<Business>) -> Result<Self, StoreError> {
        let mut index = HashMap::with_capacity(businesses.len());
        for (position, business) in businesses.iter().enumerate() {
            if index.insert(business.id.clone(), position).is_some() {
                return Err(StoreError::DuplicateBusiness(business.id.clone()));
            }
        }
        Ok(Self {
            businesses,
            index,
            classifications: BTreeMap::new(),
        })
    }

    pub fn businesses(&self) -> &[Business] {
        &self.businesses
    }

    pub fn get(&self, business_id: &str) -> Option<&Business> {
        self.index.get(business_id).map(|&i| &self.businesses[i])
    }

    pub fn classification(&self, business_id: &str) -> Option<&str> {
        self.classifications.get(business_id).map(String::as_str)
    }

    /// Recorded classifications, ordered by business id.
    pub fn classifications(&self) -> Vec<Classification> {
        self.classifications
            .iter()
            .map(|(id, code)| Classification::new(id.as_str(), code.as_str()))
            .collect()
    }
}

impl BusinessStore for MemoryStore {
    fn page(&self, page: usize, per_page: usize) -> Page<Business> {
        let start = page.saturating_mul(per_page).min(self.businesses.len());
        let end = start.saturating_add(per_page).min(self.businesses.len());
        Page {
            items: self.businesses[start..end].to_vec(),
            page,
            per_page,
            total: self.businesses.len(),
        }
    }

    fn exists(&self, business_id: &str) -> bool {
        self.index.contains_key(business_id)
    }

    fn len(&self) -> usize {
        self.businesses.len()
    }
}

impl ClassificationSink for MemoryStore {
    fn record(&mut self, business_id: &str, code: &str) -> Result<(), StoreError> {
        self.classifications.insert(business_id.to_string(), code.to_string());
        Ok(())
    }
}

/// Buffers classifications and writes them as a JSON array on `flush`.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    classifications: BTreeMap<String, String>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            classifications: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.classifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }

    /// Write everything recorded so far. Returns the number of records written.
    pub fn flush(&self) -> Result<usize, StoreError> {
        let records: Vec<Classification> = self
            .classifications
            .iter()
            .map(|(id, code)| Classification::new(id.as_str(), code.as_str()))
            .collect();
        write_json(&self.path, &records)?;
        tracing::info!(path = %self.path.display(), count = records.len(), "Wrote classifications");
        Ok(records.len())
    }
}

impl ClassificationSink for JsonFileSink {
    fn record(&mut self, business_id: &str, code: &str) -> Result<(), StoreError> {
        self.classifications.insert(business_id.to_string(), code.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            Business::new("b1", "Main St Vet", ""),
            Business::new("b2", "Downtown Diner", ""),
            Business::new("b3", "Corner Bistro", ""),
        ])
        .unwrap()
    }

    #[test]
    fn test_pages_are_stable_and_bounded() {
        let store = store();
        let first = store.page(0, 2);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].id, "b1");
        assert!(first.has_next());

        let second = store.page(1, 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, "b3");
        assert!(!second.has_next());

        assert!(store.page(5, 2).items.is_empty());
        assert!(!store.page(0, 0).has_next());
    }

    #[test]
    fn test_collect_all_preserves_order() {
        let ids: Vec<String> = collect_all(&store(), 2).into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_exists_and_duplicates() {
        let store = store();
        assert!(store.exists("b2"));
        assert!(!store.exists("b9"));
        assert_eq!(store.get("b3").map(|b| b.name.as_str()), Some("Corner Bistro"));

        let duplicate = MemoryStore::new(vec![Business::new("b1", "a", ""), Business::new("b1", "b", "")]);
        assert!(matches!(duplicate, Err(StoreError::DuplicateBusiness(id)) if id == "b1"));
    }

    #[test]
    fn test_record_overwrites() {
        let mut store = store();
        store.record("b1", "111").unwrap();
        store.record("b1", "541940").unwrap();
        store.record("b2", "").unwrap();

        assert_eq!(store.classification("b1"), Some("541940"));
        assert_eq!(
            store.classifications(),
            vec![Classification::new("b1", "541940"), Classification::no_guess("b2")]
        );
    }

    #[test]
    fn test_json_sink_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut sink = JsonFileSink::new(&path);
        sink.record_all(&[Classification::new("b2", "722511"), Classification::new("b1", "111")])
            .unwrap();
        sink.record("b2", "72251").unwrap();
        assert_eq!(sink.flush().unwrap(), 2);

        let written = load_classifications(&path).unwrap();
        assert_eq!(
            written,
            vec![Classification::new("b1", "111"), Classification::new("b2", "72251")]
        );
    }
}
