//! JSON and word2vec file loaders.

use crate::StoreError;
use naicsflow_features::{SynonymTable, WordVectors};
use naicsflow_model::{Business, Classification, GroundTruth, Taxonomy, TaxonomyEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn open(path: &Path) -> Result<BufReader<File>, StoreError> {
    File::open(path).map(BufReader::new).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Deserialize any JSON file.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, StoreError> {
    let path = path.as_ref();
    serde_json::from_reader(open(path)?).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a value as pretty-printed JSON, replacing the file.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<(), StoreError> {
    let path = path.as_ref();
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

pub fn load_businesses(path: impl AsRef<Path>) -> Result<Vec<Business>, StoreError> {
    let businesses: Vec<Business> = read_json(&path)?;
    if businesses.is_empty() {
        tracing::warn!(path = %path.as_ref().display(), "No businesses loaded");
    }
    tracing::info!(count = businesses.len(), "Loaded businesses");
    Ok(businesses)
}

/// Load a taxonomy, keeping only codes with `level` digits when given.
pub fn load_taxonomy(path: impl AsRef<Path>, level: Option<usize>) -> Result<Taxonomy, StoreError> {
    let entries: Vec<TaxonomyEntry> = read_json(&path)?;
    let taxonomy = Taxonomy::new(entries)?;
    let taxonomy = match level {
        Some(level) => taxonomy.at_level(level),
        None => taxonomy,
    };
    if taxonomy.is_empty() {
        tracing::warn!(path = %path.as_ref().display(), ?level, "Taxonomy is empty");
    }
    tracing::info!(count = taxonomy.len(), ?level, "Loaded taxonomy");
    Ok(taxonomy)
}

pub fn load_ground_truth(path: impl AsRef<Path>) -> Result<GroundTruth, StoreError> {
    let ground_truth: GroundTruth = read_json(&path)?;
    if ground_truth.is_empty() {
        tracing::warn!(path = %path.as_ref().display(), "Ground truth is empty");
    }
    Ok(ground_truth)
}

/// Business id to business-type label.
pub fn load_hints(path: impl AsRef<Path>) -> Result<HashMap<String, String>, StoreError> {
    read_json(path)
}

pub fn load_synonyms(path: impl AsRef<Path>) -> Result<SynonymTable, StoreError> {
    read_json(path)
}

pub fn load_classifications(path: impl AsRef<Path>) -> Result<Vec<Classification>, StoreError> {
    read_json(path)
}

/// Load vectors in the word2vec text format.
pub fn load_word_vectors(path: impl AsRef<Path>) -> Result<WordVectors, StoreError> {
    let path = path.as_ref();
    let vectors = WordVectors::read_word2vec(open(path)?).map_err(|source| StoreError::WordVectors {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(words = vectors.len(), dimension = vectors.dimension(), "Loaded word vectors");
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_load_taxonomy_filters_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        fs::write(
            &path,
            r#"[
                {"code": "72", "title": "Accommodation and Food Services"},
                {"code": "722511", "title": "Full-Service Restaurants", "description": "table service"},
                {"code": "541940", "title": "Veterinary Services"}
            ]"#,
        )
        .unwrap();

        assert_eq!(load_taxonomy(&path, None).unwrap().len(), 3);

        let six = load_taxonomy(&path, Some(6)).unwrap();
        let codes: Vec<&str> = six.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["722511", "541940"]);
    }

    #[test]
    fn test_load_taxonomy_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        fs::write(&path, r#"[{"code": "1", "title": "a"}, {"code": "1", "title": "b"}]"#).unwrap();
        assert!(matches!(load_taxonomy(&path, None), Err(StoreError::Model(_))));
    }

    #[test]
    fn test_load_businesses_accepts_unique_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("businesses.json");
        fs::write(
            &path,
            r#"[{"unique_id": "b1", "name": "Main St Vet", "business_type": "veterinary_care"}]"#,
        )
        .unwrap();

        let businesses = load_businesses(&path).unwrap();
        assert_eq!(
            businesses,
            vec![Business::new("b1", "Main St Vet", "").with_business_type("veterinary_care")]
        );
    }

    #[test]
    fn test_load_word_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        fs::write(&path, "2 3\ndog 1 0 0\ncat 0.9 0.1 0\n").unwrap();

        let vectors = load_word_vectors(&path).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors.dimension(), 3);

        fs::write(&path, "dog 1 0 0\ncat 1 0\n").unwrap();
        assert!(matches!(load_word_vectors(&path), Err(StoreError::WordVectors { .. })));
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_ground_truth(&missing).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(load_hints(&broken), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_ground_truth_and_hints() {
        let dir = tempfile::tempdir().unwrap();
        let truth = dir.path().join("truth.json");
        fs::write(&truth, r#"{"b1": "541940", "b2": "722511"}"#).unwrap();
        let ground_truth = load_ground_truth(&truth).unwrap();
        assert_eq!(ground_truth.get("b2"), Some("722511"));

        let hints = dir.path().join("hints.json");
        write_json(&hints, &HashMap::from([("b1".to_string(), "bank".to_string())])).unwrap();
        assert_eq!(load_hints(&hints).unwrap()["b1"], "bank");
    }
}
