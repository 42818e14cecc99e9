use crate::core::error::{Error, Result};
use crate::indexing::corpus::{l2_norm, CorpusIndex, Document, Segment};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Ordered list of segment ids
pub const ENCODED_SEGMENTS_FILE: &str = "encoded_segments.json";
/// Embedding vectors, parallel to `ENCODED_SEGMENTS_FILE`
pub const SEGMENT_ENCODINGS_FILE: &str = "segment_encodings.json";
/// Segment id -> { "text": ... }
pub const SEGMENTS_DICT_FILE: &str = "segments_dict.json";
/// Document id -> { "name": ..., ... }
pub const DOCUMENTS_DICT_FILE: &str = "documents_dict.json";

/// A problem with a single corpus item.
///
/// Vector problems drop the item from the index; a missing text keeps it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("segment {id}: encoding has dimension {found}, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("segment {id}: encoding is zero or contains non-finite values")]
    InvalidVector { id: String },

    #[error("segment {id}: duplicate id")]
    DuplicateId { id: String },

    #[error("segment {id}: no text in segments dictionary")]
    MissingText { id: String },
}

/// A loaded corpus plus every per-item problem found while loading it
#[derive(Debug)]
pub struct LoadedCorpus {
    pub index: CorpusIndex,
    pub issues: Vec<IngestError>,
}

#[derive(Deserialize)]
struct SegmentEntry {
    text: String,
}

/// Load a corpus from a model directory
pub fn load_corpus(dir: &Path) -> Result<LoadedCorpus> {
    if !dir.is_dir() {
        return Err(Error::Configuration(format!(
            "Corpus directory does not exist: {}",
            dir.display()
        )));
    }

    let ids: Vec<String> = read_json(&dir.join(ENCODED_SEGMENTS_FILE))?;
    let encodings: Vec<Vec<f32>> = read_json(&dir.join(SEGMENT_ENCODINGS_FILE))?;

    let segments_path = dir.join(SEGMENTS_DICT_FILE);
    let segments: HashMap<String, SegmentEntry> = if segments_path.exists() {
        read_json(&segments_path)?
    } else {
        tracing::warn!(
            path = %segments_path.display(),
            "no segments dictionary; segment texts unavailable"
        );
        HashMap::new()
    };

    let documents_path = dir.join(DOCUMENTS_DICT_FILE);
    let documents: HashMap<String, serde_json::Value> = if documents_path.exists() {
        read_json(&documents_path)?
    } else {
        tracing::warn!(
            path = %documents_path.display(),
            "no documents dictionary; document names unavailable"
        );
        HashMap::new()
    };

    let loaded = build_corpus(ids, encodings, segments, documents)?;
    tracing::info!(
        segments = loaded.index.len(),
        documents = loaded.index.document_count(),
        issues = loaded.issues.len(),
        "loaded corpus from {}",
        dir.display()
    );
    Ok(loaded)
}

fn build_corpus(
    ids: Vec<String>,
    encodings: Vec<Vec<f32>>,
    segments: HashMap<String, SegmentEntry>,
    documents: HashMap<String, serde_json::Value>,
) -> Result<LoadedCorpus> {
    if ids.len() != encodings.len() {
        return Err(Error::Configuration(format!(
            "{} lists {} segments but {} has {} encodings",
            ENCODED_SEGMENTS_FILE,
            ids.len(),
            SEGMENT_ENCODINGS_FILE,
            encodings.len()
        )));
    }

    let expected = encodings.iter().map(|e| e.len()).find(|&len| len > 0).unwrap_or(0);
    let mut seen = HashSet::with_capacity(ids.len());

    let items: Vec<std::result::Result<(String, Vec<f32>), IngestError>> = ids
        .into_iter()
        .zip(encodings)
        .map(|(id, encoding)| check_item(id, encoding, expected, &mut seen))
        .collect();

    let mut issues = Vec::new();
    let mut kept_ids = Vec::with_capacity(items.len());
    let mut kept_encodings = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Ok((id, encoding)) => {
                kept_ids.push(id);
                kept_encodings.push(encoding);
            }
            Err(issue) => {
                tracing::warn!("skipping corpus item: {}", issue);
                issues.push(issue);
            }
        }
    }

    let mut segment_records = Vec::with_capacity(kept_ids.len());
    let mut segments = segments;
    for id in &kept_ids {
        match segments.remove(id) {
            Some(entry) => segment_records.push(Segment {
                id: id.clone(),
                text: entry.text,
            }),
            None => issues.push(IngestError::MissingText { id: id.clone() }),
        }
    }

    let document_records = documents.into_iter().map(|(id, value)| document_from_value(id, value));

    let index = CorpusIndex::new(kept_ids, kept_encodings)?
        .with_segments(segment_records)
        .with_documents(document_records);

    Ok(LoadedCorpus { index, issues })
}

fn check_item(
    id: String,
    encoding: Vec<f32>,
    expected: usize,
    seen: &mut HashSet<String>,
) -> std::result::Result<(String, Vec<f32>), IngestError> {
    if encoding.len() != expected {
        return Err(IngestError::DimensionMismatch {
            id,
            expected,
            found: encoding.len(),
        });
    }
    let norm = l2_norm(&encoding);
    if !norm.is_finite() || norm == 0.0 {
        return Err(IngestError::InvalidVector { id });
    }
    if !seen.insert(id.clone()) {
        return Err(IngestError::DuplicateId { id });
    }
    Ok((id, encoding))
}

fn document_from_value(id: String, value: serde_json::Value) -> Document {
    let mut metadata = match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let name = match metadata.remove("name") {
        Some(serde_json::Value::String(name)) => name,
        _ => id.clone(),
    };
    Document { id, name, metadata }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Parsing(format!("Failed to parse {}: {}", path.display(), e)))
}
