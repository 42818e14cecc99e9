use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A segment of corpus text, e.g. a constitutional section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment id, usually "<document_id>/<locator>"
    pub id: String,
    pub text: String,
}

/// A source document that segments belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Any additional fields carried by the document entry
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Document id for a segment id: everything before the first '/'
pub fn document_id(segment_id: &str) -> &str {
    segment_id.split('/').next().unwrap_or(segment_id)
}

/// Immutable, ordered bijection between segment ids and embedding vectors.
///
/// Vectors are stored row-major in one contiguous buffer so that batched
/// similarity computations walk memory linearly. The row order is the order
/// the ids were supplied in.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    dim: usize,
    data: Vec<f32>,
    norms: Vec<f64>,
    segments: HashMap<String, Segment>,
    documents: HashMap<String, Document>,
}

impl CorpusIndex {
    /// Build an index from parallel lists of ids and vectors
    pub fn new(ids: Vec<String>, encodings: Vec<Vec<f32>>) -> Result<Self> {
        if ids.len() != encodings.len() {
            return Err(Error::Configuration(format!(
                "Corpus has {} segment ids but {} encodings",
                ids.len(),
                encodings.len()
            )));
        }

        let dim = encodings.first().map(|v| v.len()).unwrap_or(0);
        if !encodings.is_empty() && dim == 0 {
            return Err(Error::Configuration("Corpus encodings are empty vectors".to_string()));
        }

        let mut positions = HashMap::with_capacity(ids.len());
        let mut data = Vec::with_capacity(ids.len() * dim);
        let mut norms = Vec::with_capacity(ids.len());

        for (row, (id, encoding)) in ids.iter().zip(encodings.iter()).enumerate() {
            if encoding.len() != dim {
                return Err(Error::Configuration(format!(
                    "Encoding for {} has dimension {}, expected {}",
                    id,
                    encoding.len(),
                    dim
                )));
            }
            let norm = l2_norm(encoding);
            if !norm.is_finite() || norm == 0.0 {
                return Err(Error::Configuration(format!(
                    "Encoding for {} is zero or non-finite",
                    id
                )));
            }
            if positions.insert(id.clone(), row).is_some() {
                return Err(Error::Configuration(format!("Duplicate segment id: {}", id)));
            }
            data.extend_from_slice(encoding);
            norms.push(norm);
        }

        Ok(Self {
            ids,
            positions,
            dim,
            data,
            norms,
            segments: HashMap::new(),
            documents: HashMap::new(),
        })
    }

    /// Attach segment texts. Segments for ids outside the index are ignored.
    pub fn with_segments(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        for segment in segments {
            if self.positions.contains_key(&segment.id) {
                self.segments.insert(segment.id.clone(), segment);
            }
        }
        self
    }

    /// Attach document metadata
    pub fn with_documents(mut self, documents: impl IntoIterator<Item = Document>) -> Self {
        self.documents
            .extend(documents.into_iter().map(|d| (d.id.clone(), d)));
        self
    }

    /// Number of segments in the index
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension (0 for an empty index)
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Segment ids in row order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Row position of a segment id
    pub fn position(&self, id: &str) -> Result<usize> {
        self.positions
            .get(id)
            .copied()
            .ok_or_else(|| Error::unknown_segment(id))
    }

    /// Row positions for a set of ids, failing on the first unknown id
    pub fn positions<'a, I>(&self, ids: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter().map(|id| self.position(id)).collect()
    }

    /// Segment id at a row position
    pub fn id_at(&self, row: usize) -> &str {
        &self.ids[row]
    }

    /// Embedding at a row position
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// L2 norm of the embedding at a row position
    pub fn norm(&self, row: usize) -> f64 {
        self.norms[row]
    }

    /// Embedding for a segment id
    pub fn embedding(&self, id: &str) -> Result<&[f32]> {
        self.position(id).map(|row| self.row(row))
    }

    /// Segment text, if segment texts were attached
    pub fn text(&self, id: &str) -> Option<&str> {
        self.segments.get(id).map(|s| s.text.as_str())
    }

    /// Document a segment belongs to
    pub fn document_for(&self, segment_id: &str) -> Option<&Document> {
        self.documents.get(document_id(segment_id))
    }

    /// Number of attached documents
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Fail with a configuration error if any id is missing from the index
    pub fn require_all<'a, I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for id in ids {
            if !self.contains(id) {
                return Err(Error::unknown_segment(id));
            }
        }
        Ok(())
    }

    /// SHA256 digest over ids and vector bytes, in row order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (row, id) in self.ids.iter().enumerate() {
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
            for value in self.row(row) {
                hasher.update(value.to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// L2 norm, accumulated in f64
pub(crate) fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_index() -> CorpusIndex {
        CorpusIndex::new(
            vec!["c1/1".to_string(), "c1/2".to_string(), "c2/1".to_string()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![3.0, 4.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_positional_lookup() {
        let index = small_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dim(), 2);
        assert_eq!(index.position("c1/2").unwrap(), 1);
        assert_eq!(index.id_at(2), "c2/1");
        assert_eq!(index.row(2), &[3.0, 4.0]);
        assert!((index.norm(2) - 5.0).abs() < 1e-6);
        assert_eq!(index.embedding("c1/1").unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_unknown_id_is_configuration_error() {
        let index = small_index();
        assert!(matches!(index.position("nope"), Err(Error::Configuration(_))));
        let ids = vec!["c1/1".to_string(), "nope".to_string()];
        assert!(index.require_all(&ids).is_err());
        assert!(index.positions(&ids).is_err());
    }

    #[test]
    fn test_rejects_malformed_corpus() {
        let mismatch = CorpusIndex::new(vec!["a".to_string()], vec![]);
        assert!(matches!(mismatch, Err(Error::Configuration(_))));

        let ragged = CorpusIndex::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 0.0], vec![1.0]],
        );
        assert!(ragged.is_err());

        let zero = CorpusIndex::new(vec!["a".to_string()], vec![vec![0.0, 0.0]]);
        assert!(zero.is_err());

        let duplicate = CorpusIndex::new(
            vec!["a".to_string(), "a".to_string()],
            vec![vec![1.0], vec![2.0]],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_segments_and_documents() {
        let index = small_index()
            .with_segments(vec![
                Segment { id: "c1/1".to_string(), text: "First".to_string() },
                Segment { id: "zz/9".to_string(), text: "Orphan".to_string() },
            ])
            .with_documents(vec![Document {
                id: "c1".to_string(),
                name: "Constitution One".to_string(),
                metadata: Default::default(),
            }]);

        assert_eq!(index.text("c1/1"), Some("First"));
        assert_eq!(index.text("zz/9"), None);
        assert_eq!(index.document_for("c1/2").map(|d| d.name.as_str()), Some("Constitution One"));
        assert!(index.document_for("c2/1").is_none());
        assert_eq!(document_id("abc/12/3"), "abc");
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = small_index();
        let b = small_index();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = CorpusIndex::new(
            vec!["c1/1".to_string(), "c1/2".to_string(), "c2/1".to_string()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![3.0, 4.5]],
        )
        .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
