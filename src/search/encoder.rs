use crate::core::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Text embedding oracle.
///
/// Implementations must return one vector per input, in input order, and be
/// deterministic for identical input.
pub trait Encoder {
    /// Embed a batch of texts
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()])?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(Error::Configuration(
                "Encoder returned the wrong number of vectors".to_string(),
            )),
        }
    }
}

/// Encoder backed by embeddings computed ahead of time, keyed by exact text
#[derive(Debug, Clone, Default)]
pub struct PrecomputedEncoder {
    encodings: HashMap<String, Vec<f32>>,
}

impl PrecomputedEncoder {
    pub fn new(encodings: HashMap<String, Vec<f32>>) -> Self {
        Self { encodings }
    }

    /// Load a JSON object mapping text to its embedding
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read encodings {}: {}", path.display(), e))
        })?;
        let encodings: HashMap<String, Vec<f32>> = serde_json::from_str(&content).map_err(|e| {
            Error::Parsing(format!("Failed to parse encodings {}: {}", path.display(), e))
        })?;
        Ok(Self::new(encodings))
    }
}

impl Encoder for PrecomputedEncoder {
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.encodings.get(text).cloned().ok_or_else(|| {
                    Error::Configuration(format!("No precomputed encoding for text: {:?}", text))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precomputed_encoder_preserves_order() {
        let encoder = PrecomputedEncoder::new(HashMap::from([
            ("freedom".to_string(), vec![1.0, 0.0]),
            ("equality".to_string(), vec![0.0, 1.0]),
        ]));

        let vectors = encoder
            .embed_many(&["equality".to_string(), "freedom".to_string()])
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(encoder.embed("freedom").unwrap(), vec![1.0, 0.0]);
        assert!(matches!(encoder.embed("unknown"), Err(Error::Configuration(_))));
    }
}
