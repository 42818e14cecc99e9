use crate::core::config::Thresholds;
use crate::core::error::{Error, Result};
use crate::indexing::corpus::CorpusIndex;
use crate::session::state::{unix_now, SessionState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum number of characters kept from a topic label or description
pub const MAX_FIELD_LENGTH: usize = 400;

/// Result of sanitizing free text entered by a reviewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub value: String,
    /// True if sanitizing altered the trimmed input
    pub changed: bool,
}

/// Truncate, HTML-escape, then strip angle brackets and quotes
pub fn sanitize(text: &str, max_length: usize) -> Sanitized {
    let trimmed = text.trim();
    let truncated: String = trimmed.chars().take(max_length).collect();
    let escaped = html_escape::encode_quoted_attribute(&truncated);
    let value: String = escaped
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\''))
        .collect::<String>()
        .trim()
        .to_string();

    Sanitized {
        changed: value != trimmed,
        value,
    }
}

/// A segment id with its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentText {
    pub id: String,
    pub text: String,
}

/// Immutable record of a completed topic-discovery session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub topic_key: String,
    pub topic_label: String,
    pub topic_description: String,
    pub formulation: String,
    pub thresholds: Thresholds,
    pub corpus_fingerprint: String,
    /// Final accepted segments, sorted by id
    pub accepted: Vec<SegmentText>,
    /// Segments deselected during final review, sorted by id
    pub removed: Vec<SegmentText>,
    pub iterations: usize,
    pub started_at: u64,
    pub ended_at: u64,
}

impl SessionRecord {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Database(format!("Failed to serialize session record: {}", e)))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Database(format!("Failed to deserialize session record: {}", e)))
    }

    /// Ids of the final accepted segments
    pub fn accepted_ids(&self) -> BTreeSet<String> {
        self.accepted.iter().map(|s| s.id.clone()).collect()
    }
}

/// A finalized record plus whether the reviewer's label or description had
/// to be sanitized (the caller should ask them to check the stored value)
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptance {
    pub record: SessionRecord,
    pub label_sanitized: bool,
    pub description_sanitized: bool,
}

/// Finalize a reviewed session.
///
/// `pre_review_accepted` is the accepted set shown at final review and
/// `final_accepted` what the reviewer kept, which must be a subset of it; the
/// difference is recorded as removed. Nothing is built if the label or
/// description is empty.
pub fn accept(
    session: &SessionState,
    corpus: &CorpusIndex,
    topic_label: &str,
    topic_description: &str,
    final_accepted: &BTreeSet<String>,
    pre_review_accepted: &BTreeSet<String>,
) -> Result<Acceptance> {
    let label = sanitize_required("topic label", topic_label)?;
    let description = sanitize_required("topic description", topic_description)?;
    corpus.require_all(final_accepted)?;
    corpus.require_all(pre_review_accepted)?;
    if let Some(stray) = final_accepted.difference(pre_review_accepted).next() {
        return Err(Error::Validation(format!(
            "Segment {} was not in the accepted set under review",
            stray
        )));
    }

    let removed: BTreeSet<&String> = pre_review_accepted.difference(final_accepted).collect();

    let with_text = |id: &String| SegmentText {
        id: id.clone(),
        text: corpus.text(id).unwrap_or_default().to_string(),
    };

    let record = SessionRecord {
        topic_key: session.topic_key.clone(),
        topic_label: label.value,
        topic_description: description.value,
        formulation: session.formulation.clone(),
        thresholds: session.thresholds,
        corpus_fingerprint: session.corpus_fingerprint.clone(),
        accepted: final_accepted.iter().map(with_text).collect(),
        removed: removed.into_iter().map(with_text).collect(),
        iterations: session.iteration,
        started_at: session.started_at,
        ended_at: unix_now(),
    };

    tracing::info!(
        topic = %record.topic_key,
        accepted = record.accepted.len(),
        removed = record.removed.len(),
        "session accepted"
    );

    Ok(Acceptance {
        record,
        label_sanitized: label.changed,
        description_sanitized: description.changed,
    })
}

/// Sanitize a topic formulation before it is embedded and stored
pub fn sanitize_formulation(text: &str) -> Result<Sanitized> {
    sanitize_required("topic formulation", text)
}

fn sanitize_required(field: &str, text: &str) -> Result<Sanitized> {
    if text.trim().is_empty() {
        return Err(Error::Validation(format!("Please enter a {}", field)));
    }
    let sanitized = sanitize(text, MAX_FIELD_LENGTH);
    if sanitized.value.is_empty() {
        return Err(Error::Validation(format!("The {} is empty after sanitizing", field)));
    }
    if sanitized.changed {
        tracing::warn!("{} was sanitized to {:?}", field, sanitized.value);
    }
    Ok(sanitized)
}
