use crate::core::config::Thresholds;
use crate::core::error::{Error, Result};
use crate::indexing::corpus::CorpusIndex;
use crate::search::expansion::expand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::SystemTime;

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check that a topic key is 4 to 10 ASCII letters or digits and lower-case it
pub fn normalize_topic_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::Validation("Topic key is empty".to_string()));
    }
    let valid_len = (4..=10).contains(&key.len());
    if !valid_len || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!(
            "Topic key {:?} must be between 4 and 10 alphabetic or numeric characters",
            key
        )));
    }
    Ok(key.to_ascii_lowercase())
}

/// Working sets of one topic-discovery session.
///
/// `accepted` and `rejected` never overlap, and `frontier` is always the
/// subset of `accepted` taken on in the most recent review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub topic_key: String,
    pub formulation: String,
    pub thresholds: Thresholds,
    /// Fingerprint of the corpus the session was started against
    pub corpus_fingerprint: String,
    pub accepted: BTreeSet<String>,
    pub rejected: BTreeSet<String>,
    pub frontier: BTreeSet<String>,
    /// Candidates offered for review but not yet decided
    pub pending: BTreeSet<String>,
    /// Number of completed reviews
    pub iteration: usize,
    /// Set when a review accepts nothing or an expansion finds nothing new
    #[serde(default)]
    pub exhausted: bool,
    pub started_at: u64,
}

impl SessionState {
    /// Start a new session
    pub fn new(
        topic_key: &str,
        formulation: &str,
        thresholds: Thresholds,
        corpus_fingerprint: String,
    ) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            topic_key: normalize_topic_key(topic_key)?,
            formulation: formulation.trim().to_string(),
            thresholds,
            corpus_fingerprint,
            accepted: BTreeSet::new(),
            rejected: BTreeSet::new(),
            frontier: BTreeSet::new(),
            pending: BTreeSet::new(),
            iteration: 0,
            exhausted: false,
            started_at: unix_now(),
        })
    }

    /// Offer candidates for review, replacing any undecided ones.
    /// Segments already accepted or rejected are not offered again.
    pub fn offer(&mut self, candidates: BTreeSet<String>) {
        self.pending = candidates
            .into_iter()
            .filter(|id| !self.accepted.contains(id) && !self.rejected.contains(id))
            .collect();
    }

    /// Record a human review of the pending candidates.
    ///
    /// `selected` joins the accepted set and becomes the next frontier; the
    /// rest of the pending candidates are rejected. Fails once the session is
    /// exhausted, leaving the frontier and iteration count untouched.
    pub fn record_review(&mut self, selected: &BTreeSet<String>) -> Result<()> {
        if self.exhausted && self.pending.is_empty() {
            return Err(Error::Validation(format!(
                "Session {} has nothing left to review",
                self.topic_key
            )));
        }
        if let Some(stray) = selected.iter().find(|id| !self.pending.contains(*id)) {
            return Err(Error::Validation(format!(
                "Segment {} was not offered for review",
                stray
            )));
        }

        let pending = std::mem::take(&mut self.pending);
        let (chosen, dropped): (BTreeSet<String>, BTreeSet<String>) =
            pending.into_iter().partition(|id| selected.contains(id));

        tracing::info!(
            topic = %self.topic_key,
            iteration = self.iteration + 1,
            accepted = chosen.len(),
            rejected = dropped.len(),
            "review recorded"
        );

        self.accepted.extend(chosen.iter().cloned());
        self.rejected.extend(dropped);
        self.exhausted = chosen.is_empty();
        self.frontier = chosen;
        self.iteration += 1;
        Ok(())
    }

    /// Run the next expansion from the frontier and offer its candidates
    pub fn expand_next(&mut self, corpus: &CorpusIndex) -> Result<&BTreeSet<String>> {
        self.check_corpus(corpus)?;
        let candidates = expand(
            &self.frontier,
            &self.accepted,
            &self.rejected,
            corpus,
            self.thresholds.mapping,
        )?;
        self.offer(candidates);
        if self.pending.is_empty() {
            tracing::info!(topic = %self.topic_key, "expansion exhausted");
            self.exhausted = true;
        }
        Ok(&self.pending)
    }

    /// True once there is nothing left to review
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fail if the corpus differs from the one the session started with
    pub fn check_corpus(&self, corpus: &CorpusIndex) -> Result<()> {
        let fingerprint = corpus.fingerprint();
        if fingerprint != self.corpus_fingerprint {
            return Err(Error::Configuration(format!(
                "Corpus has changed since session {} started",
                self.topic_key
            )));
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Database(format!("Failed to serialize session: {}", e)))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Database(format!("Failed to deserialize session: {}", e)))
    }
}
