use crate::core::config::ThresholdKind;
use crate::core::error::{Error, Result};
use crate::indexing::corpus::{l2_norm, CorpusIndex};
use crate::search::encoder::Encoder;
use crate::search::metric::similarity_row;
use crate::session::ledger::{sanitize_formulation, Sanitized};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

/// A corpus segment matched by a search, with its angular similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Every corpus segment whose similarity to `query` is at or above `threshold`
pub fn search(query: &[f32], corpus: &CorpusIndex, threshold: f32) -> Result<BTreeSet<String>> {
    let threshold = ThresholdKind::Search.validate(threshold)?;
    check_query(query, corpus)?;

    let scores = similarity_row(query, corpus);
    let found: BTreeSet<String> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score >= threshold)
        .map(|(col, _)| corpus.id_at(col).to_string())
        .collect();

    tracing::info!(corpus = corpus.len(), threshold, hits = found.len(), "search complete");
    Ok(found)
}

/// Search, keeping the best `limit` hits sorted by descending score.
/// Ties are broken by ascending segment id.
pub fn ranked_search(
    query: &[f32],
    corpus: &CorpusIndex,
    threshold: f32,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let threshold = ThresholdKind::Search.validate(threshold)?;
    check_query(query, corpus)?;
    if limit == 0 {
        return Ok(Vec::new());
    }

    let scores = similarity_row(query, corpus);

    // Min-heap (via reversed ordering): weakest hit at the top
    let mut heap: BinaryHeap<RankedHit> = BinaryHeap::with_capacity(limit + 1);
    for (col, &score) in scores.iter().enumerate() {
        if score < threshold {
            continue;
        }
        heap.push(RankedHit {
            id: corpus.id_at(col),
            score,
        });
        if heap.len() > limit {
            heap.pop();
        }
    }

    let mut hits: Vec<RankedHit> = heap.into_vec();
    hits.sort_by(|a, b| b.rank_cmp(a));
    Ok(hits
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.id.to_string(),
            score: hit.score,
        })
        .collect())
}

/// Outcome of a formulation search
#[derive(Debug, Clone, PartialEq)]
pub struct FormulationSearch {
    /// The sanitized formulation that was embedded; store this one
    pub formulation: Sanitized,
    pub found: BTreeSet<String>,
}

/// Sanitize a topic formulation, embed it, and search the corpus with it
pub fn search_formulation<E: Encoder + ?Sized>(
    encoder: &E,
    formulation: &str,
    corpus: &CorpusIndex,
    threshold: f32,
) -> Result<FormulationSearch> {
    let formulation = sanitize_formulation(formulation)?;
    let query = encoder.embed(&formulation.value)?;
    let found = search(&query, corpus, threshold)?;
    Ok(FormulationSearch { formulation, found })
}

fn check_query(query: &[f32], corpus: &CorpusIndex) -> Result<()> {
    if !corpus.is_empty() && query.len() != corpus.dim() {
        return Err(Error::Configuration(format!(
            "Query has dimension {}, corpus has {}",
            query.len(),
            corpus.dim()
        )));
    }
    let norm = l2_norm(query);
    if !norm.is_finite() || norm == 0.0 {
        return Err(Error::Configuration(
            "Query embedding is zero or non-finite".to_string(),
        ));
    }
    Ok(())
}

/// Helper struct for maintaining top-K search results using a min-heap
struct RankedHit<'a> {
    id: &'a str,
    score: f32,
}

impl RankedHit<'_> {
    /// Better hits compare greater: higher score, then smaller id
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(self.id))
    }
}

impl PartialEq for RankedHit<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedHit<'_> {}

impl PartialOrd for RankedHit<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedHit<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap (a max-heap) behaves like a min-heap by rank.
        other.rank_cmp(self)
    }
}
