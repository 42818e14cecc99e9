//! Similarity propagation from a frontier of accepted segments.

use crate::core::config::ThresholdKind;
use crate::core::error::Result;
use crate::indexing::corpus::CorpusIndex;
use crate::search::metric::columns_at_or_above;
use std::collections::BTreeSet;

/// Candidates for the next review round.
///
/// Scans the frontier x corpus similarity matrix row by row and keeps every corpus
/// segment that clears `threshold` against at least one frontier row, then
/// removes everything already accepted or rejected. An empty result means
/// there is nothing left to review; deciding to stop is up to the caller.
///
/// Callers pass only the segments accepted in the previous round as the
/// frontier, not the whole accepted set, to keep the matrix small.
pub fn expand(
    frontier: &BTreeSet<String>,
    accepted: &BTreeSet<String>,
    rejected: &BTreeSet<String>,
    corpus: &CorpusIndex,
    threshold: f32,
) -> Result<BTreeSet<String>> {
    let threshold = ThresholdKind::Mapping.validate(threshold)?;
    let rows = corpus.positions(frontier)?;
    corpus.require_all(accepted)?;
    corpus.require_all(rejected)?;

    if rows.is_empty() {
        return Ok(BTreeSet::new());
    }

    tracing::debug!(rows = rows.len(), cols = corpus.len(), "scanning expansion matrix");
    let found = columns_at_or_above(&rows, corpus, threshold);

    let candidates: BTreeSet<String> = found
        .iter()
        .map(|&col| corpus.id_at(col))
        .filter(|id| !accepted.contains(*id) && !rejected.contains(*id))
        .map(str::to_string)
        .collect();

    tracing::info!(
        frontier = rows.len(),
        found = found.len(),
        candidates = candidates.len(),
        threshold,
        "expansion complete"
    );
    Ok(candidates)
}
