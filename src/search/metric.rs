//! Angular similarity between embedding vectors.
//!
//! Both forms derive from cosine similarity. `angular_similarity` is the
//! value every stage thresholds on (higher means more similar);
//! `angular_distance` is its complement.

use crate::indexing::corpus::{l2_norm, CorpusIndex};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine(a, b) as f32
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Angular similarity in [0, 1]: 1 for identical direction, 0 for opposite
pub fn angular_similarity(a: &[f32], b: &[f32]) -> f32 {
    similarity_from_cosine(cosine(a, b))
}

/// Angular distance in [0, 1]: 0 for identical direction, 1 for opposite
pub fn angular_distance(a: &[f32], b: &[f32]) -> f32 {
    distance_from_cosine(cosine(a, b))
}

/// Cosines this close to +/-1 are treated as exactly parallel
const PARALLEL_EPSILON: f64 = 1e-9;

#[inline]
fn cosine_with_norms(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

#[inline]
fn distance_from_cosine(cosine: f64) -> f32 {
    // Rounding pushes the cosine of (anti)parallel vectors slightly past +/-1.
    let clamped = if cosine.is_nan() {
        0.0
    } else if cosine >= 1.0 - PARALLEL_EPSILON {
        1.0
    } else if cosine <= -1.0 + PARALLEL_EPSILON {
        -1.0
    } else {
        cosine
    };
    ((clamped.acos() / PI) as f32).clamp(0.0, 1.0)
}

#[inline]
fn similarity_from_cosine(cosine: f64) -> f32 {
    1.0 - distance_from_cosine(cosine)
}

/// Angular similarity of one query against every corpus row, in row order
pub fn similarity_row(query: &[f32], corpus: &CorpusIndex) -> Vec<f32> {
    let query_norm = l2_norm(query);
    (0..corpus.len())
        .into_par_iter()
        .map(|col| {
            similarity_from_cosine(cosine_with_norms(
                query,
                query_norm,
                corpus.row(col),
                corpus.norm(col),
            ))
        })
        .collect()
}

/// Corpus columns whose similarity to at least one of `rows` is at or above
/// `threshold`, ascending.
///
/// Each row is thresholded on the rayon pool as it is computed, so only the
/// matching column indices are kept rather than a dense rows x corpus matrix.
pub fn columns_at_or_above(rows: &[usize], corpus: &CorpusIndex, threshold: f32) -> Vec<usize> {
    let mut found = vec![false; corpus.len()];
    let hits: Vec<Vec<usize>> = rows
        .par_iter()
        .map(|&row| matching_columns(row, corpus, threshold))
        .collect();
    for col in hits.into_iter().flatten() {
        found[col] = true;
    }
    found
        .iter()
        .enumerate()
        .filter(|&(_, &hit)| hit)
        .map(|(col, _)| col)
        .collect()
}

/// Upper-triangular pairwise similarities among corpus rows.
///
/// Entry `i` holds the similarities of `rows[i]` against `rows[i + 1..]`.
pub fn pairwise_upper(rows: &[usize], corpus: &CorpusIndex) -> Vec<Vec<f32>> {
    (0..rows.len())
        .into_par_iter()
        .map(|i| {
            let (a, norm_a) = (corpus.row(rows[i]), corpus.norm(rows[i]));
            rows[i + 1..]
                .iter()
                .map(|&other| {
                    similarity_from_cosine(cosine_with_norms(
                        a,
                        norm_a,
                        corpus.row(other),
                        corpus.norm(other),
                    ))
                })
                .collect()
        })
        .collect()
}

fn matching_columns(row: usize, corpus: &CorpusIndex, threshold: f32) -> Vec<usize> {
    let (a, norm_a) = (corpus.row(row), corpus.norm(row));
    (0..corpus.len())
        .filter(|&col| {
            let cosine = cosine_with_norms(a, norm_a, corpus.row(col), corpus.norm(col));
            similarity_from_cosine(cosine) >= threshold
        })
        .collect()
}
