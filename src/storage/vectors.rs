use crate::storage::index::{Chunk, WorkspaceIndex};
use std::cmp::Ordering;

/// Score every chunk against `query_vector` and return the best `limit`.
///
/// Chunks scoring below `min_score` are dropped. The sort is stable, so equal
/// scores keep the index's chunk order.
pub fn rank_chunks<'a>(
    index: &'a WorkspaceIndex,
    query_vector: &[f32],
    min_score: f32,
    limit: usize,
) -> Vec<(&'a Chunk, f32)> {
    if limit == 0 || query_vector.iter().all(|x| *x == 0.0) {
        return Vec::new();
    }

    let mut results: Vec<(&Chunk, f32)> = index
        .chunks
        .iter()
        .map(|chunk| (chunk, cosine_similarity(query_vector, &chunk.vector)))
        .filter(|(_, score)| *score >= min_score)
        .collect();

    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}

/// Calculate cosine similarity between two vectors, clamped to `[0, 1]`.
///
/// Index vectors are non-negative, so the clamp only absorbs rounding.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(0.0, 1.0)
}
