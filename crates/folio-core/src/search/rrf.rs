//! Reciprocal Rank Fusion: merge ranked lists by summing `1 / (k + rank)`.

use std::collections::HashMap;

pub const DEFAULT_RRF_K: usize = 60;

/// Merge ranked `(id, score)` lists into `(id, rrf_score)` sorted
/// descending. Ranks are 1-based; input scores only define the per-list
/// order and do not enter the fused score. Ties keep the order of first
/// appearance across the input lists.
pub fn rrf_merge(result_lists: &[Vec<(String, f32)>], k: usize) -> Vec<(String, f64)> {
    let mut first_seen: Vec<String> = Vec::new();
    let mut scores: HashMap<String, f64> = HashMap::new();

    for list in result_lists {
        for (rank, (id, _)) in list.iter().enumerate() {
            if !scores.contains_key(id) {
                first_seen.push(id.clone());
            }
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / ((k + rank + 1) as f64);
        }
    }

    let mut merged: Vec<(String, f64)> = first_seen
        .into_iter()
        .map(|id| {
            let score = scores[&id];
            (id, score)
        })
        .collect();
    // A stable sort keeps first-appearance order for equal scores.
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    tracing::debug!(
        lists = result_lists.len(),
        unique = merged.len(),
        "RRF merged"
    );
    merged
}
