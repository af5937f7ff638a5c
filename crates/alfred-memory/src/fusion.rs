// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weighted Reciprocal Rank Fusion.
//!
//! An item at zero-based rank `r` in a list of weight `w` earns
//! `w / (k + r + 1)`; an item's fused score is the sum over every list it
//! appears in. Lists with zero weight contribute nothing and introduce no
//! items.

use std::collections::HashMap;

/// Fusion constant per Cormack et al.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// One ranked list of ids, best first, with its fusion weight.
#[derive(Debug, Clone, Copy)]
pub struct RankedList<'a> {
    pub ids: &'a [String],
    pub weight: f64,
}

impl<'a> RankedList<'a> {
    pub fn new(ids: &'a [String], weight: f64) -> Self {
        Self { ids, weight }
    }
}

/// Fuse ranked lists into one `(id, score)` ranking, best first.
///
/// Ties keep first-appearance order, scanning lists in the order given.
pub fn reciprocal_rank_fusion(lists: &[RankedList<'_>], k: f64) -> Vec<(String, f64)> {
    let mut fused: Vec<(String, f64)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for list in lists.iter().filter(|l| l.weight > 0.0) {
        for (rank, id) in list.ids.iter().enumerate() {
            let contribution = list.weight / (k + rank as f64 + 1.0);
            match position.get(id.as_str()) {
                Some(&slot) => fused[slot].1 += contribution,
                None => {
                    position.insert(id.as_str(), fused.len());
                    fused.push((id.clone(), contribution));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
}

/// How many candidates each sub-retriever should return for `limit` results.
pub fn candidate_limit(limit: usize, multiplier: usize, minimum: usize) -> usize {
    limit.saturating_mul(multiplier).max(minimum)
}
