//! Retrieval over a loaded index generation.
//!
//! Two modes:
//!
//! - **similarity** — the `k` nearest chunks by cosine distance.
//! - **diverse** — maximal marginal relevance (MMR). A candidate pool of
//!   `max(2k, 8)` nearest chunks is fetched, then re-ranked greedily by
//!
//!   ```text
//!   mmr(d) = λ · sim(q, d) − (1 − λ) · max_{s ∈ selected} sim(d, s)
//!   ```
//!
//!   with λ = 0.5, until `k` are chosen.
//!
//! Both modes return fewer than `k` results when the generation holds fewer
//! chunks. Results carry a 1-based rank and their distance to the query.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::index::{Candidate, IndexHandle};
use crate::models::{RetrievalResult, RetrievedChunk};

/// Relevance/diversity trade-off used by diverse search.
pub const MMR_LAMBDA: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Similarity,
    Diverse,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "similarity" => Ok(SearchMode::Similarity),
            "diverse" | "mmr" => Ok(SearchMode::Diverse),
            other => Err(format!(
                "Unknown search mode: {}. Use similarity or diverse.",
                other
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Similarity => f.write_str("similarity"),
            SearchMode::Diverse => f.write_str("diverse"),
        }
    }
}

/// Size of the candidate pool diverse search re-ranks.
pub fn fetch_k(k: usize) -> usize {
    (2 * k).max(8)
}

/// Retrieve up to `k` chunks for `question`.
pub async fn query(
    handle: &IndexHandle,
    question: &str,
    k: usize,
    mode: SearchMode,
) -> Result<RetrievalResult> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = handle.embed_query(question).await?;

    let selected = match mode {
        SearchMode::Similarity => handle.nearest(&query_vec, k).await?,
        SearchMode::Diverse => {
            let pool = handle.nearest(&query_vec, fetch_k(k)).await?;
            mmr_select(&query_vec, pool, k, MMR_LAMBDA)
        }
    };

    tracing::debug!(
        generation = %handle.id(),
        mode = %mode,
        k,
        returned = selected.len(),
        "retrieval complete"
    );

    Ok(selected
        .into_iter()
        .enumerate()
        .map(|(i, c)| RetrievedChunk {
            rank: i + 1,
            distance: c.distance,
            chunk: c.chunk,
        })
        .collect())
}

/// Greedy MMR selection over a relevance-ordered candidate pool.
///
/// Deterministic for a given pool order: on equal scores the earlier
/// candidate wins.
pub fn mmr_select(
    query: &[f32],
    candidates: Vec<Candidate>,
    k: usize,
    lambda: f32,
) -> Vec<Candidate> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let mut selected: Vec<Candidate> = Vec::with_capacity(k);
    let mut remaining = candidates;

    while selected.len() < k {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let relevance = cosine_similarity(query, &candidate.vector);
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.vector, &s.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}
