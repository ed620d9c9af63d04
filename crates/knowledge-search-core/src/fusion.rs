//! Weighted Reciprocal Rank Fusion: `score = Σ wᵢ / (k + rankᵢ + 1)`.
//!
//! Combines the vector and BM25 rankings of one record type without
//! normalizing their incomparable raw scores. Ranks are zero-based.

use std::collections::HashMap;

use serde::Serialize;

use crate::lexical::LexicalHit;
use crate::store::VectorHit;
use crate::strategy::HybridWeights;

pub const DEFAULT_RRF_K: f64 = 60.0;

/// A candidate after fusion (or after a single-source ranking).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedCandidate {
    pub id: String,
    pub fused_score: f64,
    /// Best vector similarity seen, `0.0` if vector search missed it.
    pub similarity: f64,
    /// Raw BM25 score, `0.0` if BM25 missed it.
    pub bm25_score: f64,
    pub matched_terms: Vec<String>,
}

/// Replaces NaN and infinities with `0.0`.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Fuses a vector ranking and a BM25 ranking. Output is sorted by
/// descending fused score; ties keep first-seen order (vector list first).
pub fn fuse(
    vector: &[VectorHit],
    lexical: &[LexicalHit],
    weights: HybridWeights,
    k: f64,
) -> Vec<FusedCandidate> {
    let mut candidates: Vec<FusedCandidate> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut slot = |id: &str, candidates: &mut Vec<FusedCandidate>| -> usize {
        *positions.entry(id.to_string()).or_insert_with(|| {
            candidates.push(FusedCandidate {
                id: id.to_string(),
                fused_score: 0.0,
                similarity: 0.0,
                bm25_score: 0.0,
                matched_terms: Vec::new(),
            });
            candidates.len() - 1
        })
    };

    for (rank, hit) in vector.iter().enumerate() {
        let i = slot(&hit.id, &mut candidates);
        let c = &mut candidates[i];
        c.fused_score += weights.vector / (k + rank as f64 + 1.0);
        c.similarity = c.similarity.max(finite_or_zero(hit.similarity));
    }

    for (rank, hit) in lexical.iter().enumerate() {
        let i = slot(&hit.id, &mut candidates);
        let c = &mut candidates[i];
        c.fused_score += weights.bm25 / (k + rank as f64 + 1.0);
        c.bm25_score = finite_or_zero(hit.bm25_score);
        if c.matched_terms.is_empty() {
            c.matched_terms = hit.matched_terms.clone();
        }
    }

    for c in &mut candidates {
        c.fused_score = finite_or_zero(c.fused_score);
    }
    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Halves the BM25 weight (moving the difference to vector) when BM25
/// found fewer than half as many candidates as vector search.
pub fn rebalance(weights: HybridWeights, vector_count: usize, lexical_count: usize) -> HybridWeights {
    if (lexical_count as f64) < vector_count as f64 / 2.0 {
        HybridWeights {
            vector: weights.vector + weights.bm25 * 0.5,
            bm25: weights.bm25 * 0.5,
        }
    } else {
        weights
    }
}

/// Candidates from the vector ranking alone, in its order.
pub fn from_vector(hits: &[VectorHit]) -> Vec<FusedCandidate> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.id.clone()))
        .map(|h| {
            let similarity = finite_or_zero(h.similarity);
            FusedCandidate {
                id: h.id.clone(),
                fused_score: similarity,
                similarity,
                bm25_score: 0.0,
                matched_terms: Vec::new(),
            }
        })
        .collect()
}

/// Candidates from the BM25 ranking alone, in its order.
pub fn from_lexical(hits: &[LexicalHit]) -> Vec<FusedCandidate> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.id.clone()))
        .map(|h| {
            let bm25 = finite_or_zero(h.bm25_score);
            FusedCandidate {
                id: h.id.clone(),
                fused_score: bm25,
                similarity: 0.0,
                bm25_score: bm25,
                matched_terms: h.matched_terms.clone(),
            }
        })
        .collect()
}
