//! Domain relevance scoring.
//!
//! After retrieval, each candidate gets a domain score from a
//! [`DomainScorer`]. The orchestrator blends it with the normalized BM25
//! score according to the active strategy.
//!
//! [`DefaultScorer`] combines five factors, each in `[0, 1]`:
//!
//! | Factor | Source |
//! |--------|--------|
//! | similarity | vector similarity |
//! | keyword match | share of query tokens present in the record text |
//! | recency | `0.5^(age_days / 90)` of `updatedAt` (or `createdAt`) |
//! | importance | topic importance, relation confidence |
//! | popularity | `ln(1 + searchCount)`, saturating at 100 searches |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bm25::tokenize;
use crate::models::{Record, SearchFilters};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub keyword_match: f64,
    pub recency: f64,
    pub importance: f64,
    pub popularity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.6,
            keyword_match: 0.15,
            recency: 0.1,
            importance: 0.1,
            popularity: 0.05,
        }
    }
}

/// Everything a scorer may look at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    /// Vector similarity already normalized to `[0, 1]`.
    pub similarity: f64,
    pub record: &'a Record,
    pub weights: &'a ScoringWeights,
    pub filters: &'a SearchFilters,
    pub search_count: u32,
    pub query: &'a str,
}

pub trait DomainScorer: Send + Sync {
    fn score(&self, input: &ScoreInput<'_>) -> f64;
}

/// Clamps a similarity into `[0, 1]`, mapping NaN to `0.0`.
pub fn normalize_similarity(similarity: f64) -> f64 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScorer;

const RECENCY_HALF_LIFE_DAYS: f64 = 90.0;

impl DefaultScorer {
    fn keyword_match(query: &str, record: &Record) -> f64 {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let text_tokens: std::collections::HashSet<String> =
            tokenize(&record.embedding_text()).into_iter().collect();
        let hits = query_tokens
            .iter()
            .filter(|t| text_tokens.contains(*t))
            .count();
        hits as f64 / query_tokens.len() as f64
    }

    fn recency(record: &Record, now: DateTime<Utc>) -> f64 {
        let Some(ts) = record.updated_at().or_else(|| record.created_at()) else {
            return 0.0;
        };
        let Ok(parsed) = DateTime::parse_from_rfc3339(ts) else {
            return 0.0;
        };
        let age_days = (now - parsed.with_timezone(&Utc)).num_seconds().max(0) as f64 / 86_400.0;
        0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS)
    }

    fn importance(record: &Record) -> f64 {
        match record {
            Record::Topic(t) => match t.importance.as_deref() {
                Some("high") => 1.0,
                Some("medium") => 0.6,
                Some("low") => 0.3,
                _ => 0.5,
            },
            Record::Relation(r) => r.confidence.map_or(0.5, normalize_similarity),
            _ => 0.5,
        }
    }

    fn popularity(search_count: u32) -> f64 {
        ((1.0 + f64::from(search_count)).ln() / 101f64.ln()).min(1.0)
    }
}

impl DomainScorer for DefaultScorer {
    fn score(&self, input: &ScoreInput<'_>) -> f64 {
        let w = input.weights;
        let score = w.similarity * normalize_similarity(input.similarity)
            + w.keyword_match * Self::keyword_match(input.query, input.record)
            + w.recency * Self::recency(input.record, Utc::now())
            + w.importance * Self::importance(input.record)
            + w.popularity * Self::popularity(input.search_count);
        if score.is_finite() {
            score.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, Relation, Topic};

    fn score(record: &Record, similarity: f64, query: &str) -> f64 {
        DefaultScorer.score(&ScoreInput {
            similarity,
            record,
            weights: &ScoringWeights::default(),
            filters: &SearchFilters::default(),
            search_count: 0,
            query,
        })
    }

    fn entity(name: &str, updated_at: Option<String>) -> Record {
        Record::Entity(Entity {
            id: "e".into(),
            name: name.into(),
            updated_at,
            ..Default::default()
        })
    }

    #[test]
    fn test_similarity_dominates() {
        let r = entity("Toyota", None);
        assert!(score(&r, 0.9, "x") > score(&r, 0.2, "x"));
    }

    #[test]
    fn test_score_is_bounded() {
        let r = Record::Topic(Topic {
            id: "t".into(),
            title: "pricing".into(),
            importance: Some("high".into()),
            search_count: Some(10_000),
            updated_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        });
        let s = DefaultScorer.score(&ScoreInput {
            similarity: 1.0,
            record: &r,
            weights: &ScoringWeights::default(),
            filters: &SearchFilters::default(),
            search_count: 10_000,
            query: "pricing",
        });
        assert!(s <= 1.0 + 1e-9 && s > 0.95);
    }

    #[test]
    fn test_keyword_overlap_raises_score() {
        let r = entity("battery supplier", None);
        assert!(score(&r, 0.5, "battery supplier") > score(&r, 0.5, "marketing plan"));
    }

    #[test]
    fn test_recent_records_score_higher() {
        let fresh = entity("a", Some(Utc::now().to_rfc3339()));
        let stale = entity("a", Some("2001-01-01T00:00:00.000Z".into()));
        assert!(score(&fresh, 0.5, "q") > score(&stale, 0.5, "q"));
    }

    #[test]
    fn test_relation_confidence_is_importance() {
        let strong = Record::Relation(Relation {
            id: "r".into(),
            confidence: Some(0.95),
            ..Default::default()
        });
        let weak = Record::Relation(Relation {
            id: "r".into(),
            confidence: Some(0.1),
            ..Default::default()
        });
        assert!(score(&strong, 0.5, "q") > score(&weak, 0.5, "q"));
    }

    #[test]
    fn test_nan_similarity_is_zero() {
        assert_eq!(normalize_similarity(f64::NAN), 0.0);
        assert_eq!(normalize_similarity(1.7), 1.0);
        let r = entity("a", None);
        assert!(score(&r, f64::NAN, "q").is_finite());
    }
}
