//! Retrieval strategy per intent and record type.
//!
//! | intent | entity (bm25/vec) | relation | topic |
//! |---|---|---|---|
//! | factual | 0.7/0.3 | 0.6/0.4 | 0.5/0.5 |
//! | relational | 0.3/0.7 | 0.2/0.8 | 0.3/0.7 |
//! | keyword | bm25 only | bm25 only | 0.7/0.3 |
//! | conceptual | vector only | vector only | vector only |
//! | mixed | 0.5/0.5 | 0.5/0.5 | 0.5/0.5 |
//!
//! Startups, focus initiatives, meeting notes and regulations have no
//! lexical index and always use vector search.

use serde::{Deserialize, Serialize};

use crate::intent::IntentLabel;
use crate::models::RecordType;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector: f64,
    pub bm25: f64,
}

impl HybridWeights {
    pub const fn new(vector: f64, bm25: f64) -> Self {
        Self { vector, bm25 }
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub use_vector: bool,
    pub use_bm25: bool,
    pub weights: HybridWeights,
}

impl SearchStrategy {
    pub const fn hybrid(bm25: f64, vector: f64) -> Self {
        Self {
            use_vector: true,
            use_bm25: true,
            weights: HybridWeights::new(vector, bm25),
        }
    }

    pub const fn vector_only() -> Self {
        Self {
            use_vector: true,
            use_bm25: false,
            weights: HybridWeights::new(1.0, 0.0),
        }
    }

    pub const fn bm25_only() -> Self {
        Self {
            use_vector: false,
            use_bm25: true,
            weights: HybridWeights::new(0.0, 1.0),
        }
    }

    /// The same strategy with BM25 switched off; a BM25-only strategy
    /// becomes vector-only.
    pub fn without_bm25(self) -> Self {
        if self.use_bm25 {
            Self::vector_only()
        } else {
            self
        }
    }
}

impl Default for SearchStrategy {
    /// Even vector + BM25 blend.
    fn default() -> Self {
        Self::hybrid(0.5, 0.5)
    }
}

/// Strategies for the three lexically indexed types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub entity: SearchStrategy,
    pub relation: SearchStrategy,
    pub topic: SearchStrategy,
}

impl StrategySet {
    pub const fn uniform(strategy: SearchStrategy) -> Self {
        Self {
            entity: strategy,
            relation: strategy,
            topic: strategy,
        }
    }

    pub fn for_type(&self, record_type: RecordType) -> SearchStrategy {
        match record_type {
            RecordType::Entity => self.entity,
            RecordType::Relation => self.relation,
            RecordType::Topic => self.topic,
            _ => SearchStrategy::vector_only(),
        }
    }

    pub fn without_bm25(self) -> Self {
        Self {
            entity: self.entity.without_bm25(),
            relation: self.relation.without_bm25(),
            topic: self.topic.without_bm25(),
        }
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::uniform(SearchStrategy::default())
    }
}

pub fn strategy_for(label: IntentLabel) -> StrategySet {
    match label {
        IntentLabel::Factual => StrategySet {
            entity: SearchStrategy::hybrid(0.7, 0.3),
            relation: SearchStrategy::hybrid(0.6, 0.4),
            topic: SearchStrategy::hybrid(0.5, 0.5),
        },
        IntentLabel::Relational => StrategySet {
            entity: SearchStrategy::hybrid(0.3, 0.7),
            relation: SearchStrategy::hybrid(0.2, 0.8),
            topic: SearchStrategy::hybrid(0.3, 0.7),
        },
        IntentLabel::Keyword => StrategySet {
            entity: SearchStrategy::bm25_only(),
            relation: SearchStrategy::bm25_only(),
            topic: SearchStrategy::hybrid(0.7, 0.3),
        },
        IntentLabel::Conceptual => StrategySet::uniform(SearchStrategy::vector_only()),
        IntentLabel::Mixed => StrategySet::uniform(SearchStrategy::hybrid(0.5, 0.5)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factual_weights() {
        let set = strategy_for(IntentLabel::Factual);
        assert_eq!(set.entity.weights, HybridWeights::new(0.3, 0.7));
        assert_eq!(set.relation.weights, HybridWeights::new(0.4, 0.6));
        assert!(set.topic.use_bm25 && set.topic.use_vector);
    }

    #[test]
    fn test_keyword_is_bm25_only_for_graph_types() {
        let set = strategy_for(IntentLabel::Keyword);
        assert!(!set.entity.use_vector && set.entity.use_bm25);
        assert!(!set.relation.use_vector && set.relation.use_bm25);
        assert_eq!(set.topic.weights, HybridWeights::new(0.3, 0.7));
    }

    #[test]
    fn test_conceptual_is_vector_only() {
        let set = strategy_for(IntentLabel::Conceptual);
        for t in [RecordType::Entity, RecordType::Relation, RecordType::Topic] {
            assert!(!set.for_type(t).use_bm25);
        }
    }

    #[test]
    fn test_vector_only_types_ignore_intent() {
        for label in [IntentLabel::Keyword, IntentLabel::Mixed, IntentLabel::Factual] {
            let set = strategy_for(label);
            for t in [
                RecordType::Startup,
                RecordType::FocusInitiative,
                RecordType::MeetingNote,
                RecordType::Regulation,
            ] {
                assert_eq!(set.for_type(t), SearchStrategy::vector_only());
            }
        }
    }

    #[test]
    fn test_without_bm25() {
        let set = strategy_for(IntentLabel::Keyword).without_bm25();
        assert_eq!(set.entity, SearchStrategy::vector_only());
        assert_eq!(set.topic, SearchStrategy::vector_only());
        assert_eq!(
            SearchStrategy::vector_only().without_bm25(),
            SearchStrategy::vector_only()
        );
    }

    #[test]
    fn test_default_is_even_hybrid() {
        let s = SearchStrategy::default();
        assert!(s.use_bm25 && s.use_vector);
        assert_eq!(s.weights, HybridWeights::new(0.5, 0.5));
    }
}
