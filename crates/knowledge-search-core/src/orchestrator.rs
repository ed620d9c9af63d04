//! Per-record-type search pipeline.
//!
//! For one record type and strategy:
//!
//! 1. Run vector and BM25 retrieval concurrently, `2 × limit` candidates each.
//! 2. Rank: RRF when both sources are on, otherwise the single source's order.
//!    A BM25 ranking with no rows falls back to vector search, and a vector
//!    ranking with no rows falls back to BM25 on lexically indexed types
//!    unless [`TypeQuery::lexical_fallback`] is off.
//! 3. Fetch the full records in bounded-concurrency batches.
//! 4. Apply organization, attribute and date-range filters.
//! 5. Score with the [`DomainScorer`] and blend with the normalized BM25 score.
//! 6. Sort descending and truncate to `limit`.
//!
//! Any failing step degrades to fewer results and is recorded in
//! [`TypeDiagnostics`]; nothing here returns an error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::cache::IndexCache;
use crate::error::SearchError;
use crate::fusion::{self, finite_or_zero, FusedCandidate, DEFAULT_RRF_K};
use crate::lexical::{lexical_search, LexicalHit};
use crate::models::{Record, RecordType, ResultPayload, SearchFilters, SearchResult, Topic};
use crate::scoring::{normalize_similarity, DomainScorer, ScoreInput, ScoringWeights};
use crate::store::{RecordStore, VectorHit, VectorQuery, VectorStore};
use crate::strategy::SearchStrategy;

/// Raw BM25 scores are divided by this and capped at 1 before blending.
pub const BM25_NORMALIZER: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub rrf_k: f64,
    /// Ids per `get_by_ids` call.
    pub fetch_batch_size: usize,
    /// Maximum `get_by_ids` calls in flight.
    pub fetch_concurrency: usize,
    /// Shift weight to vector search when BM25 returns few candidates.
    pub rebalance_sparse_lexical: bool,
    pub scoring_weights: ScoringWeights,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            fetch_batch_size: 20,
            fetch_concurrency: 5,
            rebalance_sparse_lexical: true,
            scoring_weights: ScoringWeights::default(),
        }
    }
}

/// Which ranking produced a type's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPath {
    Fused,
    VectorOnly,
    LexicalOnly,
    /// BM25 found nothing; vector ranking used instead.
    VectorFallback,
    /// Vector search found nothing; BM25 ranking used instead.
    LexicalFallback,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDiagnostics {
    pub record_type: RecordType,
    pub strategy: SearchStrategy,
    pub path: RankingPath,
    pub vector_hits: usize,
    pub lexical_hits: usize,
    pub candidates: usize,
    pub fetched: usize,
    /// Candidates whose record could not be found.
    pub missing: usize,
    /// Records excluded by filters.
    pub filtered: usize,
    pub returned: usize,
    pub errors: Vec<SearchError>,
}

impl TypeDiagnostics {
    fn new(record_type: RecordType, strategy: SearchStrategy) -> Self {
        Self {
            record_type,
            strategy,
            path: RankingPath::None,
            vector_hits: 0,
            lexical_hits: 0,
            candidates: 0,
            fetched: 0,
            missing: 0,
            filtered: 0,
            returned: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeOutcome {
    pub results: Vec<SearchResult>,
    pub diagnostics: TypeDiagnostics,
}

/// One per-type search request.
#[derive(Debug, Clone)]
pub struct TypeQuery<'a> {
    pub record_type: RecordType,
    pub query: &'a str,
    pub limit: usize,
    pub filters: &'a SearchFilters,
    pub strategy: SearchStrategy,
    pub use_cache: bool,
    /// Whether an empty vector ranking may be replaced by BM25. Off when
    /// BM25 is disabled globally.
    pub lexical_fallback: bool,
}

/// Shared collaborators for all per-type searches.
#[derive(Clone)]
pub struct SearchContext {
    pub records: Arc<dyn RecordStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub cache: Arc<IndexCache>,
    pub scorer: Arc<dyn DomainScorer>,
    pub options: OrchestratorOptions,
}

/// Final score from the domain score and raw BM25 score under `strategy`.
pub fn blend(strategy: &SearchStrategy, domain: f64, bm25: f64) -> f64 {
    let domain = finite_or_zero(domain);
    let bm25 = finite_or_zero(bm25);
    let score = if bm25 > 0.0 && strategy.use_bm25 {
        let normalized = (bm25 / BM25_NORMALIZER).min(1.0);
        if strategy.use_vector {
            domain * strategy.weights.vector + normalized * strategy.weights.bm25
        } else {
            normalized
        }
    } else {
        domain
    };
    finite_or_zero(score).max(0.0)
}

/// Rebuilds a topic from the denormalized fields of its vector hit.
fn topic_from_hit(hit: &VectorHit, filters: &SearchFilters) -> Record {
    Record::Topic(Topic {
        id: hit.id.clone(),
        organization_id: hit.organization_id.clone(),
        title: hit.title.clone().unwrap_or_default(),
        content_summary: hit.summary.clone(),
        // The vector store already applied the category restriction.
        semantic_category: filters.topic_semantic_category.clone(),
        meeting_note_id: hit.meeting_note_id.clone(),
        regulation_id: hit.regulation_id.clone(),
        ..Topic::default()
    })
}

impl SearchContext {
    pub fn new(
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorStore>,
        cache: Arc<IndexCache>,
        scorer: Arc<dyn DomainScorer>,
    ) -> Self {
        Self {
            records,
            vectors,
            cache,
            scorer,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    async fn vector_candidates(&self, q: &TypeQuery<'_>, limit: usize) -> Result<Vec<VectorHit>> {
        let query = VectorQuery::new(q.record_type, q.query, limit, q.filters);
        self.vectors.find_similar(&query).await
    }

    async fn lexical_candidates(&self, q: &TypeQuery<'_>, limit: usize) -> Result<Vec<LexicalHit>> {
        lexical_search(
            self.records.as_ref(),
            &self.cache,
            q.record_type,
            q.query,
            limit,
            q.filters,
            q.use_cache,
        )
        .await
    }

    /// Runs the full pipeline for one record type.
    pub async fn search_type(&self, q: &TypeQuery<'_>) -> TypeOutcome {
        let record_type = q.record_type;
        let mut diag = TypeDiagnostics::new(record_type, q.strategy);
        if q.limit == 0 || q.query.trim().is_empty() {
            return TypeOutcome {
                results: Vec::new(),
                diagnostics: diag,
            };
        }

        let candidate_limit = q.limit.saturating_mul(2);
        let use_vector = q.strategy.use_vector;
        let use_bm25 = q.strategy.use_bm25 && record_type.has_lexical_index();

        let (vector, lexical) = futures::join!(
            async {
                if use_vector {
                    Some(self.vector_candidates(q, candidate_limit).await)
                } else {
                    None
                }
            },
            async {
                if use_bm25 {
                    Some(self.lexical_candidates(q, candidate_limit).await)
                } else {
                    None
                }
            },
        );
        let mut vector_hits = absorb_vector(vector, &mut diag);
        let mut lexical_hits = absorb_lexical(lexical, &mut diag);

        let (path, effective, candidates) = match (use_vector, use_bm25) {
            (true, true) => {
                let weights = if self.options.rebalance_sparse_lexical {
                    fusion::rebalance(q.strategy.weights, vector_hits.len(), lexical_hits.len())
                } else {
                    q.strategy.weights
                };
                let fused = fusion::fuse(&vector_hits, &lexical_hits, weights, self.options.rrf_k);
                (RankingPath::Fused, q.strategy, fused)
            }
            (true, false) => {
                if vector_hits.is_empty() && q.lexical_fallback && record_type.has_lexical_index() {
                    tracing::debug!(%record_type, "no vector hits, falling back to BM25");
                    lexical_hits = absorb_lexical(
                        Some(self.lexical_candidates(q, candidate_limit).await),
                        &mut diag,
                    );
                    (
                        RankingPath::LexicalFallback,
                        SearchStrategy::bm25_only(),
                        fusion::from_lexical(&lexical_hits),
                    )
                } else {
                    (RankingPath::VectorOnly, q.strategy, fusion::from_vector(&vector_hits))
                }
            }
            (false, true) => {
                if lexical_hits.is_empty() {
                    tracing::debug!(%record_type, "no BM25 hits, falling back to vector search");
                    vector_hits = absorb_vector(
                        Some(self.vector_candidates(q, candidate_limit).await),
                        &mut diag,
                    );
                    (
                        RankingPath::VectorFallback,
                        SearchStrategy::vector_only(),
                        fusion::from_vector(&vector_hits),
                    )
                } else {
                    (RankingPath::LexicalOnly, q.strategy, fusion::from_lexical(&lexical_hits))
                }
            }
            (false, false) => (RankingPath::None, q.strategy, Vec::new()),
        };
        diag.path = path;
        diag.vector_hits = vector_hits.len();
        diag.lexical_hits = lexical_hits.len();
        diag.candidates = candidates.len();

        if candidates.is_empty() {
            return TypeOutcome {
                results: Vec::new(),
                diagnostics: diag,
            };
        }

        let mut records = self.fetch_records(record_type, &candidates, &mut diag).await;
        diag.fetched = records.len();

        let hits_by_id: HashMap<&str, &VectorHit> =
            vector_hits.iter().map(|h| (h.id.as_str(), h)).collect();

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let hit = hits_by_id.get(candidate.id.as_str()).copied();
            let record = match (records.remove(&candidate.id), hit) {
                (Some(record), _) => record,
                (None, Some(hit)) if record_type == RecordType::Topic => {
                    topic_from_hit(hit, q.filters)
                }
                (None, _) => {
                    diag.missing += 1;
                    tracing::debug!(%record_type, id = %candidate.id, "candidate record not found");
                    continue;
                }
            };
            if !record.matches_filters(q.filters) {
                diag.filtered += 1;
                continue;
            }
            results.push(self.score_candidate(q, &effective, candidate, record, hit));
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(q.limit);
        diag.returned = results.len();

        tracing::debug!(
            %record_type,
            path = ?diag.path,
            vector = diag.vector_hits,
            lexical = diag.lexical_hits,
            returned = diag.returned,
            "type search finished"
        );
        TypeOutcome {
            results,
            diagnostics: diag,
        }
    }

    fn score_candidate(
        &self,
        q: &TypeQuery<'_>,
        strategy: &SearchStrategy,
        candidate: FusedCandidate,
        record: Record,
        hit: Option<&VectorHit>,
    ) -> SearchResult {
        let similarity = normalize_similarity(candidate.similarity);
        let search_count = match &record {
            Record::Topic(t) => t.search_count.unwrap_or(0),
            _ => 0,
        };
        let domain = self.scorer.score(&ScoreInput {
            similarity,
            record: &record,
            weights: &self.options.scoring_weights,
            filters: q.filters,
            search_count,
            query: q.query,
        });
        let score = blend(strategy, domain, candidate.bm25_score);
        let payload =
            ResultPayload::from_record(record, hit.and_then(|h| h.summary.as_deref()));
        SearchResult {
            id: candidate.id,
            score,
            similarity,
            matched_terms: candidate.matched_terms,
            payload,
        }
    }

    /// Fetches candidate records in batches, at most
    /// `fetch_concurrency` batches at a time. Failed batches are skipped.
    async fn fetch_records(
        &self,
        record_type: RecordType,
        candidates: &[FusedCandidate],
        diag: &mut TypeDiagnostics,
    ) -> HashMap<String, Record> {
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let batches: Vec<Vec<String>> = ids
            .chunks(self.options.fetch_batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();

        let results: Vec<Result<Vec<Record>>> = stream::iter(batches)
            .map(|batch| async move { self.records.get_by_ids(record_type, &batch).await })
            .buffer_unordered(self.options.fetch_concurrency.max(1))
            .collect()
            .await;

        let mut records = HashMap::new();
        for result in results {
            match result {
                Ok(batch) => {
                    for record in batch {
                        if record.record_type() != record_type {
                            tracing::warn!(%record_type, id = record.id(), "store returned a record of another type");
                            diag.errors.push(SearchError::SkippedRecord {
                                record_type,
                                id: record.id().to_string(),
                                reason: format!("expected {}, got {}", record_type, record.record_type()),
                            });
                            continue;
                        }
                        records.insert(record.id().to_string(), record);
                    }
                }
                Err(e) => {
                    tracing::warn!(%record_type, error = %format!("{e:#}"), "record batch fetch failed");
                    diag.errors.push(SearchError::RecordFetch {
                        record_type,
                        message: format!("{e:#}"),
                    });
                }
            }
        }
        records
    }

    pub async fn search_entities(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        strategy: SearchStrategy,
    ) -> TypeOutcome {
        self.search_with(RecordType::Entity, query, limit, filters, strategy)
            .await
    }

    pub async fn search_relations(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        strategy: SearchStrategy,
    ) -> TypeOutcome {
        self.search_with(RecordType::Relation, query, limit, filters, strategy)
            .await
    }

    pub async fn search_topics(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        strategy: SearchStrategy,
    ) -> TypeOutcome {
        self.search_with(RecordType::Topic, query, limit, filters, strategy)
            .await
    }

    pub async fn search_startups(&self, query: &str, limit: usize, filters: &SearchFilters) -> TypeOutcome {
        self.search_with(RecordType::Startup, query, limit, filters, SearchStrategy::vector_only())
            .await
    }

    pub async fn search_focus_initiatives(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> TypeOutcome {
        self.search_with(
            RecordType::FocusInitiative,
            query,
            limit,
            filters,
            SearchStrategy::vector_only(),
        )
        .await
    }

    pub async fn search_meeting_notes(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> TypeOutcome {
        self.search_with(RecordType::MeetingNote, query, limit, filters, SearchStrategy::vector_only())
            .await
    }

    pub async fn search_regulations(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> TypeOutcome {
        self.search_with(RecordType::Regulation, query, limit, filters, SearchStrategy::vector_only())
            .await
    }

    async fn search_with(
        &self,
        record_type: RecordType,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        strategy: SearchStrategy,
    ) -> TypeOutcome {
        self.search_type(&TypeQuery {
            record_type,
            query,
            limit,
            filters,
            strategy,
            use_cache: true,
            lexical_fallback: true,
        })
        .await
    }
}

fn absorb_vector(result: Option<Result<Vec<VectorHit>>>, diag: &mut TypeDiagnostics) -> Vec<VectorHit> {
    match result {
        None => Vec::new(),
        Some(Ok(hits)) => hits,
        Some(Err(e)) => {
            let record_type = diag.record_type;
            tracing::warn!(%record_type, error = %format!("{e:#}"), "vector search failed");
            diag.errors.push(SearchError::VectorSearch {
                record_type,
                message: format!("{e:#}"),
            });
            Vec::new()
        }
    }
}

fn absorb_lexical(result: Option<Result<Vec<LexicalHit>>>, diag: &mut TypeDiagnostics) -> Vec<LexicalHit> {
    match result {
        None => Vec::new(),
        Some(Ok(hits)) => hits,
        Some(Err(e)) => {
            let record_type = diag.record_type;
            tracing::warn!(%record_type, error = %format!("{e:#}"), "BM25 search failed");
            diag.errors.push(SearchError::LexicalSearch {
                record_type,
                message: format!("{e:#}"),
            });
            Vec::new()
        }
    }
}
