//! Per-type BM25 search over the live record store.
//!
//! The corpus for `(record type, filters)` is loaded with
//! [`RecordStore::query_by_filter`], turned into weighted documents by
//! [`crate::text`], indexed, and kept in the [`IndexCache`] so later queries
//! over the same scope skip the store entirely.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::bm25::{Bm25Index, Bm25Params};
use crate::cache::IndexCache;
use crate::models::{RecordType, SearchFilters};
use crate::store::RecordStore;
use crate::text::lexical_document;

/// A lexical match for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub id: String,
    /// Raw (unbounded) BM25 score.
    pub bm25_score: f64,
    pub matched_terms: Vec<String>,
}

/// Runs BM25 search for one record type, returning at most `limit` hits.
///
/// Types without a lexical index, empty corpora and queries matching
/// nothing all yield an empty list. Store failures are returned as errors
/// for the caller to degrade on. With `use_cache == false` the cache is
/// neither read nor written.
pub async fn lexical_search(
    records: &dyn RecordStore,
    cache: &IndexCache,
    record_type: RecordType,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
    use_cache: bool,
) -> Result<Vec<LexicalHit>> {
    if !record_type.has_lexical_index() || query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let cached = if use_cache {
        cache.get(record_type, filters)
    } else {
        None
    };

    let index = match cached {
        Some(index) => index,
        None => {
            let corpus = records.query_by_filter(record_type, filters).await?;
            let docs: Vec<_> = corpus.iter().filter_map(lexical_document).collect();
            if docs.is_empty() {
                tracing::debug!(%record_type, "no lexical documents in scope");
                return Ok(Vec::new());
            }
            let index = Arc::new(Bm25Index::build(
                Bm25Params::for_record_type(record_type),
                docs,
            ));
            let stats = index.stats();
            tracing::info!(
                %record_type,
                documents = stats.document_count,
                terms = stats.term_count,
                "built BM25 index"
            );
            if use_cache {
                cache.set(record_type, filters, Arc::clone(&index), stats.document_count);
            }
            index
        }
    };

    Ok(index
        .search(query, limit)
        .into_iter()
        .map(|hit| LexicalHit {
            id: hit.id,
            bm25_score: hit.score,
            matched_terms: hit.matched_terms,
        })
        .collect())
}
