//! Storage abstraction for Knowledge Search.
//!
//! The engine reads from two collaborators:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`RecordStore`] | Fetch full records by id, or every record in a filter scope (lexical corpus) |
//! | [`VectorStore`] | Nearest-neighbour search over record embeddings |
//!
//! Both are `Send + Sync` and async (via `async-trait`) so backends can be
//! SQLite, a remote vector database, or the [`memory::InMemoryStore`] used
//! in tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Record, RecordType, SearchFilters};

/// One nearest-neighbour hit. Besides the id and similarity, vector indexes
/// usually carry a few denormalized fields, which are used when the full
/// record cannot be fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VectorHit {
    pub id: String,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub organization_id: Option<String>,
    pub meeting_note_id: Option<String>,
    pub regulation_id: Option<String>,
}

impl VectorHit {
    pub fn new(id: impl Into<String>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            similarity,
            ..Self::default()
        }
    }

    /// A hit carrying the record's denormalized fields.
    pub fn for_record(record: &Record, similarity: f64) -> Self {
        let mut hit = Self::new(record.id(), similarity);
        hit.title = Some(record.label().to_string());
        hit.organization_id = record.organization_id().map(str::to_string);
        if let Record::Topic(t) = record {
            hit.summary = t.content_summary.clone();
            hit.meeting_note_id = t.meeting_note_id.clone();
            hit.regulation_id = t.regulation_id.clone();
        }
        hit
    }
}

/// A nearest-neighbour request.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub record_type: RecordType,
    pub text: &'a str,
    pub limit: usize,
    pub organization_id: Option<&'a str>,
    /// Topic semantic category restriction.
    pub category: Option<&'a str>,
}

impl<'a> VectorQuery<'a> {
    pub fn new(record_type: RecordType, text: &'a str, limit: usize, filters: &'a SearchFilters) -> Self {
        Self {
            record_type,
            text,
            limit,
            organization_id: filters.organization_id.as_deref(),
            category: match record_type {
                RecordType::Topic => filters.topic_semantic_category.as_deref(),
                _ => None,
            },
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns up to `query.limit` hits by descending similarity.
    async fn find_similar(&self, query: &VectorQuery<'_>) -> Result<Vec<VectorHit>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches the records of `record_type` with the given ids. Missing ids
    /// are silently absent from the result; order is not significant.
    async fn get_by_ids(&self, record_type: RecordType, ids: &[String]) -> Result<Vec<Record>>;

    /// Returns every record of `record_type` within the scope of `filters`
    /// (see [`Record::matches_scope`]).
    async fn query_by_filter(
        &self,
        record_type: RecordType,
        filters: &SearchFilters,
    ) -> Result<Vec<Record>>;
}
