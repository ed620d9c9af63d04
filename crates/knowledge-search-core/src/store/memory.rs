//! In-memory [`RecordStore`] + [`VectorStore`] for tests and small corpora.
//!
//! Records are kept per type in insertion order; vector search is
//! brute-force cosine similarity over the stored embeddings, with the query
//! embedded by the configured [`Embedder`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::{cosine_similarity, similarity_from_cosine, Embedder};
use crate::models::{Record, RecordType, SearchFilters};

use super::{RecordStore, VectorHit, VectorQuery, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<RecordType, Vec<Record>>>,
    vectors: RwLock<HashMap<(RecordType, String), Vec<f32>>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder: Some(embedder),
            ..Self::default()
        }
    }

    /// Inserts or replaces a record (keeping its original position) and
    /// optionally its embedding.
    pub fn upsert(&self, record: Record, vector: Option<Vec<f32>>) {
        let record_type = record.record_type();
        let id = record.id().to_string();
        {
            let mut records = self.records.write();
            let list = records.entry(record_type).or_default();
            match list.iter_mut().find(|r| r.id() == id) {
                Some(existing) => *existing = record,
                None => list.push(record),
            }
        }
        if let Some(vector) = vector {
            self.vectors.write().insert((record_type, id), vector);
        }
    }

    /// Inserts a record and embeds its text with the store's embedder.
    pub async fn upsert_embedded(&self, record: Record) -> Result<()> {
        let Some(embedder) = self.embedder.as_ref() else {
            bail!("InMemoryStore has no embedder configured");
        };
        let vector = embedder.embed(&record.embedding_text()).await?;
        self.upsert(record, Some(vector));
        Ok(())
    }

    pub fn remove(&self, record_type: RecordType, id: &str) -> bool {
        self.vectors.write().remove(&(record_type, id.to_string()));
        let mut records = self.records.write();
        let Some(list) = records.get_mut(&record_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id() != id);
        list.len() != before
    }

    pub fn len(&self, record_type: RecordType) -> usize {
        self.records.read().get(&record_type).map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn find_similar(&self, query: &VectorQuery<'_>) -> Result<Vec<VectorHit>> {
        let Some(embedder) = self.embedder.as_ref() else {
            bail!("InMemoryStore has no embedder configured");
        };
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embedder.embed(query.text).await?;

        let records = self.records.read();
        let vectors = self.vectors.read();
        let mut hits: Vec<VectorHit> = records
            .get(&query.record_type)
            .into_iter()
            .flatten()
            .filter(|r| match query.organization_id {
                Some(org) => r.organization_id() == Some(org),
                None => true,
            })
            .filter(|r| match query.category {
                Some(cat) => r.semantic_category() == Some(cat),
                None => true,
            })
            .filter_map(|r| {
                let v = vectors.get(&(query.record_type, r.id().to_string()))?;
                let similarity = similarity_from_cosine(cosine_similarity(&query_vec, v));
                (similarity > 0.0).then(|| VectorHit::for_record(r, similarity))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.limit);
        Ok(hits)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get_by_ids(&self, record_type: RecordType, ids: &[String]) -> Result<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .get(&record_type)
            .into_iter()
            .flatten()
            .filter(|r| ids.iter().any(|id| id == r.id()))
            .cloned()
            .collect())
    }

    async fn query_by_filter(
        &self,
        record_type: RecordType,
        filters: &SearchFilters,
    ) -> Result<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .get(&record_type)
            .into_iter()
            .flatten()
            .filter(|r| r.matches_scope(filters))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::{Entity, Topic};
    use futures::executor::block_on;

    fn entity(id: &str, org: &str, name: &str) -> Record {
        Record::Entity(Entity {
            id: id.into(),
            organization_id: Some(org.into()),
            name: name.into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let store = InMemoryStore::new();
        store.upsert(entity("1", "o", "first"), None);
        store.upsert(entity("2", "o", "second"), None);
        store.upsert(entity("1", "o", "renamed"), None);
        let all = block_on(store.query_by_filter(RecordType::Entity, &SearchFilters::default())).unwrap();
        let names: Vec<_> = all.iter().map(|r| r.label()).collect();
        assert_eq!(names, vec!["renamed", "second"]);
    }

    #[test]
    fn test_get_by_ids_ignores_missing() {
        let store = InMemoryStore::new();
        store.upsert(entity("1", "o", "one"), None);
        let got = block_on(store.get_by_ids(
            RecordType::Entity,
            &["1".to_string(), "404".to_string()],
        ))
        .unwrap();
        assert_eq!(got.len(), 1);
        assert!(block_on(store.get_by_ids(RecordType::Topic, &["1".to_string()]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_query_by_filter_scopes_organization() {
        let store = InMemoryStore::new();
        store.upsert(entity("1", "a", "one"), None);
        store.upsert(entity("2", "b", "two"), None);
        let scoped = block_on(store.query_by_filter(
            RecordType::Entity,
            &SearchFilters::for_organization("b"),
        ))
        .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id(), "2");
    }

    #[test]
    fn test_find_similar_ranks_and_filters() {
        let store = InMemoryStore::with_embedder(Arc::new(HashingEmbedder::new(128)));
        block_on(store.upsert_embedded(entity("1", "a", "battery supply chain"))).unwrap();
        block_on(store.upsert_embedded(entity("2", "a", "office party planning"))).unwrap();
        block_on(store.upsert_embedded(entity("3", "b", "battery supply chain"))).unwrap();

        let filters = SearchFilters::for_organization("a");
        let query = VectorQuery::new(RecordType::Entity, "battery supply", 10, &filters);
        let hits = block_on(store.find_similar(&query)).unwrap();
        assert_eq!(hits[0].id, "1");
        assert!(hits.iter().all(|h| h.id != "3"));
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.similarity)));
    }

    #[test]
    fn test_find_similar_topic_carries_denormalized_fields() {
        let store = InMemoryStore::with_embedder(Arc::new(HashingEmbedder::new(64)));
        let topic = Record::Topic(Topic {
            id: "t1".into(),
            title: "Hiring plan".into(),
            content_summary: Some("Plan for Q3 hiring".into()),
            meeting_note_id: Some("m1".into()),
            ..Default::default()
        });
        block_on(store.upsert_embedded(topic)).unwrap();
        let filters = SearchFilters::default();
        let hits = block_on(store.find_similar(&VectorQuery::new(
            RecordType::Topic,
            "hiring plan",
            5,
            &filters,
        )))
        .unwrap();
        assert_eq!(hits[0].summary.as_deref(), Some("Plan for Q3 hiring"));
        assert_eq!(hits[0].meeting_note_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_find_similar_without_embedder_fails() {
        let store = InMemoryStore::new();
        let filters = SearchFilters::default();
        let query = VectorQuery::new(RecordType::Entity, "x", 5, &filters);
        assert!(block_on(store.find_similar(&query)).is_err());
    }

    #[test]
    fn test_remove() {
        let store = InMemoryStore::new();
        store.upsert(entity("1", "o", "one"), Some(vec![1.0]));
        assert!(store.remove(RecordType::Entity, "1"));
        assert!(!store.remove(RecordType::Entity, "1"));
        assert_eq!(store.len(RecordType::Entity), 0);
    }
}
