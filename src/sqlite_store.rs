//! SQLite-backed [`RecordStore`], [`VectorStore`] and [`SettingsStore`].
//!
//! Records live in `records` as JSON, embeddings in `record_vectors` as
//! little-endian `f32` BLOBs, settings in `settings`. Vector search is a
//! brute-force cosine scan over the vectors of one record type, which is
//! adequate for the few-thousand-record corpora this store targets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use knowledge_search_core::embedding::{
    blob_to_vec, cosine_similarity, similarity_from_cosine, vec_to_blob, Embedder,
};
use knowledge_search_core::models::{Record, RecordType, SearchFilters};
use knowledge_search_core::store::{RecordStore, VectorHit, VectorQuery, VectorStore};

use crate::settings::SettingsStore;

pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { pool, embedder }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    /// Inserts or replaces a record, and its embedding when an embedder is
    /// configured.
    pub async fn upsert_record(&self, record: &Record) -> Result<()> {
        let record_type = record.record_type();
        let data_json = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO records (record_type, id, organization_id, data_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(record_type, id) DO UPDATE SET
                organization_id = excluded.organization_id,
                data_json = excluded.data_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record_type.as_str())
        .bind(record.id())
        .bind(record.organization_id())
        .bind(&data_json)
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store {} '{}'", record_type, record.id()))?;

        if let Some(embedder) = &self.embedder {
            let vector = embedder.embed(&record.embedding_text()).await?;
            sqlx::query(
                r#"
                INSERT INTO record_vectors (record_type, record_id, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(record_type, record_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(record_type.as_str())
            .bind(record.id())
            .bind(embedder.model_name())
            .bind(vector.len() as i64)
            .bind(vec_to_blob(&vector))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn delete_record(&self, record_type: RecordType, id: &str) -> Result<bool> {
        sqlx::query("DELETE FROM record_vectors WHERE record_type = ? AND record_id = ?")
            .bind(record_type.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM records WHERE record_type = ? AND id = ?")
            .bind(record_type.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self, record_type: RecordType) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE record_type = ?")
            .bind(record_type.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Decodes a stored record, skipping rows that no longer parse.
fn decode(record_type: RecordType, data_json: &str) -> Option<Record> {
    match serde_json::from_str::<Record>(data_json) {
        Ok(record) if record.record_type() == record_type => Some(record),
        Ok(record) => {
            tracing::warn!(%record_type, id = record.id(), "stored record has a mismatched type");
            None
        }
        Err(e) => {
            tracing::warn!(%record_type, error = %e, "skipping unreadable stored record");
            None
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_by_ids(&self, record_type: RecordType, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT data_json FROM records WHERE record_type = ");
        qb.push_bind(record_type.as_str());
        qb.push(" AND id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .filter_map(|row| decode(record_type, &row.get::<String, _>("data_json")))
            .collect())
    }

    async fn query_by_filter(
        &self,
        record_type: RecordType,
        filters: &SearchFilters,
    ) -> Result<Vec<Record>> {
        let rows = match filters.organization_id.as_deref() {
            Some(org) => {
                sqlx::query(
                    r#"
                    SELECT data_json FROM records
                    WHERE record_type = ? AND organization_id = ?
                    ORDER BY rowid
                    "#,
                )
                .bind(record_type.as_str())
                .bind(org)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT data_json FROM records WHERE record_type = ? ORDER BY rowid")
                    .bind(record_type.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .iter()
            .filter_map(|row| decode(record_type, &row.get::<String, _>("data_json")))
            .filter(|r| r.matches_scope(filters))
            .collect())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn find_similar(&self, query: &VectorQuery<'_>) -> Result<Vec<VectorHit>> {
        let Some(embedder) = self.embedder.as_ref() else {
            tracing::debug!(record_type = %query.record_type, "embeddings disabled, no vector hits");
            return Ok(Vec::new());
        };
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embedder.embed(query.text).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.data_json, v.embedding FROM record_vectors v \
             JOIN records r ON r.record_type = v.record_type AND r.id = v.record_id \
             WHERE v.record_type = ",
        );
        qb.push_bind(query.record_type.as_str());
        qb.push(" AND v.dims = ");
        qb.push_bind(query_vec.len() as i64);
        if let Some(org) = query.organization_id {
            qb.push(" AND r.organization_id = ");
            qb.push_bind(org);
        }
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter_map(|row| {
                let record = decode(query.record_type, &row.get::<String, _>("data_json"))?;
                if let Some(cat) = query.category {
                    if record.semantic_category() != Some(cat) {
                        return None;
                    }
                }
                let blob: Vec<u8> = row.get("embedding");
                let similarity =
                    similarity_from_cosine(cosine_similarity(&query_vec, &blob_to_vec(&blob)));
                (similarity > 0.0).then(|| VectorHit::for_record(&record, similarity))
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
impl SettingsStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
