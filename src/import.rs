//! Bulk import of records from a JSON file.
//!
//! The file holds an array of records, each tagged with `recordType`:
//!
//! ```json
//! [
//!   { "recordType": "entity", "id": "e1", "name": "Toyota", "type": "company" },
//!   { "recordType": "topic", "title": "EV pricing", "content": "..." }
//! ]
//! ```
//!
//! Records without an `id` get a fresh UUID. Items that do not parse are
//! skipped with a warning and counted in the report.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use knowledge_search_core::models::{Record, RecordType};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::engine::SearchEngine;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: BTreeMap<RecordType, usize>,
    pub skipped: usize,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

/// Parses a JSON array of records, assigning ids where missing. Returns the
/// records and the number of items that could not be parsed.
pub fn parse_records(json: &str) -> Result<(Vec<Record>, usize)> {
    let items: Vec<serde_json::Value> =
        serde_json::from_str(json).with_context(|| "Import file must be a JSON array of records")?;

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, mut item) in items.into_iter().enumerate() {
        if let Some(obj) = item.as_object_mut() {
            let missing_id = obj
                .get("id")
                .and_then(|v| v.as_str())
                .map_or(true, |s| s.trim().is_empty());
            if missing_id {
                obj.insert(
                    "id".to_string(),
                    serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
                );
            }
        }
        match serde_json::from_value::<Record>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unparseable import item");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

/// Stores `records` and invalidates the engine's cached indexes for every
/// type that changed.
pub async fn import_records(
    store: &SqliteStore,
    engine: Option<&SearchEngine>,
    records: &[Record],
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for record in records {
        store.upsert_record(record).await?;
        *report.imported.entry(record.record_type()).or_default() += 1;
    }
    if let Some(engine) = engine {
        for record_type in report.imported.keys() {
            engine.invalidate_for(*record_type);
        }
    }
    Ok(report)
}

pub async fn run_import(config: &Config, path: &Path) -> Result<ImportReport> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let (records, skipped) = parse_records(&json)?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool, create_embedder(&config.embedding)?);
    let mut report = import_records(&store, None, &records).await?;
    report.skipped = skipped;
    store.pool().close().await;

    tracing::info!(imported = report.total(), skipped, "import finished");
    Ok(report)
}
