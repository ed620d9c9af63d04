//! Integration tests for the SQLite store, settings persistence and the
//! import path, each against a fresh database in a temp directory.

use std::sync::Arc;
use tempfile::TempDir;

use knowledge_search::config::Config;
use knowledge_search::db;
use knowledge_search::engine::{open_engine, SearchOptions};
use knowledge_search::import::{import_records, parse_records};
use knowledge_search::migrate;
use knowledge_search::settings::{
    get_search_config, reset_search_config, set_search_config, SearchSettingsPatch,
    SettingsStore, SEARCH_CONFIG_KEY,
};
use knowledge_search::sqlite_store::SqliteStore;
use knowledge_search_core::embedding::{Embedder, HashingEmbedder};
use knowledge_search_core::models::{Entity, Record, RecordType, SearchFilters, Topic};
use knowledge_search_core::store::{RecordStore, VectorQuery, VectorStore};
use knowledge_search_core::strategy::SearchStrategy;

fn config(tmp: &TempDir) -> Config {
    Config::with_db_path(tmp.path().join("data").join("ksearch.sqlite"))
}

async fn open_store(cfg: &Config, embedded: bool) -> SqliteStore {
    let pool = db::connect(cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let embedder = if embedded {
        Some(Arc::new(HashingEmbedder::default()) as Arc<dyn Embedder>)
    } else {
        None
    };
    SqliteStore::new(pool, embedder)
}

fn entity(id: &str, org: Option<&str>, name: &str) -> Record {
    Record::Entity(Entity {
        id: id.into(),
        organization_id: org.map(str::to_string),
        name: name.into(),
        entity_type: Some("company".into()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    assert!(cfg.db.path.exists());
}

#[tokio::test]
async fn test_upsert_replaces_and_fetches_by_id() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&config(&tmp), false).await;

    store.upsert_record(&entity("e1", Some("org-a"), "Toyota")).await.unwrap();
    store.upsert_record(&entity("e2", Some("org-a"), "Honda")).await.unwrap();
    store
        .upsert_record(&entity("e1", Some("org-a"), "Toyota Motor"))
        .await
        .unwrap();
    assert_eq!(store.count(RecordType::Entity).await.unwrap(), 2);

    let fetched = store
        .get_by_ids(RecordType::Entity, &["e1".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].label(), "Toyota Motor");

    // Same id under another type is a different record.
    let none = store
        .get_by_ids(RecordType::Topic, &["e1".to_string()])
        .await
        .unwrap();
    assert!(none.is_empty());

    assert!(store.delete_record(RecordType::Entity, "e2").await.unwrap());
    assert!(!store.delete_record(RecordType::Entity, "e2").await.unwrap());
    assert_eq!(store.count(RecordType::Entity).await.unwrap(), 1);
}

#[tokio::test]
async fn test_query_by_filter_scopes_by_organization() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&config(&tmp), false).await;
    store.upsert_record(&entity("a", Some("org-a"), "Toyota")).await.unwrap();
    store.upsert_record(&entity("b", Some("org-b"), "Toyota")).await.unwrap();
    store.upsert_record(&entity("orphan", None, "Toyota")).await.unwrap();

    let filters = SearchFilters {
        organization_id: Some("org-a".into()),
        ..Default::default()
    };
    let ids: Vec<String> = store
        .query_by_filter(RecordType::Entity, &filters)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(ids, vec!["a"]);

    let all = store
        .query_by_filter(RecordType::Entity, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_vector_search_respects_org_and_category() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&config(&tmp), true).await;
    store
        .upsert_record(&entity("a", Some("org-a"), "battery recycling"))
        .await
        .unwrap();
    store
        .upsert_record(&entity("b", Some("org-b"), "battery recycling"))
        .await
        .unwrap();
    store
        .upsert_record(&Record::Topic(Topic {
            id: "t1".into(),
            organization_id: Some("org-a".into()),
            title: "battery recycling".into(),
            semantic_category: Some("market".into()),
            ..Default::default()
        }))
        .await
        .unwrap();

    let filters = SearchFilters {
        organization_id: Some("org-a".into()),
        ..Default::default()
    };
    let hits = store
        .find_similar(&VectorQuery::new(RecordType::Entity, "battery recycling", 10, &filters))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
    assert!(hits[0].similarity > 0.9);
    assert_eq!(hits[0].organization_id.as_deref(), Some("org-a"));

    let wrong_category = SearchFilters {
        topic_semantic_category: Some("policy".into()),
        ..Default::default()
    };
    let hits = store
        .find_similar(&VectorQuery::new(
            RecordType::Topic,
            "battery recycling",
            10,
            &wrong_category,
        ))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_vector_search_without_embedder_is_empty() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&config(&tmp), false).await;
    store.upsert_record(&entity("a", None, "Toyota")).await.unwrap();
    let filters = SearchFilters::default();
    let hits = store
        .find_similar(&VectorQuery::new(RecordType::Entity, "Toyota", 10, &filters))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_settings_persist_across_connections() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);

    {
        let store = open_store(&cfg, false).await;
        assert!(get_search_config(&store).await.enable_bm25);
        let updated = set_search_config(
            &store,
            SearchSettingsPatch {
                enable_bm25: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!updated.enable_bm25);
        assert!(updated.enable_router);
        store.pool().close().await;
    }

    let store = open_store(&cfg, false).await;
    let raw = store.get(SEARCH_CONFIG_KEY).await.unwrap().unwrap();
    assert!(raw.contains("\"enableBM25\":false"));
    assert!(!get_search_config(&store).await.enable_bm25);

    let reset = reset_search_config(&store).await.unwrap();
    assert!(reset.enable_bm25);
    assert!(store.get(SEARCH_CONFIG_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_settings_fall_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&config(&tmp), false).await;
    store.put(SEARCH_CONFIG_KEY, "{not json").await.unwrap();
    let settings = get_search_config(&store).await;
    assert!(settings.enable_bm25);
    assert!(settings.enable_router);
    assert!(settings.use_hybrid_search_by_default);
}

#[tokio::test]
async fn test_import_invalidates_engine_cache() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let (engine, store) = open_engine(&cfg).await.unwrap();

    let (records, skipped) = parse_records(
        r#"[
            {"recordType": "entity", "id": "e1", "name": "Toyota Motor", "type": "company"},
            {"recordType": "topic", "id": "t1", "title": "Toyota EV pricing", "content": "pricing"}
        ]"#,
    )
    .unwrap();
    assert_eq!(skipped, 0);
    let report = import_records(&store, Some(&engine), &records).await.unwrap();
    assert_eq!(report.total(), 2);

    let options = SearchOptions {
        use_router: Some(false),
        hybrid: Some(SearchStrategy::bm25_only()),
        ..SearchOptions::default()
    };
    let first = engine.search_knowledge_graph("Toyota", &options).await;
    assert!(first.iter().any(|r| r.id == "e1"));
    assert!(!engine.cache().is_empty());

    let (more, _) = parse_records(
        r#"[{"recordType": "entity", "id": "e2", "name": "Toyota Tsusho", "type": "company"}]"#,
    )
    .unwrap();
    import_records(&store, Some(&engine), &more).await.unwrap();

    let second = engine.search_knowledge_graph("Toyota", &options).await;
    assert!(second.iter().any(|r| r.id == "e2"));
    store.pool().close().await;
}
