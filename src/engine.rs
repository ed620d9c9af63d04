//! Top-level knowledge-graph search.
//!
//! [`SearchEngine`] resolves the per-type strategies for a query (intent
//! router, caller override, or the settings-driven default), fans the query
//! out to all seven record types under a deadline, and merges the results
//! under the global budget. It owns the shared BM25 [`IndexCache`].
//!
//! Public search entry points never return errors. Failures of individual
//! types and timeouts are reported in [`SearchDiagnostics`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use knowledge_search_core::aggregate::{self, BudgetPolicy, FanOut};
use knowledge_search_core::cache::{CacheStats, IndexCache};
use knowledge_search_core::error::SearchError;
use knowledge_search_core::intent::{Classifier, PatternClassifier, QueryIntent};
use knowledge_search_core::models::{RecordType, SearchFilters, SearchResult};
use knowledge_search_core::orchestrator::{SearchContext, TypeDiagnostics};
use knowledge_search_core::scoring::DefaultScorer;
use knowledge_search_core::strategy::{strategy_for, SearchStrategy, StrategySet};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::settings::{
    get_search_config, reset_search_config, set_search_config, SearchSettings,
    SearchSettingsPatch, SettingsStore,
};
use crate::sqlite_store::SqliteStore;

/// Per-call options of [`SearchEngine::search_knowledge_graph`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub filters: SearchFilters,
    pub use_cache: bool,
    pub timeout: Duration,
    /// Strategy applied to every lexically indexed type when the router is
    /// not used.
    pub hybrid: Option<SearchStrategy>,
    /// Overrides the `enableRouter` setting.
    pub use_router: Option<bool>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filters: SearchFilters::default(),
            use_cache: true,
            timeout: Duration::from_secs(10),
            hybrid: None,
            use_router: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchDiagnostics {
    /// Classifier output, present when the router chose the strategies.
    pub intent: Option<QueryIntent>,
    pub strategies: StrategySet,
    pub settings: SearchSettings,
    pub per_type: Vec<TypeDiagnostics>,
    pub timed_out: bool,
    pub errors: Vec<SearchError>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub diagnostics: SearchDiagnostics,
}

pub struct SearchEngine {
    ctx: SearchContext,
    classifier: Arc<dyn Classifier>,
    settings: Arc<dyn SettingsStore>,
    budget: BudgetPolicy,
}

impl SearchEngine {
    pub fn new(ctx: SearchContext, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            ctx,
            classifier: Arc::new(PatternClassifier::new()),
            settings,
            budget: BudgetPolicy::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_budget(mut self, budget: BudgetPolicy) -> Self {
        self.budget = budget;
        self
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.ctx.cache
    }

    pub fn classify(&self, query: &str) -> QueryIntent {
        self.classifier.classify(query)
    }

    pub async fn search_knowledge_graph(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        self.search_with_diagnostics(query, options).await.results
    }

    /// Same as [`search_knowledge_graph`](Self::search_knowledge_graph) with
    /// the intent router forced on.
    pub async fn search_knowledge_graph_with_router(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let options = SearchOptions {
            use_router: Some(true),
            ..options.clone()
        };
        self.search_knowledge_graph(query, &options).await
    }

    pub async fn search_with_diagnostics(&self, query: &str, options: &SearchOptions) -> SearchOutcome {
        let started = Instant::now();
        let settings = self.load_settings(options.timeout).await;
        let query = query.trim();

        if query.is_empty() {
            tracing::debug!("empty query, skipping search");
            return SearchOutcome {
                results: Vec::new(),
                diagnostics: SearchDiagnostics {
                    intent: None,
                    strategies: StrategySet::default(),
                    settings,
                    per_type: Vec::new(),
                    timed_out: false,
                    errors: Vec::new(),
                    elapsed_ms: 0,
                },
            };
        }

        let (intent, strategies) = self.resolve_strategies(query, options, &settings);
        let plan = aggregate::search_plan(options.limit, &strategies, &self.budget);
        tracing::debug!(
            query,
            limit = options.limit,
            router = intent.is_some(),
            ?strategies,
            "knowledge graph search started"
        );

        let outcome = aggregate::search_all(
            &self.ctx,
            FanOut {
                query,
                limit: options.limit,
                filters: &options.filters,
                plan: &plan,
                use_cache: options.use_cache,
                lexical_fallback: settings.enable_bm25,
                policy: &self.budget,
            },
            tokio::time::sleep(options.timeout.saturating_sub(started.elapsed())),
        )
        .await;

        let mut errors: Vec<SearchError> = outcome
            .per_type
            .iter()
            .flat_map(|d| d.errors.iter().cloned())
            .collect();
        if outcome.timed_out {
            errors.push(SearchError::Timeout {
                timeout_ms: options.timeout.as_millis() as u64,
                completed: outcome.per_type.len(),
                total: plan.len(),
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            results = outcome.results.len(),
            timed_out = outcome.timed_out,
            errors = errors.len(),
            elapsed_ms,
            "knowledge graph search finished"
        );

        SearchOutcome {
            results: outcome.results,
            diagnostics: SearchDiagnostics {
                intent,
                strategies,
                settings,
                per_type: outcome.per_type,
                timed_out: outcome.timed_out,
                errors,
                elapsed_ms,
            },
        }
    }

    /// Reads the settings within `budget`; a slow or failing settings store
    /// reads as the defaults.
    async fn load_settings(&self, budget: Duration) -> SearchSettings {
        match tokio::time::timeout(budget, get_search_config(self.settings.as_ref())).await {
            Ok(settings) => settings,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = budget.as_millis() as u64,
                    "search settings not read in time, using defaults"
                );
                SearchSettings::default()
            }
        }
    }

    fn resolve_strategies(
        &self,
        query: &str,
        options: &SearchOptions,
        settings: &SearchSettings,
    ) -> (Option<QueryIntent>, StrategySet) {
        let use_router = options.use_router.unwrap_or(settings.enable_router);
        let (intent, strategies) = if use_router {
            let intent = self.classifier.classify(query);
            let strategies = strategy_for(intent.label);
            (Some(intent), strategies)
        } else if let Some(hybrid) = options.hybrid {
            (None, StrategySet::uniform(hybrid))
        } else if settings.enable_bm25 && settings.use_hybrid_search_by_default {
            (None, StrategySet::default())
        } else {
            (None, StrategySet::uniform(SearchStrategy::vector_only()))
        };

        if settings.enable_bm25 {
            (intent, strategies)
        } else {
            (intent, strategies.without_bm25())
        }
    }

    pub async fn get_search_config(&self) -> SearchSettings {
        get_search_config(self.settings.as_ref()).await
    }

    pub async fn set_search_config(&self, patch: SearchSettingsPatch) -> anyhow::Result<SearchSettings> {
        set_search_config(self.settings.as_ref(), patch).await
    }

    pub async fn reset_search_config(&self) -> anyhow::Result<SearchSettings> {
        reset_search_config(self.settings.as_ref()).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.ctx.cache.stats()
    }

    // Invalidation is coarse: any change drops every cached index.

    pub fn invalidate_entity_cache(&self) {
        self.invalidate_for(RecordType::Entity);
    }

    pub fn invalidate_relation_cache(&self) {
        self.invalidate_for(RecordType::Relation);
    }

    pub fn invalidate_topic_cache(&self) {
        self.invalidate_for(RecordType::Topic);
    }

    pub fn invalidate_all_cache(&self) {
        self.ctx.cache.clear();
    }

    /// Called after records of `record_type` change. Types without a
    /// lexical index have nothing cached.
    pub fn invalidate_for(&self, record_type: RecordType) {
        if record_type.has_lexical_index() {
            tracing::debug!(%record_type, "invalidating index cache");
            self.ctx.cache.clear();
        }
    }

    /// Starts a background task sweeping expired indexes every `interval`
    /// (which must be non-zero). Dropping the handle detaches the task.
    pub fn spawn_cache_janitor(&self, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(&self.ctx.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup();
            }
        })
    }
}

/// Opens the configured database and builds an engine over it. The store
/// is returned as well for writes (imports, settings).
pub async fn open_engine(config: &Config) -> anyhow::Result<(SearchEngine, Arc<SqliteStore>)> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool, create_embedder(&config.embedding)?));
    let cache = Arc::new(IndexCache::new(config.cache.index_cache_config()));
    let ctx = SearchContext::new(store.clone(), store.clone(), cache, Arc::new(DefaultScorer))
        .with_options(config.retrieval.orchestrator_options());
    let engine = SearchEngine::new(ctx, store.clone()).with_budget(config.retrieval.budget());
    if config.cache.cleanup_interval_secs > 0 {
        engine.spawn_cache_janitor(Duration::from_secs(config.cache.cleanup_interval_secs));
    }
    Ok((engine, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use knowledge_search_core::embedding::HashingEmbedder;
    use knowledge_search_core::intent::IntentLabel;
    use knowledge_search_core::store::memory::InMemoryStore;

    fn engine() -> SearchEngine {
        let store = Arc::new(InMemoryStore::with_embedder(Arc::new(HashingEmbedder::default())));
        let ctx = SearchContext::new(
            store.clone(),
            store,
            Arc::new(IndexCache::default()),
            Arc::new(DefaultScorer),
        );
        SearchEngine::new(ctx, Arc::new(MemorySettings::new()))
    }

    fn no_router() -> SearchOptions {
        SearchOptions {
            use_router: Some(false),
            ..SearchOptions::default()
        }
    }

    #[test]
    fn test_default_strategy_is_even_hybrid() {
        let e = engine();
        let (intent, set) = e.resolve_strategies("q", &no_router(), &SearchSettings::default());
        assert!(intent.is_none());
        assert_eq!(set, StrategySet::uniform(SearchStrategy::hybrid(0.5, 0.5)));
    }

    #[test]
    fn test_hybrid_off_by_default_gives_vector_only() {
        let e = engine();
        let settings = SearchSettings {
            use_hybrid_search_by_default: false,
            ..SearchSettings::default()
        };
        let (_, set) = e.resolve_strategies("q", &no_router(), &settings);
        assert_eq!(set, StrategySet::uniform(SearchStrategy::vector_only()));
    }

    #[test]
    fn test_caller_hybrid_applies_uniformly() {
        let e = engine();
        let options = SearchOptions {
            hybrid: Some(SearchStrategy::hybrid(0.8, 0.2)),
            ..no_router()
        };
        let (_, set) = e.resolve_strategies("q", &options, &SearchSettings::default());
        assert_eq!(set.entity, SearchStrategy::hybrid(0.8, 0.2));
        assert_eq!(set.topic, SearchStrategy::hybrid(0.8, 0.2));
    }

    #[test]
    fn test_router_uses_intent_table() {
        let e = engine();
        let (intent, set) = e.resolve_strategies(
            "Toyota Motor",
            &SearchOptions::default(),
            &SearchSettings::default(),
        );
        assert_eq!(intent.unwrap().label, IntentLabel::Keyword);
        assert_eq!(set, strategy_for(IntentLabel::Keyword));
    }

    #[test]
    fn test_bm25_disabled_strips_every_strategy() {
        let e = engine();
        let settings = SearchSettings {
            enable_bm25: false,
            ..SearchSettings::default()
        };
        let (_, set) = e.resolve_strategies("Toyota Motor", &SearchOptions::default(), &settings);
        assert!(!set.entity.use_bm25 && !set.relation.use_bm25 && !set.topic.use_bm25);
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let e = engine();
        let outcome = e.search_with_diagnostics("   ", &SearchOptions::default()).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.diagnostics.per_type.is_empty());
        assert!(e.cache().is_empty());
    }
}
