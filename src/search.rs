//! `ksearch search`, `ksearch classify` and `ksearch cache-stats`.

use anyhow::{bail, Result};
use std::time::Duration;

use knowledge_search_core::models::{ResultPayload, SearchFilters, SearchResult};
use knowledge_search_core::strategy::SearchStrategy;

use crate::config::Config;
use crate::engine::{open_engine, SearchDiagnostics, SearchOptions};

const EXCERPT_CHARS: usize = 160;

/// Command-line search parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// `auto`, `hybrid`, `vector` or `keyword`.
    pub mode: String,
    pub router: bool,
    pub limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub filters: SearchFilters,
    pub no_cache: bool,
    pub explain: bool,
    pub json: bool,
}

/// Maps a CLI mode to search options. `auto` defers to the stored
/// settings; explicit modes disable the router unless `--router` is given.
pub fn options_for(config: &Config, req: &SearchRequest) -> Result<SearchOptions> {
    let hybrid = match req.mode.as_str() {
        "auto" => None,
        "hybrid" => Some(SearchStrategy::default()),
        "vector" => Some(SearchStrategy::vector_only()),
        "keyword" => Some(SearchStrategy::bm25_only()),
        other => bail!(
            "Unknown search mode: {}. Use auto, hybrid, vector, or keyword.",
            other
        ),
    };

    if req.mode != "auto" && req.mode != "keyword" && !config.embedding.is_enabled() {
        tracing::warn!(
            mode = %req.mode,
            "embeddings are disabled; vector search returns nothing and lexical types fall back to BM25"
        );
    }

    let use_router = if req.router {
        Some(true)
    } else if hybrid.is_some() {
        Some(false)
    } else {
        None
    };

    Ok(SearchOptions {
        limit: req.limit.unwrap_or(config.retrieval.default_limit),
        filters: req.filters.clone(),
        use_cache: !req.no_cache,
        timeout: req
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.retrieval.timeout()),
        hybrid,
        use_router,
    })
}

pub async fn run_search(config: &Config, query: &str, req: &SearchRequest) -> Result<()> {
    let options = options_for(config, req)?;
    let (engine, store) = open_engine(config).await?;
    let outcome = engine.search_with_diagnostics(query, &options).await;
    store.pool().close().await;

    if req.json {
        if req.explain {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&outcome.results)?);
        }
        return Ok(());
    }

    if outcome.results.is_empty() {
        println!("No results.");
    }
    for (i, result) in outcome.results.iter().enumerate() {
        print_result(i + 1, result);
    }
    if req.explain {
        print_diagnostics(&outcome.diagnostics);
    }
    Ok(())
}

fn print_result(rank: usize, result: &SearchResult) {
    println!(
        "{}. [{:.3}] {} / {}",
        rank,
        result.score,
        result.record_type(),
        title(&result.payload)
    );
    println!("    similarity: {:.3}", result.similarity);
    if !result.matched_terms.is_empty() {
        println!("    terms: {}", result.matched_terms.join(", "));
    }
    let excerpt = excerpt(&result.payload);
    if !excerpt.is_empty() {
        println!("    excerpt: \"{}\"", excerpt);
    }
    println!("    id: {}", result.id);
    println!();
}

fn title(payload: &ResultPayload) -> &str {
    let title = match payload {
        ResultPayload::Entity(e) => e.name.as_str(),
        ResultPayload::Relation(r) => r.relation_type.as_deref().unwrap_or(""),
        ResultPayload::Topic(t) => t.title.as_str(),
        ResultPayload::Startup(s) => s.title.as_str(),
        ResultPayload::FocusInitiative(r) | ResultPayload::MeetingNote(r) | ResultPayload::Regulation(r) => {
            r.title.as_str()
        }
    };
    if title.trim().is_empty() {
        "(untitled)"
    } else {
        title
    }
}

fn excerpt(payload: &ResultPayload) -> String {
    let text = match payload {
        ResultPayload::Entity(e) => e
            .searchable_text
            .clone()
            .unwrap_or_else(|| e.aliases.join(", ")),
        ResultPayload::Relation(r) => r.description.clone().unwrap_or_default(),
        ResultPayload::Topic(t) => t.content_summary.clone(),
        ResultPayload::Startup(s) => s.description.clone().or_else(|| s.content.clone()).unwrap_or_default(),
        ResultPayload::FocusInitiative(r) | ResultPayload::MeetingNote(r) | ResultPayload::Regulation(r) => {
            r.description.clone().or_else(|| r.content.clone()).unwrap_or_default()
        }
    };
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() > EXCERPT_CHARS {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}…", cut)
    } else {
        flat.to_string()
    }
}

fn print_diagnostics(d: &SearchDiagnostics) {
    println!("Diagnostics");
    println!("===========");
    if let Some(intent) = &d.intent {
        println!(
            "  intent:     {} ({:.2}) {}",
            intent.label,
            intent.confidence,
            intent.reasons.join("; ")
        );
    } else {
        println!("  intent:     (router off)");
    }
    println!(
        "  settings:   bm25={} router={} hybrid_default={}",
        d.settings.enable_bm25, d.settings.enable_router, d.settings.use_hybrid_search_by_default
    );
    println!("  elapsed:    {} ms{}", d.elapsed_ms, if d.timed_out { " (timed out)" } else { "" });
    println!();
    println!(
        "  {:<18} {:<16} {:>5} {:>5} {:>6} {:>6} {:>7}   {}",
        "TYPE", "PATH", "VEC", "BM25", "CAND", "FETCH", "RESULTS", "WEIGHTS v/b"
    );
    println!("  {}", "-".repeat(86));
    for t in &d.per_type {
        println!(
            "  {:<18} {:<16} {:>5} {:>5} {:>6} {:>6} {:>7}   {:.2}/{:.2}",
            t.record_type.as_str(),
            format!("{:?}", t.path),
            t.vector_hits,
            t.lexical_hits,
            t.candidates,
            t.fetched,
            t.returned,
            t.strategy.weights.vector,
            t.strategy.weights.bm25
        );
    }
    if !d.errors.is_empty() {
        println!();
        println!("  Errors:");
        for e in &d.errors {
            println!("    - {}", e);
        }
    }
    println!();
}

pub fn run_classify(query: &str, json: bool) -> Result<()> {
    use knowledge_search_core::intent::{Classifier, PatternClassifier};
    use knowledge_search_core::strategy::strategy_for;

    let intent = PatternClassifier::new().classify(query);
    let strategies = strategy_for(intent.label);

    if json {
        let out = serde_json::json!({ "intent": intent, "strategies": strategies });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("  label:        {}", intent.label);
    println!("  confidence:   {:.2}", intent.confidence);
    println!("  keywords:     {}", intent.keywords.join(", "));
    println!("  proper nouns: {}", intent.proper_nouns.join(", "));
    if let Some(target) = intent.target_type {
        println!("  target type:  {}", target);
    }
    for reason in &intent.reasons {
        println!("  - {}", reason);
    }
    println!();
    for (name, s) in [
        ("entity", strategies.entity),
        ("relation", strategies.relation),
        ("topic", strategies.topic),
    ] {
        println!(
            "  {:<10} vector={} bm25={} weights {:.2}/{:.2}",
            name, s.use_vector, s.use_bm25, s.weights.vector, s.weights.bm25
        );
    }
    Ok(())
}

/// Optionally warms the index cache with `warm_query`, then prints its
/// state. The cache is per process, so without a warm-up it is empty.
pub async fn run_cache_stats(config: &Config, warm_query: Option<&str>) -> Result<()> {
    let (engine, store) = open_engine(config).await?;
    if let Some(query) = warm_query {
        let options = SearchOptions {
            use_router: Some(false),
            hybrid: Some(SearchStrategy::bm25_only()),
            timeout: config.retrieval.timeout(),
            ..SearchOptions::default()
        };
        engine.search_knowledge_graph(query, &options).await;
    }
    store.pool().close().await;

    let stats = engine.cache_stats();
    println!("Index cache: {}/{} entries, ttl {}s", stats.size, stats.capacity, stats.ttl_secs);
    if stats.entries.is_empty() {
        return Ok(());
    }
    println!();
    println!("  {:<18} {:<40} {:>6} {:>8} {:>8}", "TYPE", "FILTERS", "DOCS", "AGE", "IDLE");
    println!("  {}", "-".repeat(84));
    for e in &stats.entries {
        println!(
            "  {:<18} {:<40} {:>6} {:>7}s {:>7}s",
            e.key.record_type.as_str(),
            e.key.filter_signature,
            e.document_count,
            e.age_secs,
            e.idle_secs
        );
    }
    Ok(())
}
