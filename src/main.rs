//! # Knowledge Search CLI (`ksearch`)
//!
//! The `ksearch` binary initializes the database, imports knowledge-graph
//! records, runs hybrid searches and manages the persisted search settings.
//!
//! ## Usage
//!
//! ```bash
//! ksearch --config ./config/ksearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ksearch init` | Create the SQLite database and run schema migrations |
//! | `ksearch import <file>` | Import records from a JSON array |
//! | `ksearch search "<query>"` | Search all record types |
//! | `ksearch classify "<query>"` | Show the query intent and routed strategies |
//! | `ksearch settings show\|set\|reset` | Inspect or change search toggles |
//! | `ksearch cache-stats` | Show the BM25 index cache |
//!
//! ## Examples
//!
//! ```bash
//! ksearch init
//! ksearch import ./data/records.json
//! ksearch search "EV pricing strategy" --explain
//! ksearch search "Toyota" --mode keyword --org org-1
//! ksearch settings set --enable-bm25 false
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`) to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_search::settings::SearchSettingsPatch;
use knowledge_search::{config, import, migrate, search, settings_cmd};
use knowledge_search_core::models::SearchFilters;

/// Knowledge Search: hybrid BM25 + vector retrieval over knowledge-graph
/// records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ksearch.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ksearch",
    about = "Knowledge Search: hybrid BM25 + vector retrieval over knowledge-graph records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ksearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import records from a JSON file.
    ///
    /// The file holds an array of objects tagged with `recordType`
    /// (`entity`, `relation`, `topic`, `startup`, `focusInitiative`,
    /// `meetingNote`, `regulation`). Existing records with the same
    /// type and id are replaced.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Search all record types.
    Search {
        /// Query text.
        query: String,

        /// Search mode: `auto` (stored settings), `hybrid`, `vector`, or `keyword`.
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Force the query-intent router on.
        #[arg(long)]
        router: bool,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Overall deadline in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Restrict to one organization.
        #[arg(long)]
        org: Option<String>,

        /// Entity type filter, e.g. `company`.
        #[arg(long)]
        entity_type: Option<String>,

        /// Relation type filter.
        #[arg(long)]
        relation_type: Option<String>,

        /// Topic semantic category filter.
        #[arg(long)]
        category: Option<String>,

        /// Only records created on or after this timestamp (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        created_after: Option<String>,

        /// Only records created on or before this timestamp.
        #[arg(long)]
        created_before: Option<String>,

        /// Only records updated on or after this timestamp.
        #[arg(long)]
        updated_after: Option<String>,

        /// Only records updated on or before this timestamp.
        #[arg(long)]
        updated_before: Option<String>,

        /// Rebuild BM25 indexes instead of using the cache.
        #[arg(long)]
        no_cache: bool,

        /// Print per-type diagnostics.
        #[arg(long)]
        explain: bool,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Classify a query and show the strategies the router would use.
    Classify {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Show or change the persisted search settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show the BM25 index cache, optionally after warming it with a query.
    CacheStats {
        /// Query to run (BM25 only) before printing.
        #[arg(long)]
        warm: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings.
    Show,

    /// Update one or more settings.
    Set {
        #[arg(long)]
        enable_bm25: Option<bool>,

        #[arg(long)]
        enable_router: Option<bool>,

        #[arg(long)]
        use_hybrid_search_by_default: Option<bool>,
    },

    /// Restore the defaults (all enabled).
    Reset,
}

/// Normalizes a filter timestamp the way record timestamps are stored.
fn timestamp_arg(value: Option<String>) -> Option<String> {
    value.map(|v| {
        knowledge_search_core::models::normalize_timestamp(&serde_json::Value::String(v.clone()))
            .unwrap_or(v)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Classify { query, json } = &cli.command {
        search::run_classify(query, *json)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            let report = import::run_import(&cfg, &file).await?;
            for (record_type, count) in &report.imported {
                println!("  {:<18} {}", record_type.as_str(), count);
            }
            println!(
                "Imported {} records ({} skipped).",
                report.total(),
                report.skipped
            );
        }
        Commands::Search {
            query,
            mode,
            router,
            limit,
            timeout_ms,
            org,
            entity_type,
            relation_type,
            category,
            created_after,
            created_before,
            updated_after,
            updated_before,
            no_cache,
            explain,
            json,
        } => {
            let req = search::SearchRequest {
                mode,
                router,
                limit,
                timeout_ms,
                filters: SearchFilters {
                    organization_id: org,
                    entity_type,
                    relation_type,
                    topic_semantic_category: category,
                    created_after: timestamp_arg(created_after),
                    created_before: timestamp_arg(created_before),
                    updated_after: timestamp_arg(updated_after),
                    updated_before: timestamp_arg(updated_before),
                },
                no_cache,
                explain,
                json,
            };
            search::run_search(&cfg, &query, &req).await?;
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => settings_cmd::run_show(&cfg).await?,
            SettingsAction::Set {
                enable_bm25,
                enable_router,
                use_hybrid_search_by_default,
            } => {
                let patch = SearchSettingsPatch {
                    enable_bm25,
                    enable_router,
                    use_hybrid_search_by_default,
                };
                settings_cmd::run_set(&cfg, patch).await?;
            }
            SettingsAction::Reset => settings_cmd::run_reset(&cfg).await?,
        },
        Commands::CacheStats { warm } => {
            search::run_cache_stats(&cfg, warm.as_deref()).await?;
        }
        Commands::Classify { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
