//! `ksearch settings show|set|reset`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::settings::{
    get_search_config, reset_search_config, set_search_config, SearchSettings,
    SearchSettingsPatch,
};
use crate::sqlite_store::SqliteStore;

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(SqliteStore::new(pool, None))
}

fn print_settings(settings: &SearchSettings) {
    println!("  enableBM25:               {}", settings.enable_bm25);
    println!("  enableRouter:             {}", settings.enable_router);
    println!(
        "  useHybridSearchByDefault: {}",
        settings.use_hybrid_search_by_default
    );
}

pub async fn run_show(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let settings = get_search_config(&store).await;
    store.pool().close().await;
    print_settings(&settings);
    Ok(())
}

pub async fn run_set(config: &Config, patch: SearchSettingsPatch) -> Result<()> {
    let store = open_store(config).await?;
    let settings = set_search_config(&store, patch).await;
    store.pool().close().await;
    print_settings(&settings?);
    Ok(())
}

pub async fn run_reset(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let settings = reset_search_config(&store).await;
    store.pool().close().await;
    println!("Search settings reset to defaults.");
    print_settings(&settings?);
    Ok(())
}
