//! Persisted search settings.
//!
//! Three switches, stored as one camelCase JSON object under the key
//! [`SEARCH_CONFIG_KEY`] of a [`SettingsStore`]:
//!
//! | Field | Effect |
//! |-------|--------|
//! | `enableBM25` | when `false`, every strategy is reduced to vector-only |
//! | `enableRouter` | classify the query and pick strategies per intent |
//! | `useHybridSearchByDefault` | default strategy blends BM25 with vector search |
//!
//! All default to `true`. A missing or unreadable stored value reads as the
//! defaults.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SEARCH_CONFIG_KEY: &str = "rag_search_config";

/// Key-value persistence for settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local [`SettingsStore`].
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    #[serde(rename = "enableBM25")]
    pub enable_bm25: bool,
    pub enable_router: bool,
    pub use_hybrid_search_by_default: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enable_bm25: true,
            enable_router: true,
            use_hybrid_search_by_default: true,
        }
    }
}

/// Partial update for [`set_search_config`]; `None` fields are left as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettingsPatch {
    #[serde(default, rename = "enableBM25")]
    pub enable_bm25: Option<bool>,
    #[serde(default)]
    pub enable_router: Option<bool>,
    #[serde(default)]
    pub use_hybrid_search_by_default: Option<bool>,
}

impl SearchSettings {
    pub fn apply(mut self, patch: SearchSettingsPatch) -> Self {
        if let Some(v) = patch.enable_bm25 {
            self.enable_bm25 = v;
        }
        if let Some(v) = patch.enable_router {
            self.enable_router = v;
        }
        if let Some(v) = patch.use_hybrid_search_by_default {
            self.use_hybrid_search_by_default = v;
        }
        self
    }
}

/// Reads the stored settings. Never fails: store errors and malformed
/// values are logged and read as the defaults.
pub async fn get_search_config(store: &dyn SettingsStore) -> SearchSettings {
    let raw = match store.get(SEARCH_CONFIG_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return SearchSettings::default(),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "failed to read search settings, using defaults");
            return SearchSettings::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "stored search settings are unreadable, using defaults");
            SearchSettings::default()
        }
    }
}

/// Merges `patch` into the current settings and persists the result.
pub async fn set_search_config(
    store: &dyn SettingsStore,
    patch: SearchSettingsPatch,
) -> Result<SearchSettings> {
    let updated = get_search_config(store).await.apply(patch);
    let json = serde_json::to_string(&updated)?;
    store
        .put(SEARCH_CONFIG_KEY, &json)
        .await
        .with_context(|| "Failed to save search settings")?;
    tracing::info!(?updated, "search settings updated");
    Ok(updated)
}

/// Removes the stored settings so the defaults apply again.
pub async fn reset_search_config(store: &dyn SettingsStore) -> Result<SearchSettings> {
    store
        .delete(SEARCH_CONFIG_KEY)
        .await
        .with_context(|| "Failed to reset search settings")?;
    tracing::info!("search settings reset to defaults");
    Ok(SearchSettings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let store = MemorySettings::new();
        assert_eq!(get_search_config(&store).await, SearchSettings::default());
    }

    #[tokio::test]
    async fn test_patch_persists_and_merges() {
        let store = MemorySettings::new();
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

        let updated = set_search_config(
            &store,
            SearchSettingsPatch {
                enable_router: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!updated.enable_bm25);
        assert!(!updated.enable_router);
        assert_eq!(get_search_config(&store).await, updated);
    }

    #[tokio::test]
    async fn test_stored_json_shape() {
        let store = MemorySettings::new();
        set_search_config(&store, SearchSettingsPatch::default())
            .await
            .unwrap();
        let raw = store.get(SEARCH_CONFIG_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["enableBM25"], true);
        assert_eq!(json["enableRouter"], true);
        assert_eq!(json["useHybridSearchByDefault"], true);
    }

    #[tokio::test]
    async fn test_unreadable_value_falls_back() {
        let store = MemorySettings::new();
        store.put(SEARCH_CONFIG_KEY, "{not json").await.unwrap();
        assert_eq!(get_search_config(&store).await, SearchSettings::default());
    }

    #[tokio::test]
    async fn test_partial_value_fills_defaults() {
        let store = MemorySettings::new();
        store
            .put(SEARCH_CONFIG_KEY, r#"{"enableRouter":false}"#)
            .await
            .unwrap();
        let s = get_search_config(&store).await;
        assert!(!s.enable_router);
        assert!(s.enable_bm25);
    }

    #[tokio::test]
    async fn test_reset() {
        let store = MemorySettings::new();
        set_search_config(
            &store,
            SearchSettingsPatch {
                use_hybrid_search_by_default: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let s = reset_search_config(&store).await.unwrap();
        assert_eq!(s, SearchSettings::default());
        assert!(store.get(SEARCH_CONFIG_KEY).await.unwrap().is_none());
    }
}
