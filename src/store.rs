//! Persisted-state collaborator (§2.5, §6) — narrow traits over the
//! rows the core reads/writes. Production wiring (a real database) is
//! left to the embedding application; this crate ships in-memory
//! defaults for tests and for embedders that haven't wired one yet.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRow {
    pub id: String,
    pub token_address: String,
    pub amount: u64,
    pub entry_price_usd: f64,
    pub entry_value_sol: f64,
    pub current_price_usd: f64,
    pub status: String,
    pub profit_loss_percent: Option<f64>,
    pub exit_reason: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait PositionStore: Send + Sync {
    async fn upsert(&self, row: PositionRow) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<PositionRow>>;
    async fn list_open(&self) -> Result<Vec<PositionRow>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProcessingStateRow {
    pub token_address: String,
    pub user_id: String,
    pub state: String,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TokenProcessingStateStore: Send + Sync {
    async fn upsert(&self, row: TokenProcessingStateRow) -> Result<()>;
    async fn get(&self, token_address: &str, user_id: &str) -> Result<Option<TokenProcessingStateRow>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettingsRow {
    pub user_id: String,
    pub min_liquidity_auto_usd: f64,
    pub min_liquidity_manual_usd: f64,
}

#[async_trait::async_trait]
pub trait RiskSettingsStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<RiskSettingsRow>>;
    async fn upsert(&self, row: RiskSettingsRow) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfigurationRow {
    pub api_type: String,
    pub base_url: String,
    pub api_key_encrypted: Option<String>,
    pub is_enabled: bool,
    pub rate_limit_per_minute: u32,
}

#[async_trait::async_trait]
pub trait ApiConfigurationStore: Send + Sync {
    async fn get(&self, api_type: &str) -> Result<Option<ApiConfigurationRow>>;
    async fn list_enabled(&self) -> Result<Vec<ApiConfigurationRow>>;
}

#[derive(Default)]
pub struct InMemoryPositionStore {
    rows: Arc<RwLock<HashMap<String, PositionRow>>>,
}

#[async_trait::async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn upsert(&self, row: PositionRow) -> Result<()> {
        self.rows.write().await.insert(row.id.clone(), row);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PositionRow>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<PositionRow>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.status == "open")
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTokenProcessingStateStore {
    rows: Arc<RwLock<HashMap<(String, String), TokenProcessingStateRow>>>,
}

#[async_trait::async_trait]
impl TokenProcessingStateStore for InMemoryTokenProcessingStateStore {
    async fn upsert(&self, row: TokenProcessingStateRow) -> Result<()> {
        let key = (row.token_address.clone(), row.user_id.clone());
        self.rows.write().await.insert(key, row);
        Ok(())
    }

    async fn get(&self, token_address: &str, user_id: &str) -> Result<Option<TokenProcessingStateRow>> {
        let key = (token_address.to_string(), user_id.to_string());
        Ok(self.rows.read().await.get(&key).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRiskSettingsStore {
    rows: Arc<RwLock<HashMap<String, RiskSettingsRow>>>,
}

#[async_trait::async_trait]
impl RiskSettingsStore for InMemoryRiskSettingsStore {
    async fn get(&self, user_id: &str) -> Result<Option<RiskSettingsRow>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, row: RiskSettingsRow) -> Result<()> {
        self.rows.write().await.insert(row.user_id.clone(), row);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApiConfigurationStore {
    rows: Arc<RwLock<HashMap<String, ApiConfigurationRow>>>,
}

#[async_trait::async_trait]
impl ApiConfigurationStore for InMemoryApiConfigurationStore {
    async fn get(&self, api_type: &str) -> Result<Option<ApiConfigurationRow>> {
        Ok(self.rows.read().await.get(api_type).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<ApiConfigurationRow>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.is_enabled)
            .cloned()
            .collect())
    }
}

impl InMemoryApiConfigurationStore {
    pub async fn seed(&self, row: ApiConfigurationRow) {
        self.rows.write().await.insert(row.api_type.clone(), row);
    }
}

/// Convenience wrapper so the `Error::Store` variant is actually used by
/// callers that need to surface a store failure without crashing the
/// caller (§7 infrastructure-failure handling).
pub fn store_error(context: &str, source: impl std::fmt::Display) -> Error {
    Error::Store(format!("{context}: {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_position_store_round_trips() {
        let store = InMemoryPositionStore::default();
        let row = PositionRow {
            id: "p1".into(),
            token_address: "mint1".into(),
            amount: 100,
            entry_price_usd: 1.0,
            entry_value_sol: 1.0,
            current_price_usd: 1.0,
            status: "open".into(),
            profit_loss_percent: Some(0.0),
            exit_reason: None,
            closed_at: None,
        };
        store.upsert(row.clone()).await.unwrap();
        let fetched = store.get("p1").await.unwrap().unwrap();
        assert_eq!(fetched.token_address, "mint1");
        assert_eq!(store.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_configuration_store_lists_only_enabled() {
        let store = InMemoryApiConfigurationStore::default();
        store
            .seed(ApiConfigurationRow {
                api_type: "aggregator".into(),
                base_url: "https://example.invalid".into(),
                api_key_encrypted: None,
                is_enabled: true,
                rate_limit_per_minute: 60,
            })
            .await;
        store
            .seed(ApiConfigurationRow {
                api_type: "rugcheck".into(),
                base_url: "https://example.invalid".into(),
                api_key_encrypted: None,
                is_enabled: false,
                rate_limit_per_minute: 10,
            })
            .await;
        let enabled = store.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].api_type, "aggregator");
    }
}
