//! Block explorer `txlist` client.
//!
//! Prefers the unified multi-chain endpoint (selected by `chainid`) and falls
//! back to the server's legacy per-chain explorer when the unified call
//! comes back empty with an error marker.

use crate::error::FeedError;
use crate::throttle::ThrottledClient;
use async_trait::async_trait;
use fleet_core::ServerConfig;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2";
const PAGE_SIZE: &str = "1000";

/// Explorer endpoint and key, usually taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerSettings {
    pub api_url: String,
    pub api_key: Option<String>,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_EXPLORER_API_URL.to_string(),
            api_key: None,
        }
    }
}

impl ExplorerSettings {
    /// Read `ETHERSCAN_API_URL` and `ETHERSCAN_API_KEY`.
    pub fn from_env() -> Self {
        let api_url = std::env::var("ETHERSCAN_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXPLORER_API_URL.to_string());
        let api_key = std::env::var("ETHERSCAN_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self::new(api_url, api_key)
    }

    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Latest transactions of the server's contract, newest first.
    ///
    /// A server without a contract address yields an empty list.
    async fn fetch_transactions(&self, server: &ServerConfig) -> Result<Vec<Value>, FeedError>;
}

/// Pull the transaction list out of the shapes explorers answer with.
pub fn extract_transactions(payload: &Value) -> Vec<Value> {
    if let Some(list) = payload.get("result").and_then(Value::as_array) {
        return list.clone();
    }
    if let Some(list) = payload.get("data").and_then(Value::as_array) {
        return list.clone();
    }
    payload
        .get("result")
        .and_then(|r| r.get("transactions"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Explorers report throttling as a 200 with a text result.
fn check_rate_limit(payload: &Value) -> Result<(), FeedError> {
    match payload.get("result").and_then(Value::as_str) {
        Some(text) if text.to_lowercase().contains("max rate limit") => {
            Err(FeedError::RateLimitExceeded(text.to_string()))
        }
        _ => Ok(()),
    }
}

/// True when the unified endpoint signalled an error instead of "no rows".
fn is_error_marker(payload: &Value) -> bool {
    let status_zero = payload.get("status").and_then(Value::as_str) == Some("0");
    let has_result = match payload.get("result") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };
    let notok = payload.get("message").and_then(Value::as_str) == Some("NOTOK");
    (status_zero && has_result) || notok
}

pub struct EtherscanClient {
    throttle: ThrottledClient,
    settings: ExplorerSettings,
}

impl EtherscanClient {
    pub fn new(throttle: ThrottledClient, settings: ExplorerSettings) -> Self {
        Self { throttle, settings }
    }

    fn api_key_for(&self, server: &ServerConfig) -> Option<String> {
        server
            .explorer_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.api_key.clone())
    }

    fn unified_url(&self, chain_id: u64, address: &str, api_key: &str) -> Result<String, FeedError> {
        let chain = chain_id.to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api", self.settings.api_url),
            &[
                ("chainid", chain.as_str()),
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("sort", "desc"),
                ("page", "1"),
                ("offset", PAGE_SIZE),
                ("apikey", api_key),
            ],
        )
        .map_err(|e| FeedError::Explorer(e.to_string()))?;
        Ok(url.to_string())
    }

    fn legacy_url(base: &str, address: &str, api_key: Option<&str>) -> Result<String, FeedError> {
        let mut params = vec![
            ("module", "account"),
            ("action", "txlist"),
            ("address", address),
            ("sort", "desc"),
            ("page", "1"),
            ("offset", PAGE_SIZE),
        ];
        if let Some(key) = api_key {
            params.push(("apikey", key));
        }
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api", base.trim_end_matches('/')),
            &params,
        )
        .map_err(|e| FeedError::Explorer(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn fetch_legacy(&self, server: &ServerConfig, address: &str) -> Result<Vec<Value>, FeedError> {
        let Some(base) = server.explorer_api_base.as_deref() else {
            return Ok(Vec::new());
        };
        let key = server
            .explorer_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let payload = self.throttle.get_json(Self::legacy_url(base, address, key)?).await?;
        check_rate_limit(&payload)?;
        Ok(extract_transactions(&payload))
    }
}

#[async_trait]
impl ExplorerApi for EtherscanClient {
    async fn fetch_transactions(&self, server: &ServerConfig) -> Result<Vec<Value>, FeedError> {
        let Some(address) = server.contract_address.as_deref() else {
            return Ok(Vec::new());
        };

        let api_key = self.api_key_for(server);
        let chain_id = server.chain_id.filter(|id| *id > 0);

        let (Some(chain_id), Some(api_key)) = (chain_id, api_key) else {
            return self.fetch_legacy(server, address).await;
        };

        let payload = self
            .throttle
            .get_json(self.unified_url(chain_id, address, &api_key)?)
            .await?;
        check_rate_limit(&payload)?;

        let txs = extract_transactions(&payload);
        if txs.is_empty() && server.explorer_api_base.is_some() && is_error_marker(&payload) {
            info!(server = %server.id, "Unified explorer returned an error, using legacy endpoint");
            return self.fetch_legacy(server, address).await;
        }

        debug!(server = %server.id, count = txs.len(), "Fetched contract transactions");
        Ok(txs)
    }
}
