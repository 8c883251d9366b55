//! Native coin USD prices from the Binance public ticker.

use crate::error::FeedError;
use async_trait::async_trait;
use fleet_core::{safe_number, NativeAsset, NativePrices};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const PRICE_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
const TICKER_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait PriceApi: Send + Sync {
    async fn fetch_price(&self, asset: NativeAsset) -> Result<f64, FeedError>;
}

/// Binance `/api/v3/ticker/price` client.
#[derive(Clone)]
pub struct BinanceTickerClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceTickerClient {
    const BASE_URL: &'static str = "https://api.binance.com";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: Self::BASE_URL.to_string(),
        }
    }
}

#[async_trait]
impl PriceApi for BinanceTickerClient {
    async fn fetch_price(&self, asset: NativeAsset) -> Result<f64, FeedError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            asset.ticker_symbol()
        );
        let json: Value = self
            .client
            .get(&url)
            .timeout(TICKER_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Response: {"symbol":"ETHUSDT","price":"3120.55000000"}
        json.get("price")
            .and_then(safe_number)
            .ok_or_else(|| FeedError::Decode(format!("no price for {}", asset.ticker_symbol())))
    }
}

struct CacheState {
    prices: NativePrices,
    refreshed_at: Option<Instant>,
}

/// Native prices refreshed at most once per interval.
///
/// A failed refresh keeps the previous price for that asset.
pub struct NativePriceCache {
    source: Arc<dyn PriceApi>,
    interval: Duration,
    state: Mutex<CacheState>,
}

impl NativePriceCache {
    pub fn new(source: Arc<dyn PriceApi>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            state: Mutex::new(CacheState {
                prices: NativePrices::default(),
                refreshed_at: None,
            }),
        }
    }

    /// Current prices, refreshing them first when stale.
    pub async fn current(&self) -> NativePrices {
        let mut state = self.state.lock().await;
        let stale = state
            .refreshed_at
            .map_or(true, |at| at.elapsed() >= self.interval);
        if !stale {
            return state.prices;
        }

        for asset in [NativeAsset::Eth, NativeAsset::Pol, NativeAsset::Bnb] {
            match self.source.fetch_price(asset).await {
                Ok(price) => state.prices.set(asset, price),
                Err(e) => warn!(symbol = asset.ticker_symbol(), error = %e, "Price refresh failed"),
            }
        }
        state.refreshed_at = Some(Instant::now());
        debug!(prices = ?state.prices, "Native prices refreshed");
        state.prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceApi for CountingSource {
        async fn fetch_price(&self, asset: NativeAsset) -> Result<f64, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match asset {
                NativeAsset::Pol => Err(FeedError::Timeout("ticker".to_string())),
                _ => Ok(100.0 + n as f64),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prices_cached_within_interval() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = NativePriceCache::new(source.clone(), PRICE_REFRESH_INTERVAL);

        let first = cache.current().await;
        assert_eq!(first.eth, Some(100.0));
        assert_eq!(first.pol, None);
        assert_eq!(first.bnb, Some(102.0));

        let again = cache.current().await;
        assert_eq!(again, first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        tokio::time::advance(PRICE_REFRESH_INTERVAL).await;
        let refreshed = cache.current().await;
        assert_eq!(refreshed.eth, Some(103.0));
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);
    }
}
