//! Single-flight request queue for rate-limited external APIs.
//!
//! All callers share one FIFO queue drained by a background task that starts
//! at most one request per interval, however many callers enqueue at once.

use crate::error::FeedError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One request per second.
pub const THROTTLE_INTERVAL: Duration = Duration::from_secs(1);
pub const THROTTLED_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const QUEUE_CAPACITY: usize = 256;

/// Replace the `apikey` query value with `***` for logging.
pub fn mask_api_key(raw: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| k == "apikey") {
        return raw.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "apikey" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

/// Performs one GET and decodes the JSON body.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, FeedError>;
}

#[derive(Clone, Default)]
pub struct HttpJsonFetcher {
    client: reqwest::Client,
}

impl HttpJsonFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JsonFetcher for HttpJsonFetcher {
    async fn get_json(&self, url: &str) -> Result<Value, FeedError> {
        let response = self
            .client
            .get(url)
            .timeout(THROTTLED_REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

struct QueuedRequest {
    url: String,
    reply: oneshot::Sender<Result<Value, FeedError>>,
}

/// Cloneable handle to the shared queue.
#[derive(Clone)]
pub struct ThrottledClient {
    tx: mpsc::Sender<QueuedRequest>,
}

impl ThrottledClient {
    /// Spawn the queue worker on the current runtime.
    pub fn start(fetcher: Arc<dyn JsonFetcher>, interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueuedRequest>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Throttled client started");
            let mut last_start: Option<Instant> = None;

            while let Some(request) = rx.recv().await {
                if let Some(prev) = last_start {
                    tokio::time::sleep_until(prev + interval).await;
                }
                last_start = Some(Instant::now());

                let masked = mask_api_key(&request.url);
                debug!(url = %masked, "Throttled request ->");
                let result = fetcher.get_json(&request.url).await;
                if let Err(e) = &result {
                    warn!(url = %masked, error = %e, "Throttled request failed");
                }
                // Caller may have given up waiting.
                let _ = request.reply.send(result);
            }

            info!("Throttled client stopped");
        });

        Self { tx }
    }

    /// Start with the default HTTP fetcher and a one second interval.
    pub fn http(client: reqwest::Client) -> Self {
        Self::start(Arc::new(HttpJsonFetcher::new(client)), THROTTLE_INTERVAL)
    }

    /// Enqueue a GET and wait for its turn and result.
    pub async fn get_json(&self, url: String) -> Result<Value, FeedError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueuedRequest { url, reply })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        rx.await.map_err(|_| FeedError::ChannelClosed)?
    }
}
