//! HTTP client for the bot servers being monitored.

use crate::error::FeedError;
use async_trait::async_trait;
use fleet_core::ServerConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
pub const BALANCES_TIMEOUT: Duration = Duration::from_secs(15);
pub const COMPLETED_TIMEOUT: Duration = Duration::from_secs(20);
/// Full history is the most expensive call a bot server answers.
pub const COMPLETED_ALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(15);

/// Endpoints exposed by every bot server.
///
/// Payloads are returned undecoded; shape checks belong to the caller so it
/// can tell a malformed payload from an empty one.
#[async_trait]
pub trait BotServerApi: Send + Sync {
    /// Free-text operational status page.
    async fn fetch_status(&self, server: &ServerConfig) -> Result<String, FeedError>;

    async fn fetch_balances(&self, server: &ServerConfig) -> Result<Value, FeedError>;

    /// Recently completed trades.
    async fn fetch_completed(&self, server: &ServerConfig) -> Result<Value, FeedError>;

    /// Full trade history, used once per process for bootstrap.
    async fn fetch_completed_all(&self, server: &ServerConfig) -> Result<Value, FeedError>;

    async fn fetch_diff_data(&self, server: &ServerConfig) -> Result<Value, FeedError>;
}

/// [`BotServerApi`] over plain HTTP with fixed per-endpoint timeouts.
#[derive(Clone, Default)]
pub struct HttpBotServerClient {
    client: reqwest::Client,
}

impl HttpBotServerClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json(&self, url: String, timeout: Duration) -> Result<Value, FeedError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(decode_body(body))
    }
}

/// Parse a response body, keeping non-JSON bodies (maintenance pages and the
/// like) as a string value so shape checks report them as malformed.
fn decode_body(body: String) -> Value {
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Response body is not JSON");
            Value::String(body)
        }
    }
}

#[async_trait]
impl BotServerApi for HttpBotServerClient {
    async fn fetch_status(&self, server: &ServerConfig) -> Result<String, FeedError> {
        let url = server.url_for(&server.status_path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_balances(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.get_json(server.url_for(&server.balances_path), BALANCES_TIMEOUT)
            .await
    }

    async fn fetch_completed(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.get_json(server.url_for(&server.completed_path), COMPLETED_TIMEOUT)
            .await
    }

    async fn fetch_completed_all(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.get_json(server.url_for(&server.completed_all_path), COMPLETED_ALL_TIMEOUT)
            .await
    }

    async fn fetch_diff_data(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.get_json(server.url_for(&server.diff_path), DIFF_TIMEOUT)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every connection with a fixed 200 response.
    async fn serve(content_type: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body("[1,2]".to_string()), json!([1, 2]));
        assert_eq!(
            decode_body("<html>maintenance</html>".to_string()),
            json!("<html>maintenance</html>")
        );
        assert_eq!(decode_body(String::new()), json!(""));
    }

    #[tokio::test]
    async fn test_html_body_is_returned_not_failed() {
        let base = serve("text/html", "<html>maintenance</html>").await;
        let server = ServerConfig::new("bnb", "BNB", base);
        let client = HttpBotServerClient::default();

        let balances = client.fetch_balances(&server).await.unwrap();
        assert_eq!(balances, json!("<html>maintenance</html>"));
        let diffs = client.fetch_diff_data(&server).await.unwrap();
        assert!(diffs.is_string());
    }

    #[tokio::test]
    async fn test_json_body_is_decoded() {
        let base = serve("application/json", r#"[{"id":1}]"#).await;
        let server = ServerConfig::new("bnb", "BNB", base);
        let completed = HttpBotServerClient::default()
            .fetch_completed(&server)
            .await
            .unwrap();
        assert_eq!(completed, json!([{ "id": 1 }]));
    }
}
