//! Server API client for REST endpoints

use crate::error::{ClientError, Result};
use crate::models::HistoryEntry;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Read-only access to stored envelopes
pub struct HistoryApi {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HistoryApi {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// All envelopes exchanged with `peer`, oldest first
    pub async fn fetch_history(&self, peer: &str) -> Result<Vec<HistoryEntry>> {
        let response = self
            .client
            .get(format!("{}/api/messages/{}", self.base_url, peer))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let entries: Vec<HistoryEntry> = response.json().await?;
                log::debug!("Fetched {} stored envelopes with {}", entries.len(), peer);
                Ok(entries)
            }
            StatusCode::UNAUTHORIZED => Err(ClientError::ServerError(
                "Not authorized: token rejected by server".to_string(),
            )),
            status => {
                let detail = response
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.error)
                    .unwrap_or_else(|_| status.to_string());
                Err(ClientError::ServerError(format!(
                    "History request failed: {}",
                    detail
                )))
            }
        }
    }

    /// Succeeds when the server answers `GET /health` with a 2xx status
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::ServerError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let api = HistoryApi::new("http://localhost:5000/", "token").unwrap();
        assert_eq!(api.base_url, "http://localhost:5000");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let api = HistoryApi::new("http://127.0.0.1:1", "token").unwrap();
        let result = api.fetch_history("bob").await;
        assert!(matches!(result, Err(ClientError::HttpError(_))));
    }
}
