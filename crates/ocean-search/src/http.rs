//! Thin HTTP wrapper shared by the remote readers.
//!
//! One attempt per request. Failures are logged and returned as
//! [`SearchError::Http`]; there is no retry.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use ocean_common::{SearchError, SearchResult};

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::Http {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SearchResult<T> {
        let body = self.get(url, Some("application/json")).await?;
        serde_json::from_slice(&body).map_err(|e| SearchError::unexpected(url, e.to_string()))
    }

    /// GET `url` and return the raw body.
    pub async fn get_bytes(&self, url: &str) -> SearchResult<Bytes> {
        self.get(url, None).await
    }

    async fn get(&self, url: &str, accept: Option<&str>) -> SearchResult<Bytes> {
        debug!(url = %url, "GET");

        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed");
            SearchError::Http {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Request returned error status");
            return Err(SearchError::Http {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }

        let bytes = response.bytes().await.map_err(|e| SearchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        debug!(url = %url, size = bytes.len(), "Fetched");
        Ok(bytes)
    }
}
