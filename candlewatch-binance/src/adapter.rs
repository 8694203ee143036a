#[cfg(feature = "test-adapters")]
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Failure reported by a [`BinanceRest`] transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Http(String),
    /// The exchange answered with a non-success status.
    #[error("status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The response body was not JSON.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Public REST endpoints used by the source (so we can inject fakes in tests).
#[async_trait]
pub trait BinanceRest: Send + Sync {
    /// `GET {path}?{params}` decoded as JSON.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RestError>;
}

/// Production transport backed by `reqwest`.
pub struct RealAdapter {
    client: reqwest::Client,
    base: Url,
}

impl RealAdapter {
    /// Build a client for `base` with a per-request `timeout`.
    ///
    /// # Errors
    /// Returns `RestError::Http` if the HTTP client cannot be constructed.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, RestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::Http(e.to_string()))?;
        Ok(Self { client, base })
    }

    /// Wrap an existing `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl BinanceRest for RealAdapter {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RestError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| RestError::Http(format!("invalid url: {e}")))?;
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| RestError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| RestError::Decode(e.to_string()))
    }
}

#[cfg(feature = "test-adapters")]
impl dyn BinanceRest {
    /// Test helper that builds a transport from a closure taking `(path, params)`.
    pub fn from_fn<F>(f: F) -> Arc<dyn BinanceRest>
    where
        F: Send + Sync + 'static + Fn(&str, &[(&str, String)]) -> Result<Value, RestError>,
    {
        struct FnRest<F>(F);

        #[async_trait]
        impl<F> BinanceRest for FnRest<F>
        where
            F: Send + Sync + 'static + Fn(&str, &[(&str, String)]) -> Result<Value, RestError>,
        {
            async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RestError> {
                (self.0)(path, params)
            }
        }

        Arc::new(FnRest(f))
    }
}
