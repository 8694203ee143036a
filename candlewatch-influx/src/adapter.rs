#[cfg(feature = "test-adapters")]
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Failure reported by an [`InfluxTransport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Http(String),
    /// The server answered with a non-success status.
    #[error("status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The response body was not the expected JSON.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// HTTP surface of an InfluxDB 1.x server (so we can inject fakes in tests).
#[async_trait]
pub trait InfluxTransport: Send + Sync {
    /// POST line-protocol `body` to `/write` with millisecond precision.
    async fn write(&self, database: &str, body: String) -> Result<(), TransportError>;

    /// Run an InfluxQL statement through `/query` and return the decoded JSON body.
    ///
    /// Timestamps in the response are epoch milliseconds.
    async fn query(&self, database: Option<&str>, statement: &str) -> Result<Value, TransportError>;
}

/// Production transport backed by `reqwest`.
pub struct RealAdapter {
    client: reqwest::Client,
    base: Url,
}

impl RealAdapter {
    /// Build a client for the server at `base` with a per-request `timeout`.
    ///
    /// # Errors
    /// Returns `TransportError::Http` if the HTTP client cannot be constructed.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { client, base })
    }

    /// Wrap an existing `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|e| TransportError::Http(format!("invalid url: {e}")))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(512);
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl InfluxTransport for RealAdapter {
    async fn write(&self, database: &str, body: String) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(self.endpoint("write")?)
            .query(&[("db", database), ("precision", "ms")])
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        check_status(resp).await.map(|_| ())
    }

    async fn query(&self, database: Option<&str>, statement: &str) -> Result<Value, TransportError> {
        let mut params = vec![("q", statement), ("epoch", "ms")];
        if let Some(db) = database {
            params.push(("db", db));
        }
        let resp = self
            .client
            .post(self.endpoint("query")?)
            .query(&params)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        check_status(resp)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(feature = "test-adapters")]
impl dyn InfluxTransport {
    /// Test helper that builds a transport from a write closure and a query closure.
    ///
    /// The write closure receives `(database, body)`; the query closure
    /// receives `(database, statement)`.
    pub fn from_fns<FW, FQ>(fw: FW, fq: FQ) -> Arc<dyn InfluxTransport>
    where
        FW: Send + Sync + 'static + Fn(&str, &str) -> Result<(), TransportError>,
        FQ: Send + Sync + 'static + Fn(Option<&str>, &str) -> Result<Value, TransportError>,
    {
        struct FnTransport<FW, FQ> {
            fw: FW,
            fq: FQ,
        }

        #[async_trait]
        impl<FW, FQ> InfluxTransport for FnTransport<FW, FQ>
        where
            FW: Send + Sync + 'static + Fn(&str, &str) -> Result<(), TransportError>,
            FQ: Send + Sync + 'static + Fn(Option<&str>, &str) -> Result<Value, TransportError>,
        {
            async fn write(&self, database: &str, body: String) -> Result<(), TransportError> {
                (self.fw)(database, &body)
            }

            async fn query(
                &self,
                database: Option<&str>,
                statement: &str,
            ) -> Result<Value, TransportError> {
                (self.fq)(database, statement)
            }
        }

        Arc::new(FnTransport { fw, fq })
    }

    /// Test helper for stores that only query.
    pub fn from_fn<FQ>(fq: FQ) -> Arc<dyn InfluxTransport>
    where
        FQ: Send + Sync + 'static + Fn(Option<&str>, &str) -> Result<Value, TransportError>,
    {
        Self::from_fns(
            |_, _| Err(TransportError::Http("writes not configured".into())),
            fq,
        )
    }
}
