//! HTTP client for the CFP registry API.
//!
//! The registry exposes `/speakers` and `/proposals` below a configurable
//! endpoint. Each collection supports `POST`, and each record `GET`, `PUT` and
//! `DELETE` at `{path}/{id}`. Bodies are passed through as raw JSON bytes so the
//! caller decides how to compare them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfp_core::ResourceKind;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};
use url::Url;

use crate::config::RegistryConfig;
use crate::error::{Error, ErrorReason, Operation, Result};

/// Collection path of a resource kind, relative to the endpoint.
pub const fn resource_path(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Speaker => "/speakers",
        ResourceKind::Proposal => "/proposals",
    }
}

/// Remote record store the reconcilers converge against.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Create a record. Returns the stored record.
    async fn create(&self, kind: ResourceKind, payload: &[u8]) -> Result<Vec<u8>>;

    /// Replace a record. Returns the stored record.
    async fn update(&self, kind: ResourceKind, id: &str, payload: &[u8]) -> Result<Vec<u8>>;

    /// Fetch a record.
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Vec<u8>>;

    /// Delete a record.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;
}

/// Registry client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: Arc<RegistryConfig>,
    endpoint: Url,
    http_client: reqwest::Client,
}

impl RegistryClient {
    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the endpoint is not a valid URL.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(RegistryConfig::with_endpoint(endpoint))
    }

    /// Create a client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the endpoint is invalid or the HTTP client
    /// cannot be built.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::invalid_request(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            endpoint,
            http_client,
        })
    }

    /// Endpoint the resource paths are appended to.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, kind: ResourceKind, id: Option<&str>) -> Result<Url> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", resource_path(kind)))
            .map_err(|e| Error::invalid_request(format!("invalid request URL: {e}")))?;
        if let Some(id) = id {
            if id.is_empty() {
                return Err(Error::invalid_request("record id must not be empty"));
            }
            url.path_segments_mut()
                .map_err(|()| Error::invalid_request("endpoint cannot be a base URL"))?
                .push(id);
        }
        Ok(url)
    }

    /// Send with retries on transport failures.
    ///
    /// Waits `BASE_DELAY_MS * 2^(attempt-1)` between attempts.
    async fn execute(
        &self,
        operation: Operation,
        kind: ResourceKind,
        url: Url,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        const BASE_DELAY_MS: u64 = 200;

        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            match self.execute_once(operation, kind, &url, body).await {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    if attempt > self.config.max_retries || e.reason != ErrorReason::RequestFailed {
                        return Err(e);
                    }

                    let delay_ms = BASE_DELAY_MS
                        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
                    info!(
                        attempt,
                        delay_ms,
                        error = %e,
                        "Retrying registry call after transport failure"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn execute_once(
        &self,
        operation: Operation,
        kind: ResourceKind,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        debug!(method = operation.method(), %url, "Calling registry");

        let mut builder = self.http_client.request(http_method(operation), url.clone());
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }
        let request = builder
            .build()
            .map_err(|e| Error::invalid_request(e.to_string()))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| Error::request_failed(e.to_string()))?;

        let status = response.status();
        let payload = response.bytes().await.map_err(|e| {
            Error::rejected(operation, kind, format!("error reading response: {e}"))
                .with_status(status.as_u16())
        })?;

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&payload);
            return Err(Error::rejected(
                operation,
                kind,
                format!("{operation} error: {}: {status}", detail.trim()),
            )
            .with_status(status.as_u16()));
        }

        Ok(payload.to_vec())
    }
}

const fn http_method(operation: Operation) -> Method {
    match operation {
        Operation::Create => Method::POST,
        Operation::Update => Method::PUT,
        Operation::Fetch => Method::GET,
        Operation::Delete => Method::DELETE,
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn create(&self, kind: ResourceKind, payload: &[u8]) -> Result<Vec<u8>> {
        let url = self.url(kind, None)?;
        self.execute(Operation::Create, kind, url, Some(payload)).await
    }

    async fn update(&self, kind: ResourceKind, id: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let url = self.url(kind, Some(id))?;
        self.execute(Operation::Update, kind, url, Some(payload)).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Vec<u8>> {
        let url = self.url(kind, Some(id))?;
        self.execute(Operation::Fetch, kind, url, None).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let url = self.url(kind, Some(id))?;
        self.execute(Operation::Delete, kind, url, None)
            .await
            .map(|_| ())
    }
}
