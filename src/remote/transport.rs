use anyhow::Result;
use async_trait::async_trait;
use reqwest::header;
use tracing::debug;

use super::types::{CallError, Method, RawResponse, RemoteRequest};
use crate::TARGET_REMOTE_CALL;

/// Sends a single request attempt. Timeouts, retries and cancellation are
/// layered on top by [`super::RemoteClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RemoteRequest) -> Result<RawResponse, CallError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        debug!(target: TARGET_REMOTE_CALL, "Creating HTTP client");
        let client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!("erblogx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<RawResponse, CallError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        builder = builder.header(header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CallError::NetworkFailure(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| CallError::NetworkFailure(format!("failed reading body: {}", e)))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}
