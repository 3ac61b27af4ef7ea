use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transport::{HttpTransport, Transport};
use super::types::{CallError, RawResponse, RemoteRequest};
use crate::config::RemoteConfig;
use crate::TARGET_REMOTE_CALL;

/// Applies the timeout and retry policy to calls made through a transport.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, config: RemoteConfig) -> Self {
        RemoteClient { transport, config }
    }

    pub fn http(config: RemoteConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?), config))
    }

    /// Performs the request, retrying transient failures up to the configured
    /// number of times. Cancelling `cancel` abandons the call at the next
    /// await point and yields [`CallError::Cancelled`].
    pub async fn call(
        &self,
        request: &RemoteRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, CallError> {
        let max_attempts = self.config.max_attempts();
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            attempts += 1;
            debug!(
                target: TARGET_REMOTE_CALL,
                "{} {} (attempt {}/{})", request.method, request.url, attempts, max_attempts
            );

            let error = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(target: TARGET_REMOTE_CALL, "{} {} cancelled", request.method, request.url);
                    return Err(CallError::Cancelled);
                }
                outcome = timeout(self.config.timeout, self.transport.send(request)) => match outcome {
                    Ok(Ok(response)) if response.is_success() => return Ok(response),
                    Ok(Ok(response)) => CallError::http(response.status),
                    Ok(Err(err)) => err,
                    Err(_) => CallError::Timeout(self.config.timeout),
                },
            };

            if !error.is_transient() || attempts >= max_attempts {
                warn!(
                    target: TARGET_REMOTE_CALL,
                    "{} {} failed after {} attempt(s): {}", request.method, request.url, attempts, error
                );
                return Err(error);
            }

            warn!(
                target: TARGET_REMOTE_CALL,
                "{} {} attempt {} failed: {}. Retrying in {:?}",
                request.method,
                request.url,
                attempts,
                error,
                self.config.retry_delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CallError::Cancelled),
                _ = sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Like [`Self::call`], decoding a successful body as JSON. Decoding
    /// failures are not retried.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: &RemoteRequest,
        cancel: &CancellationToken,
    ) -> Result<T, CallError> {
        let response = self.call(request, cancel).await?;
        response.json().map_err(|err| {
            warn!(target: TARGET_REMOTE_CALL, "{} {}: {}", request.method, request.url, err);
            err
        })
    }
}
