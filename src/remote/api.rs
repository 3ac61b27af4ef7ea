use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::client::RemoteClient;
use super::types::{self, CallError, RemoteRequest};
use crate::config::{HEALTH_ENDPOINT, SEARCH_ENDPOINT, SUMMARIZE_ENDPOINT};
use crate::types::{Article, Query, SearchResult, SummarizeRequest, Summary, SummaryResponse};
use crate::TARGET_REMOTE_CALL;

/// The search and summarization service as the session sees it.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, CallError>;

    async fn summarize(
        &self,
        request: &SummarizeRequest,
        cancel: &CancellationToken,
    ) -> Result<Summary, CallError>;

    /// Cheap request used to wake a backend that sleeps when idle.
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), CallError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Article>,
}

pub struct ApiClient {
    remote: RemoteClient,
    search_url: Url,
    summarize_url: Url,
    health_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, remote: RemoteClient) -> anyhow::Result<Self> {
        let base = types::base_url(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid API URL {:?}: {}", base_url, e))?;
        // Endpoints extend the base path instead of replacing it
        let endpoint = |path: &str| base.join(path.trim_start_matches('/'));
        Ok(ApiClient {
            search_url: endpoint(SEARCH_ENDPOINT)?,
            summarize_url: endpoint(SUMMARIZE_ENDPOINT)?,
            health_url: endpoint(HEALTH_ENDPOINT)?,
            remote,
        })
    }
}

#[async_trait]
impl SearchBackend for ApiClient {
    async fn search(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, CallError> {
        let mut url = self.search_url.clone();
        url.query_pairs_mut().append_pair("q", query.as_str());

        let response: SearchResponse = self
            .remote
            .call_json(&RemoteRequest::get(url.as_str()), cancel)
            .await?;
        let results = response
            .results
            .into_iter()
            .map(SearchResult::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CallError::DecodeError)?;

        info!(target: TARGET_REMOTE_CALL, "Search for {:?} returned {} results", query.as_str(), results.len());
        Ok(results)
    }

    async fn summarize(
        &self,
        request: &SummarizeRequest,
        cancel: &CancellationToken,
    ) -> Result<Summary, CallError> {
        let call = RemoteRequest::post_json(self.summarize_url.as_str(), request)?;
        let response: SummaryResponse = self.remote.call_json(&call, cancel).await?;
        if response.query != request.query {
            warn!(
                target: TARGET_REMOTE_CALL,
                "Summary echoed query {:?}, expected {:?}", response.query, request.query
            );
        }
        Ok(Summary::from_response(response))
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), CallError> {
        self.remote
            .call(&RemoteRequest::get(self.health_url.as_str()), cancel)
            .await
            .map(|_| ())
    }
}
