use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{HistoryEntry, LibraryStore, StoreError, StoreResult, UserProfile};
use crate::remote::{base_url, RemoteClient, RemoteRequest};
use crate::types::{Article, ArticleId};
use crate::TARGET_DB;

/// Library tables behind a PostgREST endpoint.
pub struct RestStore {
    base: Url,
    anon_key: String,
    remote: RemoteClient,
}

#[derive(Deserialize)]
struct SavedRow {
    article_id: ArticleId,
}

impl RestStore {
    pub fn new(project_url: &str, anon_key: &str, remote: RemoteClient) -> anyhow::Result<Self> {
        let base = base_url(project_url)
            .map_err(|e| anyhow::anyhow!("Invalid store URL {:?}: {}", project_url, e))?;
        Ok(RestStore {
            base: base.join("rest/v1/")?,
            anon_key: anon_key.to_string(),
            remote,
        })
    }

    fn table(&self, name: &str, filters: &[(&str, String)]) -> StoreResult<Url> {
        let mut url = self
            .base
            .join(name)
            .map_err(|e| StoreError::Failure(e.to_string()))?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RemoteRequest) -> RemoteRequest {
        request
            .with_header("apikey", self.anon_key.as_str())
            .with_header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send(&self, request: RemoteRequest) -> StoreResult<Vec<u8>> {
        debug!(target: TARGET_DB, "{} {}", request.method, request.url);
        let response = self
            .remote
            .call(&self.authorized(request), &CancellationToken::new())
            .await?;
        Ok(response.body)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: Url) -> StoreResult<T> {
        let body = self.send(RemoteRequest::get(url.as_str())).await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Failure(e.to_string()))
    }

    async fn insert<T: serde::Serialize>(
        &self,
        url: Url,
        rows: &T,
        prefer: &str,
    ) -> StoreResult<()> {
        let request = RemoteRequest::post_json(url.as_str(), rows)
            .map_err(|e| StoreError::Failure(e.to_string()))?
            .with_header("Prefer", prefer);
        self.send(request).await.map(|_| ())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// PostgREST `in.(...)` list. Text ids are quoted.
fn in_list(ids: &[ArticleId]) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| match id {
            ArticleId::Number(n) => n.to_string(),
            ArticleId::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        })
        .collect();
    format!("in.({})", items.join(","))
}

#[async_trait]
impl LibraryStore for RestStore {
    async fn saved_article_ids(&self, email: &str) -> StoreResult<Vec<ArticleId>> {
        let url = self.table(
            "saved_articles",
            &[("select", "article_id".into()), ("user_email", eq(email))],
        )?;
        let rows: Vec<SavedRow> = self.fetch(url).await?;
        Ok(rows.into_iter().map(|r| r.article_id).collect())
    }

    async fn save_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        let url = self.table(
            "saved_articles",
            &[("on_conflict", "user_email,article_id".into())],
        )?;
        let row = json!([{ "user_email": email, "article_id": id }]);
        match self
            .insert(url, &row, "resolution=ignore-duplicates,return=minimal")
            .await
        {
            Err(StoreError::Conflict(_)) => {
                debug!(target: TARGET_DB, "Article {} already saved for {}", id, email);
                Ok(())
            }
            other => other,
        }
    }

    async fn remove_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        let url = self.table(
            "saved_articles",
            &[("user_email", eq(email)), ("article_id", eq(&id.to_string()))],
        )?;
        self.send(RemoteRequest::delete(url.as_str())).await.map(|_| ())
    }

    async fn articles_by_ids(&self, ids: &[ArticleId]) -> StoreResult<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.table("articles", &[("select", "*".into()), ("id", in_list(ids))])?;
        self.fetch(url).await
    }

    async fn ensure_user(&self, profile: &UserProfile) -> StoreResult<bool> {
        let url = self.table(
            "users",
            &[("select", "email".into()), ("email", eq(&profile.email))],
        )?;
        let existing: Vec<serde_json::Value> = self.fetch(url).await?;
        if !existing.is_empty() {
            return Ok(false);
        }
        let url = self.table("users", &[])?;
        match self.insert(url, &[profile], "return=minimal").await {
            Ok(()) => {
                info!(target: TARGET_DB, "Created user record for {}", profile.email);
                Ok(true)
            }
            // Created concurrently by another session
            Err(StoreError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn record_search(&self, entry: &HistoryEntry) -> StoreResult<()> {
        let url = self.table("Library", &[])?;
        self.insert(url, &[entry], "return=minimal").await
    }
}
