//! The signed-in user's saved articles, with an optional summary of them.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{Action, AuthGate, Decision, DenyReason};
use crate::remote::SearchBackend;
use crate::store::{LibraryStore, StoreError, UserProfile};
use crate::types::{Article, SummarizeRequest, Summary};
use crate::TARGET_SESSION;

/// Query sent with a summary request for the whole library.
pub const LIBRARY_SUMMARY_QUERY: &str = "library_summary";

pub struct LibraryView {
    store: Arc<dyn LibraryStore>,
    backend: Arc<dyn SearchBackend>,
    gate: AuthGate,
    articles: Vec<Article>,
    summary: Option<Summary>,
}

impl LibraryView {
    pub fn new(store: Arc<dyn LibraryStore>, backend: Arc<dyn SearchBackend>, gate: AuthGate) -> Self {
        LibraryView {
            store,
            backend,
            gate,
            articles: Vec::new(),
            summary: None,
        }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Fetches the saved articles of the signed-in user, in saved order.
    pub async fn load(&mut self) -> Result<&[Article], StoreError> {
        if let Decision::Denied(reason) = self.gate.check(Action::ViewLibrary) {
            return Err(StoreError::Denied(reason));
        }
        let email = self.gate.email().ok_or(StoreError::Reloading)?;

        let ids = self.store.saved_article_ids(&email).await?;
        let mut articles = self.store.articles_by_ids(&ids).await?;
        articles.sort_by_key(|a| ids.iter().position(|id| *id == a.id));

        info!(target: TARGET_SESSION, "Library for {} holds {} articles", email, articles.len());
        self.articles = articles;
        self.summary = None;
        Ok(&self.articles)
    }

    /// Summarizes the loaded articles, or hides the summary if one is shown.
    /// Returns the summary now displayed.
    pub async fn toggle_summary(&mut self) -> Result<Option<&Summary>, DenyReason> {
        if self.summary.take().is_some() || self.articles.is_empty() {
            return Ok(None);
        }
        if let Decision::Denied(reason) = self.gate.check(Action::Summarize) {
            return Err(reason);
        }

        let request = SummarizeRequest {
            query: LIBRARY_SUMMARY_QUERY.to_string(),
            article_ids: self.articles.iter().map(|a| a.id.clone()).collect(),
        };
        let summary = match self
            .backend
            .summarize(&request, &CancellationToken::new())
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(target: TARGET_SESSION, "Library summary failed, showing fallback: {}", err);
                Summary::fallback("your library", self.articles.len(), &err)
            }
        };
        self.summary = Some(summary);
        Ok(self.summary.as_ref())
    }
}

/// Makes sure the signed-in user has a user record.
pub async fn provision_user(store: &dyn LibraryStore, email: &str) -> Result<bool, StoreError> {
    store.ensure_user(&UserProfile::from_email(email)).await
}
