//! Persistence of users, saved articles and search history.

mod rest;

pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::DenyReason;
use crate::remote::CallError;
use crate::types::{Article, ArticleId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Failure(String),
    #[error("{0}")]
    Denied(DenyReason),
    #[error("saved articles are still loading")]
    Reloading,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<CallError> for StoreError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::HttpError { status: 409, reason } => StoreError::Conflict(reason),
            other => StoreError::Failure(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Failure(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
}

impl UserProfile {
    /// Username defaults to the local part of the address.
    pub fn from_email(email: &str) -> Self {
        let local = email.split('@').next().unwrap_or(email).to_string();
        UserProfile {
            email: email.to_string(),
            name: None,
            username: Some(local),
        }
    }
}

/// One submitted search, kept for the user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "libId")]
    pub lib_id: Uuid,
    #[serde(rename = "searchInput")]
    pub search_input: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "type")]
    pub search_type: String,
    /// Set by the store, never sent.
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn semantic(search_input: &str, user_email: &str) -> Self {
        HistoryEntry {
            lib_id: Uuid::new_v4(),
            search_input: search_input.to_string(),
            user_email: user_email.to_string(),
            search_type: "semantic".to_string(),
            created_at: Some(Utc::now()),
        }
    }
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn saved_article_ids(&self, email: &str) -> StoreResult<Vec<ArticleId>>;

    /// Saving an already saved article succeeds.
    async fn save_article(&self, email: &str, id: &ArticleId) -> StoreResult<()>;

    /// Removing an article that is not saved succeeds.
    async fn remove_article(&self, email: &str, id: &ArticleId) -> StoreResult<()>;

    async fn articles_by_ids(&self, ids: &[ArticleId]) -> StoreResult<Vec<Article>>;

    /// Creates the user row if missing. Returns true when a row was created.
    async fn ensure_user(&self, profile: &UserProfile) -> StoreResult<bool>;

    async fn record_search(&self, entry: &HistoryEntry) -> StoreResult<()>;

    /// Keeps local copies of articles the user has seen, so the library can
    /// show them later. Stores backed by the article catalog need nothing.
    async fn remember_articles(&self, _articles: &[Article]) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_status_maps_to_conflict() {
        assert!(matches!(
            StoreError::from(CallError::http(409)),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            StoreError::from(CallError::http(500)),
            StoreError::Failure(_)
        ));
    }

    #[test]
    fn history_entries_use_library_column_names() {
        let entry = HistoryEntry::semantic("kafka", "dev@example.com");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["searchInput"], "kafka");
        assert_eq!(json["userEmail"], "dev@example.com");
        assert_eq!(json["type"], "semantic");
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn history_rows_decode_without_a_timestamp() {
        let json = serde_json::json!({
            "libId": "6f1c2b0e-5a43-4c8e-9a55-0d6f4f3c2a11",
            "searchInput": "kafka",
            "userEmail": "dev@example.com",
            "type": "semantic",
            "created_at": "2024-01-01T00:00:00Z"
        });
        let entry: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(entry.search_input, "kafka");
        assert_eq!(entry.created_at, None);
    }

    #[test]
    fn username_defaults_to_local_part() {
        assert_eq!(
            UserProfile::from_email("ada@example.com").username.as_deref(),
            Some("ada")
        );
    }
}
