use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, info};

use super::core::Database;
use crate::store::{HistoryEntry, LibraryStore, StoreResult, UserProfile};
use crate::types::{Article, ArticleId};
use crate::TARGET_DB;

impl Database {
    /// Inserts the article or refreshes its stored fields.
    pub async fn upsert_article(&self, article: &Article) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, company, published_date, content, url, image_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                published_date = excluded.published_date,
                content = excluded.content,
                url = excluded.url,
                image_url = excluded.image_url
            "#,
        )
        .bind(article.id.to_string())
        .bind(&article.title)
        .bind(&article.company)
        .bind(&article.published_date)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.image_url)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for Database {
    async fn saved_article_ids(&self, email: &str) -> StoreResult<Vec<ArticleId>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT article_id FROM saved_articles WHERE user_email = ?1 ORDER BY saved_at",
        )
        .bind(email)
        .fetch_all(self.pool())
        .await?;
        Ok(ids.iter().map(|id| ArticleId::parse(id)).collect())
    }

    async fn save_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO saved_articles (user_email, article_id, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_email, article_id) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?
        .rows_affected();

        debug!(target: TARGET_DB, "Saved article {} for {} (new: {})", id, email, inserted > 0);
        Ok(())
    }

    async fn remove_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        let removed = sqlx::query(
            "DELETE FROM saved_articles WHERE user_email = ?1 AND article_id = ?2",
        )
        .bind(email)
        .bind(id.to_string())
        .execute(self.pool())
        .await?
        .rows_affected();

        debug!(target: TARGET_DB, "Removed article {} for {} (existed: {})", id, email, removed > 0);
        Ok(())
    }

    async fn articles_by_ids(&self, ids: &[ArticleId]) -> StoreResult<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, title, company, published_date, content, url, image_url \
             FROM articles WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: String = row.get("id");
                Article {
                    id: ArticleId::parse(&id),
                    title: row.get("title"),
                    company: row.get("company"),
                    published_date: row.get("published_date"),
                    content: row.get("content"),
                    url: row.get("url"),
                    image_url: row.get("image_url"),
                    similarity: None,
                }
            })
            .collect())
    }

    async fn ensure_user(&self, profile: &UserProfile) -> StoreResult<bool> {
        let created = sqlx::query(
            r#"
            INSERT INTO users (email, name, username, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.username)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?
        .rows_affected()
            > 0;

        if created {
            info!(target: TARGET_DB, "Created user record for {}", profile.email);
        }
        Ok(created)
    }

    async fn record_search(&self, entry: &HistoryEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO library (lib_id, search_input, user_email, search_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(entry.lib_id.to_string())
        .bind(&entry.search_input)
        .bind(&entry.user_email)
        .bind(&entry.search_type)
        .bind(entry.created_at.unwrap_or_else(Utc::now).to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remember_articles(&self, articles: &[Article]) -> StoreResult<()> {
        for article in articles {
            self.upsert_article(article).await?;
        }
        Ok(())
    }
}
