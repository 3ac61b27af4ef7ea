use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                username TEXT,
                created_at TEXT NOT NULL
            );

            -- Article ids are stored as text; numeric ids round-trip through ArticleId::parse
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                published_date TEXT NOT NULL,
                content TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT
            );

            CREATE TABLE IF NOT EXISTS saved_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_email TEXT NOT NULL,
                article_id TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                UNIQUE (user_email, article_id)
            );
            CREATE INDEX IF NOT EXISTS idx_saved_articles_user ON saved_articles (user_email);

            CREATE TABLE IF NOT EXISTS library (
                lib_id TEXT PRIMARY KEY,
                search_input TEXT NOT NULL,
                user_email TEXT NOT NULL,
                search_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_library_user ON library (user_email, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
