//! Domain types shared by the session, the bookmark store and the library view.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::remote::CallError;
use crate::util::excerpt;

/// Themes attached to a summary the backend could not produce.
pub const FALLBACK_THEMES: [&str; 2] = ["Engineering", "Technology"];

/// Backend article identifier. The search service hands out integers, older
/// rows in the library tables carry strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArticleId {
    Number(i64),
    Text(String),
}

impl ArticleId {
    /// Reads an identifier from user input or a TEXT column.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => ArticleId::Number(n),
            Err(_) => ArticleId::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleId::Number(n) => write!(f, "{}", n),
            ArticleId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ArticleId {
    fn from(n: i64) -> Self {
        ArticleId::Number(n)
    }
}

impl From<&str> for ArticleId {
    fn from(s: &str) -> Self {
        ArticleId::Text(s.to_string())
    }
}

/// A submitted search. Never empty once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Query(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Article row as the backend and the `articles` relation hand it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: ArticleId,
    pub title: String,
    pub company: String,
    pub published_date: String,
    pub content_excerpt: String,
    pub url: String,
    pub image_url: Option<String>,
    /// Passed through from the backend unmodified.
    pub similarity: f64,
}

impl TryFrom<Article> for SearchResult {
    type Error = String;

    fn try_from(article: Article) -> Result<Self, Self::Error> {
        let similarity = article
            .similarity
            .ok_or_else(|| format!("article {} has no similarity score", article.id))?;
        Ok(SearchResult {
            content_excerpt: excerpt(&article.content),
            id: article.id,
            title: article.title,
            company: article.company,
            published_date: article.published_date,
            url: article.url,
            image_url: article.image_url,
            similarity,
        })
    }
}

impl From<&SearchResult> for Article {
    fn from(result: &SearchResult) -> Self {
        Article {
            id: result.id.clone(),
            title: result.title.clone(),
            company: result.company.clone(),
            published_date: result.published_date.clone(),
            content: result.content_excerpt.clone(),
            url: result.url.clone(),
            image_url: result.image_url.clone(),
            similarity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizeRequest {
    pub query: String,
    pub article_ids: Vec<ArticleId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummaryResponse {
    pub query: String,
    pub article_count: usize,
    #[serde(default)]
    pub themes: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub query: String,
    pub article_count: usize,
    /// Insertion ordered, no duplicates.
    pub themes: Vec<String>,
    pub summary_text: String,
    /// Set when the text was produced locally after the backend call failed.
    pub fallback: bool,
}

impl Summary {
    pub fn from_response(response: SummaryResponse) -> Self {
        Summary {
            query: response.query,
            article_count: response.article_count,
            themes: dedup_themes(response.themes),
            summary_text: response.summary,
            fallback: false,
        }
    }

    /// Locally produced summary shown when summarization failed.
    pub fn fallback(query: &str, article_count: usize, error: &CallError) -> Self {
        let summary_text = format!(
            "{} Showing a fallback summary instead: {} articles were found for \"{}\". \
             Once the summarization service is reachable again this panel will hold an \
             AI-generated overview of the results.",
            error.user_message(),
            article_count,
            query
        );
        Summary {
            query: query.to_string(),
            article_count,
            themes: FALLBACK_THEMES.iter().map(|t| t.to_string()).collect(),
            summary_text,
            fallback: true,
        }
    }
}

fn dedup_themes(themes: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(themes.len());
    for theme in themes {
        let theme = theme.trim().to_string();
        if !theme.is_empty() && !seen.contains(&theme) {
            seen.push(theme);
        }
    }
    seen
}
