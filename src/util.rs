//! Text and date helpers used when rendering results and library entries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters of article content kept in a result excerpt.
pub const EXCERPT_CHARS: usize = 150;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// Removes markup and collapses whitespace.
pub fn strip_html(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// First `EXCERPT_CHARS` characters of the plain text, with an ellipsis when cut.
pub fn excerpt(content: &str) -> String {
    let text = strip_html(content);
    if text.chars().count() <= EXCERPT_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}

/// Similarity as a percentage with one decimal, e.g. `0.8734` -> `87.3%`.
pub fn format_similarity(similarity: f64) -> String {
    format!("{:.1}%", similarity * 100.0)
}

/// Parse a date string in the formats the backend has been seen to use
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(date_str) {
        return Some(date.with_timezone(&Utc));
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(date_str) {
        return Some(date.with_timezone(&Utc));
    }

    for format in &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(date_str, format) {
            return Some(date.and_utc());
        }
    }

    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Renders a publication date for display; unparseable input is shown as is.
pub fn format_published_date(date_str: &str) -> String {
    match parse_date(date_str) {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => date_str.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            strip_html("<p>Hello&nbsp;<b>world</b></p>\n<br/>again &amp; again"),
            "Hello world again & again"
        );
    }

    #[test]
    fn excerpt_cuts_long_content() {
        let long = "word ".repeat(60);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.chars().count() <= EXCERPT_CHARS + 3);
        assert_eq!(excerpt("<i>short</i>"), "short");
    }

    #[test]
    fn similarity_is_a_percentage() {
        assert_eq!(format_similarity(0.8734), "87.3%");
        assert_eq!(format_similarity(1.0), "100.0%");
    }

    #[test]
    fn published_dates_are_normalized() {
        assert_eq!(format_published_date("2024-03-05"), "Mar 5, 2024");
        assert_eq!(format_published_date("2024-03-05T10:00:00Z"), "Mar 5, 2024");
        assert_eq!(format_published_date("2024-03-05T10:00:00.123"), "Mar 5, 2024");
        assert_eq!(format_published_date("sometime"), "sometime");
    }
}
