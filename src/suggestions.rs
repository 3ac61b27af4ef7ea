/// Queries offered when the search box is focused and empty.
pub const DEFAULT_SUGGESTIONS: &[&str] = &[
    "How does Netflix handle microservices at scale?",
    "Database sharding strategies at Uber",
    "Running Kafka in production",
    "Incident postmortems and reliability practices",
    "Feature flags and progressive delivery",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionProvider {
    items: Vec<String>,
}

impl Default for SuggestionProvider {
    fn default() -> Self {
        SuggestionProvider {
            items: DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SuggestionProvider {
    /// Uses the given list, or the built-in one when it is empty.
    pub fn new(items: Vec<String>) -> Self {
        let items: Vec<String> = items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            Self::default()
        } else {
            SuggestionProvider { items }
        }
    }

    pub fn suggestions(&self) -> &[String] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_builtin_list() {
        let provider = SuggestionProvider::new(vec!["  ".into()]);
        assert_eq!(provider.suggestions().len(), DEFAULT_SUGGESTIONS.len());
        assert_eq!(provider.get(99), None);
    }

    #[test]
    fn configured_list_replaces_defaults() {
        let provider = SuggestionProvider::new(vec!["rust at scale".into()]);
        assert_eq!(provider.get(0), Some("rust at scale"));
        assert_eq!(provider.suggestions().len(), 1);
    }
}
