use crate::optimistic::Optimistic;
use crate::types::ArticleId;

/// Snapshot of the saved articles as shown to the user.
#[derive(Debug, Clone, Default)]
pub struct BookmarkSet {
    entries: Optimistic<ArticleId, ()>,
}

impl BookmarkSet {
    pub(crate) fn new(entries: Optimistic<ArticleId, ()>) -> Self {
        BookmarkSet { entries }
    }

    /// Includes saves and removals that are still in flight.
    pub fn contains(&self, id: &ArticleId) -> bool {
        self.entries.get(id).is_some()
    }

    pub fn is_confirmed(&self, id: &ArticleId) -> bool {
        self.entries.confirmed(id).is_some()
    }

    pub fn is_pending(&self, id: &ArticleId) -> bool {
        self.entries.is_pending(id)
    }

    pub fn ids(&self) -> Vec<ArticleId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
