use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{Handled, SessionState};
use crate::auth::{Action, AuthGate, Decision, DenyReason};
use crate::bookmarks::{BookmarkSet, BookmarkStore};
use crate::remote::{CallError, SearchBackend};
use crate::store::{HistoryEntry, LibraryStore, StoreError};
use crate::suggestions::SuggestionProvider;
use crate::types::{ArticleId, Query, SearchResult, SummarizeRequest, Summary};
use crate::TARGET_SESSION;

/// Result of a backend call spawned by the session, tagged with the token
/// it was issued under.
#[derive(Debug)]
pub enum Completion {
    Search {
        token: u64,
        outcome: Result<Vec<SearchResult>, CallError>,
    },
    Summary {
        token: u64,
        outcome: Result<Summary, CallError>,
    },
}

struct InFlight {
    token: u64,
    cancel: CancellationToken,
}

impl InFlight {
    fn cancel(self) {
        self.cancel.cancel();
    }
}

/// One query lifecycle: input, search, results and an optional summary.
///
/// Backend calls run as spawned tasks and report back through a channel
/// owned by the session. Every call carries a token; a completion whose
/// token is no longer current is dropped, so the last submission wins.
pub struct SearchSession {
    backend: Arc<dyn SearchBackend>,
    gate: AuthGate,
    history: Option<Arc<dyn LibraryStore>>,
    suggestions: SuggestionProvider,

    state: SessionState,
    active_query: Option<Query>,
    results: Vec<SearchResult>,
    summary: Option<Summary>,
    last_failure: Option<CallError>,

    next_token: u64,
    search: Option<InFlight>,
    summarize: Option<InFlight>,

    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl SearchSession {
    pub fn new(backend: Arc<dyn SearchBackend>, gate: AuthGate) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        SearchSession {
            backend,
            gate,
            history: None,
            suggestions: SuggestionProvider::default(),
            state: SessionState::Idle,
            active_query: None,
            results: Vec::new(),
            summary: None,
            last_failure: None,
            next_token: 0,
            search: None,
            summarize: None,
            completions_tx,
            completions_rx,
        }
    }

    /// Records each completed search for signed-in users.
    pub fn with_history(mut self, store: Arc<dyn LibraryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn with_suggestions(mut self, suggestions: SuggestionProvider) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn active_query(&self) -> Option<&Query> {
        self.active_query.as_ref()
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Present only in `SummaryShown`.
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// The failure behind the last empty result set, for diagnostics.
    pub fn last_failure(&self) -> Option<&CallError> {
        self.last_failure.as_ref()
    }

    pub fn no_results(&self) -> bool {
        *self.state.underlying() == SessionState::ResultsShown && self.results.is_empty()
    }

    /// Suggestions to display, if the session is in the suggesting state.
    pub fn visible_suggestions(&self) -> Option<&[String]> {
        match self.state {
            SessionState::Suggesting => Some(self.suggestions.suggestions()),
            _ => None,
        }
    }

    fn transition(&mut self, next: SessionState) -> Handled {
        debug!(target: TARGET_SESSION, "{} -> {}", self.state, next);
        self.state = next;
        Handled::Applied
    }

    /// Moves to `next`, or makes it the resume target if a sign-in prompt is up.
    fn settle(&mut self, next: SessionState) -> Handled {
        if let SessionState::AuthRequired { resume, .. } = &mut self.state {
            debug!(target: TARGET_SESSION, "auth-required (resume {} -> {})", resume, next);
            **resume = next;
            return Handled::Applied;
        }
        self.transition(next)
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn deny(&mut self, action: Action, reason: DenyReason) -> Handled {
        info!(target: TARGET_SESSION, "{} denied: {}", action, reason);
        let resume = Box::new(self.state.underlying().clone());
        self.transition(SessionState::AuthRequired { reason, resume })
    }

    pub fn focus_input(&mut self, text: &str) -> Handled {
        if self.state == SessionState::Idle && text.trim().is_empty() {
            return self.transition(SessionState::Suggesting);
        }
        Handled::Ignored
    }

    pub fn input_changed(&mut self, text: &str) -> Handled {
        if self.state == SessionState::Suggesting && !text.trim().is_empty() {
            return self.transition(SessionState::Idle);
        }
        Handled::Ignored
    }

    pub fn blur_input(&mut self) -> Handled {
        if self.state == SessionState::Suggesting {
            return self.transition(SessionState::Idle);
        }
        Handled::Ignored
    }

    /// Submits the suggestion at `index` as a query.
    pub fn choose_suggestion(&mut self, index: usize) -> Handled {
        if self.state != SessionState::Suggesting {
            return Handled::Ignored;
        }
        match self.suggestions.get(index).map(str::to_string) {
            Some(text) => self.submit(&text),
            None => Handled::Ignored,
        }
    }

    /// Starts a search, superseding anything in flight. Blank input is ignored.
    pub fn submit(&mut self, text: &str) -> Handled {
        let Some(query) = Query::new(text) else {
            return Handled::Ignored;
        };
        if let Decision::Denied(reason) = self.gate.check(Action::Search) {
            return self.deny(Action::Search, reason);
        }

        if let Some(call) = self.search.take() {
            debug!(target: TARGET_SESSION, "Superseding search {}", call.token);
            call.cancel();
        }
        if let Some(call) = self.summarize.take() {
            call.cancel();
        }
        self.results.clear();
        self.summary = None;
        self.last_failure = None;

        let token = self.issue_token();
        let cancel = CancellationToken::new();
        info!(target: TARGET_SESSION, "Searching for {:?} (token {})", query.as_str(), token);

        let backend = Arc::clone(&self.backend);
        let tx = self.completions_tx.clone();
        let call_cancel = cancel.clone();
        let call_query = query.clone();
        tokio::spawn(async move {
            let outcome = backend.search(&call_query, &call_cancel).await;
            let _ = tx.send(Completion::Search { token, outcome });
        });

        self.search = Some(InFlight { token, cancel });
        self.active_query = Some(query);
        self.transition(SessionState::Searching)
    }

    /// Summarizes the displayed results. Needs a signed-in identity.
    pub fn request_summary(&mut self) -> Handled {
        if self.state != SessionState::ResultsShown || self.results.is_empty() {
            return Handled::Ignored;
        }
        let Some(query) = self.active_query.clone() else {
            return Handled::Ignored;
        };
        if let Decision::Denied(reason) = self.gate.check(Action::Summarize) {
            return self.deny(Action::Summarize, reason);
        }

        let token = self.issue_token();
        let cancel = CancellationToken::new();
        let request = SummarizeRequest {
            query: query.as_str().to_string(),
            article_ids: self.results.iter().map(|r| r.id.clone()).collect(),
        };
        info!(
            target: TARGET_SESSION,
            "Summarizing {} results for {:?} (token {})",
            request.article_ids.len(),
            request.query,
            token
        );

        let backend = Arc::clone(&self.backend);
        let tx = self.completions_tx.clone();
        let call_cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = backend.summarize(&request, &call_cancel).await;
            let _ = tx.send(Completion::Summary { token, outcome });
        });

        self.summarize = Some(InFlight { token, cancel });
        self.transition(SessionState::SummaryLoading)
    }

    /// Saves or unsaves a shown article. Without a signed-in identity the
    /// store is not touched and the sign-in prompt is raised instead.
    pub fn toggle_bookmark(
        &mut self,
        bookmarks: &BookmarkStore,
        id: &ArticleId,
    ) -> Result<BookmarkSet, StoreError> {
        if let Decision::Denied(reason) = self.gate.check(Action::Bookmark) {
            let _ = self.deny(Action::Bookmark, reason.clone());
            return Err(StoreError::Denied(reason));
        }
        bookmarks.toggle(id)
    }

    /// Hides the summary, cancelling it if it is still loading.
    pub fn dismiss_summary(&mut self) -> Handled {
        match self.state {
            SessionState::SummaryShown => {
                self.summary = None;
                self.transition(SessionState::ResultsShown)
            }
            SessionState::SummaryLoading => {
                if let Some(call) = self.summarize.take() {
                    debug!(target: TARGET_SESSION, "Cancelling summary {}", call.token);
                    call.cancel();
                }
                self.transition(SessionState::ResultsShown)
            }
            _ => Handled::Ignored,
        }
    }

    /// The summary button: requests a summary, or hides the one shown.
    pub fn toggle_summary(&mut self) -> Handled {
        match self.state {
            SessionState::SummaryShown | SessionState::SummaryLoading => self.dismiss_summary(),
            _ => self.request_summary(),
        }
    }

    pub fn dismiss_auth(&mut self) -> Handled {
        if let SessionState::AuthRequired { resume, .. } = &self.state {
            let resume = (**resume).clone();
            return self.transition(resume);
        }
        Handled::Ignored
    }

    /// Waits for the next backend call to finish and applies it.
    pub async fn next_completion(&mut self) -> Handled {
        match self.completions_rx.recv().await {
            Some(completion) => self.apply(completion),
            None => Handled::Ignored,
        }
    }

    /// Applies a completion if its token is still current.
    pub fn apply(&mut self, completion: Completion) -> Handled {
        match completion {
            Completion::Search { token, outcome } => self.finish_search(token, outcome),
            Completion::Summary { token, outcome } => self.finish_summary(token, outcome),
        }
    }

    fn finish_search(
        &mut self,
        token: u64,
        outcome: Result<Vec<SearchResult>, CallError>,
    ) -> Handled {
        if self.search.as_ref().map(|c| c.token) != Some(token) {
            debug!(target: TARGET_SESSION, "Dropping stale search result (token {})", token);
            return Handled::Ignored;
        }
        self.search = None;

        match outcome {
            Ok(results) => {
                info!(target: TARGET_SESSION, "Showing {} results", results.len());
                self.results = results;
            }
            Err(err) => {
                warn!(target: TARGET_SESSION, "Search failed, showing no results: {}", err);
                self.results.clear();
                self.last_failure = Some(err);
            }
        }
        self.summary = None;
        self.record_history();
        self.settle(SessionState::ResultsShown)
    }

    fn finish_summary(&mut self, token: u64, outcome: Result<Summary, CallError>) -> Handled {
        if self.summarize.as_ref().map(|c| c.token) != Some(token) {
            debug!(target: TARGET_SESSION, "Dropping stale summary (token {})", token);
            return Handled::Ignored;
        }
        self.summarize = None;
        let Some(query) = self.active_query.as_ref().map(|q| q.as_str().to_string()) else {
            return Handled::Ignored;
        };

        let summary = match outcome {
            Ok(mut summary) => {
                if summary.query != query {
                    warn!(
                        target: TARGET_SESSION,
                        "Summary came back for {:?}, showing it under {:?}", summary.query, query
                    );
                    summary.query = query;
                }
                summary
            }
            Err(err) => {
                warn!(target: TARGET_SESSION, "Summary failed, showing fallback: {}", err);
                Summary::fallback(&query, self.results.len(), &err)
            }
        };
        self.summary = Some(summary);
        self.settle(SessionState::SummaryShown)
    }

    /// Fire-and-forget: failures are logged and never retried.
    fn record_history(&self) {
        let (Some(store), Some(email), Some(query)) =
            (&self.history, self.gate.email(), &self.active_query)
        else {
            return;
        };
        let store = Arc::clone(store);
        let entry = HistoryEntry::semantic(query.as_str(), &email);
        tokio::spawn(async move {
            if let Err(err) = store.record_search(&entry).await {
                warn!(target: TARGET_SESSION, "Failed to record search history: {}", err);
            }
        });
    }
}
