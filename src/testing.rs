//! Fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::remote::{CallError, RawResponse, RemoteRequest, SearchBackend, Transport};
use crate::store::{HistoryEntry, LibraryStore, StoreError, StoreResult, UserProfile};
use crate::types::{Article, ArticleId, Query, SearchResult, SummarizeRequest, Summary};

pub enum Step {
    Ok(u16, &'static str),
    Fail(CallError),
    Hang,
}

/// Plays back scripted attempts. Once the script runs out every attempt hangs.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RemoteRequest>>,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        ScriptedTransport {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self::new(Vec::new())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<RawResponse, CallError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Hang);
        match step {
            Step::Ok(status, body) => Ok(RawResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}

pub fn result(id: i64, title: &str) -> SearchResult {
    SearchResult {
        id: ArticleId::Number(id),
        title: title.to_string(),
        company: "Acme".to_string(),
        published_date: "2024-01-01".to_string(),
        content_excerpt: format!("About {}", title),
        url: format!("https://eng.example/{}", id),
        image_url: None,
        similarity: 0.9,
    }
}

type SearchReply = Result<Vec<SearchResult>, CallError>;
type SummaryReply = Result<Summary, CallError>;

/// Backend whose answers are released by the test. Searches for queries
/// without a held reply return no results at once. Cancellation is
/// recorded but not honoured, so late answers still arrive.
#[derive(Default)]
pub struct FakeBackend {
    held_searches: Mutex<HashMap<String, oneshot::Receiver<SearchReply>>>,
    held_summaries: Mutex<VecDeque<oneshot::Receiver<SummaryReply>>>,
    pub search_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
    pub cancelled_calls: AtomicUsize,
    summarize_requests: Mutex<Vec<SummarizeRequest>>,
}

impl FakeBackend {
    pub fn hold_search(&self, query: &str) -> oneshot::Sender<SearchReply> {
        let (tx, rx) = oneshot::channel();
        self.held_searches.lock().unwrap().insert(query.to_string(), rx);
        tx
    }

    pub fn hold_summary(&self) -> oneshot::Sender<SummaryReply> {
        let (tx, rx) = oneshot::channel();
        self.held_summaries.lock().unwrap().push_back(rx);
        tx
    }

    pub fn summarize_requests(&self) -> Vec<SummarizeRequest> {
        self.summarize_requests.lock().unwrap().clone()
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn search(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, CallError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let held = self.held_searches.lock().unwrap().remove(query.as_str());
        let reply = match held {
            Some(rx) => rx.await.unwrap_or(Err(CallError::Cancelled)),
            None => Ok(Vec::new()),
        };
        if cancel.is_cancelled() {
            self.cancelled_calls.fetch_add(1, Ordering::SeqCst);
        }
        reply
    }

    async fn summarize(
        &self,
        request: &SummarizeRequest,
        cancel: &CancellationToken,
    ) -> Result<Summary, CallError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.summarize_requests.lock().unwrap().push(request.clone());
        let held = self.held_summaries.lock().unwrap().pop_front();
        let reply = match held {
            Some(rx) => rx.await.unwrap_or(Err(CallError::Cancelled)),
            None => Ok(Summary {
                query: request.query.clone(),
                article_count: request.article_ids.len(),
                themes: vec!["Scale".to_string()],
                summary_text: format!("Summary of {} articles", request.article_ids.len()),
                fallback: false,
            }),
        };
        if cancel.is_cancelled() {
            self.cancelled_calls.fetch_add(1, Ordering::SeqCst);
        }
        reply
    }

    async fn ping(&self, _cancel: &CancellationToken) -> Result<(), CallError> {
        Ok(())
    }
}

/// In-memory library tables with scriptable latency and failures.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<HashMap<String, HashSet<ArticleId>>>,
    articles: Mutex<Vec<Article>>,
    users: Mutex<Vec<UserProfile>>,
    history: Mutex<Vec<HistoryEntry>>,
    /// Completed writes in completion order, e.g. `save:3`.
    log: Mutex<Vec<String>>,
    delays: Mutex<HashMap<ArticleId, Duration>>,
    /// Writes rejected by the store, e.g. `remove:3`.
    failing: Mutex<HashSet<String>>,
    load_gate: Mutex<Option<oneshot::Receiver<()>>>,
    failing_loads: AtomicBool,
}

impl MemoryStore {
    pub fn with_saved(email: &str, ids: &[ArticleId]) -> Self {
        let store = MemoryStore::default();
        store
            .saved
            .lock()
            .unwrap()
            .insert(email.to_string(), ids.iter().cloned().collect());
        store
    }

    pub fn with_articles(self, articles: Vec<Article>) -> Self {
        *self.articles.lock().unwrap() = articles;
        self
    }

    pub fn delay(&self, id: ArticleId, delay: Duration) {
        self.delays.lock().unwrap().insert(id, delay);
    }

    pub fn fail(&self, op: &str, id: &ArticleId) {
        self.failing.lock().unwrap().insert(format!("{}:{}", op, id));
    }

    /// Every `saved_article_ids` call fails from now on.
    pub fn fail_loads(&self) {
        self.failing_loads.store(true, Ordering::SeqCst);
    }

    /// The next `saved_article_ids` call waits until the sender fires.
    pub fn hold_load(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.load_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn is_saved(&self, email: &str, id: &ArticleId) -> bool {
        self.saved
            .lock()
            .unwrap()
            .get(email)
            .map_or(false, |ids| ids.contains(id))
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().unwrap().clone()
    }

    pub fn users(&self) -> Vec<UserProfile> {
        self.users.lock().unwrap().clone()
    }

    async fn write(&self, op: &str, id: &ArticleId) -> StoreResult<()> {
        let delay = self.delays.lock().unwrap().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let entry = format!("{}:{}", op, id);
        self.log.lock().unwrap().push(entry.clone());
        if self.failing.lock().unwrap().contains(&entry) {
            return Err(StoreError::Failure(format!("{} {} rejected", op, id)));
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn saved_article_ids(&self, email: &str) -> StoreResult<Vec<ArticleId>> {
        let gate = self.load_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Failure("saved articles unavailable".into()));
        }
        let mut ids: Vec<ArticleId> = self
            .saved
            .lock()
            .unwrap()
            .get(email)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn save_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        self.write("save", id).await?;
        self.saved
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .insert(id.clone());
        Ok(())
    }

    async fn remove_article(&self, email: &str, id: &ArticleId) -> StoreResult<()> {
        self.write("remove", id).await?;
        if let Some(ids) = self.saved.lock().unwrap().get_mut(email) {
            ids.remove(id);
        }
        Ok(())
    }

    async fn articles_by_ids(&self, ids: &[ArticleId]) -> StoreResult<Vec<Article>> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn ensure_user(&self, profile: &UserProfile) -> StoreResult<bool> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == profile.email) {
            return Ok(false);
        }
        users.push(profile.clone());
        Ok(true)
    }

    async fn record_search(&self, entry: &HistoryEntry) -> StoreResult<()> {
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
