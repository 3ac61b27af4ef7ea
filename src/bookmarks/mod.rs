//! Saved articles with optimistic toggling.
//!
//! A toggle flips the entry locally and returns at once; the write to the
//! library store runs in the background and is rolled back on failure.
//! Writes for the same article are sent strictly in toggle order.

mod set;

pub use set::BookmarkSet;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{Action, AuthGate, Decision};
use crate::optimistic::{Mutation, Optimistic};
use crate::store::{LibraryStore, StoreError};
use crate::types::ArticleId;
use crate::TARGET_BOOKMARKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// Completion signal of the last write queued for an article. Tails
/// outlive reloads so later writes still queue behind them.
struct Tail {
    ticket: u64,
    owner: String,
    done: watch::Receiver<bool>,
}

/// Resolves once the write behind `done` has settled.
async fn settled(mut done: watch::Receiver<bool>) {
    // An error only means the write's task went away
    let _ = done.wait_for(|done| *done).await;
}

struct Inner {
    entries: Optimistic<ArticleId, ()>,
    phase: LoadPhase,
    /// Bumped on every reload; writes from an older epoch are not applied.
    epoch: u64,
    owner: Option<String>,
    tails: HashMap<ArticleId, Tail>,
}

struct Shared {
    inner: Mutex<Inner>,
    store: Arc<dyn LibraryStore>,
    gate: AuthGate,
    changes: watch::Sender<BookmarkSet>,
    outstanding: watch::Sender<usize>,
}

#[derive(Clone)]
pub struct BookmarkStore {
    shared: Arc<Shared>,
}

impl BookmarkStore {
    pub fn new(store: Arc<dyn LibraryStore>, gate: AuthGate) -> Self {
        let (changes, _) = watch::channel(BookmarkSet::default());
        let (outstanding, _) = watch::channel(0);
        BookmarkStore {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    entries: Optimistic::new(),
                    phase: LoadPhase::Unloaded,
                    epoch: 0,
                    owner: None,
                    tails: HashMap::new(),
                }),
                store,
                gate,
                changes,
                outstanding,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: BookmarkSet) {
        self.shared.changes.send_replace(snapshot);
    }

    pub fn snapshot(&self) -> BookmarkSet {
        BookmarkSet::new(self.lock().entries.clone())
    }

    /// Receives a new snapshot on every visible change.
    pub fn subscribe(&self) -> watch::Receiver<BookmarkSet> {
        self.shared.changes.subscribe()
    }

    pub fn phase(&self) -> LoadPhase {
        self.lock().phase
    }

    pub fn is_saved(&self, id: &ArticleId) -> bool {
        self.lock().entries.get(id).is_some()
    }

    /// Flips the saved state of `id` and schedules the write. Returns the
    /// snapshot with the flip applied.
    pub fn toggle(&self, id: &ArticleId) -> Result<BookmarkSet, StoreError> {
        if let Decision::Denied(reason) = self.shared.gate.check(Action::Bookmark) {
            return Err(StoreError::Denied(reason));
        }
        let email = self.shared.gate.email().ok_or(StoreError::Reloading)?;

        let (mutation, epoch, previous, done, snapshot) = {
            let mut inner = self.lock();
            match inner.phase {
                LoadPhase::Ready if inner.owner.as_deref() == Some(email.as_str()) => {}
                LoadPhase::Failed => {
                    return Err(StoreError::Failure(
                        "saved articles could not be loaded".to_string(),
                    ))
                }
                _ => return Err(StoreError::Reloading),
            }

            let target = if inner.entries.get(id).is_some() {
                None
            } else {
                Some(())
            };
            let mutation = inner.entries.apply(id.clone(), target);
            let (done, done_rx) = watch::channel(false);
            let previous = inner
                .tails
                .insert(
                    id.clone(),
                    Tail {
                        ticket: mutation.ticket,
                        owner: email.clone(),
                        done: done_rx,
                    },
                )
                .map(|tail| tail.done);
            let snapshot = BookmarkSet::new(inner.entries.clone());
            (mutation, inner.epoch, previous, done, snapshot)
        };

        debug!(
            target: TARGET_BOOKMARKS,
            "{} article {} for {}",
            if mutation.target.is_some() { "Saving" } else { "Removing" },
            id,
            email
        );
        self.publish(snapshot.clone());
        self.shared.outstanding.send_modify(|n| *n += 1);

        let this = self.clone();
        tokio::spawn(async move { this.persist(email, mutation, epoch, previous, done).await });

        Ok(snapshot)
    }

    async fn persist(
        self,
        email: String,
        mutation: Mutation<ArticleId, ()>,
        epoch: u64,
        previous: Option<watch::Receiver<bool>>,
        done: watch::Sender<bool>,
    ) {
        if let Some(previous) = previous {
            settled(previous).await;
        }

        let store = &self.shared.store;
        let outcome = match mutation.target {
            Some(()) => store.save_article(&email, &mutation.key).await,
            None => store.remove_article(&email, &mutation.key).await,
        };

        let snapshot = {
            let mut inner = self.lock();
            if inner.tails.get(&mutation.key).map(|t| t.ticket) == Some(mutation.ticket) {
                inner.tails.remove(&mutation.key);
            }
            if inner.epoch == epoch {
                inner.entries.settle(&mutation, &outcome);
                Some(BookmarkSet::new(inner.entries.clone()))
            } else {
                None
            }
        };

        match (&outcome, &snapshot) {
            (_, None) => debug!(
                target: TARGET_BOOKMARKS,
                "Discarding result for article {}: saved articles were reloaded", mutation.key
            ),
            (Ok(()), Some(_)) => debug!(target: TARGET_BOOKMARKS, "Article {} stored", mutation.key),
            (Err(err), Some(_)) => warn!(
                target: TARGET_BOOKMARKS,
                "Rolling back article {} for {}: {}", mutation.key, email, err
            ),
        }

        if let Some(snapshot) = snapshot {
            self.publish(snapshot);
        }
        done.send_replace(true);
        self.shared
            .outstanding
            .send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Replaces the set with the saved articles of the current identity.
    /// Writes still running for that identity are awaited first so the
    /// loaded set includes them. Toggles are rejected until this completes.
    pub async fn reload(&self) -> Result<BookmarkSet, StoreError> {
        let email = self.shared.gate.email();
        let (epoch, in_flight) = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.phase = LoadPhase::Loading;
            inner.owner = email.clone();
            inner.entries.reset(std::iter::empty());
            let in_flight: Vec<watch::Receiver<bool>> = inner
                .tails
                .values()
                .filter(|tail| Some(&tail.owner) == email.as_ref())
                .map(|tail| tail.done.clone())
                .collect();
            (inner.epoch, in_flight)
        };
        self.publish(BookmarkSet::default());

        if !in_flight.is_empty() {
            debug!(
                target: TARGET_BOOKMARKS,
                "Waiting for {} pending writes before reloading", in_flight.len()
            );
            for done in in_flight {
                settled(done).await;
            }
        }

        let loaded = match &email {
            Some(email) => self.shared.store.saved_article_ids(email).await,
            None => Ok(Vec::new()),
        };

        let snapshot = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!(target: TARGET_BOOKMARKS, "Reload superseded by a newer one");
                return Ok(BookmarkSet::new(inner.entries.clone()));
            }
            match loaded {
                Ok(ids) => {
                    inner.entries.reset(ids.into_iter().map(|id| (id, ())));
                    inner.phase = LoadPhase::Ready;
                    BookmarkSet::new(inner.entries.clone())
                }
                Err(err) => {
                    inner.phase = LoadPhase::Failed;
                    warn!(target: TARGET_BOOKMARKS, "Failed to load saved articles: {}", err);
                    return Err(err);
                }
            }
        };

        info!(
            target: TARGET_BOOKMARKS,
            "Loaded {} saved articles for {}",
            snapshot.len(),
            email.as_deref().unwrap_or("<anonymous>")
        );
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Reloads whenever the signed-in identity changes.
    pub fn spawn_identity_sync(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut identity = self.shared.gate.watch();
        tokio::spawn(async move {
            let mut last: Option<(bool, Option<String>)> = None;
            loop {
                let current = {
                    let id = identity.borrow_and_update();
                    (id.loaded, id.email.clone())
                };
                if last.as_ref() != Some(&current) {
                    if current.0 {
                        // Failures are logged by reload and leave the store in the Failed phase
                        let _ = this.reload().await;
                    }
                    last = Some(current);
                }
                if identity.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Waits until every scheduled write has settled.
    pub async fn flush(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DenyReason, GatePolicy, Identity, IdentityProvider};
    use crate::testing::MemoryStore;
    use std::time::Duration;

    const EMAIL: &str = "dev@example.com";

    fn id(n: i64) -> ArticleId {
        ArticleId::Number(n)
    }

    async fn signed_in(store: &Arc<MemoryStore>) -> (IdentityProvider, BookmarkStore) {
        let provider = IdentityProvider::new(Identity::signed_in(EMAIL));
        let bookmarks = BookmarkStore::new(store.clone(), provider.gate(GatePolicy::default()));
        bookmarks.reload().await.unwrap();
        (provider, bookmarks)
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_visible_at_once_and_confirmed_later() {
        let store = Arc::new(MemoryStore::default());
        store.delay(id(1), Duration::from_secs(3));
        let (_provider, bookmarks) = signed_in(&store).await;

        let snapshot = bookmarks.toggle(&id(1)).unwrap();
        assert!(snapshot.contains(&id(1)));
        assert!(snapshot.is_pending(&id(1)));
        assert!(!snapshot.is_confirmed(&id(1)));

        bookmarks.flush().await;
        let snapshot = bookmarks.snapshot();
        assert!(snapshot.is_confirmed(&id(1)));
        assert!(!snapshot.is_pending(&id(1)));
        assert!(store.is_saved(EMAIL, &id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_rolled_back() {
        let store = Arc::new(MemoryStore::default());
        store.fail("save", &id(1));
        let (_provider, bookmarks) = signed_in(&store).await;
        let mut changes = bookmarks.subscribe();

        assert!(bookmarks.toggle(&id(1)).unwrap().contains(&id(1)));
        bookmarks.flush().await;

        assert!(!bookmarks.is_saved(&id(1)));
        assert!(changes.has_changed().unwrap());
        assert!(!changes.borrow_and_update().contains(&id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_from_rest_store_reverts_save() {
        use crate::config::RemoteConfig;
        use crate::remote::RemoteClient;
        use crate::store::RestStore;
        use crate::testing::{ScriptedTransport, Step};

        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Ok(200, "[]"),
            Step::Ok(500, "boom"),
        ]));
        let remote = RemoteClient::new(transport.clone(), RemoteConfig::default());
        let store = RestStore::new("https://project.supabase.co", "anon-key", remote).unwrap();
        let provider = IdentityProvider::new(Identity::signed_in(EMAIL));
        let bookmarks = BookmarkStore::new(Arc::new(store), provider.gate(GatePolicy::default()));
        bookmarks.reload().await.unwrap();

        let a1 = ArticleId::Text("a1".into());
        assert!(bookmarks.toggle(&a1).unwrap().contains(&a1));
        bookmarks.flush().await;

        assert!(!bookmarks.is_saved(&a1));
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_for_one_article_keep_toggle_order() {
        let store = Arc::new(MemoryStore::default());
        store.delay(id(1), Duration::from_secs(5));
        let (_provider, bookmarks) = signed_in(&store).await;

        assert!(bookmarks.toggle(&id(1)).unwrap().contains(&id(1)));
        assert!(!bookmarks.toggle(&id(1)).unwrap().contains(&id(1)));
        bookmarks.flush().await;

        assert_eq!(store.log(), vec!["save:1", "remove:1"]);
        assert!(!bookmarks.is_saved(&id(1)));
        assert!(!store.is_saved(EMAIL, &id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_waits_for_running_writes_of_the_same_user() {
        let store = Arc::new(MemoryStore::default());
        store.delay(id(1), Duration::from_secs(10));
        let (_provider, bookmarks) = signed_in(&store).await;

        bookmarks.toggle(&id(1)).unwrap();
        bookmarks.reload().await.unwrap();
        assert!(bookmarks.is_saved(&id(1)));
        assert!(bookmarks.snapshot().is_confirmed(&id(1)));

        store.delay(id(1), Duration::from_secs(1));
        assert!(!bookmarks.toggle(&id(1)).unwrap().contains(&id(1)));
        assert!(bookmarks.toggle(&id(1)).unwrap().contains(&id(1)));
        bookmarks.flush().await;

        assert_eq!(store.log(), vec!["save:1", "remove:1", "save:1"]);
        assert!(bookmarks.is_saved(&id(1)));
        assert!(store.is_saved(EMAIL, &id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_after_a_failed_load_are_refused() {
        let store = Arc::new(MemoryStore::default());
        store.fail_loads();
        let provider = IdentityProvider::new(Identity::signed_in(EMAIL));
        let bookmarks = BookmarkStore::new(store.clone(), provider.gate(GatePolicy::default()));

        assert!(matches!(bookmarks.reload().await, Err(StoreError::Failure(_))));
        assert_eq!(bookmarks.phase(), LoadPhase::Failed);
        assert!(matches!(bookmarks.toggle(&id(1)), Err(StoreError::Failure(_))));
        assert!(store.log().is_empty());
        assert!(bookmarks.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn other_articles_are_not_held_back() {
        let store = Arc::new(MemoryStore::default());
        store.delay(id(1), Duration::from_secs(5));
        let (_provider, bookmarks) = signed_in(&store).await;

        bookmarks.toggle(&id(1)).unwrap();
        bookmarks.toggle(&id(2)).unwrap();
        bookmarks.flush().await;

        assert_eq!(store.log(), vec!["save:2", "save:1"]);
        assert_eq!(bookmarks.snapshot().ids(), vec![id(1), id(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_removal_after_successful_save_keeps_it_saved() {
        let store = Arc::new(MemoryStore::default());
        store.fail("remove", &id(1));
        let (_provider, bookmarks) = signed_in(&store).await;

        bookmarks.toggle(&id(1)).unwrap();
        bookmarks.toggle(&id(1)).unwrap();
        bookmarks.flush().await;

        assert!(bookmarks.is_saved(&id(1)));
        assert!(bookmarks.snapshot().is_confirmed(&id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_users_cannot_toggle() {
        let store = Arc::new(MemoryStore::default());
        let provider = IdentityProvider::new(Identity::anonymous());
        let bookmarks = BookmarkStore::new(store.clone(), provider.gate(GatePolicy::default()));
        bookmarks.reload().await.unwrap();

        assert_eq!(
            bookmarks.toggle(&id(1)).unwrap_err(),
            StoreError::Denied(DenyReason::SignInRequired(Action::Bookmark))
        );
        assert!(store.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_wait_for_reload_to_finish() {
        let store = Arc::new(MemoryStore::with_saved(EMAIL, &[id(1)]));
        let release = store.hold_load();
        let provider = IdentityProvider::new(Identity::signed_in(EMAIL));
        let bookmarks = BookmarkStore::new(store.clone(), provider.gate(GatePolicy::default()));

        let reload = tokio::spawn({
            let bookmarks = bookmarks.clone();
            async move { bookmarks.reload().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(bookmarks.toggle(&id(2)).unwrap_err(), StoreError::Reloading);
        release.send(()).unwrap();
        reload.await.unwrap().unwrap();

        assert_eq!(bookmarks.phase(), LoadPhase::Ready);
        assert!(bookmarks.is_saved(&id(1)));
        assert!(bookmarks.toggle(&id(2)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn identity_change_reloads_and_drops_stale_results() {
        let store = Arc::new(MemoryStore::with_saved("other@example.com", &[id(9)]));
        store.delay(id(1), Duration::from_secs(5));
        let (provider, bookmarks) = signed_in(&store).await;
        let sync = bookmarks.spawn_identity_sync();

        bookmarks.toggle(&id(1)).unwrap();
        provider.sign_in("other@example.com");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(bookmarks.snapshot().ids(), vec![id(9)]);
        bookmarks.flush().await;
        // the first user's save landed remotely but is not shown for the new user
        assert!(store.is_saved(EMAIL, &id(1)));
        assert_eq!(bookmarks.snapshot().ids(), vec![id(9)]);

        provider.sign_out();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bookmarks.snapshot().is_empty());
        sync.abort();
    }
}
