pub mod auth;
pub mod bookmarks;
pub mod config;
pub mod db;
pub mod environment;
pub mod library;
pub mod logging;
pub mod optimistic;
pub mod remote;
pub mod session;
pub mod store;
pub mod suggestions;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub const TARGET_REMOTE_CALL: &str = "remote_call";
pub const TARGET_SESSION: &str = "session";
pub const TARGET_BOOKMARKS: &str = "bookmarks";
pub const TARGET_DB: &str = "db_query";

pub use auth::{Action, AuthGate, Decision, DenyReason, GatePolicy, Identity, IdentityProvider};
pub use bookmarks::{BookmarkSet, BookmarkStore};
pub use remote::{ApiClient, CallError, RemoteClient, SearchBackend};
pub use session::{Handled, SearchSession, SessionState};
pub use store::{LibraryStore, StoreError};
pub use types::{Article, ArticleId, Query, SearchResult, Summary};
