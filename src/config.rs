//! Client configuration, read from the environment and overridden by CLI flags.

use std::time::Duration;

use crate::auth::GatePolicy;
use crate::environment::{get_env_bool, get_env_parsed, get_env_string, get_env_var_as_vec};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const SEARCH_ENDPOINT: &str = "/ai-search";
pub const SUMMARIZE_ENDPOINT: &str = "/summarize-results";
pub const HEALTH_ENDPOINT: &str = "/test";

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_DATABASE_PATH: &str = "erblogx.db";

/// Timeout and retry policy applied to every remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RemoteConfig {
    pub fn from_env() -> Self {
        RemoteConfig {
            timeout: Duration::from_millis(get_env_parsed("ERBLOGX_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)),
            retry_attempts: get_env_parsed("ERBLOGX_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_delay: Duration::from_millis(get_env_parsed(
                "ERBLOGX_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}

/// Where saved articles, users and search history live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// PostgREST endpoint of the hosted database.
    Rest { url: String, anon_key: String },
    /// Local SQLite file.
    Sqlite { path: String },
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let url = get_env_string("SUPABASE_URL", "");
        let anon_key = get_env_string("SUPABASE_ANON", "");
        if !url.is_empty() && !anon_key.is_empty() {
            StoreConfig::Rest { url, anon_key }
        } else {
            StoreConfig::Sqlite {
                path: get_env_string("DATABASE_PATH", DEFAULT_DATABASE_PATH),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    pub gate: GatePolicy,
    pub suggestions: Vec<String>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        ClientConfig {
            api_url: get_env_string("ERBLOGX_API_URL", DEFAULT_API_URL),
            remote: RemoteConfig::from_env(),
            store: StoreConfig::from_env(),
            gate: GatePolicy {
                require_sign_in_for_search: get_env_bool(
                    "ERBLOGX_REQUIRE_SIGN_IN_FOR_SEARCH",
                    false,
                ),
            },
            suggestions: get_env_var_as_vec("ERBLOGX_SUGGESTIONS", '|'),
        }
    }
}
