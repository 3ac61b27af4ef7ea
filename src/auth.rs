//! Signed-in identity and the gate that decides which actions need it.

use std::fmt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::TARGET_SESSION;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// False until the identity provider has answered.
    pub loaded: bool,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn loading() -> Self {
        Identity::default()
    }

    pub fn anonymous() -> Self {
        Identity {
            loaded: true,
            ..Identity::default()
        }
    }

    pub fn signed_in(email: &str) -> Self {
        Identity {
            loaded: true,
            email: Some(email.to_string()),
            name: None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.loaded && self.email.is_some()
    }
}

/// Owns the current identity and broadcasts changes to gates and stores.
pub struct IdentityProvider {
    tx: watch::Sender<Identity>,
}

impl IdentityProvider {
    pub fn new(initial: Identity) -> Self {
        let (tx, _) = watch::channel(initial);
        IdentityProvider { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Identity> {
        self.tx.subscribe()
    }

    pub fn gate(&self, policy: GatePolicy) -> AuthGate {
        AuthGate::new(self.subscribe(), policy)
    }

    pub fn set(&self, identity: Identity) {
        info!(
            target: TARGET_SESSION,
            "Identity changed: {}",
            identity.email.as_deref().unwrap_or("<anonymous>")
        );
        self.tx.send_replace(identity);
    }

    pub fn sign_in(&self, email: &str) {
        self.set(Identity::signed_in(email));
    }

    pub fn sign_out(&self) {
        self.set(Identity::anonymous());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Search,
    Summarize,
    Bookmark,
    ViewLibrary,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Search => "search",
            Action::Summarize => "summarize results",
            Action::Bookmark => "save articles",
            Action::ViewLibrary => "open your library",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("still checking who is signed in")]
    IdentityLoading,
    #[error("sign in to {0}")]
    SignInRequired(Action),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatePolicy {
    pub require_sign_in_for_search: bool,
}

#[derive(Clone)]
pub struct AuthGate {
    identity: watch::Receiver<Identity>,
    policy: GatePolicy,
}

impl AuthGate {
    pub fn new(identity: watch::Receiver<Identity>, policy: GatePolicy) -> Self {
        AuthGate { identity, policy }
    }

    fn is_gated(&self, action: Action) -> bool {
        match action {
            Action::Search => self.policy.require_sign_in_for_search,
            Action::Summarize | Action::Bookmark | Action::ViewLibrary => true,
        }
    }

    /// Pure function of the identity at the time of the call.
    pub fn check(&self, action: Action) -> Decision {
        if !self.is_gated(action) {
            return Decision::Allowed;
        }
        let identity = self.identity.borrow();
        if !identity.loaded {
            Decision::Denied(DenyReason::IdentityLoading)
        } else if identity.email.is_none() {
            Decision::Denied(DenyReason::SignInRequired(action))
        } else {
            Decision::Allowed
        }
    }

    pub fn email(&self) -> Option<String> {
        self.identity.borrow().email.clone()
    }

    /// A fresh receiver for observing identity changes.
    pub fn watch(&self) -> watch::Receiver<Identity> {
        self.identity.clone()
    }
}
