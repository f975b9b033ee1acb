//! Identity provider collaborator.
//!
//! ARCHITECTURE
//! ============
//! The provider owns sign-in state. Consumers never poll it; they hold an
//! `IdentityFeed` that yields the current identity once on subscribe and again
//! on every change. `AuthStateBroadcaster` implements that fan-out for every
//! provider backend so they share one subscription contract.
//!
//! TRADE-OFFS
//! ==========
//! Feeds are unbounded. Identity changes are rare and tiny, and a bounded
//! channel would force the provider to either block or drop a sign-out.

pub mod memory;
pub mod rest;

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use memory::MemoryIdentityProvider;
pub use rest::RestIdentityProvider;

// =============================================================================
// IDENTITY
// =============================================================================

/// Provider-assigned principal key. Also the profile store key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed-in principal as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uid,
    pub email: String,
    /// Whether the contact address has been confirmed.
    pub email_verified: bool,
}

/// One notification on an identity feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityEvent {
    /// Current identity, `None` when signed out.
    Changed(Option<Identity>),
    /// The provider can no longer deliver notifications.
    Failed(String),
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("an account already exists for this email")]
    EmailExists,
    #[error("password should be at least 6 characters")]
    WeakPassword,
    #[error("no signed-in identity")]
    NotSignedIn,
    #[error("too many attempts, try again later")]
    RateLimited,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("identity provider error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected identity provider response: {0}")]
    Decode(String),
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
}

impl IdentityError {
    /// Transport or availability failure; the same call may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// FEED
// =============================================================================

/// Receiving end of one identity subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct IdentityFeed {
    rx: mpsc::UnboundedReceiver<IdentityEvent>,
}

impl IdentityFeed {
    /// Next notification, or `None` once the provider side is gone.
    pub async fn next(&mut self) -> Option<IdentityEvent> {
        self.rx.recv().await
    }
}

struct BroadcastInner {
    current: Option<Identity>,
    subscribers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

/// Fan-out of identity changes to every live feed.
pub struct AuthStateBroadcaster {
    inner: Mutex<BroadcastInner>,
}

impl AuthStateBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(BroadcastInner { current: None, subscribers: Vec::new() }) }
    }

    /// Open a feed. The current identity is queued on it immediately.
    pub fn subscribe(&self) -> IdentityFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(IdentityEvent::Changed(inner.current.clone()));
        inner.subscribers.push(tx);
        IdentityFeed { rx }
    }

    /// Record a new identity and notify every open feed.
    pub fn publish(&self, identity: Option<Identity>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.current.clone_from(&identity);
        inner
            .subscribers
            .retain(|tx| tx.send(IdentityEvent::Changed(identity.clone())).is_ok());
    }

    /// Tell every open feed that notifications have stopped.
    pub fn fail(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .subscribers
            .retain(|tx| tx.send(IdentityEvent::Failed(message.to_owned())).is_ok());
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Number of feeds whose receiver is still alive.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl Default for AuthStateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// Email/password identity provider with change notifications.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Send a verification message to the signed-in identity's address.
    async fn send_verification(&self) -> Result<(), IdentityError>;

    /// Re-read the signed-in identity (picks up a completed verification).
    async fn refresh(&self) -> Result<Option<Identity>, IdentityError>;

    /// Whether an account exists for `email`.
    async fn is_registered(&self, email: &str) -> Result<bool, IdentityError>;

    fn current(&self) -> Option<Identity>;

    fn subscribe(&self) -> IdentityFeed;
}

/// Lowercase and trim an address for account lookups.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
