//! Session state and its reducer.
//!
//! DESIGN
//! ======
//! A `Session` answers "who is asking": the signed-in identity, the access
//! projection of its profile, and whether either is still being resolved.
//! All updates go through `Session::apply`, a pure fold over `SessionEvent`s,
//! so every transition can be tested without a live provider.
//!
//! Each identity change opens a new profile fetch tagged with a
//! `FetchTicket`. A `ProfileLoaded` event only lands if its ticket is the one
//! the session is still waiting for; results for an earlier identity (or an
//! earlier sign-in of the same identity) are dropped.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use crate::identity::{Identity, Uid};
use crate::profile::AccessProfile;

/// Tag for one outstanding profile fetch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub uid: Uid,
    pub seq: u64,
}

/// Result of a profile fetch as seen by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(AccessProfile),
    /// The store answered and holds no record for this identity.
    Missing,
    /// Transport or availability failure.
    Failed(String),
}

/// Non-fatal and fatal conditions surfaced to views.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Unable to fetch user data: {0}")]
    ProfileUnavailable(String),
    #[error("Identity feed failed: {0}")]
    IdentityFeed(String),
}

impl SessionError {
    /// Fatal errors end the session's subscription.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IdentityFeed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Identity provider reported the current identity (`None` = signed out).
    IdentityChanged(Option<Identity>),
    ProfileLoaded { ticket: FetchTicket, outcome: FetchOutcome },
    SubscriptionFailed(String),
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<AccessProfile>,
    /// True until identity and profile lookups have both completed.
    pub resolving: bool,
    pub error: Option<SessionError>,
    awaiting: Option<FetchTicket>,
    fetch_seq: u64,
}

impl Session {
    /// Fresh session at startup: nothing known yet, resolving.
    #[must_use]
    pub fn new() -> Self {
        Self { identity: None, profile: None, resolving: true, error: None, awaiting: None, fetch_seq: 0 }
    }

    /// Resolved session with no signed-in identity.
    #[must_use]
    pub fn signed_out() -> Self {
        Self { resolving: false, ..Self::new() }
    }

    /// Resolved session for `identity` with an optional profile.
    #[must_use]
    pub fn signed_in(identity: Identity, profile: Option<AccessProfile>) -> Self {
        Self { identity: Some(identity), profile, resolving: false, ..Self::new() }
    }

    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.email_verified)
    }

    /// Ticket of the profile fetch this session is waiting on, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<&FetchTicket> {
        self.awaiting.as_ref()
    }

    #[must_use]
    pub fn is_awaiting(&self, ticket: &FetchTicket) -> bool {
        self.awaiting.as_ref() == Some(ticket)
    }

    /// Fold one event into the session.
    #[must_use]
    pub fn apply(self, event: SessionEvent) -> Self {
        match event {
            SessionEvent::IdentityChanged(Some(identity)) => {
                let seq = self.fetch_seq + 1;
                let ticket = FetchTicket { uid: identity.uid.clone(), seq };
                Self {
                    identity: Some(identity),
                    profile: None,
                    resolving: true,
                    error: None,
                    awaiting: Some(ticket),
                    fetch_seq: seq,
                }
            }
            SessionEvent::IdentityChanged(None) => Self {
                identity: None,
                profile: None,
                resolving: false,
                error: None,
                awaiting: None,
                fetch_seq: self.fetch_seq,
            },
            SessionEvent::ProfileLoaded { ticket, outcome } => {
                if !self.is_awaiting(&ticket) {
                    return self;
                }
                let (profile, error) = match outcome {
                    FetchOutcome::Found(profile) => (Some(profile), None),
                    FetchOutcome::Missing => (None, None),
                    FetchOutcome::Failed(message) => (None, Some(SessionError::ProfileUnavailable(message))),
                };
                Self { profile, error, resolving: false, awaiting: None, ..self }
            }
            SessionEvent::SubscriptionFailed(message) => Self {
                identity: None,
                profile: None,
                resolving: false,
                error: Some(SessionError::IdentityFeed(message)),
                awaiting: None,
                fetch_seq: self.fetch_seq,
            },
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
