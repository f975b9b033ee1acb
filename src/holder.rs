//! Session state holder.
//!
//! ARCHITECTURE
//! ============
//! One tokio task owns the `Session`. It listens on exactly one identity
//! feed plus a channel of profile-fetch results, folds both through
//! `Session::apply`, and publishes every new value on a `watch` channel.
//! Readers (the gate, views, the CLI) only ever see snapshots.
//!
//! ```text
//! IdentityFeed ──┐
//!                ├─► run loop ─► Session::apply ─► watch::Sender<Session>
//! fetch results ─┘        │
//!                         └─► spawn fetch(ticket) ─► ProfileStore::fetch
//! ```
//!
//! LIFECYCLE
//! =========
//! Dropping or shutting down the holder aborts the task. That drops the feed
//! (unsubscribing from the provider) and the fetch-result receiver, so a
//! fetch still in flight finishes into a closed channel and is ignored.

#[cfg(test)]
#[path = "holder_test.rs"]
mod holder_test;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::identity::{IdentityEvent, IdentityFeed, IdentityProvider};
use crate::session::{FetchOutcome, FetchTicket, Session, SessionEvent};
use crate::store::ProfileStore;

type FetchResult = (FetchTicket, FetchOutcome);

pub struct SessionHolder {
    state: watch::Receiver<Session>,
    task: JoinHandle<()>,
}

impl SessionHolder {
    /// Subscribe to `provider` and start resolving sessions against `store`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(provider: Arc<dyn IdentityProvider>, store: Arc<dyn ProfileStore>) -> Self {
        let feed = provider.subscribe();
        let (tx, rx) = watch::channel(Session::new());
        let task = tokio::spawn(run(feed, store, tx));
        Self { state: rx, task }
    }

    /// Current session value.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published session.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Wait until the session is no longer resolving and return it.
    pub async fn resolved(&self) -> Session {
        let mut rx = self.state.clone();
        let result = rx.wait_for(|s| !s.resolving).await.map(|s| s.clone());
        result.unwrap_or_else(|_| rx.borrow().clone())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait until its feed has been released.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for SessionHolder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// RUN LOOP
// =============================================================================

async fn run(mut feed: IdentityFeed, store: Arc<dyn ProfileStore>, state: watch::Sender<Session>) {
    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<FetchResult>();
    let mut session = Session::new();

    loop {
        let event = tokio::select! {
            notification = feed.next() => match notification {
                Some(IdentityEvent::Changed(identity)) => SessionEvent::IdentityChanged(identity),
                Some(IdentityEvent::Failed(message)) => {
                    error!(error = %message, "identity feed failed");
                    SessionEvent::SubscriptionFailed(message)
                }
                None => {
                    error!("identity feed closed");
                    SessionEvent::SubscriptionFailed("identity feed closed".into())
                }
            },
            Some((ticket, outcome)) = results_rx.recv() => {
                if !session.is_awaiting(&ticket) {
                    debug!(uid = %ticket.uid, seq = ticket.seq, "discarding stale profile fetch");
                    continue;
                }
                SessionEvent::ProfileLoaded { ticket, outcome }
            }
        };

        let fatal = matches!(event, SessionEvent::SubscriptionFailed(_));
        let previous = session.awaiting().cloned();
        session = session.apply(event);

        if let Some(ticket) = session.awaiting()
            && previous.as_ref() != Some(ticket)
        {
            spawn_fetch(Arc::clone(&store), ticket.clone(), results_tx.clone());
        }

        state.send_replace(session.clone());

        if fatal {
            break;
        }
    }
}

fn spawn_fetch(store: Arc<dyn ProfileStore>, ticket: FetchTicket, results: mpsc::UnboundedSender<FetchResult>) {
    tokio::spawn(async move {
        let outcome = match store.fetch(&ticket.uid).await {
            Ok(Some(profile)) => FetchOutcome::Found(profile.access()),
            Ok(None) => FetchOutcome::Missing,
            Err(e) => {
                warn!(uid = %ticket.uid, error = %e, "profile fetch failed");
                FetchOutcome::Failed(e.to_string())
            }
        };
        // Closed once the holder is gone; the result no longer matters.
        let _ = results.send((ticket, outcome));
    });
}
