use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};

use super::*;
use crate::identity::{Identity, MemoryIdentityProvider, Uid};
use crate::profile::test_helpers::{member, profile};
use crate::profile::{AccessProfile, ApprovalStatus, Profile, ProfileDetails, Role, UserSettings};
use crate::session::SessionError;
use crate::store::{MemoryProfileStore, StoreError};

// =============================================================================
// HELPERS
// =============================================================================

async fn wait_until(holder: &SessionHolder, mut predicate: impl FnMut(&Session) -> bool) -> Session {
    let mut rx = holder.watch();
    let session = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for session")
        .expect("holder stopped")
        .clone();
    session
}

fn signed_in_as(session: &Session, identity: &Identity) -> bool {
    session.identity.as_ref().is_some_and(|i| i.uid == identity.uid)
}

async fn seed(store: &MemoryProfileStore, identity: &Identity, role: Role, status: ApprovalStatus) {
    store
        .create(&profile(identity.uid.as_str(), role, status))
        .await
        .unwrap();
}

/// Store whose fetch for one key blocks until released.
struct GatedStore {
    inner: MemoryProfileStore,
    blocked: Uid,
    release: Mutex<Option<oneshot::Receiver<()>>>,
    completed: AtomicUsize,
}

impl GatedStore {
    fn new(blocked: Uid) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let store = Self {
            inner: MemoryProfileStore::new(),
            blocked,
            release: Mutex::new(Some(rx)),
            completed: AtomicUsize::new(0),
        };
        (store, tx)
    }
}

#[async_trait]
impl ProfileStore for GatedStore {
    async fn fetch(&self, uid: &Uid) -> Result<Option<Profile>, StoreError> {
        if uid == &self.blocked {
            let release = self.release.lock().await.take();
            if let Some(release) = release {
                let _ = release.await;
            }
        }
        let result = self.inner.fetch(uid).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn create(&self, profile: &Profile) -> Result<(), StoreError> {
        self.inner.create(profile).await
    }

    async fn update_status(&self, uid: &Uid, status: ApprovalStatus) -> Result<(), StoreError> {
        self.inner.update_status(uid, status).await
    }

    async fn update_profile(&self, uid: &Uid, details: &ProfileDetails) -> Result<(), StoreError> {
        self.inner.update_profile(uid, details).await
    }

    async fn update_settings(&self, uid: &Uid, settings: &UserSettings) -> Result<(), StoreError> {
        self.inner.update_settings(uid, settings).await
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        self.inner.list().await
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[tokio::test]
async fn starts_resolving_then_resolves_signed_out() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let holder = SessionHolder::spawn(provider, store);

    let session = holder.resolved().await;
    assert!(!session.resolving);
    assert_eq!(session.identity, None);
    assert_eq!(session.error, None);
    assert!(holder.is_running());
}

#[tokio::test]
async fn sign_in_resolves_profile() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let alice = provider.add_account("alice@example.com", "secret1", true);
    seed(&store, &alice, Role::Member, ApprovalStatus::Approved).await;

    let holder = SessionHolder::spawn(provider.clone(), store);
    holder.resolved().await;
    provider.sign_in("alice@example.com", "secret1").await.unwrap();

    let session = wait_until(&holder, |s| !s.resolving && signed_in_as(s, &alice)).await;
    assert_eq!(session.profile, Some(AccessProfile::member(ApprovalStatus::Approved)));
    assert!(session.email_verified());
}

#[tokio::test]
async fn already_signed_in_identity_is_picked_up_on_spawn() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let admin = provider.add_account("admin@example.com", "secret1", true);
    seed(&store, &admin, Role::Administrator, ApprovalStatus::Approved).await;
    provider.sign_in("admin@example.com", "secret1").await.unwrap();

    let holder = SessionHolder::spawn(provider, store);
    let session = holder.resolved().await;
    assert!(signed_in_as(&session, &admin));
    assert_eq!(session.profile, Some(AccessProfile::administrator()));
}

#[tokio::test]
async fn missing_profile_resolves_without_error() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let bob = provider.add_account("bob@example.com", "secret1", true);
    provider.sign_in("bob@example.com", "secret1").await.unwrap();

    let holder = SessionHolder::spawn(provider, store);
    let session = holder.resolved().await;
    assert!(signed_in_as(&session, &bob));
    assert_eq!(session.profile, None);
    assert_eq!(session.error, None);
}

#[tokio::test]
async fn fetch_failure_resolves_with_error() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    provider.add_account("carol@example.com", "secret1", true);
    provider.sign_in("carol@example.com", "secret1").await.unwrap();
    store.set_unavailable(true);

    let holder = SessionHolder::spawn(provider, store);
    let session = holder.resolved().await;
    assert!(session.identity.is_some());
    assert_eq!(session.profile, None);
    assert!(matches!(session.error, Some(SessionError::ProfileUnavailable(_))));
}

#[tokio::test]
async fn sign_out_clears_session() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let dave = provider.add_account("dave@example.com", "secret1", true);
    seed(&store, &dave, Role::Member, ApprovalStatus::Pending).await;
    provider.sign_in("dave@example.com", "secret1").await.unwrap();

    let holder = SessionHolder::spawn(provider.clone(), store);
    holder.resolved().await;
    provider.sign_out().await.unwrap();

    let session = wait_until(&holder, |s| s.identity.is_none() && !s.resolving).await;
    assert_eq!(session.profile, None);
}

// =============================================================================
// ORDERING
// =============================================================================

#[tokio::test]
async fn stale_fetch_does_not_overwrite_newer_identity() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let first = provider.add_account("first@example.com", "secret1", true);
    let second = provider.add_account("second@example.com", "secret1", true);

    let (store, release) = GatedStore::new(first.uid.clone());
    store
        .inner
        .create(&profile(first.uid.as_str(), Role::Administrator, ApprovalStatus::Approved))
        .await
        .unwrap();
    store
        .inner
        .create(&member(second.uid.as_str(), ApprovalStatus::Pending))
        .await
        .unwrap();
    let store = Arc::new(store);

    let holder = SessionHolder::spawn(provider.clone(), store.clone());
    holder.resolved().await;

    provider.sign_in("first@example.com", "secret1").await.unwrap();
    wait_until(&holder, |s| signed_in_as(s, &first)).await;

    provider.sign_in("second@example.com", "secret1").await.unwrap();
    let resolved = wait_until(&holder, |s| !s.resolving && signed_in_as(s, &second)).await;
    assert_eq!(resolved.profile, Some(AccessProfile::member(ApprovalStatus::Pending)));

    release.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.completed.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = holder.snapshot();
    assert!(signed_in_as(&session, &second));
    assert_eq!(session.profile, Some(AccessProfile::member(ApprovalStatus::Pending)));
}

// =============================================================================
// TEARDOWN / FAILURE
// =============================================================================

#[tokio::test]
async fn shutdown_releases_subscription() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());

    let holder = SessionHolder::spawn(provider.clone(), store);
    holder.resolved().await;
    assert_eq!(provider.subscriber_count(), 1);

    holder.shutdown().await;
    assert_eq!(provider.subscriber_count(), 0);
}

#[tokio::test]
async fn fetch_finishing_after_shutdown_is_ignored() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let erin = provider.add_account("erin@example.com", "secret1", true);
    let (store, release) = GatedStore::new(erin.uid.clone());
    let store = Arc::new(store);
    provider.sign_in("erin@example.com", "secret1").await.unwrap();

    let holder = SessionHolder::spawn(provider.clone(), store.clone());
    let rx = holder.watch();
    wait_until(&holder, |s| signed_in_as(s, &erin)).await;
    holder.shutdown().await;

    release.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.completed.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(rx.borrow().resolving);
    assert_eq!(provider.subscriber_count(), 0);
}

#[tokio::test]
async fn feed_failure_resets_and_stops() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let frank = provider.add_account("frank@example.com", "secret1", true);
    seed(&store, &frank, Role::Member, ApprovalStatus::Approved).await;
    provider.sign_in("frank@example.com", "secret1").await.unwrap();

    let holder = SessionHolder::spawn(provider.clone(), store);
    holder.resolved().await;
    provider.fail_feed("connection reset");

    let session = wait_until(&holder, |s| s.error.is_some()).await;
    assert_eq!(session.identity, None);
    assert!(!session.resolving);
    assert_eq!(session.error, Some(SessionError::IdentityFeed("connection reset".into())));

    tokio::time::timeout(Duration::from_secs(2), async {
        while holder.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(provider.subscriber_count(), 0);
}
