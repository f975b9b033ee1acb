//! In-process identity provider.
//!
//! Keeps accounts in memory with SHA-256 password digests. Used for local
//! development and as the provider behind the integration suite; the
//! `mark_verified` and `fail_feed` hooks stand in for actions that happen
//! outside the portal (clicking a verification link, a dropped connection).

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthStateBroadcaster, Identity, IdentityError, IdentityFeed, IdentityProvider, Uid, normalize_email};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: Uid,
    email: String,
    password_digest: String,
    email_verified: bool,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity { uid: self.uid.clone(), email: self.email.clone(), email_verified: self.email_verified }
    }
}

#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

/// Identity provider backed by a local account map.
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    broadcaster: AuthStateBroadcaster,
    next_uid: AtomicU64,
    verifications_sent: AtomicUsize,
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            broadcaster: AuthStateBroadcaster::new(),
            next_uid: AtomicU64::new(1),
            verifications_sent: AtomicUsize::new(0),
        }
    }

    /// Create an account without signing in. Returns its identity.
    pub fn add_account(&self, email: &str, password: &str, email_verified: bool) -> Identity {
        let account = self.new_account(email, password, email_verified);
        let identity = account.identity();
        self.lock_accounts().insert(account.email.clone(), account);
        identity
    }

    /// Confirm an account's address. Signed-in sessions see it after `refresh`.
    pub fn mark_verified(&self, uid: &Uid) -> bool {
        let mut accounts = self.lock_accounts();
        match accounts.values_mut().find(|a| &a.uid == uid) {
            Some(account) => {
                account.email_verified = true;
                true
            }
            None => false,
        }
    }

    /// Push a feed failure to every subscriber.
    pub fn fail_feed(&self, message: &str) {
        self.broadcaster.fail(message);
    }

    #[must_use]
    pub fn verifications_sent(&self) -> usize {
        self.verifications_sent.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    fn new_account(&self, email: &str, password: &str, email_verified: bool) -> Account {
        Account {
            uid: self.allocate_uid(),
            email: normalize_email(email),
            password_digest: hash_password(password),
            email_verified,
        }
    }

    fn allocate_uid(&self) -> Uid {
        let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
        Uid::new(format!("uid-{n}"))
    }

    fn lock_accounts(&self) -> std::sync::MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn account_for(&self, uid: &Uid) -> Option<Account> {
        self.lock_accounts().values().find(|a| &a.uid == uid).cloned()
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = {
            let accounts = self.lock_accounts();
            let account = accounts
                .get(&normalize_email(email))
                .ok_or(IdentityError::InvalidCredentials)?;
            if account.password_digest != hash_password(password) {
                return Err(IdentityError::InvalidCredentials);
            }
            account.identity()
        };
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }
        // Existence check and insert share one guard.
        let identity = match self.lock_accounts().entry(normalize_email(email)) {
            Entry::Occupied(_) => return Err(IdentityError::EmailExists),
            Entry::Vacant(slot) => slot.insert(self.new_account(email, password, false)).identity(),
        };
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.broadcaster.publish(None);
        Ok(())
    }

    async fn send_verification(&self) -> Result<(), IdentityError> {
        if self.broadcaster.current().is_none() {
            return Err(IdentityError::NotSignedIn);
        }
        self.verifications_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(current) = self.broadcaster.current() else {
            return Ok(None);
        };
        let Some(account) = self.account_for(&current.uid) else {
            self.broadcaster.publish(None);
            return Ok(None);
        };
        let fresh = account.identity();
        if fresh != current {
            self.broadcaster.publish(Some(fresh.clone()));
        }
        Ok(Some(fresh))
    }

    async fn is_registered(&self, email: &str) -> Result<bool, IdentityError> {
        Ok(self.lock_accounts().contains_key(&normalize_email(email)))
    }

    fn current(&self) -> Option<Identity> {
        self.broadcaster.current()
    }

    fn subscribe(&self) -> IdentityFeed {
        self.broadcaster.subscribe()
    }
}
