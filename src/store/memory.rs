//! In-process profile store.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{ProfileStore, StoreError};
use crate::identity::Uid;
use crate::profile::{ApprovalStatus, Profile, ProfileDetails, UserSettings};

/// Profile store backed by a `HashMap`. `set_unavailable` makes every call
/// fail with a transient error.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<Uid, Profile>>,
    unavailable: AtomicBool,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Apply `change` to an existing record and bump `updated_at`.
    async fn patch(&self, uid: &Uid, change: impl FnOnce(&mut Profile) + Send) -> Result<(), StoreError> {
        self.check_available()?;
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(uid.clone()))?;
        change(profile);
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("profile store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch(&self, uid: &Uid) -> Result<Option<Profile>, StoreError> {
        self.check_available()?;
        Ok(self.profiles.read().await.get(uid).cloned())
    }

    async fn create(&self, profile: &Profile) -> Result<(), StoreError> {
        self.check_available()?;
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_status(&self, uid: &Uid, status: ApprovalStatus) -> Result<(), StoreError> {
        self.patch(uid, |profile| profile.status = status).await
    }

    async fn update_profile(&self, uid: &Uid, details: &ProfileDetails) -> Result<(), StoreError> {
        self.patch(uid, |profile| details.clone().apply_to(profile)).await
    }

    async fn update_settings(&self, uid: &Uid, settings: &UserSettings) -> Result<(), StoreError> {
        self.patch(uid, |profile| profile.settings = settings.clone()).await
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        self.check_available()?;
        Ok(self.profiles.read().await.values().cloned().collect())
    }
}
