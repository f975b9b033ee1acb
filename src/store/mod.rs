//! Profile store collaborator.
//!
//! ARCHITECTURE
//! ============
//! Profiles live in a keyed document collection owned by the external
//! platform. The portal reads one record per identity change, writes a record
//! at registration, and patches the status field during admin review.
//! Members patch their own details and settings; every patch touches only
//! its own fields plus `updatedAt`.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;

use crate::identity::Uid;
use crate::profile::{ApprovalStatus, Profile, ProfileDetails, UserSettings};

pub use firestore::FirestoreProfileStore;
pub use memory::MemoryProfileStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    NotFound(Uid),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
    #[error("profile store error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("profile decode failed: {0}")]
    Decode(String),
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
}

impl StoreError {
    /// Transport or availability failure; the same call may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Keyed profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile keyed by `uid`. `Ok(None)` when no record exists.
    async fn fetch(&self, uid: &Uid) -> Result<Option<Profile>, StoreError>;

    /// Write the full record, replacing any existing one.
    async fn create(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Set the approval status and bump `updated_at`.
    async fn update_status(&self, uid: &Uid, status: ApprovalStatus) -> Result<(), StoreError>;

    /// Overwrite the member-editable fields and bump `updated_at`.
    async fn update_profile(&self, uid: &Uid, details: &ProfileDetails) -> Result<(), StoreError>;

    /// Replace the stored settings and bump `updated_at`.
    async fn update_settings(&self, uid: &Uid, settings: &UserSettings) -> Result<(), StoreError>;

    /// Every stored profile, in no particular order.
    async fn list(&self) -> Result<Vec<Profile>, StoreError>;
}
