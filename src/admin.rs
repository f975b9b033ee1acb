//! Administrative operations: registration review, the user directory, and
//! seeding the administrator account.
//!
//! DESIGN
//! ======
//! Review is a single status patch on the profile store. The directory view
//! is computed client-side from a full listing: `DirectoryQuery` filters and
//! sorts a slice of profiles and `DirectoryStats` counts them, so both work
//! the same against any `ProfileStore`.
//!
//! Seeding makes sure the configured administrator identity exists with an
//! approved administrator profile, then signs back out. Transient failures
//! are retried with a linear back-off (`backoff * attempt`).

#[cfg(test)]
#[path = "admin_test.rs"]
mod admin_test;

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::identity::{Identity, IdentityError, IdentityProvider, Uid};
use crate::profile::{ApprovalStatus, Profile, Role, UserSettings};
use crate::store::{ProfileStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to {decision} user: {source}")]
    Review {
        decision: ReviewDecision,
        #[source]
        source: StoreError,
    },
}

impl AdminError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Identity(e) => e.is_transient(),
            Self::Store(e) | Self::Review { source: e, .. } => e.is_transient(),
        }
    }
}

// =============================================================================
// REVIEW
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    #[must_use]
    pub fn status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

/// Approve or reject the registration keyed by `uid`.
///
/// # Errors
///
/// Returns `AdminError::Review` wrapping the store failure.
pub async fn review(store: &dyn ProfileStore, uid: &Uid, decision: ReviewDecision) -> Result<(), AdminError> {
    let status = decision.status();
    store
        .update_status(uid, status)
        .await
        .map_err(|source| AdminError::Review { decision, source })?;
    info!(%uid, status = status.as_str(), "user status updated");
    Ok(())
}

// =============================================================================
// DIRECTORY
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(ApprovalStatus),
}

impl StatusFilter {
    #[must_use]
    pub fn matches(self, status: ApprovalStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }

    /// `"all"` or a status name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        ApprovalStatus::parse(raw).map(Self::Only)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    FullName,
    Email,
    PrimaryJurisdiction,
    Status,
    CreatedAt,
}

impl SortField {
    fn compare(self, a: &Profile, b: &Profile) -> Ordering {
        match self {
            Self::FullName => a.full_name.cmp(&b.full_name),
            Self::Email => a.email.cmp(&b.email),
            Self::PrimaryJurisdiction => a.primary_jurisdiction.cmp(&b.primary_jurisdiction),
            Self::Status => a.status.as_str().cmp(b.status.as_str()),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Search, filter and sort settings of the user directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryQuery {
    /// Case-insensitive substring over full name, email and jurisdiction.
    pub search: String,
    pub status: StatusFilter,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for DirectoryQuery {
    fn default() -> Self {
        Self { search: String::new(), status: StatusFilter::All, sort: SortField::CreatedAt, order: SortOrder::Desc }
    }
}

impl DirectoryQuery {
    /// Matching profiles in display order.
    #[must_use]
    pub fn apply(&self, profiles: &[Profile]) -> Vec<Profile> {
        let needle = self.search.trim().to_lowercase();
        let mut rows: Vec<Profile> = profiles
            .iter()
            .filter(|p| self.status.matches(p.status))
            .filter(|p| needle.is_empty() || matches_search(p, &needle))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ord = self.sort.compare(a, b);
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        rows
    }

    /// Clicking the current column flips the order; another column sorts
    /// ascending by it.
    pub fn toggle_sort(&mut self, field: SortField) {
        if self.sort == field {
            self.order = self.order.toggled();
        } else {
            self.sort = field;
            self.order = SortOrder::Asc;
        }
    }
}

fn matches_search(profile: &Profile, needle: &str) -> bool {
    [&profile.full_name, &profile.email, &profile.primary_jurisdiction]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl DirectoryStats {
    #[must_use]
    pub fn from_profiles(profiles: &[Profile]) -> Self {
        profiles.iter().fold(Self { total: profiles.len(), ..Self::default() }, |mut stats, p| {
            match p.status {
                ApprovalStatus::Pending => stats.pending += 1,
                ApprovalStatus::Approved => stats.approved += 1,
                ApprovalStatus::Rejected => stats.rejected += 1,
            }
            stats
        })
    }
}

// =============================================================================
// SEEDING
// =============================================================================

/// Credentials of the administrator account to provision.
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; the n-th retry waits `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff: Duration::from_secs(1) }
    }
}

/// Ensure the administrator identity and profile exist, then sign out.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn seed_admin(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    seed: &AdminSeed,
    retry: RetryPolicy,
) -> Result<Identity, AdminError> {
    let mut attempt: u32 = 0;
    loop {
        match seed_once(provider, store, seed).await {
            Ok(identity) => {
                info!(uid = %identity.uid, email = %seed.email, "admin account verified");
                return Ok(identity);
            }
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                attempt += 1;
                warn!(error = %e, attempt, total = retry.max_retries, "admin seeding failed; retrying");
                tokio::time::sleep(retry.backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn seed_once(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    seed: &AdminSeed,
) -> Result<Identity, AdminError> {
    let identity = if provider.is_registered(&seed.email).await? {
        provider.sign_in(&seed.email, &seed.password).await?
    } else {
        provider.sign_up(&seed.email, &seed.password).await?
    };

    let ensured = ensure_admin_profile(store, &identity).await;
    let signed_out = provider.sign_out().await;
    ensured?;
    signed_out?;
    Ok(identity)
}

async fn ensure_admin_profile(store: &dyn ProfileStore, identity: &Identity) -> Result<(), AdminError> {
    if store.fetch(&identity.uid).await?.is_some() {
        return Ok(());
    }
    store.create(&admin_profile(identity, OffsetDateTime::now_utc())).await?;
    info!(uid = %identity.uid, "admin profile created");
    Ok(())
}

fn admin_profile(identity: &Identity, now: OffsetDateTime) -> Profile {
    Profile {
        id: identity.uid.clone(),
        username: "admin".into(),
        full_name: "Portal Administrator".into(),
        email: identity.email.clone(),
        phone: None,
        primary_jurisdiction: "Global".into(),
        registration_number: None,
        office_address: "Headquarters".into(),
        team_size: 1,
        website: None,
        linked_in: None,
        years_of_experience: 10,
        specialty_areas: vec!["Administration".into()],
        status: ApprovalStatus::Approved,
        role: Role::Administrator,
        settings: UserSettings::default(),
        created_at: now,
        updated_at: now,
    }
}
