//! Account flows around the gate: login, registration, verification.
//!
//! SYSTEM CONTEXT
//! ==============
//! These run on user action and talk to both collaborators directly. They
//! never touch the `Session`; the holder picks up whatever identity change
//! they cause through its feed, and the gate takes it from there.
//!
//! Login comes in two portals. The administrator portal only accepts
//! addresses in the admin domain with an administrator profile; the member
//! portal turns administrator accounts away. A rejected login signs the
//! identity back out so the session never resolves to an account the visitor
//! was told they could not use.
//!
//! Self-service edits (profile details, settings) only ever write the record
//! of the identity that is signed in.

#[cfg(test)]
#[path = "flows_test.rs"]
mod flows_test;

use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::identity::{IdentityError, IdentityProvider, Uid, normalize_email};
use crate::navigation::{after_verification_path, landing_path};
use crate::profile::{ApprovalStatus, Profile, ProfileDetails, Role, UserSettings};
use crate::routes::VERIFY_EMAIL_PATH;
use crate::store::{ProfileStore, StoreError};

/// Wait between verification resends.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Invalid admin credentials")]
    InvalidAdminCredentials,
    #[error("Please use admin login for administrator access")]
    UseAdminPortal,
    #[error("User data not found")]
    ProfileNotFound,
    #[error("Profiles can only be changed by their owner")]
    NotOwnProfile,
    #[error("Resend available in {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// LOGIN
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginPortal {
    Member,
    Administrator,
}

/// Sign in through `portal` and return the landing path.
///
/// `admin_domain` restricts the administrator portal to one email domain;
/// `None` leaves only the role check.
///
/// # Errors
///
/// Returns `InvalidAdminCredentials`, `UseAdminPortal` or `ProfileNotFound`
/// when the account does not fit the portal, or the collaborator error.
pub async fn login(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    portal: LoginPortal,
    email: &str,
    password: &str,
    admin_domain: Option<&str>,
) -> Result<&'static str, FlowError> {
    if portal == LoginPortal::Administrator && !in_domain(email, admin_domain) {
        return Err(FlowError::InvalidAdminCredentials);
    }

    let identity = provider.sign_in(email, password).await?;

    let profile = match store.fetch(&identity.uid).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Err(reject(provider, FlowError::ProfileNotFound).await),
        Err(e) => return Err(reject(provider, e.into()).await),
    };

    match (portal, profile.role) {
        (LoginPortal::Administrator, Role::Member) => {
            return Err(reject(provider, FlowError::InvalidAdminCredentials).await);
        }
        (LoginPortal::Member, Role::Administrator) => {
            return Err(reject(provider, FlowError::UseAdminPortal).await);
        }
        _ => {}
    }

    info!(uid = %identity.uid, role = profile.role.as_str(), "login succeeded");
    Ok(landing_path(&identity, profile.access()))
}

async fn reject(provider: &dyn IdentityProvider, error: FlowError) -> FlowError {
    if let Err(e) = provider.sign_out().await {
        warn!(error = %e, "sign-out after rejected login failed");
    }
    error
}

fn in_domain(email: &str, domain: Option<&str>) -> bool {
    let Some(domain) = domain else {
        return true;
    };
    let email = normalize_email(email);
    let domain = domain.trim().trim_start_matches('@').to_ascii_lowercase();
    email
        .rsplit_once('@')
        .is_some_and(|(local, host)| !local.is_empty() && host == domain)
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Registration form as submitted. Numeric and list fields arrive as text.
#[derive(Clone, Debug, Default)]
pub struct RegistrationForm {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub primary_jurisdiction: String,
    pub registration_number: String,
    pub office_address: String,
    pub team_size: String,
    pub website: String,
    pub linked_in: String,
    pub years_of_experience: String,
    /// Comma-separated.
    pub specialty_areas: String,
}

impl RegistrationForm {
    /// Presence check on the required fields, in form order.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` naming the first blank required field. A
    /// specialty list with no non-blank entry counts as blank.
    pub fn validate(&self) -> Result<(), FlowError> {
        require_present(&[
            ("username", &self.username),
            ("full name", &self.full_name),
            ("email", &self.email),
            ("password", &self.password),
            ("primary jurisdiction", &self.primary_jurisdiction),
            ("office address", &self.office_address),
            ("team size", &self.team_size),
            ("years of experience", &self.years_of_experience),
            ("specialty areas", &self.specialty_areas),
        ])?;
        require_specialties(&self.specialty_areas)
    }

    fn into_profile(self, uid: Uid, now: OffsetDateTime) -> Profile {
        Profile {
            id: uid,
            username: self.username.trim().to_owned(),
            full_name: self.full_name.trim().to_owned(),
            email: self.email.trim().to_owned(),
            phone: optional(&self.phone),
            primary_jurisdiction: self.primary_jurisdiction.trim().to_owned(),
            registration_number: optional(&self.registration_number),
            office_address: self.office_address.trim().to_owned(),
            team_size: parse_count(&self.team_size),
            website: optional(&self.website),
            linked_in: optional(&self.linked_in),
            years_of_experience: parse_count(&self.years_of_experience),
            specialty_areas: split_specialties(&self.specialty_areas),
            status: ApprovalStatus::Pending,
            role: Role::Member,
            settings: UserSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Create the account, send the verification message, store a pending
/// member profile. Returns the stored profile.
///
/// # Errors
///
/// Returns `MissingField` before any collaborator call, otherwise the first
/// collaborator error.
pub async fn register(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    form: RegistrationForm,
) -> Result<Profile, FlowError> {
    form.validate()?;

    let identity = provider.sign_up(form.email.trim(), &form.password).await?;
    provider.send_verification().await?;

    let profile = form.into_profile(identity.uid.clone(), OffsetDateTime::now_utc());
    store.create(&profile).await?;

    info!(uid = %identity.uid, "registration stored, awaiting review");
    Ok(profile)
}

fn require_present(fields: &[(&'static str, &String)]) -> Result<(), FlowError> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(FlowError::MissingField(*name)),
        None => Ok(()),
    }
}

fn require_specialties(raw: &str) -> Result<(), FlowError> {
    if split_specialties(raw).is_empty() {
        return Err(FlowError::MissingField("specialty areas"));
    }
    Ok(())
}

fn optional(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_count(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

fn split_specialties(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|area| !area.is_empty())
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// SELF-SERVICE
// =============================================================================

/// Profile edit form. Starts from the stored record; numeric and list fields
/// are text, as on the registration form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub phone: String,
    pub primary_jurisdiction: String,
    pub registration_number: String,
    pub office_address: String,
    pub team_size: String,
    pub website: String,
    pub linked_in: String,
    pub years_of_experience: String,
    /// Comma-separated.
    pub specialty_areas: String,
}

impl ProfileUpdate {
    /// Prefill from the stored record.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone().unwrap_or_default(),
            primary_jurisdiction: profile.primary_jurisdiction.clone(),
            registration_number: profile.registration_number.clone().unwrap_or_default(),
            office_address: profile.office_address.clone(),
            team_size: profile.team_size.to_string(),
            website: profile.website.clone().unwrap_or_default(),
            linked_in: profile.linked_in.clone().unwrap_or_default(),
            years_of_experience: profile.years_of_experience.to_string(),
            specialty_areas: profile.specialty_areas.join(", "),
        }
    }

    /// Same presence rules as registration for the fields that can change.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` naming the first blank required field.
    pub fn validate(&self) -> Result<(), FlowError> {
        require_present(&[
            ("full name", &self.full_name),
            ("primary jurisdiction", &self.primary_jurisdiction),
            ("office address", &self.office_address),
            ("team size", &self.team_size),
            ("years of experience", &self.years_of_experience),
            ("specialty areas", &self.specialty_areas),
        ])?;
        require_specialties(&self.specialty_areas)
    }

    #[must_use]
    pub fn into_details(self) -> ProfileDetails {
        ProfileDetails {
            full_name: self.full_name.trim().to_owned(),
            phone: optional(&self.phone),
            primary_jurisdiction: self.primary_jurisdiction.trim().to_owned(),
            registration_number: optional(&self.registration_number),
            office_address: self.office_address.trim().to_owned(),
            team_size: parse_count(&self.team_size),
            website: optional(&self.website),
            linked_in: optional(&self.linked_in),
            years_of_experience: parse_count(&self.years_of_experience),
            specialty_areas: split_specialties(&self.specialty_areas),
        }
    }
}

/// Save the signed-in member's profile edits. Returns what was written.
///
/// # Errors
///
/// Returns `NotSignedIn`, `NotOwnProfile` when `uid` is someone else's
/// record, `MissingField`, or the store error.
pub async fn update_profile(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    uid: &Uid,
    form: ProfileUpdate,
) -> Result<ProfileDetails, FlowError> {
    require_owner(provider, uid)?;
    form.validate()?;
    let details = form.into_details();
    store.update_profile(uid, &details).await?;
    info!(%uid, "profile updated");
    Ok(details)
}

/// Save the signed-in member's settings.
///
/// # Errors
///
/// Returns `NotSignedIn`, `NotOwnProfile`, or the store error.
pub async fn update_settings(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
    uid: &Uid,
    settings: &UserSettings,
) -> Result<(), FlowError> {
    require_owner(provider, uid)?;
    store.update_settings(uid, settings).await?;
    info!(%uid, "settings updated");
    Ok(())
}

fn require_owner(provider: &dyn IdentityProvider, uid: &Uid) -> Result<(), FlowError> {
    let identity = provider.current().ok_or(IdentityError::NotSignedIn)?;
    if &identity.uid != uid {
        warn!(signed_in = %identity.uid, target = %uid, "refused edit of another member's record");
        return Err(FlowError::NotOwnProfile);
    }
    Ok(())
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Tracks when a verification message was last sent.
#[derive(Clone, Debug)]
pub struct ResendCooldown {
    period: Duration,
    last_sent: Option<Instant>,
}

impl ResendCooldown {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period, last_sent: None }
    }

    /// Time left before another send is allowed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_sent?);
        self.period.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// # Errors
    ///
    /// Returns `CooldownActive` with the whole seconds left, rounded up.
    pub fn check(&self, now: Instant) -> Result<(), FlowError> {
        match self.remaining(now) {
            Some(left) => Err(FlowError::CooldownActive {
                remaining_secs: left.as_secs() + u64::from(left.subsec_nanos() > 0),
            }),
            None => Ok(()),
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }
}

impl Default for ResendCooldown {
    fn default() -> Self {
        Self::new(RESEND_COOLDOWN)
    }
}

/// Send another verification message unless the cooldown is running. The
/// cooldown only starts after a successful send.
///
/// # Errors
///
/// Returns `CooldownActive` or the provider error.
pub async fn resend_verification(
    provider: &dyn IdentityProvider,
    cooldown: &mut ResendCooldown,
    now: Instant,
) -> Result<(), FlowError> {
    cooldown.check(now)?;
    provider.send_verification().await?;
    cooldown.start(now);
    Ok(())
}

/// Re-read the signed-in identity and pick the next page. Stays on the
/// verify page until the address is confirmed.
///
/// # Errors
///
/// Returns `NotSignedIn` when nobody is signed in, or the collaborator error.
pub async fn confirm_verification(
    provider: &dyn IdentityProvider,
    store: &dyn ProfileStore,
) -> Result<&'static str, FlowError> {
    let identity = provider
        .refresh()
        .await?
        .ok_or(IdentityError::NotSignedIn)?;
    if !identity.email_verified {
        return Ok(VERIFY_EMAIL_PATH);
    }
    let profile = store.fetch(&identity.uid).await?;
    Ok(after_verification_path(profile.map(|p| p.access())))
}

/// # Errors
///
/// Returns the provider error.
pub async fn sign_out(provider: &dyn IdentityProvider) -> Result<(), FlowError> {
    provider.sign_out().await?;
    Ok(())
}
