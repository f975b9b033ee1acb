//! Member profile records.
//!
//! DESIGN
//! ======
//! `Profile` mirrors one document in the `users` collection. Field names are
//! camelCase on the wire so records written by other portal clients decode
//! unchanged. The gate never sees the full record, only its `AccessProfile`
//! projection (role + approval status).

#[cfg(test)]
#[path = "profile_test.rs"]
mod profile_test;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::identity::Uid;

// =============================================================================
// ROLE / STATUS
// =============================================================================

/// Account role. Stored as `"user"` / `"admin"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    Member,
    #[serde(rename = "admin")]
    Administrator,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "user",
            Self::Administrator => "admin",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::Member),
            "admin" => Some(Self::Administrator),
            _ => None,
        }
    }
}

/// Review state of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

// =============================================================================
// ACCESS PROFILE
// =============================================================================

/// The part of a profile that access decisions depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessProfile {
    pub role: Role,
    pub status: ApprovalStatus,
}

impl AccessProfile {
    #[must_use]
    pub fn member(status: ApprovalStatus) -> Self {
        Self { role: Role::Member, status }
    }

    #[must_use]
    pub fn administrator() -> Self {
        Self { role: Role::Administrator, status: ApprovalStatus::Approved }
    }

    #[must_use]
    pub fn is_administrator(self) -> bool {
        self.role == Role::Administrator
    }

    #[must_use]
    pub fn is_approved(self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

// =============================================================================
// PROFILE
// =============================================================================

/// Full member record as kept in the profile store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Same key as the owning identity.
    pub id: Uid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub primary_jurisdiction: String,
    pub registration_number: Option<String>,
    pub office_address: String,
    pub team_size: u32,
    pub website: Option<String>,
    #[serde(rename = "linkedIn")]
    pub linked_in: Option<String>,
    pub years_of_experience: u32,
    pub specialty_areas: Vec<String>,
    pub status: ApprovalStatus,
    pub role: Role,
    /// Records written before settings existed decode with the defaults.
    #[serde(default)]
    pub settings: UserSettings,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Profile {
    #[must_use]
    pub fn access(&self) -> AccessProfile {
        AccessProfile { role: self.role, status: self.status }
    }

    /// The member-editable part of the record.
    #[must_use]
    pub fn details(&self) -> ProfileDetails {
        ProfileDetails {
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            primary_jurisdiction: self.primary_jurisdiction.clone(),
            registration_number: self.registration_number.clone(),
            office_address: self.office_address.clone(),
            team_size: self.team_size,
            website: self.website.clone(),
            linked_in: self.linked_in.clone(),
            years_of_experience: self.years_of_experience,
            specialty_areas: self.specialty_areas.clone(),
        }
    }
}

// =============================================================================
// SELF-SERVICE FIELDS
// =============================================================================

/// Fields a member may change on their own record. Identity keys, review
/// state and timestamps are not among them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileDetails {
    pub full_name: String,
    pub phone: Option<String>,
    pub primary_jurisdiction: String,
    pub registration_number: Option<String>,
    pub office_address: String,
    pub team_size: u32,
    pub website: Option<String>,
    pub linked_in: Option<String>,
    pub years_of_experience: u32,
    pub specialty_areas: Vec<String>,
}

impl ProfileDetails {
    /// Document field names written by a details update, in record order.
    pub const FIELD_PATHS: [&'static str; 10] = [
        "fullName",
        "phone",
        "primaryJurisdiction",
        "registrationNumber",
        "officeAddress",
        "teamSize",
        "website",
        "linkedIn",
        "yearsOfExperience",
        "specialtyAreas",
    ];

    /// Overwrite the matching fields of `profile`.
    pub fn apply_to(self, profile: &mut Profile) {
        profile.full_name = self.full_name;
        profile.phone = self.phone;
        profile.primary_jurisdiction = self.primary_jurisdiction;
        profile.registration_number = self.registration_number;
        profile.office_address = self.office_address;
        profile.team_size = self.team_size;
        profile.website = self.website;
        profile.linked_in = self.linked_in;
        profile.years_of_experience = self.years_of_experience;
        profile.specialty_areas = self.specialty_areas;
    }
}

/// Who can see a member's profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileVisibility {
    Public,
    #[default]
    Network,
    Private,
}

impl ProfileVisibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Network => "network",
            Self::Private => "private",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "public" => Some(Self::Public),
            "network" => Some(Self::Network),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
    System,
}

impl ThemeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub email: bool,
    pub push: bool,
    pub desktop: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { email: true, push: true, desktop: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub profile_visibility: ProfileVisibility,
    pub show_email: bool,
    pub show_phone: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self { profile_visibility: ProfileVisibility::Network, show_email: true, show_phone: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    pub mode: ThemeMode,
    pub color: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self { mode: ThemeMode::Light, color: "default".into() }
    }
}

/// Per-member preferences, stored under `settings` on the profile record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub notifications: NotificationSettings,
    pub privacy: PrivacySettings,
    pub theme: ThemeSettings,
}

// =============================================================================
// TEST HELPERS
// =============================================================================
