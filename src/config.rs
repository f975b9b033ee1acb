//! Portal configuration parsed from environment variables.
//!
//! `from_env` reads the process environment; `from_lookup` takes any key
//! lookup so parsing can be tested without touching global state.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::admin::{AdminSeed, RetryPolicy};

pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_STORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SEED_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SEED_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_RESEND_COOLDOWN_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Timeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub api_key: String,
    pub project_id: String,
    pub identity_base_url: String,
    pub store_base_url: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Domain the administrator portal accepts.
    pub admin_domain: Option<String>,
    pub timeouts: Timeouts,
    pub seed_max_retries: u32,
    pub seed_backoff_ms: u64,
    pub resend_cooldown_secs: u64,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("project_id", &self.project_id)
            .field("identity_base_url", &self.identity_base_url)
            .field("store_base_url", &self.store_base_url)
            .field("admin_email", &self.admin_email)
            .field("admin_domain", &self.admin_domain)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl PortalConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `PORTAL_API_KEY`
    /// - `PORTAL_PROJECT_ID`
    ///
    /// Optional:
    /// - `PORTAL_IDENTITY_BASE_URL`, `PORTAL_STORE_BASE_URL`
    /// - `PORTAL_ADMIN_EMAIL` + `PORTAL_ADMIN_PASSWORD`: seed account
    /// - `PORTAL_ADMIN_DOMAIN`: defaults to the seed account's domain
    /// - `PORTAL_REQUEST_TIMEOUT_SECS` (30), `PORTAL_CONNECT_TIMEOUT_SECS` (10)
    /// - `PORTAL_SEED_MAX_RETRIES` (3), `PORTAL_SEED_BACKOFF_MS` (1000)
    /// - `PORTAL_RESEND_COOLDOWN_SECS` (60)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when a required variable is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when a required variable is unset or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::Missing { var: key.into() });
        let parse_or = |key: &str, default: u64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        let api_key = require("PORTAL_API_KEY")?;
        let project_id = require("PORTAL_PROJECT_ID")?;
        let identity_base_url = base_url(get("PORTAL_IDENTITY_BASE_URL"), DEFAULT_IDENTITY_BASE_URL);
        let store_base_url = base_url(get("PORTAL_STORE_BASE_URL"), DEFAULT_STORE_BASE_URL);

        let admin_email = get("PORTAL_ADMIN_EMAIL");
        let admin_password = get("PORTAL_ADMIN_PASSWORD");
        let admin_domain = get("PORTAL_ADMIN_DOMAIN")
            .or_else(|| admin_email.as_deref().and_then(email_domain))
            .map(|d| d.trim_start_matches('@').to_ascii_lowercase());

        let timeouts = Timeouts {
            request_secs: parse_or("PORTAL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or("PORTAL_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let seed_max_retries = get("PORTAL_SEED_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SEED_MAX_RETRIES);

        Ok(Self {
            api_key,
            project_id,
            identity_base_url,
            store_base_url,
            admin_email,
            admin_password,
            admin_domain,
            timeouts,
            seed_max_retries,
            seed_backoff_ms: parse_or("PORTAL_SEED_BACKOFF_MS", DEFAULT_SEED_BACKOFF_MS),
            resend_cooldown_secs: parse_or("PORTAL_RESEND_COOLDOWN_SECS", DEFAULT_RESEND_COOLDOWN_SECS),
        })
    }

    /// Seed credentials, when both halves are configured.
    #[must_use]
    pub fn admin_seed(&self) -> Option<AdminSeed> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some(AdminSeed { email: email.clone(), password: password.clone() }),
            _ => None,
        }
    }

    #[must_use]
    pub fn seed_retry(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.seed_max_retries, backoff: Duration::from_millis(self.seed_backoff_ms) }
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_secs(self.resend_cooldown_secs)
    }
}

fn base_url(raw: Option<String>, default: &str) -> String {
    raw.as_deref().unwrap_or(default).trim_end_matches('/').to_owned()
}

fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_owned())
        .filter(|d| !d.is_empty())
}
