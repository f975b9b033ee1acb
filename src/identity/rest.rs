//! Identity-toolkit REST client.
//!
//! Thin HTTP wrapper over the `accounts:*` endpoints. Holds the signed-in
//! credential in memory and publishes changes through an
//! `AuthStateBroadcaster`. Response parsing and error mapping are pure
//! functions so they can be tested without a network.

#[cfg(test)]
#[path = "rest_test.rs"]
mod rest_test;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{AuthStateBroadcaster, Identity, IdentityError, IdentityFeed, IdentityProvider, Uid, normalize_email};

const CONTINUE_URI: &str = "http://localhost";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
struct Credential {
    identity: Identity,
    id_token: String,
}

pub struct RestIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    credential: Mutex<Option<Credential>>,
    broadcaster: AuthStateBroadcaster,
}

impl RestIdentityProvider {
    /// Build a client for `base_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| IdentityError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            credential: Mutex::new(None),
            broadcaster: AuthStateBroadcaster::new(),
        })
    }

    /// Bearer token of the signed-in identity, for calls to other services.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.lock_credential().as_ref().map(|c| c.id_token.clone())
    }

    fn lock_credential(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.credential.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_credential(&self, credential: Option<Credential>) {
        let identity = credential.as_ref().map(|c| c.identity.clone());
        *self.lock_credential() = credential;
        self.broadcaster.publish(identity);
    }

    fn require_token(&self) -> Result<String, IdentityError> {
        self.id_token().ok_or(IdentityError::NotSignedIn)
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, IdentityError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(endpoint_url(&self.base_url, method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(map_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| IdentityError::Decode(e.to_string()))
    }

    /// Exchange a fresh token for the account's current verification flag.
    async fn lookup(&self, id_token: &str) -> Result<Identity, IdentityError> {
        let response: LookupResponse = self.call("accounts:lookup", &LookupRequest { id_token }).await?;
        identity_from_lookup(response)
    }

    async fn password_auth(&self, method: &str, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let request = PasswordRequest { email: &normalize_email(email), password, return_secure_token: true };
        let auth: AuthResponse = self.call(method, &request).await?;
        let identity = self.lookup(&auth.id_token).await?;
        self.store_credential(Some(Credential { identity: identity.clone(), id_token: auth.id_token }));
        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.password_auth("accounts:signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.password_auth("accounts:signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.store_credential(None);
        Ok(())
    }

    async fn send_verification(&self) -> Result<(), IdentityError> {
        let id_token = self.require_token()?;
        let request = OobRequest { request_type: "VERIFY_EMAIL", id_token: &id_token };
        let _: serde_json::Value = self.call("accounts:sendOobCode", &request).await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(id_token) = self.id_token() else {
            return Ok(None);
        };
        let fresh = self.lookup(&id_token).await?;
        if self.broadcaster.current().as_ref() != Some(&fresh) {
            self.store_credential(Some(Credential { identity: fresh.clone(), id_token }));
        }
        Ok(Some(fresh))
    }

    async fn is_registered(&self, email: &str) -> Result<bool, IdentityError> {
        let request = CreateAuthUriRequest { identifier: &normalize_email(email), continue_uri: CONTINUE_URI };
        let response: CreateAuthUriResponse = self.call("accounts:createAuthUri", &request).await?;
        Ok(response.registered)
    }

    fn current(&self) -> Option<Identity> {
        self.broadcaster.current()
    }

    fn subscribe(&self) -> IdentityFeed {
        self.broadcaster.subscribe()
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'a str,
    id_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuthUriRequest<'a> {
    identifier: &'a str,
    continue_uri: &'a str,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    id_token: String,
}

#[derive(Debug, serde::Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Debug, serde::Deserialize)]
struct CreateAuthUriResponse {
    #[serde(default)]
    registered: bool,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn endpoint_url(base_url: &str, method: &str) -> String {
    format!("{base_url}/{method}")
}

fn identity_from_lookup(response: LookupResponse) -> Result<Identity, IdentityError> {
    let user = response
        .users
        .into_iter()
        .next()
        .ok_or_else(|| IdentityError::Decode("lookup returned no users".into()))?;
    Ok(Identity { uid: Uid::new(user.local_id), email: user.email, email_verified: user.email_verified })
}

/// Map a non-2xx response onto the error taxonomy.
///
/// Provider messages look like `CODE` or `CODE : detail`; only the code is
/// matched.
fn map_error(status: u16, body: &str) -> IdentityError {
    if status >= 500 {
        return IdentityError::Unavailable(format!("{status}: {body}"));
    }
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_owned());
    let code = message.split([' ', ':']).next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" | "USER_DISABLED" => {
            IdentityError::InvalidCredentials
        }
        "EMAIL_EXISTS" => IdentityError::EmailExists,
        "WEAK_PASSWORD" => IdentityError::WeakPassword,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::RateLimited,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" => IdentityError::NotSignedIn,
        _ => IdentityError::Api { status, message },
    }
}
