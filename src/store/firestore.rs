//! Document-store REST client for the `users` collection.
//!
//! DESIGN
//! ======
//! Documents are exchanged in the store's typed-value JSON form
//! (`{"stringValue": ...}`, `{"integerValue": "12"}`, ...). Encoding and
//! decoding are pure functions over `serde_json::Value`; the client only
//! moves bytes. A bearer token from the signed-in identity is attached when a
//! token source is configured, so store-side security rules see the caller.
//!
//! `create` is a full-document PATCH without an update mask (replace
//! semantics). The other writes are masked PATCHes that require the document
//! to exist: `update_status` masks to `status`, `update_profile` to the
//! member-editable fields, `update_settings` to `settings`. Each also writes
//! `updatedAt`.

#[cfg(test)]
#[path = "firestore_test.rs"]
mod firestore_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{ProfileStore, StoreError};
use crate::identity::{RestIdentityProvider, Uid};
use crate::profile::{
    ApprovalStatus, NotificationSettings, PrivacySettings, Profile, ProfileDetails, ProfileVisibility, Role,
    ThemeMode, ThemeSettings, UserSettings,
};

const COLLECTION: &str = "users";
const PAGE_SIZE: &str = "300";

// =============================================================================
// CLIENT
// =============================================================================

pub struct FirestoreProfileStore {
    http: reqwest::Client,
    documents_url: String,
    api_key: String,
    tokens: Option<Arc<RestIdentityProvider>>,
}

impl FirestoreProfileStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        project_id: &str,
        api_key: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StoreError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            documents_url: documents_url(base_url, project_id),
            api_key: api_key.to_owned(),
            tokens: None,
        })
    }

    /// Authenticate requests as whoever is signed in to `provider`.
    #[must_use]
    pub fn with_token_source(mut self, provider: Arc<RestIdentityProvider>) -> Self {
        self.tokens = Some(provider);
        self
    }

    fn document_url(&self, uid: &Uid) -> String {
        format!("{}/{COLLECTION}/{}", self.documents_url, uid.as_str())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.query(&[("key", self.api_key.as_str())]);
        match self.tokens.as_ref().and_then(|p| p.id_token()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Masked PATCH of `fields` plus `updatedAt` on an existing document.
    async fn patch_fields(&self, uid: &Uid, fields: Map<String, Value>) -> Result<(), StoreError> {
        let (mask, body) = masked_patch(fields, OffsetDateTime::now_utc())?;
        let mut query: Vec<(&str, &str)> = mask.iter().map(|path| ("updateMask.fieldPaths", path.as_str())).collect();
        query.push(("currentDocument.exists", "true"));
        let request = self
            .http
            .patch(self.document_url(uid))
            .query(&query)
            .json(&body);
        let (code, text) = self.send(request).await?;
        if code == 404 {
            return Err(StoreError::NotFound(uid.clone()));
        }
        check_status(code, &text)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait]
impl ProfileStore for FirestoreProfileStore {
    async fn fetch(&self, uid: &Uid) -> Result<Option<Profile>, StoreError> {
        let (status, body) = self.send(self.http.get(self.document_url(uid))).await?;
        if status == 404 {
            return Ok(None);
        }
        check_status(status, &body)?;
        decode_document(&parse_json(&body)?).map(Some)
    }

    async fn create(&self, profile: &Profile) -> Result<(), StoreError> {
        let request = self
            .http
            .patch(self.document_url(&profile.id))
            .json(&encode_profile(profile));
        let (status, body) = self.send(request).await?;
        check_status(status, &body)
    }

    async fn update_status(&self, uid: &Uid, status: ApprovalStatus) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("status".into(), string_value(status.as_str()));
        self.patch_fields(uid, fields).await
    }

    async fn update_profile(&self, uid: &Uid, details: &ProfileDetails) -> Result<(), StoreError> {
        self.patch_fields(uid, details_fields(details)).await
    }

    async fn update_settings(&self, uid: &Uid, settings: &UserSettings) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("settings".into(), settings_value(settings));
        self.patch_fields(uid, fields).await
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let url = format!("{}/{COLLECTION}", self.documents_url);
        let mut profiles = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let (status, body) = self.send(request).await?;
            check_status(status, &body)?;
            let (page, next) = decode_page(&parse_json(&body)?)?;
            profiles.extend(page);
            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(profiles),
            }
        }
    }
}

// =============================================================================
// ENCODING
// =============================================================================

fn documents_url(base_url: &str, project_id: &str) -> String {
    format!("{}/projects/{project_id}/databases/(default)/documents", base_url.trim_end_matches('/'))
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

fn optional_string_value(s: Option<&str>) -> Value {
    match s {
        Some(s) => string_value(s),
        None => json!({ "nullValue": null }),
    }
}

fn integer_value(n: u32) -> Value {
    json!({ "integerValue": n.to_string() })
}

fn timestamp_value(at: OffsetDateTime) -> Result<Value, StoreError> {
    let formatted = at
        .format(&Rfc3339)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(json!({ "timestampValue": formatted }))
}

fn array_value(items: &[String]) -> Value {
    let values: Vec<Value> = items.iter().map(|s| string_value(s)).collect();
    json!({ "arrayValue": { "values": values } })
}

fn bool_value(b: bool) -> Value {
    json!({ "booleanValue": b })
}

fn map_value(fields: Value) -> Value {
    json!({ "mapValue": { "fields": fields } })
}

fn settings_value(settings: &UserSettings) -> Value {
    let NotificationSettings { email, push, desktop } = settings.notifications;
    let privacy = settings.privacy;
    map_value(json!({
        "notifications": map_value(json!({
            "email": bool_value(email),
            "push": bool_value(push),
            "desktop": bool_value(desktop),
        })),
        "privacy": map_value(json!({
            "profileVisibility": string_value(privacy.profile_visibility.as_str()),
            "showEmail": bool_value(privacy.show_email),
            "showPhone": bool_value(privacy.show_phone),
        })),
        "theme": map_value(json!({
            "mode": string_value(settings.theme.mode.as_str()),
            "color": string_value(&settings.theme.color),
        })),
    }))
}

/// Typed values for the member-editable fields, keyed by
/// `ProfileDetails::FIELD_PATHS`.
fn details_fields(details: &ProfileDetails) -> Map<String, Value> {
    let values = [
        string_value(&details.full_name),
        optional_string_value(details.phone.as_deref()),
        string_value(&details.primary_jurisdiction),
        optional_string_value(details.registration_number.as_deref()),
        string_value(&details.office_address),
        integer_value(details.team_size),
        optional_string_value(details.website.as_deref()),
        optional_string_value(details.linked_in.as_deref()),
        integer_value(details.years_of_experience),
        array_value(&details.specialty_areas),
    ];
    ProfileDetails::FIELD_PATHS
        .iter()
        .map(|path| (*path).to_owned())
        .zip(values)
        .collect()
}

/// Field mask and body for a PATCH of `fields`, stamping `updatedAt`.
fn masked_patch(mut fields: Map<String, Value>, now: OffsetDateTime) -> Result<(Vec<String>, Value), StoreError> {
    fields.insert("updatedAt".into(), timestamp_value(now)?);
    let mask = fields.keys().cloned().collect();
    Ok((mask, json!({ "fields": fields })))
}

/// Encode a profile as a document body (`{"fields": {...}}`).
fn encode_profile(profile: &Profile) -> Value {
    let created_at = timestamp_value(profile.created_at).unwrap_or(Value::Null);
    let updated_at = timestamp_value(profile.updated_at).unwrap_or(Value::Null);
    let mut fields = details_fields(&profile.details());
    fields.extend([
        ("id".to_owned(), string_value(profile.id.as_str())),
        ("username".to_owned(), string_value(&profile.username)),
        ("email".to_owned(), string_value(&profile.email)),
        ("status".to_owned(), string_value(profile.status.as_str())),
        ("role".to_owned(), string_value(profile.role.as_str())),
        ("settings".to_owned(), settings_value(&profile.settings)),
        ("createdAt".to_owned(), created_at),
        ("updatedAt".to_owned(), updated_at),
    ]);
    json!({ "fields": fields })
}

// =============================================================================
// DECODING
// =============================================================================

fn parse_json(body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))
}

fn check_status(status: u16, body: &str) -> Result<(), StoreError> {
    match status {
        200..=299 => Ok(()),
        429 | 500..=599 => Err(StoreError::Unavailable(format!("{status}: {body}"))),
        _ => Err(StoreError::Api { status, body: body.to_owned() }),
    }
}

fn missing(name: &str) -> StoreError {
    StoreError::Decode(format!("missing field `{name}`"))
}

fn field_str(fields: &Map<String, Value>, name: &str) -> Result<String, StoreError> {
    field_opt_str(fields, name)?.ok_or_else(|| missing(name))
}

fn field_opt_str(fields: &Map<String, Value>, name: &str) -> Result<Option<String>, StoreError> {
    let Some(value) = fields.get(name) else {
        return Ok(None);
    };
    if value.get("nullValue").is_some() {
        return Ok(None);
    }
    value
        .get("stringValue")
        .and_then(Value::as_str)
        .map(|s| Some(s.to_owned()))
        .ok_or_else(|| StoreError::Decode(format!("field `{name}` is not a string")))
}

/// Integer fields may arrive as `integerValue` (a decimal string) or
/// `doubleValue`. Absent counts decode as 0.
#[allow(clippy::cast_possible_truncation)]
fn field_u32(fields: &Map<String, Value>, name: &str) -> Result<u32, StoreError> {
    let Some(value) = fields.get(name) else {
        return Ok(0);
    };
    let parsed = if let Some(raw) = value.get("integerValue") {
        match raw {
            Value::String(s) => s.parse::<i64>().ok(),
            other => other.as_i64(),
        }
    } else if let Some(raw) = value.get("doubleValue").and_then(Value::as_f64) {
        Some(raw as i64)
    } else if value.get("nullValue").is_some() {
        Some(0)
    } else {
        None
    };
    parsed
        .and_then(|n| u32::try_from(n.max(0)).ok())
        .ok_or_else(|| StoreError::Decode(format!("field `{name}` is not an integer")))
}

fn field_strings(fields: &Map<String, Value>, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(|v| v.get("arrayValue"))
        .and_then(|v| v.get("values"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.get("stringValue").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn field_time(fields: &Map<String, Value>, name: &str) -> Result<OffsetDateTime, StoreError> {
    let Some(raw) = fields
        .get(name)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
    else {
        return Ok(OffsetDateTime::UNIX_EPOCH);
    };
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| StoreError::Decode(format!("field `{name}`: {e}")))
}

fn field_map<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Map<String, Value>> {
    fields
        .get(name)?
        .get("mapValue")?
        .get("fields")?
        .as_object()
}

fn nested_bool(fields: Option<&Map<String, Value>>, name: &str, default: bool) -> bool {
    fields
        .and_then(|f| f.get(name))
        .and_then(|v| v.get("booleanValue"))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn nested_str<'a>(fields: Option<&'a Map<String, Value>>, name: &str) -> Option<&'a str> {
    fields
        .and_then(|f| f.get(name))
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
}

/// Settings are preferences, not access data: anything missing or
/// unrecognised falls back to its default instead of failing the record.
fn field_settings(fields: &Map<String, Value>, name: &str) -> UserSettings {
    let Some(settings) = field_map(fields, name) else {
        return UserSettings::default();
    };
    let notify = field_map(settings, "notifications");
    let privacy = field_map(settings, "privacy");
    let theme = field_map(settings, "theme");
    let notify_default = NotificationSettings::default();
    let privacy_default = PrivacySettings::default();
    let theme_default = ThemeSettings::default();

    UserSettings {
        notifications: NotificationSettings {
            email: nested_bool(notify, "email", notify_default.email),
            push: nested_bool(notify, "push", notify_default.push),
            desktop: nested_bool(notify, "desktop", notify_default.desktop),
        },
        privacy: PrivacySettings {
            profile_visibility: nested_str(privacy, "profileVisibility")
                .and_then(ProfileVisibility::parse)
                .unwrap_or(privacy_default.profile_visibility),
            show_email: nested_bool(privacy, "showEmail", privacy_default.show_email),
            show_phone: nested_bool(privacy, "showPhone", privacy_default.show_phone),
        },
        theme: ThemeSettings {
            mode: nested_str(theme, "mode")
                .and_then(ThemeMode::parse)
                .unwrap_or(theme_default.mode),
            color: nested_str(theme, "color").map_or(theme_default.color, str::to_owned),
        },
    }
}

/// Decode one document (`{"name": ".../users/<id>", "fields": {...}}`).
fn decode_document(doc: &Value) -> Result<Profile, StoreError> {
    let fields = doc
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| missing("fields"))?;

    let id = match doc.get("name").and_then(Value::as_str) {
        Some(name) => name.rsplit('/').next().unwrap_or(name).to_owned(),
        None => field_str(fields, "id")?,
    };
    let status_raw = field_str(fields, "status")?;
    let status = ApprovalStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown status `{status_raw}`")))?;
    let role_raw = field_str(fields, "role")?;
    let role = Role::parse(&role_raw).ok_or_else(|| StoreError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(Profile {
        id: Uid::new(id),
        username: field_opt_str(fields, "username")?.unwrap_or_default(),
        full_name: field_opt_str(fields, "fullName")?.unwrap_or_default(),
        email: field_str(fields, "email")?,
        phone: field_opt_str(fields, "phone")?,
        primary_jurisdiction: field_opt_str(fields, "primaryJurisdiction")?.unwrap_or_default(),
        registration_number: field_opt_str(fields, "registrationNumber")?,
        office_address: field_opt_str(fields, "officeAddress")?.unwrap_or_default(),
        team_size: field_u32(fields, "teamSize")?,
        website: field_opt_str(fields, "website")?,
        linked_in: field_opt_str(fields, "linkedIn")?,
        years_of_experience: field_u32(fields, "yearsOfExperience")?,
        specialty_areas: field_strings(fields, "specialtyAreas"),
        status,
        role,
        settings: field_settings(fields, "settings"),
        created_at: field_time(fields, "createdAt")?,
        updated_at: field_time(fields, "updatedAt")?,
    })
}

/// Decode a list page into profiles plus the next page token.
fn decode_page(page: &Value) -> Result<(Vec<Profile>, Option<String>), StoreError> {
    let profiles = match page.get("documents").and_then(Value::as_array) {
        Some(docs) => docs.iter().map(decode_document).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let next = page
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);
    Ok((profiles, next))
}
