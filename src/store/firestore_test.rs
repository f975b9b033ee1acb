use super::*;
use crate::profile::test_helpers::member;

fn stored_document() -> Value {
    json!({
        "name": "projects/demo/databases/(default)/documents/users/abc123",
        "fields": {
            "id": { "stringValue": "abc123" },
            "username": { "stringValue": "jdoe" },
            "fullName": { "stringValue": "Jane Doe" },
            "email": { "stringValue": "jane@example.com" },
            "phone": { "stringValue": "+15550100" },
            "primaryJurisdiction": { "stringValue": "Delaware" },
            "officeAddress": { "stringValue": "1 Main St" },
            "teamSize": { "integerValue": "4" },
            "yearsOfExperience": { "integerValue": "12" },
            "specialtyAreas": { "arrayValue": { "values": [
                { "stringValue": "Tax" },
                { "stringValue": "Trusts" }
            ] } },
            "status": { "stringValue": "approved" },
            "role": { "stringValue": "user" },
            "createdAt": { "timestampValue": "2024-03-01T12:00:00Z" },
            "updatedAt": { "timestampValue": "2024-03-02T08:30:00.125Z" }
        },
        "createTime": "2024-03-01T12:00:00.000001Z"
    })
}

// =============================================================================
// decode_document
// =============================================================================

#[test]
fn decode_document_reads_typed_fields() {
    let profile = decode_document(&stored_document()).unwrap();
    assert_eq!(profile.id, Uid::new("abc123"));
    assert_eq!(profile.full_name, "Jane Doe");
    assert_eq!(profile.phone.as_deref(), Some("+15550100"));
    assert_eq!(profile.registration_number, None);
    assert_eq!(profile.team_size, 4);
    assert_eq!(profile.years_of_experience, 12);
    assert_eq!(profile.specialty_areas, vec!["Tax".to_owned(), "Trusts".to_owned()]);
    assert_eq!(profile.status, ApprovalStatus::Approved);
    assert_eq!(profile.role, Role::Member);
    assert_eq!(profile.created_at.unix_timestamp(), 1_709_294_400);
}

#[test]
fn decode_document_prefers_name_over_id_field() {
    let mut doc = stored_document();
    doc["fields"]["id"] = json!({ "stringValue": "stale" });
    assert_eq!(decode_document(&doc).unwrap().id, Uid::new("abc123"));
}

#[test]
fn decode_document_accepts_double_and_null_counts() {
    let mut doc = stored_document();
    doc["fields"]["teamSize"] = json!({ "doubleValue": 7.0 });
    doc["fields"]["yearsOfExperience"] = json!({ "nullValue": null });
    let profile = decode_document(&doc).unwrap();
    assert_eq!(profile.team_size, 7);
    assert_eq!(profile.years_of_experience, 0);
}

#[test]
fn decode_document_rejects_unknown_status() {
    let mut doc = stored_document();
    doc["fields"]["status"] = json!({ "stringValue": "suspended" });
    assert!(matches!(decode_document(&doc), Err(StoreError::Decode(_))));
}

#[test]
fn decode_document_requires_role_and_email() {
    let mut doc = stored_document();
    doc["fields"].as_object_mut().unwrap().remove("role");
    assert!(matches!(decode_document(&doc), Err(StoreError::Decode(_))));

    let mut doc = stored_document();
    doc["fields"].as_object_mut().unwrap().remove("email");
    assert!(matches!(decode_document(&doc), Err(StoreError::Decode(_))));
}

#[test]
fn decode_document_without_fields_fails() {
    assert!(decode_document(&json!({ "name": "x/users/y" })).is_err());
}

// =============================================================================
// encode_profile
// =============================================================================

#[test]
fn encode_profile_writes_typed_values() {
    let mut profile = member("u1", ApprovalStatus::Pending);
    profile.website = Some("https://example.com".into());
    let body = encode_profile(&profile);
    let fields = &body["fields"];

    assert_eq!(fields["status"], json!({ "stringValue": "pending" }));
    assert_eq!(fields["role"], json!({ "stringValue": "user" }));
    assert_eq!(fields["teamSize"], json!({ "integerValue": "1" }));
    assert_eq!(fields["phone"], json!({ "nullValue": null }));
    assert_eq!(fields["website"], json!({ "stringValue": "https://example.com" }));
    assert_eq!(fields["createdAt"], json!({ "timestampValue": "1970-01-01T00:00:00Z" }));
    assert_eq!(
        fields["specialtyAreas"],
        json!({ "arrayValue": { "values": [{ "stringValue": "Corporate" }] } })
    );
}

#[test]
fn encoded_profile_decodes_back() {
    let profile = member("u1", ApprovalStatus::Rejected);
    let mut doc = encode_profile(&profile);
    doc["name"] = json!("projects/demo/databases/(default)/documents/users/u1");
    assert_eq!(decode_document(&doc).unwrap(), profile);
}

#[test]
fn settings_encode_as_nested_maps() {
    let mut profile = member("u1", ApprovalStatus::Approved);
    profile.settings.privacy.profile_visibility = ProfileVisibility::Private;
    profile.settings.notifications.desktop = false;
    let body = encode_profile(&profile);
    let settings = &body["fields"]["settings"]["mapValue"]["fields"];

    assert_eq!(
        settings["privacy"]["mapValue"]["fields"]["profileVisibility"],
        json!({ "stringValue": "private" })
    );
    assert_eq!(
        settings["notifications"]["mapValue"]["fields"]["desktop"],
        json!({ "booleanValue": false })
    );
    assert_eq!(settings["theme"]["mapValue"]["fields"]["color"], json!({ "stringValue": "default" }));
}

#[test]
fn missing_or_odd_settings_fall_back_to_defaults() {
    assert_eq!(decode_document(&stored_document()).unwrap().settings, UserSettings::default());

    let mut doc = stored_document();
    doc["fields"]["settings"] = json!({ "mapValue": { "fields": {
        "theme": { "mapValue": { "fields": {
            "mode": { "stringValue": "dark" },
            "color": { "stringValue": "teal" }
        } } },
        "privacy": { "mapValue": { "fields": {
            "profileVisibility": { "stringValue": "everyone" },
            "showPhone": { "booleanValue": true }
        } } }
    } } });
    let settings = decode_document(&doc).unwrap().settings;
    assert_eq!(settings.theme, ThemeSettings { mode: ThemeMode::Dark, color: "teal".into() });
    assert_eq!(settings.privacy.profile_visibility, ProfileVisibility::Network);
    assert!(settings.privacy.show_phone);
    assert_eq!(settings.notifications, NotificationSettings::default());
}

// =============================================================================
// masked patches
// =============================================================================

#[test]
fn details_patch_masks_only_editable_fields() {
    let mut details = member("u1", ApprovalStatus::Pending).details();
    details.team_size = 7;
    let (mask, body) = masked_patch(details_fields(&details), OffsetDateTime::UNIX_EPOCH).unwrap();

    let mut expected: Vec<String> = ProfileDetails::FIELD_PATHS.iter().map(|p| (*p).to_owned()).collect();
    expected.push("updatedAt".into());
    let mut sorted = mask.clone();
    sorted.sort();
    expected.sort();
    assert_eq!(sorted, expected);
    assert!(!mask.iter().any(|p| p == "status" || p == "role" || p == "email"));
    assert_eq!(body["fields"]["teamSize"], json!({ "integerValue": "7" }));
    assert_eq!(body["fields"]["updatedAt"], json!({ "timestampValue": "1970-01-01T00:00:00Z" }));
}

#[test]
fn settings_patch_masks_settings_and_timestamp() {
    let mut fields = Map::new();
    fields.insert("settings".into(), settings_value(&UserSettings::default()));
    let (mut mask, body) = masked_patch(fields, OffsetDateTime::UNIX_EPOCH).unwrap();
    mask.sort();
    assert_eq!(mask, vec!["settings", "updatedAt"]);
    assert!(body["fields"]["settings"]["mapValue"].is_object());
}

// =============================================================================
// pages / status
// =============================================================================

#[test]
fn decode_page_returns_next_token() {
    let page = json!({ "documents": [stored_document()], "nextPageToken": "tok-2" });
    let (profiles, next) = decode_page(&page).unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(next.as_deref(), Some("tok-2"));
}

#[test]
fn decode_page_empty_collection() {
    let (profiles, next) = decode_page(&json!({})).unwrap();
    assert!(profiles.is_empty());
    assert_eq!(next, None);
}

#[test]
fn check_status_classifies_failures() {
    assert!(check_status(200, "").is_ok());
    assert!(check_status(503, "down").unwrap_err().is_transient());
    assert!(check_status(429, "slow down").unwrap_err().is_transient());
    assert_eq!(
        check_status(403, "denied"),
        Err(StoreError::Api { status: 403, body: "denied".into() })
    );
}

#[test]
fn documents_url_targets_default_database() {
    assert_eq!(
        documents_url("https://firestore.googleapis.com/v1/", "demo"),
        "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents"
    );
}
