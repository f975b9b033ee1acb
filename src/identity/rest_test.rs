use super::*;

// =============================================================================
// map_error
// =============================================================================

fn envelope(message: &str) -> String {
    serde_json::json!({ "error": { "code": 400, "message": message } }).to_string()
}

#[test]
fn map_error_credentials() {
    for code in ["EMAIL_NOT_FOUND", "INVALID_PASSWORD", "INVALID_LOGIN_CREDENTIALS"] {
        assert_eq!(map_error(400, &envelope(code)), IdentityError::InvalidCredentials);
    }
}

#[test]
fn map_error_strips_detail_suffix() {
    let body = envelope("WEAK_PASSWORD : Password should be at least 6 characters");
    assert_eq!(map_error(400, &body), IdentityError::WeakPassword);
}

#[test]
fn map_error_known_codes() {
    assert_eq!(map_error(400, &envelope("EMAIL_EXISTS")), IdentityError::EmailExists);
    assert_eq!(map_error(400, &envelope("TOO_MANY_ATTEMPTS_TRY_LATER")), IdentityError::RateLimited);
    assert_eq!(map_error(400, &envelope("INVALID_ID_TOKEN")), IdentityError::NotSignedIn);
}

#[test]
fn map_error_server_side_is_unavailable() {
    let err = map_error(503, "upstream overloaded");
    assert!(err.is_transient());
}

#[test]
fn map_error_unknown_code_keeps_message() {
    assert_eq!(
        map_error(400, &envelope("OPERATION_NOT_ALLOWED")),
        IdentityError::Api { status: 400, message: "OPERATION_NOT_ALLOWED".into() }
    );
}

#[test]
fn map_error_non_json_body() {
    assert_eq!(map_error(403, "forbidden"), IdentityError::Api { status: 403, message: "forbidden".into() });
}

// =============================================================================
// lookup parsing
// =============================================================================

#[test]
fn identity_from_lookup_reads_first_user() {
    let response: LookupResponse = serde_json::from_value(serde_json::json!({
        "kind": "identitytoolkit#GetAccountInfoResponse",
        "users": [{ "localId": "abc123", "email": "a@example.com", "emailVerified": true }]
    }))
    .unwrap();
    let identity = identity_from_lookup(response).unwrap();
    assert_eq!(identity.uid, Uid::new("abc123"));
    assert_eq!(identity.email, "a@example.com");
    assert!(identity.email_verified);
}

#[test]
fn identity_from_lookup_defaults_unverified() {
    let response: LookupResponse =
        serde_json::from_value(serde_json::json!({ "users": [{ "localId": "abc123", "email": "a@example.com" }] }))
            .unwrap();
    assert!(!identity_from_lookup(response).unwrap().email_verified);
}

#[test]
fn identity_from_lookup_empty_is_decode_error() {
    let response: LookupResponse = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(matches!(identity_from_lookup(response), Err(IdentityError::Decode(_))));
}

// =============================================================================
// request shapes
// =============================================================================

#[test]
fn password_request_uses_camel_case() {
    let body = serde_json::to_value(PasswordRequest { email: "a@b.com", password: "pw", return_secure_token: true })
        .unwrap();
    assert_eq!(body, serde_json::json!({ "email": "a@b.com", "password": "pw", "returnSecureToken": true }));
}

#[test]
fn oob_request_targets_email_verification() {
    let body = serde_json::to_value(OobRequest { request_type: "VERIFY_EMAIL", id_token: "tok" }).unwrap();
    assert_eq!(body, serde_json::json!({ "requestType": "VERIFY_EMAIL", "idToken": "tok" }));
}

#[test]
fn endpoint_url_joins_method() {
    assert_eq!(
        endpoint_url("https://identitytoolkit.googleapis.com/v1", "accounts:lookup"),
        "https://identitytoolkit.googleapis.com/v1/accounts:lookup"
    );
}

#[tokio::test]
async fn new_client_starts_signed_out() {
    let provider = RestIdentityProvider::new(
        "https://identity.invalid/v1/",
        "key",
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(provider.base_url, "https://identity.invalid/v1");
    assert_eq!(provider.current(), None);
    assert_eq!(provider.id_token(), None);
    assert_eq!(provider.send_verification().await, Err(IdentityError::NotSignedIn));
    assert_eq!(provider.refresh().await, Ok(None));
}
