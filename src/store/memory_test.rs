use super::*;
use crate::profile::ThemeMode;
use crate::profile::test_helpers::member;

#[tokio::test]
async fn fetch_missing_is_none() {
    let store = MemoryProfileStore::new();
    assert_eq!(store.fetch(&Uid::new("nobody")).await, Ok(None));
}

#[tokio::test]
async fn create_then_fetch() {
    let store = MemoryProfileStore::new();
    let profile = member("u1", ApprovalStatus::Pending);
    store.create(&profile).await.unwrap();
    assert_eq!(store.fetch(&profile.id).await, Ok(Some(profile)));
}

#[tokio::test]
async fn create_replaces_existing_record() {
    let store = MemoryProfileStore::new();
    let mut profile = member("u1", ApprovalStatus::Pending);
    store.create(&profile).await.unwrap();
    profile.full_name = "Renamed".into();
    store.create(&profile).await.unwrap();

    let stored = store.fetch(&profile.id).await.unwrap().unwrap();
    assert_eq!(stored.full_name, "Renamed");
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_status_bumps_updated_at() {
    let store = MemoryProfileStore::new();
    let profile = member("u1", ApprovalStatus::Pending);
    store.create(&profile).await.unwrap();

    store
        .update_status(&profile.id, ApprovalStatus::Approved)
        .await
        .unwrap();
    let stored = store.fetch(&profile.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
    assert!(stored.updated_at > profile.updated_at);
}

#[tokio::test]
async fn update_status_missing_is_not_found() {
    let store = MemoryProfileStore::new();
    let uid = Uid::new("ghost");
    assert_eq!(
        store.update_status(&uid, ApprovalStatus::Rejected).await,
        Err(StoreError::NotFound(uid))
    );
}

#[tokio::test]
async fn update_profile_rewrites_details_only() {
    let store = MemoryProfileStore::new();
    let profile = member("u1", ApprovalStatus::Approved);
    store.create(&profile).await.unwrap();

    let mut details = profile.details();
    details.office_address = "9 Bay St".into();
    details.phone = Some("555-0100".into());
    store.update_profile(&profile.id, &details).await.unwrap();

    let stored = store.fetch(&profile.id).await.unwrap().unwrap();
    assert_eq!(stored.details(), details);
    assert_eq!(stored.status, ApprovalStatus::Approved);
    assert_eq!(stored.email, profile.email);
    assert!(stored.updated_at > profile.updated_at);
}

#[tokio::test]
async fn update_settings_replaces_settings() {
    let store = MemoryProfileStore::new();
    let profile = member("u1", ApprovalStatus::Approved);
    store.create(&profile).await.unwrap();

    let mut settings = UserSettings::default();
    settings.notifications.push = false;
    settings.theme.mode = ThemeMode::Dark;
    store.update_settings(&profile.id, &settings).await.unwrap();

    let stored = store.fetch(&profile.id).await.unwrap().unwrap();
    assert_eq!(stored.settings, settings);
    assert_eq!(stored.full_name, profile.full_name);
}

#[tokio::test]
async fn self_service_updates_need_an_existing_record() {
    let store = MemoryProfileStore::new();
    let ghost = member("ghost", ApprovalStatus::Pending);
    assert_eq!(
        store.update_profile(&ghost.id, &ghost.details()).await,
        Err(StoreError::NotFound(ghost.id.clone()))
    );
    assert_eq!(
        store.update_settings(&ghost.id, &UserSettings::default()).await,
        Err(StoreError::NotFound(ghost.id.clone()))
    );
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_store_fails_transiently() {
    let store = MemoryProfileStore::new();
    store.set_unavailable(true);
    let err = store.fetch(&Uid::new("u1")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(store.list().await.is_err());

    store.set_unavailable(false);
    assert!(store.list().await.unwrap().is_empty());
}
