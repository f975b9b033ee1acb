use super::*;

fn alice(verified: bool) -> Identity {
    Identity { uid: Uid::new("alice"), email: "alice@example.com".into(), email_verified: verified }
}

#[tokio::test]
async fn subscribe_delivers_current_identity_first() {
    let broadcaster = AuthStateBroadcaster::new();
    broadcaster.publish(Some(alice(true)));

    let mut feed = broadcaster.subscribe();
    assert_eq!(feed.next().await, Some(IdentityEvent::Changed(Some(alice(true)))));
}

#[tokio::test]
async fn subscribe_before_sign_in_reports_signed_out() {
    let broadcaster = AuthStateBroadcaster::new();
    let mut feed = broadcaster.subscribe();
    assert_eq!(feed.next().await, Some(IdentityEvent::Changed(None)));
}

#[tokio::test]
async fn publish_reaches_every_feed_in_order() {
    let broadcaster = AuthStateBroadcaster::new();
    let mut a = broadcaster.subscribe();
    let mut b = broadcaster.subscribe();

    broadcaster.publish(Some(alice(false)));
    broadcaster.publish(None);

    for feed in [&mut a, &mut b] {
        assert_eq!(feed.next().await, Some(IdentityEvent::Changed(None)));
        assert_eq!(feed.next().await, Some(IdentityEvent::Changed(Some(alice(false)))));
        assert_eq!(feed.next().await, Some(IdentityEvent::Changed(None)));
    }
}

#[tokio::test]
async fn fail_is_delivered_as_event() {
    let broadcaster = AuthStateBroadcaster::new();
    let mut feed = broadcaster.subscribe();
    broadcaster.fail("network down");

    assert_eq!(feed.next().await, Some(IdentityEvent::Changed(None)));
    assert_eq!(feed.next().await, Some(IdentityEvent::Failed("network down".into())));
}

#[test]
fn dropped_feeds_are_pruned() {
    let broadcaster = AuthStateBroadcaster::new();
    let kept = broadcaster.subscribe();
    let dropped = broadcaster.subscribe();
    assert_eq!(broadcaster.subscriber_count(), 2);

    drop(dropped);
    broadcaster.publish(Some(alice(true)));
    assert_eq!(broadcaster.subscriber_count(), 1);
    drop(kept);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[test]
fn current_tracks_last_publish() {
    let broadcaster = AuthStateBroadcaster::default();
    assert_eq!(broadcaster.current(), None);
    broadcaster.publish(Some(alice(true)));
    assert_eq!(broadcaster.current(), Some(alice(true)));
}

#[test]
fn only_unavailable_is_transient() {
    assert!(IdentityError::Unavailable("timeout".into()).is_transient());
    assert!(!IdentityError::InvalidCredentials.is_transient());
    assert!(!IdentityError::Api { status: 400, message: "BAD".into() }.is_transient());
}

#[test]
fn normalize_email_trims_and_lowercases() {
    assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
}

#[test]
fn uid_displays_raw_value() {
    assert_eq!(Uid::new("abc").to_string(), "abc");
    assert_eq!(serde_json::to_string(&Uid::new("abc")).unwrap(), "\"abc\"");
}
