// ABOUTME: Integration tests for the mention router and message log.
// ABOUTME: Covers unread/markRead properties, @all expansion and the empty-mention policies.

use parley_agent::backends::mock::MockBackend;
use parley_core::{ChatError, EmptyMentionPolicy, Router, HUMAN};
use std::collections::BTreeSet;

fn router_with(agents: &[&str]) -> Router {
    let router = Router::new(EmptyMentionPolicy::Store);
    for name in agents {
        router
            .agents()
            .register(name, MockBackend::new().into_handle())
            .unwrap();
    }
    router
}

#[tokio::test]
async fn test_two_recipients_read_independently() {
    let router = router_with(&["alice", "bob"]);
    let record = router.post(HUMAN, "hello @alice @bob").unwrap();

    let for_alice = router.unread("alice");
    let for_bob = router.unread("bob");
    assert_eq!(for_alice, vec![record.clone()]);
    assert_eq!(for_bob, vec![record]);

    router.mark_read("alice", &for_alice);
    assert!(router.unread("alice").is_empty());
    assert_eq!(router.unread("bob"), for_bob);
}

#[tokio::test]
async fn test_unread_matches_receivers_minus_readers() {
    let router = router_with(&["alice", "bob", "carol"]);
    router.post(HUMAN, "@alice one").unwrap();
    router.post("alice", "@bob two").unwrap();
    router.post("bob", "@alice @carol three").unwrap();
    router.post(HUMAN, "nobody four").unwrap();

    let first = router.unread("alice");
    router.mark_read("alice", &first[..1]);

    for id in ["alice", "bob", "carol", HUMAN] {
        let unread: Vec<u64> = router.unread(id).iter().map(|r| r.seq).collect();
        let expected: Vec<u64> = router
            .history()
            .iter()
            .filter(|m| m.receivers.contains(id) && !m.readers.contains(id))
            .map(|m| m.seq)
            .collect();
        assert_eq!(unread, expected, "unread mismatch for {id}");
    }
}

#[tokio::test]
async fn test_unread_is_oldest_first() {
    let router = router_with(&["alice"]);
    for i in 0..5 {
        router.post(HUMAN, &format!("@alice message {i}")).unwrap();
    }
    let bodies: Vec<String> = router.unread("alice").into_iter().map(|r| r.body).collect();
    assert_eq!(
        bodies,
        (0..5).map(|i| format!("@alice message {i}")).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let router = router_with(&["alice"]);
    router.post(HUMAN, "@alice hi").unwrap();
    let unread = router.unread("alice");

    assert_eq!(router.mark_read("alice", &unread), 1);
    let once = router.history()[0].readers.clone();
    assert_eq!(router.mark_read("alice", &unread), 0);
    assert_eq!(router.history()[0].readers, once);
    assert_eq!(once, BTreeSet::from(["alice".to_string()]));
}

#[tokio::test]
async fn test_all_expands_to_registered_agents_except_sender() {
    let router = router_with(&["alice", "bob", "carol"]);
    router.post("alice", "@all standup in five").unwrap();

    assert!(router.unread("alice").is_empty());
    assert!(router.unread(HUMAN).is_empty());
    assert!(router.unread("ghost").is_empty());

    let for_bob = router.unread("bob");
    assert_eq!(for_bob.len(), 1);
    assert_eq!(router.unread("carol").len(), 1);

    router.mark_read("bob", &for_bob);
    let readers = &router.history()[0].readers;
    assert!(readers.contains("bob"));
    assert!(!readers.contains("all"));
    assert_eq!(router.unread("carol").len(), 1);
}

#[tokio::test]
async fn test_all_reaches_agents_registered_later() {
    let router = router_with(&["alice"]);
    router.post(HUMAN, "@all anyone?").unwrap();
    assert!(router.unread("dave").is_empty());

    router
        .agents()
        .register("dave", MockBackend::new().into_handle())
        .unwrap();
    assert_eq!(router.unread("dave").len(), 1);
}

#[tokio::test]
async fn test_unregister_leaves_messages_undelivered() {
    let router = router_with(&["alice"]);
    router.post(HUMAN, "@alice still there?").unwrap();
    assert!(router.agents().unregister("alice").is_some());
    assert!(router.agents().unregister("alice").is_none());
    // Direct mentions are still in the log, nothing was marked read
    assert_eq!(router.unread("alice").len(), 1);
    assert!(router.history()[0].readers.is_empty());
}

#[test]
fn test_empty_mention_policies() {
    let storing = Router::new(EmptyMentionPolicy::Store);
    let record = storing.post(HUMAN, "just thinking out loud").unwrap();
    assert!(record.receivers.is_empty());
    assert_eq!(storing.len(), 1);

    let rejecting = Router::new(EmptyMentionPolicy::Reject);
    assert_eq!(
        rejecting.post(HUMAN, "just thinking out loud"),
        Err(ChatError::EmptyRecipients)
    );
    assert!(rejecting.is_empty());
}

#[test]
fn test_timestamps_never_decrease() {
    let router = Router::default();
    for i in 0..50 {
        router.post(HUMAN, &format!("@a {i}")).unwrap();
    }
    let history = router.history();
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(history.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
}

#[tokio::test]
async fn test_reserved_names_cannot_register() {
    let router = Router::default();
    for name in ["human", "all"] {
        assert_eq!(
            router
                .agents()
                .register(name, MockBackend::new().into_handle())
                .unwrap_err(),
            ChatError::ReservedName(name.to_string())
        );
    }
}
