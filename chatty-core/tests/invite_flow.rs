/*
    invite_flow.rs - Two and three device join scenarios

    Every device runs against the same in-memory board with its own vault
    directory, so these tests cover the whole path from invite code to a
    readable group message.
*/

use chatty_core::core_board::records::{encrypted_keys_path, invite_path, join_requests_path};
use chatty_core::core_board::{BulletinBoard, MemoryBoard};
use chatty_core::core_invite::{Decision, InviteError, InviteState, JoinOutcome};
use chatty_core::core_session::{read_feed, send_message, FeedItem, IvPolicy};
use chatty_core::test_utils::{assert_completes_within, TestDevice, DEFAULT_TEST_TIMEOUT};
use serde_json::json;

/// **Accepted join**
///
/// 1. Alice creates "Friends" and publishes the invite `a1b2c3`
/// 2. Bob enters the code in upper case
/// 3. Alice sees the request in her feed and accepts it
/// 4. Bob stores the group and both read each other's messages
#[tokio::test]
async fn test_join_and_exchange_messages() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::on_board("alice", &board);
    let mut bob = TestDevice::on_board("bob", &board);

    let group = alice.create_group("Friends");
    board
        .put(&invite_path("a1b2c3"), json!({ "groupId": group.group_id.as_str() }))
        .await
        .unwrap();

    let code = bob.exchange.request_join(&bob.vault, "A1B2C3").await.unwrap();
    assert_eq!(code.as_str(), "a1b2c3");
    assert!(board.get(&invite_path("a1b2c3")).await.unwrap().is_none());

    let feed = read_feed(&board, &alice.session, &alice.vault).await.unwrap();
    let request = match feed.as_slice() {
        [FeedItem::JoinRequest(request)] => request.clone(),
        other => panic!("expected a single join request, got {:?}", other),
    };
    assert_eq!(request.code, code);
    alice.exchange.respond(&alice.vault, &request, Decision::Accept).await.unwrap();
    assert!(board.list(&join_requests_path(&group.group_id)).await.unwrap().is_empty());

    let outcome = assert_completes_within(
        DEFAULT_TEST_TIMEOUT,
        bob.exchange.wait_for_response(&mut bob.vault, &code),
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::Joined { group_id: group.group_id.clone(), group_name: "Friends".to_string() }
    );

    let joined = bob.vault.group(&group.group_id).unwrap().unwrap().clone();
    assert_eq!(joined, group);
    assert!(bob.exchange.pending_codes().await.unwrap().is_empty());
    assert!(board.get(&encrypted_keys_path("a1b2c3")).await.unwrap().is_none());

    bob.session.select(&bob.vault, &group.group_id).unwrap();
    send_message(&board, &bob.session, &bob.vault, "  hi all  ", &bob.random).await.unwrap();
    send_message(&board, &alice.session, &alice.vault, "welcome bob", &alice.random).await.unwrap();

    let texts = |feed: Vec<FeedItem>| -> Vec<(String, bool)> {
        feed.into_iter()
            .filter_map(|item| match item {
                FeedItem::Message { text, own, .. } => Some((text, own)),
                _ => None,
            })
            .collect()
    };
    let alice_view = texts(read_feed(&board, &alice.session, &alice.vault).await.unwrap());
    assert_eq!(alice_view, vec![("hi all".to_string(), false), ("welcome bob".to_string(), true)]);
    let bob_view = texts(read_feed(&board, &bob.session, &bob.vault).await.unwrap());
    assert_eq!(bob_view, vec![("hi all".to_string(), true), ("welcome bob".to_string(), false)]);
}

/// **Rejected join**: Bob learns the group's name, gets no key and keeps
/// nothing pending.
#[tokio::test]
async fn test_rejected_join_leaves_no_trace() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::on_board("alice", &board);
    let mut bob = TestDevice::on_board("bob", &board);
    let group = alice.create_group("Book Club");

    let code = alice.exchange.issue_code(&alice.session, &alice.vault).await.unwrap();
    bob.exchange.request_join(&bob.vault, code.as_str()).await.unwrap();

    let request = alice.exchange.incoming_requests(&group.group_id).await.unwrap().remove(0);
    alice.exchange.respond(&alice.vault, &request, Decision::Reject).await.unwrap();

    let outcome = assert_completes_within(
        DEFAULT_TEST_TIMEOUT,
        bob.exchange.wait_for_response(&mut bob.vault, &code),
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::Denied { group_id: group.group_id.clone(), group_name: "Book Club".to_string() }
    );
    assert_eq!(bob.exchange.state(&code).await, Some(InviteState::Rejected));
    assert!(bob.vault.vault().unwrap().is_empty());
    assert!(bob.exchange.pending_codes().await.unwrap().is_empty());
    assert_eq!(bob.exchange.watch_count().await, 0);
    assert!(board.get(&encrypted_keys_path(code.as_str())).await.unwrap().is_none());
}

/// **Race**: two joiners enter the same code at once; exactly one gets in
#[tokio::test]
async fn test_code_is_consumed_once() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::on_board("alice", &board);
    let bob = TestDevice::on_board("bob", &board);
    let carol = TestDevice::on_board("carol", &board);
    let group = alice.create_group("Friends");

    let code = alice.exchange.issue_code(&alice.session, &alice.vault).await.unwrap();
    let (bob_result, carol_result) = tokio::join!(
        bob.exchange.request_join(&bob.vault, code.as_str()),
        carol.exchange.request_join(&carol.vault, code.as_str()),
    );

    let results = [bob_result, carol_result];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(InviteError::InviteNotFound(_)))));

    let requests = alice.exchange.incoming_requests(&group.group_id).await.unwrap();
    assert_eq!(requests.len(), 1);

    let losers_pending = bob.exchange.pending_codes().await.unwrap().len()
        + carol.exchange.pending_codes().await.unwrap().len();
    assert_eq!(losers_pending, 1);
}

/// **Duplicate response**: a replayed acceptance after resolution changes
/// nothing
#[tokio::test]
async fn test_replayed_response_is_ignored() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::on_board("alice", &board);
    let mut bob = TestDevice::on_board("bob", &board);
    let group = alice.create_group("Friends");

    let code = alice.exchange.issue_code(&alice.session, &alice.vault).await.unwrap();
    bob.exchange.request_join(&bob.vault, code.as_str()).await.unwrap();
    let request = alice.exchange.incoming_requests(&group.group_id).await.unwrap().remove(0);
    alice.exchange.respond(&alice.vault, &request, Decision::Accept).await.unwrap();

    let response_path = encrypted_keys_path(code.as_str());
    let response = board.get(&response_path).await.unwrap().unwrap();

    let first = bob.exchange.poll_responses(&mut bob.vault).await;
    assert_eq!(first.len(), 1);
    assert!(first[0].1.is_ok());

    board.put(&response_path, response).await.unwrap();
    let second = bob.exchange.poll_responses(&mut bob.vault).await;
    assert!(second.is_empty());
    assert_eq!(bob.vault.vault().unwrap().len(), 1);
}

/// **Restart while pending**: the ephemeral key survives on disk and the
/// response is still resolved
#[tokio::test]
async fn test_pending_invite_survives_restart() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::on_board("alice", &board);
    let mut bob = TestDevice::on_board("bob", &board);
    let group = alice.create_group("Friends");

    let code = alice.exchange.issue_code(&alice.session, &alice.vault).await.unwrap();
    bob.exchange.request_join(&bob.vault, code.as_str()).await.unwrap();

    let request = alice.exchange.incoming_requests(&group.group_id).await.unwrap().remove(0);
    alice.exchange.respond(&alice.vault, &request, Decision::Accept).await.unwrap();

    bob.restart();
    assert_eq!(bob.exchange.resume().await.unwrap(), 1);

    // The response was already on the board and arrives as the initial snapshot
    let outcome = assert_completes_within(
        DEFAULT_TEST_TIMEOUT,
        bob.exchange.wait_for_response(&mut bob.vault, &code),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, JoinOutcome::Joined { .. }));

    bob.restart();
    assert_eq!(bob.vault.group(&group.group_id).unwrap(), Some(&group));
    assert_eq!(bob.exchange.resume().await.unwrap(), 0);
}

/// **Fresh IV per message**: identical texts give different ciphertexts and
/// both sides still read them
#[tokio::test]
async fn test_per_message_iv_policy() {
    let board = MemoryBoard::new();
    let mut alice = TestDevice::with_policy("alice", &board, IvPolicy::PerMessage);
    let mut bob = TestDevice::with_policy("bob", &board, IvPolicy::PerMessage);
    let group = alice.create_group("Friends");

    let code = alice.exchange.issue_code(&alice.session, &alice.vault).await.unwrap();
    bob.exchange.request_join(&bob.vault, code.as_str()).await.unwrap();
    let request = alice.exchange.incoming_requests(&group.group_id).await.unwrap().remove(0);
    alice.exchange.respond(&alice.vault, &request, Decision::Accept).await.unwrap();
    bob.exchange.wait_for_response(&mut bob.vault, &code).await.unwrap();
    bob.session.select(&bob.vault, &group.group_id).unwrap();

    send_message(&board, &alice.session, &alice.vault, "same words", &alice.random).await.unwrap();
    send_message(&board, &alice.session, &alice.vault, "same words", &alice.random).await.unwrap();

    let stored = board
        .list(&chatty_core::core_board::records::messages_path(&group.group_id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].1["content"], stored[1].1["content"]);

    let feed = read_feed(&board, &bob.session, &bob.vault).await.unwrap();
    assert_eq!(feed.len(), 2);
    for item in feed {
        match item {
            FeedItem::Message { text, own, .. } => {
                assert_eq!(text, "same words");
                assert!(!own);
            }
            other => panic!("unexpected feed item {:?}", other),
        }
    }
}
