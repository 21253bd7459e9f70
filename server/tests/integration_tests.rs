/// Integration tests for the relay core
/// Exercises registry, relay and store together without the HTTP layer
use secure_chat_server::registry::{Outbound, SessionHandle, SessionRegistry};
use secure_chat_server::store::models::ForwardedEnvelope;
use secure_chat_server::{EnvelopeRelay, Identity, OfflineStore, RelayError, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn setup() -> (EnvelopeRelay, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory());
    let relay = EnvelopeRelay::new(Arc::new(SessionRegistry::new()), store.clone());
    (relay, store)
}

fn payload(receiver: &str, ciphertext: &str) -> String {
    serde_json::json!({ "receiver": receiver, "ciphertext": ciphertext, "iv": "abcdef" }).to_string()
}

async fn connect(
    relay: &EnvelopeRelay,
    name: &str,
) -> (SessionHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(tx);
    relay
        .registry()
        .register(Identity::from(name), handle.clone())
        .await;
    (handle, rx)
}

fn forwarded(frame: Outbound) -> ForwardedEnvelope {
    match frame {
        Outbound::Envelope(text) => serde_json::from_str(&text).expect("Invalid forwarded frame"),
        other => panic!("Unexpected frame: {:?}", other),
    }
}

#[tokio::test]
async fn test_conversation_workflow() {
    let (relay, store) = setup();
    let alice = Identity::from("alice");
    let bob = Identity::from("bob");

    // Bob is offline for the first message
    relay.handle_inbound(&alice, &payload("bob", "t1")).await.unwrap();

    // Bob comes online and replies, then Alice answers live
    let (_bob_handle, mut bob_rx) = connect(&relay, "bob").await;
    relay.handle_inbound(&bob, &payload("alice", "t2")).await.unwrap();
    let outcome = relay.handle_inbound(&alice, &payload("bob", "t3")).await.unwrap();
    assert!(outcome.delivered());

    let live = forwarded(bob_rx.recv().await.unwrap());
    assert_eq!(live.ciphertext, "t3");
    assert_eq!(live.sender, alice);

    // Backlog has everything in order regardless of direction
    let history = store.query(&bob, &alice).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|e| e.ciphertext.as_str()).collect();
    assert_eq!(contents, vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn test_reregistration_routes_to_newest_transport() {
    let (relay, _store) = setup();
    let alice = Identity::from("alice");

    let (old_handle, mut old_rx) = connect(&relay, "bob").await;
    let (new_handle, mut new_rx) = connect(&relay, "bob").await;

    // Late close from the stale connection must not evict the new one
    let removed = relay
        .registry()
        .unregister(&Identity::from("bob"), old_handle.session_id)
        .await;
    assert!(!removed);

    relay.handle_inbound(&alice, &payload("bob", "fresh")).await.unwrap();
    assert_eq!(forwarded(new_rx.recv().await.unwrap()).ciphertext, "fresh");
    assert!(old_rx.try_recv().is_err());

    assert!(
        relay
            .registry()
            .unregister(&Identity::from("bob"), new_handle.session_id)
            .await
    );
}

#[tokio::test]
async fn test_malformed_payload_does_not_poison_connection() {
    let (relay, store) = setup();
    let alice = Identity::from("alice");

    for raw in [
        r#"{"ciphertext":"x","iv":"y"}"#,
        r#"{"receiver":"bob","iv":"y"}"#,
        r#"{"receiver":"bob","ciphertext":"x"}"#,
        r#"{"receiver":["bob"],"ciphertext":"x","iv":"y"}"#,
        "",
    ] {
        let result = relay.handle_inbound(&alice, raw).await;
        assert!(matches!(result, Err(RelayError::MalformedEnvelope(_))), "{:?}", raw);
    }
    assert!(store.query(&alice, &Identity::from("bob")).await.unwrap().is_empty());

    relay.handle_inbound(&alice, &payload("bob", "valid")).await.unwrap();
    assert_eq!(store.query(&alice, &Identity::from("bob")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_senders_are_isolated() {
    let (relay, store) = setup();
    let (_carol, mut carol_rx) = connect(&relay, "carol").await;

    let mut tasks = Vec::new();
    for sender in ["alice", "bob", "dave", "erin"] {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            let me = Identity::from(sender);
            for i in 0..10 {
                relay
                    .handle_inbound(&me, &payload("carol", &format!("{}-{}", sender, i)))
                    .await
                    .unwrap();
                // one bad frame per sender in the middle of the stream
                if i == 5 {
                    let _ = relay.handle_inbound(&me, "{").await;
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut received = Vec::new();
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(100), carol_rx.recv()).await
    {
        received.push(forwarded(frame));
    }
    assert_eq!(received.len(), 40);

    // per-sender order is preserved
    for sender in ["alice", "bob", "dave", "erin"] {
        let mine: Vec<String> = received
            .iter()
            .filter(|e| e.sender.as_str() == sender)
            .map(|e| e.ciphertext.clone())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("{}-{}", sender, i)).collect();
        assert_eq!(mine, expected);

        let stored = store
            .query(&Identity::from(sender), &Identity::from("carol"))
            .await
            .unwrap();
        assert_eq!(stored.len(), 10);
    }
}
