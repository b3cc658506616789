//! Conversation engine against a mocked chat service: optimistic sends,
//! conversation id adoption and recovery, the single-flight guard, and the
//! send-failure policies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{any, body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{seed_session, test_app, test_app_with, TEST_BEARER};
use confab::conversation::{Author, SendFailurePolicy};
use confab::credentials::{CredentialStore, FileCredentialStore, KEY_HISTORY_ID};
use confab::ConfabError;

#[tokio::test]
async fn test_first_send_adopts_and_persists_history_id() {
    let app = test_app().await;
    seed_session(&app).await;

    app.engine.start_new_chat().await.unwrap();

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .and(header("authorization", TEST_BEARER))
        .and(body_partial_json(json!({
            "message": "Hello",
            "history_id": null,
            "username": "alice"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Hi there",
            "history_id": 42
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let reply = app.engine.send("Hello").await.unwrap();
    assert_eq!(reply.text, "Hi there");
    assert_eq!(reply.author, Author::Assistant);

    // Adoption happened exactly once and was persisted before send returned.
    assert_eq!(app.engine.history_id(), Some(42));
    assert_eq!(
        app.store.get(KEY_HISTORY_ID).await.unwrap().as_deref(),
        Some("42")
    );

    let messages = app.engine.messages();
    let turns: Vec<(Author, String)> = messages
        .iter()
        .map(|m| (m.author, m.text.clone()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Author::User, "Hello".to_string()),
            (Author::Assistant, "Hi there".to_string()),
        ]
    );

    // The display view is the exact reverse of the chronological order.
    let newest_first: Vec<String> = app
        .engine
        .messages_newest_first()
        .iter()
        .map(|m| m.text.clone())
        .collect();
    assert_eq!(newest_first, vec!["Hi there".to_string(), "Hello".to_string()]);
}

#[tokio::test]
async fn test_second_send_reuses_adopted_history_id() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .and(body_partial_json(json!({ "history_id": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "first reply",
            "history_id": 42
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .and(body_partial_json(json!({ "history_id": 42 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "second reply",
            "history_id": 42
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    app.engine.send("one").await.unwrap();
    app.engine.send("two").await.unwrap();

    assert_eq!(app.engine.history_id(), Some(42));
    assert_eq!(app.engine.messages().len(), 4);
}

#[tokio::test]
async fn test_restart_after_send_recovers_history_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("credentials.json");

    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::open(&path).unwrap());
    let app = test_app_with(store, SendFailurePolicy::default()).await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Hi there",
            "history_id": 42
        })))
        .mount(&app.server)
        .await;

    app.engine.send("Hello").await.unwrap();
    assert_eq!(app.engine.history_id(), Some(42));

    // Simulated restart: a fresh store over the same file, fresh components.
    let restarted_store: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::open(&path).unwrap());
    let restarted = test_app_with(restarted_store, SendFailurePolicy::default()).await;
    assert!(restarted.session.restore().await.unwrap());
    assert_eq!(restarted.engine.restore().await.unwrap(), Some(42));
    assert_eq!(restarted.engine.history_id(), Some(42));
}

#[tokio::test]
async fn test_whitespace_only_send_makes_no_network_call() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.server)
        .await;

    let err = app.engine.send("   \t\n").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfabError>(),
        Some(ConfabError::Validation(_))
    ));
    assert!(app.engine.messages().is_empty());
}

#[tokio::test]
async fn test_overlapping_send_is_rejected_busy() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "slow reply", "history_id": 42 }))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&app.server)
        .await;

    let first = app.engine.send("first");
    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        app.engine.send("second").await
    };
    let (first_result, second_result) = tokio::join!(first, second);

    assert!(first_result.is_ok());
    let err = second_result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfabError>(),
        Some(ConfabError::Busy("send"))
    ));

    // The rejected send left no optimistic user message behind.
    let user_turns: Vec<String> = app
        .engine
        .messages()
        .iter()
        .filter(|m| m.author == Author::User)
        .map(|m| m.text.clone())
        .collect();
    assert_eq!(user_turns, vec!["first".to_string()]);
    assert!(!app.engine.is_busy());
}

#[tokio::test]
async fn test_start_new_chat_rejected_while_send_in_flight() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "slow reply", "history_id": 42 }))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&app.server)
        .await;

    let send = app.engine.send("first");
    let new_chat = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        app.engine.start_new_chat().await
    };
    let (send_result, new_chat_result) = tokio::join!(send, new_chat);

    assert!(send_result.is_ok());
    let err = new_chat_result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfabError>(),
        Some(ConfabError::Busy(_))
    ));
    // The send completed normally despite the rejected reset.
    assert_eq!(app.engine.history_id(), Some(42));
}

#[tokio::test]
async fn test_send_failure_appends_inline_error_reply() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Internal server error"
        })))
        .mount(&app.server)
        .await;

    // The engine reports the synthetic reply, not a failure.
    let reply = app.engine.send("boom").await.unwrap();
    assert_eq!(reply.author, Author::Assistant);
    assert!(reply.text.contains("Internal server error"));

    let messages = app.engine.messages();
    assert_eq!(messages.len(), 2);
    // The optimistic user turn is never retracted under this policy.
    assert_eq!(messages[0].author, Author::User);
    assert_eq!(messages[0].text, "boom");
    assert_eq!(messages[1].author, Author::Assistant);

    // No conversation id was adopted from a failed exchange.
    assert_eq!(app.engine.history_id(), None);
    assert!(app.store.get(KEY_HISTORY_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn test_send_failure_with_rollback_policy_retracts_user_turn() {
    let store: Arc<dyn CredentialStore> =
        Arc::new(confab::credentials::MemoryCredentialStore::new());
    let app = test_app_with(store, SendFailurePolicy::Rollback).await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Internal server error"
        })))
        .mount(&app.server)
        .await;

    let err = app.engine.send("boom").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfabError>(),
        Some(ConfabError::Server { status: 500, .. })
    ));
    assert!(app.engine.messages().is_empty());
    assert!(!app.engine.is_busy());
}

#[tokio::test]
async fn test_send_401_invalidates_session_and_continues_inline() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&app.server)
        .await;

    let reply = app.engine.send("hello").await.unwrap();
    assert_eq!(reply.author, Author::Assistant);

    // The rejected credential logged the session out centrally.
    assert!(!app.session.is_authenticated());
}

#[tokio::test]
async fn test_load_existing_reconstructs_chronological_pairs() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("GET"))
        .and(path("/history/7"))
        .and(header("authorization", TEST_BEARER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chat": [
                { "user": "Hi", "ai": "Hello!" },
                { "user": "Bye", "ai": "Goodbye!" }
            ]
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let count = app.engine.load_existing(7).await.unwrap();
    assert_eq!(count, 4);
    assert_eq!(app.engine.history_id(), Some(7));
    assert_eq!(
        app.store.get(KEY_HISTORY_ID).await.unwrap().as_deref(),
        Some("7")
    );

    let turns: Vec<(Author, String)> = app
        .engine
        .messages()
        .iter()
        .map(|m| (m.author, m.text.clone()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Author::User, "Hi".to_string()),
            (Author::Assistant, "Hello!".to_string()),
            (Author::User, "Bye".to_string()),
            (Author::Assistant, "Goodbye!".to_string()),
        ]
    );

    let newest_first: Vec<String> = app
        .engine
        .messages_newest_first()
        .iter()
        .map(|m| m.text.clone())
        .collect();
    assert_eq!(
        newest_first,
        vec![
            "Goodbye!".to_string(),
            "Bye".to_string(),
            "Hello!".to_string(),
            "Hi".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_start_new_chat_clears_state_and_persisted_id() {
    let app = test_app().await;
    seed_session(&app).await;

    Mock::given(method("POST"))
        .and(path("/get_response"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Hi there",
            "history_id": 42
        })))
        .mount(&app.server)
        .await;

    app.engine.send("Hello").await.unwrap();
    assert_eq!(app.engine.history_id(), Some(42));

    app.engine.start_new_chat().await.unwrap();
    assert_eq!(app.engine.history_id(), None);
    assert!(app.engine.messages().is_empty());
    assert!(app.store.get(KEY_HISTORY_ID).await.unwrap().is_none());
}
