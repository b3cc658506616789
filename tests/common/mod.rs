//! Shared helpers for integration tests
//!
//! Builds the full component stack (store, session, client, manager,
//! engine, history index) against a wiremock server.

#![allow(dead_code)]

use std::sync::Arc;

use wiremock::MockServer;

use confab::client::ApiClient;
use confab::config::ServerConfig;
use confab::conversation::{ConversationEngine, SendFailurePolicy};
use confab::credentials::{
    CredentialStore, MemoryCredentialStore, KEY_TOKEN, KEY_USERNAME, KEY_USER_ID,
};
use confab::history::HistoryIndex;
use confab::session::{SessionHandle, SessionManager};

/// Bearer token used by seeded sessions
pub const TEST_TOKEN: &str = "test_token";
/// Authorization header value matching [`TEST_TOKEN`]
pub const TEST_BEARER: &str = "Bearer test_token";

pub struct TestApp {
    pub server: MockServer,
    pub store: Arc<dyn CredentialStore>,
    pub session: SessionHandle,
    pub api: Arc<ApiClient>,
    pub manager: SessionManager,
    pub engine: ConversationEngine,
    pub history: HistoryIndex,
}

/// Build a stack over an in-memory store with the default send policy
pub async fn test_app() -> TestApp {
    test_app_with(
        Arc::new(MemoryCredentialStore::new()),
        SendFailurePolicy::default(),
    )
    .await
}

/// Build a stack over the given store and send-failure policy
pub async fn test_app_with(
    store: Arc<dyn CredentialStore>,
    policy: SendFailurePolicy,
) -> TestApp {
    let server = MockServer::start().await;

    let session = SessionHandle::new(store.clone());
    let config = ServerConfig {
        api_url: server.uri(),
        timeout_seconds: 5,
    };
    let api = Arc::new(ApiClient::new(&config, session.clone()).expect("client builds"));
    let manager = SessionManager::new(api.clone(), session.clone(), store.clone());
    let engine =
        ConversationEngine::with_failure_policy(api.clone(), session.clone(), store.clone(), policy);
    let history = HistoryIndex::new(api.clone());

    TestApp {
        server,
        store,
        session,
        api,
        manager,
        engine,
        history,
    }
}

/// Persist test credentials and restore the session from them
pub async fn seed_session(app: &TestApp) {
    app.store.set(KEY_TOKEN, TEST_TOKEN).await.unwrap();
    app.store.set(KEY_USER_ID, "7").await.unwrap();
    app.store.set(KEY_USERNAME, "alice").await.unwrap();
    assert!(app.session.restore().await.unwrap());
}
