/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`    — Interactive chat session and one-shot sends
- `account` — Login, registration, profile, logout, account deletion
- `history` — Stored conversation listing and deletion

These handlers are intentionally small and use the library components:
the session manager, conversation engine, and history index.
*/

use std::sync::Arc;

use crate::client::ApiClient;
use crate::config::Config;
use crate::conversation::ConversationEngine;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::error::Result;
use crate::history::HistoryIndex;
use crate::session::{SessionHandle, SessionManager};

pub mod account;
pub mod chat;
pub mod history;

/// Wired-up application components sharing one session and one store
///
/// Building the context restores persisted state: the session comes back
/// from stored credentials and the engine recovers the active conversation
/// id, so a restarted process continues where the previous one stopped.
pub struct AppContext {
    /// Shared session handle
    pub session: SessionHandle,
    /// Session state machine
    pub manager: SessionManager,
    /// Active conversation owner
    pub engine: ConversationEngine,
    /// Stored conversation index
    pub history: HistoryIndex,
}

impl AppContext {
    /// Build and restore all components from configuration
    pub async fn build(config: &Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.storage.credentials_file {
            Some(path) => Arc::new(FileCredentialStore::open(path.clone())?),
            None => Arc::new(FileCredentialStore::open_default()?),
        };

        let session = SessionHandle::new(store.clone());
        session.restore().await?;

        let api = Arc::new(ApiClient::new(&config.server, session.clone())?);
        let manager = SessionManager::new(api.clone(), session.clone(), store.clone());
        let engine = ConversationEngine::new(api.clone(), session.clone(), store.clone());
        engine.restore().await?;
        let history = HistoryIndex::new(api);

        Ok(Self {
            session,
            manager,
            engine,
            history,
        })
    }
}

/// Read one line of input under the given label
pub(crate) fn prompt_line(label: &str) -> Result<String> {
    let mut editor = rustyline::DefaultEditor::new()?;
    let line = editor.readline(label)?;
    Ok(line.trim().to_string())
}
