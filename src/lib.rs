//! Confab - chat service client library
//!
//! This library provides the core functionality for the Confab client:
//! session management, the authenticated HTTP client, the conversation
//! engine, and the stored-conversation index.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session state machine and credential lifecycle
//! - `client`: Authenticated HTTP client for the chat service
//! - `conversation`: Active conversation and the optimistic send protocol
//! - `history`: Index of stored conversations
//! - `credentials`: Durable key-value persistence for session state
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use confab::client::ApiClient;
//! use confab::config::Config;
//! use confab::conversation::ConversationEngine;
//! use confab::credentials::{CredentialStore, FileCredentialStore};
//! use confab::session::{SessionHandle, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::open_default()?);
//!     let session = SessionHandle::new(store.clone());
//!     session.restore().await?;
//!
//!     let api = Arc::new(ApiClient::new(&config.server, session.clone())?);
//!     let manager = SessionManager::new(api.clone(), session.clone(), store.clone());
//!     let engine = ConversationEngine::new(api, session, store);
//!
//!     manager.login("user@example.com", "password").await?;
//!     let reply = engine.send("Hello!").await?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod history;
pub mod session;

mod single_flight;

// Re-export commonly used types
pub use client::ApiClient;
pub use config::Config;
pub use conversation::{Author, Conversation, ConversationEngine, Message, SendFailurePolicy};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ConfabError, Result};
pub use history::{HistoryEntry, HistoryIndex};
pub use session::{Session, SessionHandle, SessionManager, User};

#[cfg(test)]
pub mod test_utils;
